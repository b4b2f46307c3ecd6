//! Integration tests for the bounded worker pool and the in-flight invariant

use activity_harvester::harvester::{ChunkOutcome, JobStatus};
use activity_harvester::progress::MemoryProgressStore;
use activity_harvester::sink::MemorySink;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::support::{harvester, issue_job, FakeSource};

#[tokio::test]
async fn test_every_chunk_completes_exactly_once_with_bounded_parallelism() {
    let job = issue_job("2024-01-01", "2024-01-10");
    let source = FakeSource::new();
    source.with_latency(Duration::from_millis(20));
    let store = Arc::new(MemoryProgressStore::new());
    let sink = Arc::new(MemorySink::new());

    let report = harvester(source.clone(), store.clone(), sink.clone(), 3)
        .run(&job)
        .await
        .unwrap();

    assert_eq!(report.status(), JobStatus::Finished);
    assert_eq!(report.completed_count(), 10);
    assert_eq!(source.calls().len(), 10);
    assert!(source.peak_concurrency() <= 3);
    assert!(source.peak_concurrency() >= 2);

    let delivered: HashSet<_> = sink.batches().iter().map(|b| b.chunk).collect();
    assert_eq!(delivered.len(), 10);
    assert_eq!(sink.batches().len(), 10);
    assert_eq!(store.len(job.identity()), 10);
}

#[tokio::test]
async fn test_report_is_in_chunk_order_despite_out_of_order_completion() {
    let job = issue_job("2024-03-01", "2024-03-08");
    let source = FakeSource::new();
    source.with_latency(Duration::from_millis(5));

    let report = harvester(
        source,
        Arc::new(MemoryProgressStore::new()),
        Arc::new(MemorySink::new()),
        4,
    )
    .run(&job)
    .await
    .unwrap();

    let reported: Vec<_> = report.chunks().iter().map(|c| c.chunk).collect();
    assert_eq!(reported, job.chunks());
}

#[tokio::test]
async fn test_concurrent_runs_of_one_job_never_fetch_a_chunk_twice() {
    let job = issue_job("2024-01-01", "2024-01-06");
    let source = FakeSource::new();
    source.with_latency(Duration::from_millis(20));
    let harvester = harvester(
        source.clone(),
        Arc::new(MemoryProgressStore::new()),
        Arc::new(MemorySink::new()),
        6,
    );

    let (first, second) = tokio::join!(harvester.run(&job), harvester.run(&job));
    let (first, second) = (first.unwrap(), second.unwrap());

    for day in [
        "2024-01-01",
        "2024-01-02",
        "2024-01-03",
        "2024-01-04",
        "2024-01-05",
        "2024-01-06",
    ] {
        assert_eq!(source.calls_for(day), 1, "day {day} fetched more than once");
    }
    for chunk in job.chunks() {
        let outcomes = [first.outcome(&chunk), second.outcome(&chunk)];
        let fetched = outcomes
            .iter()
            .filter(|o| matches!(o, Some(ChunkOutcome::Completed { .. })))
            .count();
        assert_eq!(fetched, 1);
    }
}
