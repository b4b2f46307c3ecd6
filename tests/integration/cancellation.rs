//! Integration tests for cancellation and resumption after it

use activity_harvester::fetcher::PagedFetcher;
use activity_harvester::harvester::{ChunkOutcome, Harvester, JobStatus};
use activity_harvester::progress::{MemoryProgressStore, ProgressTracker};
use activity_harvester::shutdown::CancelSignal;
use activity_harvester::sink::MemorySink;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::support::{date, fast_backoff, harvester, issue_job, pool, FakeSource};

#[tokio::test]
async fn test_cancel_mid_job_then_resume_completes_exactly_the_rest() {
    let job = issue_job("2024-01-01", "2024-01-10");
    let store = Arc::new(MemoryProgressStore::new());
    let cancel = CancelSignal::shared();
    let source = FakeSource::new();
    // the fourth page request triggers cancellation; that page still completes its chunk
    source.cancel_after(4, cancel.clone());
    let sink = Arc::new(MemorySink::new());

    let report = harvester(source.clone(), store.clone(), sink.clone(), 1)
        .with_cancel(cancel)
        .run(&job)
        .await
        .unwrap();

    assert_eq!(report.status(), JobStatus::Cancelled);
    assert!(report.was_cancelled());
    assert_eq!(report.completed_count(), 4);
    assert_eq!(report.pending_count(), 6);
    assert!(report
        .chunks()
        .iter()
        .skip(4)
        .all(|c| c.outcome == ChunkOutcome::NotStarted));
    assert_eq!(source.calls().len(), 4);
    assert_eq!(store.len(job.identity()), 4);

    let resumed_source = FakeSource::new();
    let resumed = harvester(resumed_source.clone(), store.clone(), sink.clone(), 3)
        .run(&job)
        .await
        .unwrap();

    assert_eq!(resumed.status(), JobStatus::Finished);
    assert_eq!(resumed.skipped_count(), 4);
    assert_eq!(resumed.completed_count(), 6);
    let fetched = resumed_source.fetched_days();
    assert_eq!(fetched.len(), 6);
    assert_eq!(fetched[0], date("2024-01-05"));
    assert_eq!(sink.batches().len(), 10);
}

#[tokio::test]
async fn test_cancel_while_waiting_on_blocked_pool_leaves_chunk_pending() {
    let job = issue_job("2024-01-01", "2024-01-02");
    let source = FakeSource::new();
    source.rate_limit_credential("a", Utc::now() + ChronoDuration::hours(1));
    let cancel = CancelSignal::shared();

    let fetcher = PagedFetcher::new(source.clone(), pool(&["a"]), fast_backoff(3));
    let harvester = Harvester::new(
        fetcher,
        ProgressTracker::new(Arc::new(MemoryProgressStore::new())),
        Arc::new(MemorySink::new()),
    )
    .with_cancel(cancel.clone());

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        }
    });

    let report = tokio::time::timeout(Duration::from_secs(5), harvester.run(&job))
        .await
        .expect("cancellation must interrupt the quota wait")
        .unwrap();

    assert_eq!(report.status(), JobStatus::Cancelled);
    assert_eq!(report.resumable_chunks().len(), 2);
    // one rejected request, then the pool blocked until cancellation
    assert_eq!(source.calls().len(), 1);
}
