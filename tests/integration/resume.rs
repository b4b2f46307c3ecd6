//! Integration tests for idempotent resumption

use activity_harvester::harvester::{ChunkOutcome, JobStatus};
use activity_harvester::progress::{FileProgressStore, MemoryProgressStore, ProgressStore, ProgressTracker};
use activity_harvester::sink::{JsonLinesSink, MemorySink};
use chrono::Utc;
use std::sync::Arc;

use crate::support::{date, harvester, issue_job, FakeSource};

#[tokio::test]
async fn test_resume_fetches_only_the_remaining_days() {
    let job = issue_job("2024-01-01", "2024-01-10");
    let store = Arc::new(MemoryProgressStore::new());
    let tracker = ProgressTracker::new(store.clone());
    for chunk in job.chunks().into_iter().take(3) {
        tracker
            .mark_complete(job.identity(), chunk, Utc::now(), 2)
            .await
            .unwrap();
    }

    let source = FakeSource::new();
    let sink = Arc::new(MemorySink::new());
    let report = harvester(source.clone(), store.clone(), sink.clone(), 2)
        .run(&job)
        .await
        .unwrap();

    assert_eq!(report.status(), JobStatus::Finished);
    assert_eq!(report.skipped_count(), 3);
    assert_eq!(report.completed_count(), 7);
    let fetched = source.fetched_days();
    assert_eq!(fetched.len(), 7);
    assert_eq!(fetched.first(), Some(&date("2024-01-04")));
    assert_eq!(fetched.last(), Some(&date("2024-01-10")));
    assert_eq!(sink.record_count(), 14);
    assert_eq!(store.len(job.identity()), 10);
}

#[tokio::test]
async fn test_rerun_of_finished_job_fetches_nothing() {
    let job = issue_job("2024-01-01", "2024-01-05");
    let store = Arc::new(MemoryProgressStore::new());
    let first = FakeSource::new();
    harvester(first.clone(), store.clone(), Arc::new(MemorySink::new()), 2)
        .run(&job)
        .await
        .unwrap();
    assert_eq!(first.calls().len(), 5);

    let second = FakeSource::new();
    let report = harvester(second.clone(), store, Arc::new(MemorySink::new()), 2)
        .run(&job)
        .await
        .unwrap();
    assert!(second.calls().is_empty());
    assert!(report
        .chunks()
        .iter()
        .all(|c| c.outcome == ChunkOutcome::AlreadyComplete));
    assert_eq!(report.status(), JobStatus::Finished);
}

#[tokio::test]
async fn test_file_store_resumes_across_processes() {
    let dir = tempfile::tempdir().unwrap();
    let progress_dir = dir.path().join("progress");
    let output = dir.path().join("issues.jsonl");
    let job = issue_job("2024-02-01", "2024-02-04");

    // first "process" completes two of four days, then the store is rebuilt from disk
    {
        let store = Arc::new(FileProgressStore::new(&progress_dir));
        let tracker = ProgressTracker::new(store);
        for chunk in job.chunks().into_iter().take(2) {
            tracker
                .mark_complete(job.identity(), chunk, Utc::now(), 2)
                .await
                .unwrap();
        }
    }

    let store = Arc::new(FileProgressStore::new(&progress_dir));
    let source = FakeSource::new();
    let sink = Arc::new(JsonLinesSink::open(&output).unwrap());
    let report = harvester(source.clone(), store.clone(), sink, 1)
        .run(&job)
        .await
        .unwrap();

    assert_eq!(report.status(), JobStatus::Finished);
    assert_eq!(
        source.fetched_days(),
        vec![date("2024-02-03"), date("2024-02-04")]
    );
    assert_eq!(store.completed_chunks(job.identity()).await.unwrap().len(), 4);
    let lines = std::fs::read_to_string(&output).unwrap();
    assert_eq!(lines.lines().count(), 4);
}

#[tokio::test]
async fn test_reset_makes_completed_chunks_fetchable_again() {
    let job = issue_job("2024-01-01", "2024-01-03");
    let store = Arc::new(MemoryProgressStore::new());
    harvester(FakeSource::new(), store.clone(), Arc::new(MemorySink::new()), 1)
        .run(&job)
        .await
        .unwrap();

    let removed = ProgressTracker::new(store.clone())
        .reset(job.identity())
        .await
        .unwrap();
    assert_eq!(removed, 3);

    let source = FakeSource::new();
    let report = harvester(source.clone(), store, Arc::new(MemorySink::new()), 1)
        .run(&job)
        .await
        .unwrap();
    assert_eq!(report.completed_count(), 3);
    assert_eq!(source.fetched_days().len(), 3);
}
