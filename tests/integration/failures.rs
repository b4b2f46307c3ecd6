//! Integration tests for chunk-level failure handling

use activity_harvester::credential::QuotaInfo;
use activity_harvester::fetcher::PageError;
use activity_harvester::harvester::{ChunkOutcome, JobStatus};
use activity_harvester::progress::{MemoryProgressStore, ProgressStore};
use activity_harvester::sink::MemorySink;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::support::{date, harvester, issue_job, FakeSource, FlakyStore, RejectingSink};

fn status(code: u16, body: &str) -> PageError {
    PageError::Status {
        status: code,
        body: body.to_string(),
        quota: QuotaInfo::default(),
    }
}

#[tokio::test]
async fn test_client_error_fails_one_chunk_after_a_single_attempt() {
    let job = issue_job("2024-01-01", "2024-01-05");
    let source = FakeSource::new();
    source.fail_day("2024-01-03", vec![status(422, "Validation Failed")]);
    let store = Arc::new(MemoryProgressStore::new());

    let report = harvester(source.clone(), store.clone(), Arc::new(MemorySink::new()), 2)
        .run(&job)
        .await
        .unwrap();

    assert_eq!(source.calls_for("2024-01-03"), 1);
    assert_eq!(report.status(), JobStatus::PartiallyFailed);
    assert_eq!(report.completed_count(), 4);
    assert_eq!(report.failed_count(), 1);

    // a rejected request is not worth resuming
    assert!(report.resumable_chunks().is_empty());
    let failed = job.chunks()[2];
    assert_eq!(failed.start().date_naive(), date("2024-01-03"));
    match report.outcome(&failed) {
        Some(ChunkOutcome::Failed {
            class, retryable, ..
        }) => {
            assert_eq!(class, "client_error");
            assert!(!retryable);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!store.is_complete(job.identity(), &failed).await.unwrap());
}

#[tokio::test]
async fn test_job_fails_when_no_chunk_succeeds() {
    let job = issue_job("2024-01-01", "2024-01-02");
    let source = FakeSource::new();
    source.fail_day("2024-01-01", vec![status(404, "Not Found")]);
    source.fail_day("2024-01-02", vec![status(404, "Not Found")]);

    let report = harvester(
        source.clone(),
        Arc::new(MemoryProgressStore::new()),
        Arc::new(MemorySink::new()),
        2,
    )
    .run(&job)
    .await
    .unwrap();

    assert_eq!(report.status(), JobStatus::Failed);
    assert_eq!(source.calls().len(), 2);
}

#[tokio::test]
async fn test_transient_errors_are_retried_then_recovered() {
    let job = issue_job("2024-01-01", "2024-01-01");
    let source = FakeSource::new();
    source.fail_day(
        "2024-01-01",
        vec![
            status(502, "Bad Gateway"),
            PageError::Network {
                message: "connection reset".to_string(),
                timeout: false,
            },
        ],
    );

    let report = harvester(
        source.clone(),
        Arc::new(MemoryProgressStore::new()),
        Arc::new(MemorySink::new()),
        1,
    )
    .run(&job)
    .await
    .unwrap();

    assert_eq!(source.calls_for("2024-01-01"), 3);
    assert_eq!(report.status(), JobStatus::Finished);
    assert_eq!(report.items_delivered(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_leave_the_chunk_resumable() {
    let job = issue_job("2024-01-01", "2024-01-02");
    let source = FakeSource::new();
    source.fail_day(
        "2024-01-02",
        (0..5).map(|_| status(503, "Service Unavailable")).collect(),
    );
    let store = Arc::new(MemoryProgressStore::new());

    let report = harvester(source.clone(), store.clone(), Arc::new(MemorySink::new()), 1)
        .run(&job)
        .await
        .unwrap();

    // max_retries = 2: the third failure gives up
    assert_eq!(source.calls_for("2024-01-02"), 3);
    assert_eq!(report.status(), JobStatus::PartiallyFailed);
    let resumable = report.resumable_chunks();
    assert_eq!(resumable.len(), 1);
    assert!(matches!(
        report.outcome(&resumable[0]),
        Some(ChunkOutcome::Failed { retryable: true, .. })
    ));

    // remaining scripted failures are consumed by the resumed run's first two attempts
    let resumed = harvester(source.clone(), store, Arc::new(MemorySink::new()), 1)
        .run(&job)
        .await
        .unwrap();
    assert_eq!(resumed.status(), JobStatus::Finished);
    assert_eq!(resumed.skipped_count(), 1);
    assert_eq!(source.calls_for("2024-01-01"), 1);
}

#[tokio::test]
async fn test_progress_write_is_retried_before_failing() {
    let job = issue_job("2024-01-01", "2024-01-01");
    let store = FlakyStore::new(2);
    let sink = Arc::new(MemorySink::new());

    let report = harvester(FakeSource::new(), store.clone(), sink.clone(), 1)
        .run(&job)
        .await
        .unwrap();

    assert_eq!(report.status(), JobStatus::Finished);
    assert_eq!(store.writes.load(Ordering::SeqCst), 3);
    assert_eq!(sink.batches().len(), 1);
}

#[tokio::test]
async fn test_unavailable_progress_store_fails_the_chunk_as_retryable() {
    let job = issue_job("2024-01-01", "2024-01-01");
    let store = FlakyStore::new(usize::MAX);
    let sink = Arc::new(MemorySink::new());

    let report = harvester(FakeSource::new(), store.clone(), sink.clone(), 1)
        .run(&job)
        .await
        .unwrap();

    assert_eq!(report.status(), JobStatus::Failed);
    let chunk = job.chunks()[0];
    match report.outcome(&chunk) {
        Some(ChunkOutcome::Failed {
            class, retryable, ..
        }) => {
            assert_eq!(class, "progress_store_unavailable");
            assert!(*retryable);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    // the batch was delivered before the write failed; a resumed run delivers it again
    assert_eq!(sink.batches().len(), 1);
    assert!(!store.is_complete(job.identity(), &chunk).await.unwrap());
}

#[tokio::test]
async fn test_sink_failure_is_a_chunk_failure_not_a_completion() {
    let job = issue_job("2024-01-01", "2024-01-03");
    let store = Arc::new(MemoryProgressStore::new());
    let sink = RejectingSink::rejecting("2024-01-02");

    let report = harvester(FakeSource::new(), store.clone(), sink.clone(), 1)
        .run(&job)
        .await
        .unwrap();

    assert_eq!(report.status(), JobStatus::PartiallyFailed);
    assert_eq!(sink.accepted.batches().len(), 2);
    let rejected = job.chunks()[1];
    assert!(matches!(
        report.outcome(&rejected),
        Some(ChunkOutcome::Failed { class, .. }) if class == "sink_write_failure"
    ));
    assert!(!store.is_complete(job.identity(), &rejected).await.unwrap());
    assert_eq!(store.len(job.identity()), 2);
}
