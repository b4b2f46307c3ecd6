//! Integration tests for credential rotation under rate limiting

use activity_harvester::credential::{Acquire, Credential};
use activity_harvester::fetcher::PagedFetcher;
use activity_harvester::harvester::{Harvester, HarvesterConfig, JobStatus};
use activity_harvester::progress::{MemoryProgressStore, ProgressTracker};
use activity_harvester::sink::MemorySink;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;

use crate::support::{fast_backoff, issue_job, pool, FakeSource};

#[tokio::test]
async fn test_rate_limited_credential_is_rotated_out() {
    let job = issue_job("2024-01-01", "2024-01-03");
    let source = FakeSource::new();
    let reset_at = Utc::now() + ChronoDuration::hours(1);
    source.rate_limit_credential("a", reset_at);
    let pool = pool(&["a", "b"]);

    let fetcher = PagedFetcher::new(source.clone(), pool.clone(), fast_backoff(3));
    let harvester = Harvester::new(
        fetcher,
        ProgressTracker::new(Arc::new(MemoryProgressStore::new())),
        Arc::new(MemorySink::new()),
    )
    .with_config(HarvesterConfig::default().with_parallelism(1));

    let report = harvester.run(&job).await.unwrap();
    assert_eq!(report.status(), JobStatus::Finished);

    let calls = source.calls();
    let on_a = calls.iter().filter(|c| c.credential == "a").count();
    let on_b = calls.iter().filter(|c| c.credential == "b").count();
    assert!(on_a <= 1, "exhausted credential reused: {calls:?}");
    assert_eq!(on_b, 3);

    // "a" stays exhausted until its reset, so the pool keeps handing out "b"
    for _ in 0..3 {
        match pool.acquire() {
            Acquire::Ready(credential) => assert_eq!(credential.identifier(), "b"),
            Acquire::Blocked { .. } => panic!("pool should not be blocked"),
        }
    }
    let a: Credential = pool
        .snapshot()
        .into_iter()
        .find(|c| c.identifier() == "a")
        .unwrap();
    if on_a == 1 {
        assert_eq!(a.remaining_quota(), 0);
        assert_eq!(a.reset_at(), Some(reset_at));
    }
}

#[tokio::test]
async fn test_default_parallelism_follows_pool_size() {
    let fetcher = PagedFetcher::new(FakeSource::new(), pool(&["a", "b", "c"]), fast_backoff(1));
    let harvester = Harvester::new(
        fetcher,
        ProgressTracker::new(Arc::new(MemoryProgressStore::new())),
        Arc::new(MemorySink::new()),
    );
    assert_eq!(harvester.config().parallelism, 3);
}
