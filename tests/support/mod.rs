//! Shared fakes for the integration suite

#![allow(dead_code)]

use activity_harvester::backoff::BackoffPolicy;
use activity_harvester::credential::{Credential, CredentialPool, QuotaInfo};
use activity_harvester::fetcher::{EndpointSpec, FetchResult, PageError, PageSource, PagedFetcher};
use activity_harvester::harvester::{HarvestJob, Harvester, HarvesterConfig};
use activity_harvester::progress::{
    JobIdentity, MemoryProgressStore, ProgressRecord, ProgressStore, ProgressStoreError,
    ProgressTracker,
};
use activity_harvester::shutdown::SharedCancel;
use activity_harvester::sink::{ChunkBatch, MemorySink, RecordSink, SinkError, SinkResult};
use activity_harvester::split::{DateChunk, DateRange};
use activity_harvester::{EntityKind, Platform};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded page request
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub chunk: DateChunk,
    pub cursor: Option<String>,
    pub credential: String,
}

/// Page source serving two records per chunk, with scripted failures per day
///
/// Failures queued for a day are returned (in order) before that day succeeds.
/// Optionally rejects one credential with 429, cancels a signal after N calls,
/// and sleeps inside each request to widen concurrency windows.
#[derive(Default)]
pub struct FakeSource {
    failures: Mutex<HashMap<NaiveDate, VecDeque<PageError>>>,
    rate_limited: Mutex<Option<(String, DateTime<Utc>)>>,
    cancel_after: Mutex<Option<(usize, SharedCancel)>>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<Call>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_day(&self, day: &str, errors: Vec<PageError>) {
        self.failures
            .lock()
            .unwrap()
            .entry(date(day))
            .or_default()
            .extend(errors);
    }

    pub fn rate_limit_credential(&self, identifier: &str, reset_at: DateTime<Utc>) {
        *self.rate_limited.lock().unwrap() = Some((identifier.to_string(), reset_at));
    }

    pub fn cancel_after(&self, calls: usize, cancel: SharedCancel) {
        *self.cancel_after.lock().unwrap() = Some((calls, cancel));
    }

    pub fn with_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, day: &str) -> usize {
        let day = date(day);
        self.calls()
            .iter()
            .filter(|call| call.chunk.start().date_naive() == day)
            .count()
    }

    pub fn fetched_days(&self) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = self
            .calls()
            .iter()
            .map(|call| call.chunk.start().date_naive())
            .collect();
        days.sort();
        days.dedup();
        days
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for FakeSource {
    async fn fetch_page(
        &self,
        _endpoint: &EndpointSpec,
        filter: &DateChunk,
        cursor: Option<&str>,
        credential: &Credential,
    ) -> Result<FetchResult, PageError> {
        let call_count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                chunk: *filter,
                cursor: cursor.map(str::to_string),
                credential: credential.identifier().to_string(),
            });
            calls.len()
        };
        if let Some((after, cancel)) = self.cancel_after.lock().unwrap().as_ref() {
            if call_count >= *after {
                cancel.cancel();
            }
        }

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let limited = self.rate_limited.lock().unwrap().clone();
        if let Some((identifier, reset_at)) = limited {
            if identifier == credential.identifier() {
                return Err(PageError::Status {
                    status: 429,
                    body: "API rate limit exceeded".to_string(),
                    quota: QuotaInfo::new(0, reset_at),
                });
            }
        }

        let day = filter.start().date_naive();
        let scripted = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&day)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }

        Ok(FetchResult {
            items: vec![
                serde_json::json!({ "day": day.to_string(), "n": 1 }),
                serde_json::json!({ "day": day.to_string(), "n": 2 }),
            ],
            ..FetchResult::default()
        })
    }
}

/// Store wrapper failing the first `failures` writes
pub struct FlakyStore {
    inner: MemoryProgressStore,
    failures: AtomicUsize,
    pub writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryProgressStore::new(),
            failures: AtomicUsize::new(failures),
            writes: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ProgressStore for FlakyStore {
    async fn is_complete(&self, job: &JobIdentity, chunk: &DateChunk) -> Result<bool, ProgressStoreError> {
        self.inner.is_complete(job, chunk).await
    }

    async fn mark_complete(&self, job: &JobIdentity, record: ProgressRecord) -> Result<(), ProgressStoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ProgressStoreError::Unavailable("store offline".to_string()));
        }
        self.inner.mark_complete(job, record).await
    }

    async fn completed_chunks(&self, job: &JobIdentity) -> Result<Vec<ProgressRecord>, ProgressStoreError> {
        self.inner.completed_chunks(job).await
    }

    async fn reset(&self, job: &JobIdentity) -> Result<usize, ProgressStoreError> {
        self.inner.reset(job).await
    }
}

/// Sink rejecting batches for one day and keeping the rest
#[derive(Default)]
pub struct RejectingSink {
    reject: Mutex<Option<NaiveDate>>,
    pub accepted: MemorySink,
}

impl RejectingSink {
    pub fn rejecting(day: &str) -> Arc<Self> {
        let sink = Self::default();
        *sink.reject.lock().unwrap() = Some(date(day));
        Arc::new(sink)
    }
}

#[async_trait]
impl RecordSink for RejectingSink {
    async fn write_batch(&self, batch: &ChunkBatch) -> SinkResult<()> {
        if *self.reject.lock().unwrap() == Some(batch.chunk.start().date_naive()) {
            return Err(SinkError::Rejected("database unavailable".to_string()));
        }
        self.accepted.write_batch(batch).await
    }

    async fn flush(&self) -> SinkResult<()> {
        Ok(())
    }
}

pub fn date(day: &str) -> NaiveDate {
    NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap()
}

pub fn fast_backoff(max_retries: u32) -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(4), max_retries)
        .without_jitter()
}

pub fn pool(identifiers: &[&str]) -> Arc<CredentialPool> {
    Arc::new(
        CredentialPool::new(
            identifiers
                .iter()
                .map(|id| Credential::labeled(*id, format!("secret-{id}")))
                .collect(),
        )
        .unwrap(),
    )
}

/// GitHub issue job over the inclusive day range
pub fn issue_job(start: &str, end: &str) -> HarvestJob {
    HarvestJob::new(
        Platform::GitHub,
        EntityKind::Issue,
        "rust-lang/rust",
        DateRange::parse(start, end).unwrap(),
        1,
    )
    .unwrap()
}

pub fn harvester(
    source: Arc<FakeSource>,
    store: Arc<dyn ProgressStore>,
    sink: Arc<dyn RecordSink>,
    parallelism: usize,
) -> Harvester {
    let fetcher = PagedFetcher::new(source, pool(&["a"]), fast_backoff(2));
    Harvester::new(fetcher, ProgressTracker::new(store), sink)
        .with_config(HarvesterConfig::default().with_parallelism(parallelism))
}
