//! Harvest executor: drives a job's chunks through fetch, delivery and recording

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::ProgressBar;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn, Instrument};

use super::config::HarvesterConfig;
use super::job::{ChunkOutcome, ChunkReport, HarvestJob, JobReport};
use super::HarvestError;
use crate::fetcher::{FetchError, PagedFetcher};
use crate::metrics::ChunkMetrics;
use crate::progress::{JobIdentity, ProgressTracker};
use crate::shutdown::SharedCancel;
use crate::sink::{ChunkBatch, RecordSink};
use crate::split::DateChunk;

type InFlight = Arc<Mutex<HashSet<(JobIdentity, DateChunk)>>>;

/// Claim on one (job, chunk) pair; released on drop
struct InFlightGuard {
    registry: InFlight,
    key: (JobIdentity, DateChunk),
}

impl InFlightGuard {
    fn claim(registry: &InFlight, job: &JobIdentity, chunk: DateChunk) -> Option<Self> {
        let key = (job.clone(), chunk);
        let inserted = registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone());
        inserted.then(|| Self {
            registry: Arc::clone(registry),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

/// Orchestrates harvest jobs
///
/// One harvester may run several jobs (or the same job twice) concurrently;
/// the shared in-flight registry guarantees a (job, chunk) pair is never
/// fetched by two runs at once.
pub struct Harvester {
    fetcher: PagedFetcher,
    tracker: ProgressTracker,
    sink: Arc<dyn RecordSink>,
    config: HarvesterConfig,
    cancel: SharedCancel,
    in_flight: InFlight,
    progress_bar: Option<ProgressBar>,
}

impl Harvester {
    /// Create a harvester
    ///
    /// Parallelism defaults to the size of the fetcher's credential pool and the
    /// fetcher's cancellation signal is shared.
    pub fn new(fetcher: PagedFetcher, tracker: ProgressTracker, sink: Arc<dyn RecordSink>) -> Self {
        let config = HarvesterConfig::for_pool_size(fetcher.pool().len());
        let cancel = Arc::clone(fetcher.cancel_signal());
        Self {
            fetcher,
            tracker,
            sink,
            config,
            cancel,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            progress_bar: None,
        }
    }

    /// Override runtime settings
    pub fn with_config(mut self, config: HarvesterConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a cancellation signal (also observed by the fetcher)
    pub fn with_cancel(mut self, cancel: SharedCancel) -> Self {
        self.fetcher = self.fetcher.with_cancel(Arc::clone(&cancel));
        self.cancel = cancel;
        self
    }

    /// Advance `bar` by one for every chunk reaching an outcome
    pub fn with_progress_bar(mut self, bar: ProgressBar) -> Self {
        self.progress_bar = Some(bar);
        self
    }

    /// Runtime settings
    pub fn config(&self) -> &HarvesterConfig {
        &self.config
    }

    /// Progress tracker used for skipping and recording
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Run `job` until every chunk reaches an outcome or cancellation is requested
    ///
    /// Chunk failures are reported in the [`JobReport`], not returned as errors.
    ///
    /// # Errors
    /// Returns [`HarvestError::SinkWriteFailure`] when the final sink flush fails.
    pub async fn run(&self, job: &HarvestJob) -> Result<JobReport, HarvestError> {
        let span = tracing::info_span!(
            "harvest",
            job = %job.identity(),
            platform = %job.platform(),
            kind = %job.kind(),
            scope = %job.scope(),
        );

        async {
            let chunks = job.chunks();
            info!(
                chunks = chunks.len(),
                parallelism = self.config.parallelism,
                range = %job.range(),
                "Starting harvest job"
            );
            if let Some(bar) = &self.progress_bar {
                bar.set_length(chunks.len() as u64);
            }

            let reports: Vec<ChunkReport> = stream::iter(chunks)
                .map(|chunk| async move {
                    let outcome = self.process_chunk(job, chunk).await;
                    if let Some(bar) = &self.progress_bar {
                        bar.inc(1);
                    }
                    ChunkReport { chunk, outcome }
                })
                .buffer_unordered(self.config.parallelism)
                .collect()
                .await;

            self.sink.flush().await?;
            if let Some(bar) = &self.progress_bar {
                bar.finish();
            }

            let report = JobReport::new(
                job.identity().clone(),
                reports,
                self.cancel.is_cancelled(),
            );
            info!(
                status = %report.status(),
                completed = report.completed_count(),
                skipped = report.skipped_count(),
                failed = report.failed_count(),
                pending = report.pending_count(),
                items = report.items_delivered(),
                "Harvest job finished"
            );
            Ok::<_, HarvestError>(report)
        }
        .instrument(span)
        .await
    }

    async fn process_chunk(&self, job: &HarvestJob, chunk: DateChunk) -> ChunkOutcome {
        if self.cancel.is_cancelled() {
            return ChunkOutcome::NotStarted;
        }
        // claim before the progress lookup so a run finishing this chunk cannot race us
        let Some(_claim) = InFlightGuard::claim(&self.in_flight, job.identity(), chunk) else {
            debug!(chunk = %chunk, "Chunk in flight in another run, skipping");
            return ChunkOutcome::InFlightElsewhere;
        };
        if self.tracker.is_complete(job.identity(), &chunk).await {
            debug!(chunk = %chunk, "Chunk already complete, skipping");
            return ChunkOutcome::AlreadyComplete;
        }

        let metrics = ChunkMetrics::start(job.identity().as_str(), chunk);
        let span = tracing::debug_span!("chunk", chunk = %chunk);
        match self.harvest_chunk(job, chunk).instrument(span).await {
            Ok(outcome @ ChunkOutcome::Completed { items, .. }) => {
                metrics.record_success(items);
                outcome
            }
            Ok(outcome) => outcome,
            Err(HarvestError::Cancelled) | Err(HarvestError::Fetch(FetchError::Cancelled)) => {
                info!(chunk = %chunk, "Chunk interrupted by cancellation, left pending");
                ChunkOutcome::NotStarted
            }
            Err(e) => {
                error!(
                    chunk = %chunk,
                    class = e.class_label(),
                    retryable = e.is_retryable(),
                    error = %e,
                    hint = e.suggestion().unwrap_or_default(),
                    "Chunk failed"
                );
                metrics.record_failure(e.class_label(), &e.to_string());
                ChunkOutcome::failed(&e)
            }
        }
    }

    /// Fetch, deliver and record one chunk
    async fn harvest_chunk(
        &self,
        job: &HarvestJob,
        chunk: DateChunk,
    ) -> Result<ChunkOutcome, HarvestError> {
        let records: Vec<serde_json::Value> = self
            .fetcher
            .fetch_all(job.endpoint(), chunk)
            .try_collect()
            .await?;
        let completed_at = Utc::now();
        let items = records.len();
        debug!(chunk = %chunk, items = items, "Chunk fetched");

        let batch = ChunkBatch {
            job: job.identity().clone(),
            platform: job.platform(),
            kind: job.kind(),
            scope: job.scope().to_string(),
            chunk,
            completed_at,
            records,
        };
        self.sink.write_batch(&batch).await?;

        self.record_complete(job.identity(), chunk, completed_at, items as u64)
            .await?;
        Ok(ChunkOutcome::Completed {
            items,
            completed_at,
        })
    }

    /// Record completion, retrying store failures on the transient backoff schedule
    ///
    /// Retries ignore cancellation: the batch has already been delivered.
    async fn record_complete(
        &self,
        job: &JobIdentity,
        chunk: DateChunk,
        completed_at: chrono::DateTime<Utc>,
        items: u64,
    ) -> Result<(), HarvestError> {
        let attempts = self.config.progress_write_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .tracker
                .mark_complete(job, chunk, completed_at, items)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    let delay = self.fetcher.backoff().delay_for(attempt);
                    warn!(
                        chunk = %chunk,
                        attempt = attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Progress write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(HarvestError::ProgressStoreUnavailable(e)),
            }
        }
    }
}
