//! Harvest job definition and per-chunk reporting

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::HarvestError;
use crate::fetcher::EndpointSpec;
use crate::progress::JobIdentity;
use crate::split::{split, DateChunk, DateRange};
use crate::{EntityKind, Platform};

/// One mining request: what to list, where, and over which dates
///
/// Immutable once built; all mutable state lives in the progress store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestJob {
    platform: Platform,
    kind: EntityKind,
    scope: String,
    range: DateRange,
    granularity_days: u32,
    endpoint: EndpointSpec,
    identity: JobIdentity,
}

impl HarvestJob {
    /// Build and validate a job
    ///
    /// # Errors
    /// Returns [`HarvestError::Validation`] when the platform cannot list `kind`,
    /// the scope is malformed, or `granularity_days` is zero.
    pub fn new(
        platform: Platform,
        kind: EntityKind,
        scope: &str,
        range: DateRange,
        granularity_days: u32,
    ) -> Result<Self, HarvestError> {
        if granularity_days == 0 {
            return Err(HarvestError::Validation(
                "granularity must be at least 1 day".to_string(),
            ));
        }
        let endpoint =
            EndpointSpec::resolve(platform, kind, scope).map_err(HarvestError::Validation)?;
        let scope = endpoint.scope.clone();
        let identity = JobIdentity::new(platform, kind, &scope, &range);

        Ok(Self {
            platform,
            kind,
            scope,
            range,
            granularity_days,
            endpoint,
            identity,
        })
    }

    /// Source platform
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Entity kind listed
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Repository, project key or site
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Requested half-open range
    pub fn range(&self) -> &DateRange {
        &self.range
    }

    /// Chunk width in days
    pub fn granularity_days(&self) -> u32 {
        self.granularity_days
    }

    /// Resolved list endpoint
    pub fn endpoint(&self) -> &EndpointSpec {
        &self.endpoint
    }

    /// Stable identity keying progress records
    pub fn identity(&self) -> &JobIdentity {
        &self.identity
    }

    /// Chunks to process, in order
    ///
    /// Endpoints without a date filter are fetched as a single chunk spanning the range.
    pub fn chunks(&self) -> Vec<DateChunk> {
        if !self.endpoint.dated {
            return DateChunk::new(self.range.start(), self.range.end())
                .into_iter()
                .collect();
        }
        // granularity was checked in new()
        split(&self.range, self.granularity_days)
            .map(|chunks| chunks.collect())
            .unwrap_or_default()
    }
}

/// Job-level state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Chunks are still being processed (here or by another run)
    #[default]
    Running,
    /// Every chunk is complete
    Finished,
    /// No chunk is complete and at least one failed
    Failed,
    /// Some chunks are complete, others failed
    PartiallyFailed,
    /// Cancellation stopped the job with chunks still pending
    Cancelled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::PartiallyFailed => "partially_failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// What happened to one chunk during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChunkOutcome {
    /// Recorded complete by an earlier run; not fetched
    AlreadyComplete,
    /// Fetched, delivered and recorded in this run
    Completed {
        /// Records delivered
        items: usize,
        /// When the fetch finished
        completed_at: DateTime<Utc>,
    },
    /// Surfaced as failed; left pending
    Failed {
        /// Error description
        error: String,
        /// Error class label
        class: String,
        /// Whether a resumed run may succeed
        retryable: bool,
        /// Remediation hint, when one applies
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
    /// Not started (or interrupted) because cancellation was requested
    NotStarted,
    /// Another run on the same harvester is fetching this chunk
    InFlightElsewhere,
}

impl ChunkOutcome {
    pub(crate) fn failed(error: &HarvestError) -> Self {
        ChunkOutcome::Failed {
            error: error.to_string(),
            class: error.class_label().to_string(),
            retryable: error.is_retryable(),
            hint: error.suggestion().map(str::to_string),
        }
    }

    /// Whether the chunk is recorded complete after this run
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            ChunkOutcome::AlreadyComplete | ChunkOutcome::Completed { .. }
        )
    }

    /// Whether the chunk failed in this run
    pub fn is_failed(&self) -> bool {
        matches!(self, ChunkOutcome::Failed { .. })
    }
}

/// Outcome of one chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkReport {
    /// Chunk boundaries
    pub chunk: DateChunk,
    /// What happened to it
    #[serde(flatten)]
    pub outcome: ChunkOutcome,
}

/// Final report of a run: every chunk's outcome in chunk order
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    job: JobIdentity,
    chunks: Vec<ChunkReport>,
    cancelled: bool,
}

impl JobReport {
    pub(crate) fn new(job: JobIdentity, mut chunks: Vec<ChunkReport>, cancelled: bool) -> Self {
        chunks.sort_by_key(|report| report.chunk);
        Self {
            job,
            chunks,
            cancelled,
        }
    }

    /// Job the report belongs to
    pub fn job(&self) -> &JobIdentity {
        &self.job
    }

    /// Per-chunk outcomes, ordered by chunk start
    pub fn chunks(&self) -> &[ChunkReport] {
        &self.chunks
    }

    /// Outcome for `chunk`, if it belongs to the job
    pub fn outcome(&self, chunk: &DateChunk) -> Option<&ChunkOutcome> {
        self.chunks
            .iter()
            .find(|report| &report.chunk == chunk)
            .map(|report| &report.outcome)
    }

    /// Whether cancellation was observed during the run
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Job status derived from the chunk outcomes
    ///
    /// Failures dominate: any failed chunk makes the job `PartiallyFailed`
    /// (some chunk complete) or `Failed` (none complete). Otherwise pending
    /// chunks make it `Cancelled` after a cancellation, or `Running` while
    /// another run still holds them.
    pub fn status(&self) -> JobStatus {
        if self.failed_count() > 0 {
            return if self.complete_count() > 0 {
                JobStatus::PartiallyFailed
            } else {
                JobStatus::Failed
            };
        }
        if self.pending_count() > 0 {
            return if self.cancelled {
                JobStatus::Cancelled
            } else {
                JobStatus::Running
            };
        }
        JobStatus::Finished
    }

    /// Chunks a resumed run could still complete: retryable failures and chunks left unstarted
    ///
    /// Client errors are excluded; the same request would be rejected again.
    pub fn resumable_chunks(&self) -> Vec<DateChunk> {
        self.chunks
            .iter()
            .filter(|report| {
                matches!(
                    report.outcome,
                    ChunkOutcome::Failed { retryable: true, .. } | ChunkOutcome::NotStarted
                )
            })
            .map(|report| report.chunk)
            .collect()
    }

    /// Records delivered in this run
    pub fn items_delivered(&self) -> usize {
        self.chunks
            .iter()
            .map(|report| match report.outcome {
                ChunkOutcome::Completed { items, .. } => items,
                _ => 0,
            })
            .sum()
    }

    /// Chunks fetched and recorded in this run
    pub fn completed_count(&self) -> usize {
        self.count(|o| matches!(o, ChunkOutcome::Completed { .. }))
    }

    /// Chunks skipped because an earlier run completed them
    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, ChunkOutcome::AlreadyComplete))
    }

    /// Chunks that failed
    pub fn failed_count(&self) -> usize {
        self.count(ChunkOutcome::is_failed)
    }

    /// Chunks neither complete nor failed
    pub fn pending_count(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                ChunkOutcome::NotStarted | ChunkOutcome::InFlightElsewhere
            )
        })
    }

    fn complete_count(&self) -> usize {
        self.count(ChunkOutcome::is_complete)
    }

    fn count(&self, predicate: impl Fn(&ChunkOutcome) -> bool) -> usize {
        self.chunks
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }
}

#[derive(Serialize)]
struct JobReportView<'a> {
    job: &'a JobIdentity,
    status: JobStatus,
    items_delivered: usize,
    completed: usize,
    skipped: usize,
    failed: usize,
    pending: usize,
    chunks: &'a [ChunkReport],
}

impl Serialize for JobReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        JobReportView {
            job: &self.job,
            status: self.status(),
            items_delivered: self.items_delivered(),
            completed: self.completed_count(),
            skipped: self.skipped_count(),
            failed: self.failed_count(),
            pending: self.pending_count(),
            chunks: &self.chunks,
        }
        .serialize(serializer)
    }
}

impl std::fmt::Display for JobReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Job:       {}", self.job)?;
        writeln!(f, "Status:    {}", self.status())?;
        writeln!(
            f,
            "Chunks:    {} completed, {} skipped, {} failed, {} pending",
            self.completed_count(),
            self.skipped_count(),
            self.failed_count(),
            self.pending_count()
        )?;
        write!(f, "Records:   {}", self.items_delivered())?;
        for report in &self.chunks {
            if let ChunkOutcome::Failed { error, hint, .. } = &report.outcome {
                write!(f, "\n  failed {}: {error}", report.chunk)?;
                if let Some(hint) = hint {
                    write!(f, "\n    hint: {hint}")?;
                }
            }
        }
        Ok(())
    }
}
