//! Harvest orchestration
//!
//! The harvester drives one [`HarvestJob`] to a terminal state:
//!
//! 1. **Chunking**: the job's range is split into calendar-day chunks
//! 2. **Skipping**: chunks the [`ProgressTracker`](crate::progress::ProgressTracker) knows are complete are not fetched
//! 3. **Fetching**: remaining chunks run on a bounded worker pool through the
//!    [`PagedFetcher`](crate::fetcher::PagedFetcher)
//! 4. **Delivery**: each fetched chunk goes to the sink as one batch, then is recorded complete
//! 5. **Reporting**: a [`JobReport`] lists every chunk's outcome in chunk order
//!
//! # Error Handling
//!
//! Per-chunk failures never abort the job; they are recorded in the report and
//! the job ends `PartiallyFailed` or `Failed`. [`HarvestError`] is returned only
//! for failures that concern the whole job (invalid job, final sink flush).

pub mod config;
pub mod executor;
pub mod job;

pub use config::HarvesterConfig;
pub use executor::Harvester;
pub use job::{ChunkOutcome, HarvestJob, JobReport, JobStatus};
pub use crate::progress::JobIdentity;

use crate::fetcher::FetchError;
use crate::progress::ProgressStoreError;
use crate::sink::SinkError;

/// Harvest errors
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Job parameters are invalid
    #[error("validation error: {0}")]
    Validation(String),

    /// A fetch failed after the retry policy gave up
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// A completion record could not be written
    #[error("progress store unavailable: {0}")]
    ProgressStoreUnavailable(#[from] ProgressStoreError),

    /// The sink rejected or failed to write a batch
    #[error("sink write failure: {0}")]
    SinkWriteFailure(#[from] SinkError),

    /// Cancellation stopped the work
    #[error("harvest cancelled")]
    Cancelled,
}

impl HarvestError {
    /// Short label for logs, metrics and reports
    pub fn class_label(&self) -> &'static str {
        match self {
            HarvestError::Validation(_) => "validation",
            HarvestError::Fetch(e) => e.class_label(),
            HarvestError::ProgressStoreUnavailable(_) => "progress_store_unavailable",
            HarvestError::SinkWriteFailure(_) => "sink_write_failure",
            HarvestError::Cancelled => "cancelled",
        }
    }

    /// Remediation hint shown next to the failure
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            HarvestError::Fetch(e) => e.suggestion(),
            HarvestError::ProgressStoreUnavailable(_) => {
                Some("Check the progress directory; the batch was delivered and will be sent again on resume")
            }
            HarvestError::SinkWriteFailure(_) => Some("Check the output destination, then resume the job"),
            HarvestError::Validation(_) | HarvestError::Cancelled => None,
        }
    }

    /// Whether a later run may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        match self {
            HarvestError::Validation(_) => false,
            HarvestError::Fetch(e) => e.is_retryable(),
            HarvestError::ProgressStoreUnavailable(_)
            | HarvestError::SinkWriteFailure(_)
            | HarvestError::Cancelled => true,
        }
    }
}
