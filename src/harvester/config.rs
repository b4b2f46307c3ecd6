//! Harvest configuration constants and runtime settings

use std::time::Duration;

/// Maximum number of retries per page for rate-limited and transient failures.
/// With the default schedule the longest wait before giving up is about a minute.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Delay before the first retry.
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(2);

/// Cap for a single computed retry delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Upper bound of the random jitter added to every retry delay.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Remaining quota below which a successful response still triggers credential rotation.
pub const DEFAULT_QUOTA_SAFETY_THRESHOLD: i64 = 50;

/// Rotation threshold for GitHub search endpoints, whose bucket holds 30 requests per minute.
pub const SEARCH_QUOTA_SAFETY_THRESHOLD: i64 = 5;

/// Assumed replenish delay for a credential reported exhausted without a reset time.
pub const DEFAULT_RESET_FALLBACK: Duration = Duration::from_secs(60);

/// Network timeout for a single page request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Chunk width when the caller does not choose one.
pub const DEFAULT_GRANULARITY_DAYS: u32 = 1;

/// Widest chunk the CLI accepts (about a century).
pub const MAX_GRANULARITY_DAYS: u32 = 36_500;

/// Upper bound for the worker pool, whatever the credential count.
pub const MAX_PARALLELISM: usize = 32;

/// Safety limit on pages per chunk to stop runaway pagination.
pub const MAX_PAGES_PER_FETCH: usize = 10_000;

/// Attempts to record a chunk as complete before the chunk is surfaced as failed.
pub const PROGRESS_WRITE_ATTEMPTS: u32 = 3;

/// Runtime settings for a [`super::Harvester`]
#[derive(Debug, Clone)]
pub struct HarvesterConfig {
    /// Maximum chunks fetched concurrently for one job
    pub parallelism: usize,
    /// Attempts to write a completion record before failing the chunk
    pub progress_write_attempts: u32,
}

impl HarvesterConfig {
    /// Settings sized for a credential pool of `pool_size` members
    ///
    /// Each concurrent fetch typically holds one credential, so parallelism
    /// defaults to the pool size, clamped to `[1, MAX_PARALLELISM]`.
    pub fn for_pool_size(pool_size: usize) -> Self {
        Self {
            parallelism: pool_size.clamp(1, MAX_PARALLELISM),
            progress_write_attempts: PROGRESS_WRITE_ATTEMPTS,
        }
    }

    /// Override the worker pool size (clamped to `[1, MAX_PARALLELISM]`)
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.clamp(1, MAX_PARALLELISM);
        self
    }
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self::for_pool_size(1)
    }
}
