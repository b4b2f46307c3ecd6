//! Chunk completion tracking
//!
//! A [`ProgressStore`] persists which chunks of a job have completed. The
//! [`ProgressTracker`] wraps a store and applies the failure policy the
//! harvester relies on:
//!
//! - a failed lookup counts as "not complete" (re-fetching is safe)
//! - a failed write is surfaced so the caller can retry it; completion records
//!   are never dropped silently
//!
//! Records are keyed by `(job identity, chunk start, chunk end)`, so writers for
//! different chunks never conflict and may arrive in any order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::split::{DateChunk, DateRange};
use crate::{EntityKind, Platform};

pub mod file;
pub mod memory;

pub use file::FileProgressStore;
pub use memory::MemoryProgressStore;

/// Stable identity of a harvest job: platform, entity kind, scope and range
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobIdentity(String);

impl JobIdentity {
    /// Derive the identity of a job
    pub fn new(platform: Platform, kind: EntityKind, scope: &str, range: &DateRange) -> Self {
        Self(format!(
            "{platform}:{kind}:{scope}:{}..{}",
            range.start().to_rfc3339(),
            range.end().to_rfc3339()
        ))
    }

    /// Identity as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe name: readable prefix plus a digest of the full identity
    pub fn file_stem(&self) -> String {
        let readable: String = self
            .0
            .split(':')
            .take(3)
            .collect::<Vec<_>>()
            .join("_")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .take(64)
            .collect();
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!("{readable}-{}", &digest[..16])
    }
}

impl std::fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Completion record for one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Completed chunk
    pub chunk: DateChunk,
    /// When the chunk's results were delivered
    pub completed_at: DateTime<Utc>,
    /// Records delivered for the chunk
    pub items: u64,
}

/// Progress store errors
#[derive(Debug, thiserror::Error)]
pub enum ProgressStoreError {
    /// Backing store cannot be reached right now
    #[error("progress store unavailable: {0}")]
    Unavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Advisory lock could not be taken
    #[error("lock error: {0}")]
    Lock(String),

    /// Stored document could not be parsed
    #[error("corrupt progress document: {0}")]
    Corrupt(String),

    /// Stored document has an unknown schema version
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// Stored document exceeds the size limit
    #[error("progress document too large: {size} bytes (max: {max} bytes)")]
    TooLarge {
        /// Actual size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },
}

/// Persistence of chunk completion records
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Whether `chunk` is recorded complete for `job`
    async fn is_complete(&self, job: &JobIdentity, chunk: &DateChunk) -> Result<bool, ProgressStoreError>;

    /// Record a chunk complete; recording an already complete chunk is a no-op
    async fn mark_complete(&self, job: &JobIdentity, record: ProgressRecord) -> Result<(), ProgressStoreError>;

    /// All completion records for `job`, ordered by chunk
    async fn completed_chunks(&self, job: &JobIdentity) -> Result<Vec<ProgressRecord>, ProgressStoreError>;

    /// Remove every record for `job`; returns how many were removed
    async fn reset(&self, job: &JobIdentity) -> Result<usize, ProgressStoreError>;
}

/// Failure-policy wrapper around a [`ProgressStore`]
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
}

impl ProgressTracker {
    /// Wrap a store
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    /// Whether `chunk` is complete; lookup failures count as not complete
    pub async fn is_complete(&self, job: &JobIdentity, chunk: &DateChunk) -> bool {
        match self.store.is_complete(job, chunk).await {
            Ok(complete) => complete,
            Err(e) => {
                warn!(
                    job = %job,
                    chunk = %chunk,
                    error = %e,
                    "Progress lookup failed, treating chunk as not complete"
                );
                false
            }
        }
    }

    /// Record `chunk` complete
    ///
    /// # Errors
    /// Store failures are returned unchanged for the caller to retry.
    pub async fn mark_complete(
        &self,
        job: &JobIdentity,
        chunk: DateChunk,
        completed_at: DateTime<Utc>,
        items: u64,
    ) -> Result<(), ProgressStoreError> {
        self.store
            .mark_complete(
                job,
                ProgressRecord {
                    chunk,
                    completed_at,
                    items,
                },
            )
            .await?;
        debug!(job = %job, chunk = %chunk, items = items, "Chunk recorded complete");
        Ok(())
    }

    /// All completion records for `job`
    pub async fn completed_chunks(&self, job: &JobIdentity) -> Result<Vec<ProgressRecord>, ProgressStoreError> {
        self.store.completed_chunks(job).await
    }

    /// Forget every completion record for `job`
    pub async fn reset(&self, job: &JobIdentity) -> Result<usize, ProgressStoreError> {
        let removed = self.store.reset(job).await?;
        warn!(job = %job, removed = removed, "Progress reset");
        Ok(removed)
    }
}
