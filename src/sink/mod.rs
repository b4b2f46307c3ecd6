//! Output sinks for harvested records
//!
//! The harvester hands each completed chunk to a [`RecordSink`] as one
//! [`ChunkBatch`], so memory is bounded by a single chunk's items. A sink error
//! fails that chunk; it is never swallowed.
//!
//! Resumed runs may deliver a chunk again when its completion record could not
//! be written the first time, so sinks that feed a database should upsert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::progress::JobIdentity;
use crate::split::DateChunk;
use crate::{EntityKind, Platform};

pub mod csv;
pub mod jsonl;
pub mod memory;

pub use self::csv::CsvSink;
pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;

/// Sink errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    Csv(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    Flush(String),

    /// Downstream collaborator rejected the batch
    #[error("sink rejected batch: {0}")]
    Rejected(String),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Records of one completed chunk plus its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkBatch {
    /// Owning job
    pub job: JobIdentity,
    /// Source platform
    pub platform: Platform,
    /// Entity kind of every record
    pub kind: EntityKind,
    /// Repository, project or site
    pub scope: String,
    /// Chunk boundaries
    pub chunk: DateChunk,
    /// When the chunk finished fetching
    pub completed_at: DateTime<Utc>,
    /// Records in API order
    pub records: Vec<serde_json::Value>,
}

/// Append-only destination for chunk batches
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Deliver one chunk's records
    async fn write_batch(&self, batch: &ChunkBatch) -> SinkResult<()>;

    /// Flush buffered output
    async fn flush(&self) -> SinkResult<()>;
}

/// Open a file sink, choosing the format from the extension (`.csv` or JSON Lines)
pub fn create_file_sink(path: &Path) -> SinkResult<Arc<dyn RecordSink>> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        Ok(Arc::new(CsvSink::open(path)?))
    } else {
        Ok(Arc::new(JsonLinesSink::open(path)?))
    }
}

pub(crate) fn ensure_parent_dir(path: &Path) -> SinkResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SinkError::Io(format!("Failed to create directory: {e}")))?;
        }
    }
    Ok(())
}
