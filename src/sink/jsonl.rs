//! JSON Lines sink: one object per record, wrapped with its chunk metadata

use async_trait::async_trait;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use super::{ensure_parent_dir, ChunkBatch, RecordSink, SinkError, SinkResult};

const DEFAULT_BUFFER_SIZE: usize = 8192;

#[derive(Serialize)]
struct Line<'a> {
    job: &'a str,
    platform: String,
    kind: String,
    scope: &'a str,
    chunk_start: String,
    chunk_end: String,
    completed_at: String,
    record: &'a serde_json::Value,
}

/// Appends records to a `.jsonl` file
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it and its directory if needed
    pub fn open(path: impl AsRef<Path>) -> SinkResult<Self> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SinkError::Io(format!("Failed to open {}: {e}", path.display())))?;
        info!(path = %path.display(), "Opened JSON Lines sink");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file)),
        })
    }

    /// Output path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn write_batch(&self, batch: &ChunkBatch) -> SinkResult<()> {
        let mut buffer = Vec::new();
        for record in &batch.records {
            let line = Line {
                job: batch.job.as_str(),
                platform: batch.platform.to_string(),
                kind: batch.kind.to_string(),
                scope: &batch.scope,
                chunk_start: batch.chunk.start().to_rfc3339(),
                chunk_end: batch.chunk.end().to_rfc3339(),
                completed_at: batch.completed_at.to_rfc3339(),
                record,
            };
            serde_json::to_writer(&mut buffer, &line)
                .map_err(|e| SinkError::Serialization(e.to_string()))?;
            buffer.push(b'\n');
        }

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer
            .write_all(&buffer)
            .map_err(|e| SinkError::Io(format!("Failed to write batch: {e}")))?;
        writer
            .flush()
            .map_err(|e| SinkError::Flush(e.to_string()))?;
        debug!(chunk = %batch.chunk, records = batch.records.len(), "Wrote JSON Lines batch");
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        self.writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .flush()
            .map_err(|e| SinkError::Flush(e.to_string()))
    }
}
