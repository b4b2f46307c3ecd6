//! CSV sink: one row per record, the record itself stored as a JSON string column

use async_trait::async_trait;
use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use super::{ensure_parent_dir, ChunkBatch, RecordSink, SinkError, SinkResult};

const DEFAULT_BUFFER_SIZE: usize = 8192;

const HEADER: [&str; 8] = [
    "job",
    "platform",
    "kind",
    "scope",
    "chunk_start",
    "chunk_end",
    "completed_at",
    "record",
];

#[derive(Debug, Serialize)]
struct Row<'a> {
    job: &'a str,
    platform: String,
    kind: String,
    scope: &'a str,
    chunk_start: String,
    chunk_end: String,
    completed_at: String,
    record: String,
}

/// Appends records to a CSV file
pub struct CsvSink {
    path: PathBuf,
    writer: Mutex<Writer<BufWriter<File>>>,
}

impl CsvSink {
    /// Open `path` for appending; the header row is written only to a new or empty file
    pub fn open(path: impl AsRef<Path>) -> SinkResult<Self> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SinkError::Io(format!("Failed to open {}: {e}", path.display())))?;
        let is_empty = file
            .metadata()
            .map_err(|e| SinkError::Io(e.to_string()))?
            .len()
            == 0;

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file));
        if is_empty {
            writer
                .write_record(HEADER)
                .map_err(|e| SinkError::Csv(format!("Failed to write header: {e}")))?;
        }

        info!(path = %path.display(), new_file = is_empty, "Opened CSV sink");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
        })
    }

    /// Output path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    async fn write_batch(&self, batch: &ChunkBatch) -> SinkResult<()> {
        let platform = batch.platform.to_string();
        let kind = batch.kind.to_string();
        let chunk_start = batch.chunk.start().to_rfc3339();
        let chunk_end = batch.chunk.end().to_rfc3339();
        let completed_at = batch.completed_at.to_rfc3339();

        let mut rows = Vec::with_capacity(batch.records.len());
        for record in &batch.records {
            rows.push(Row {
                job: batch.job.as_str(),
                platform: platform.clone(),
                kind: kind.clone(),
                scope: &batch.scope,
                chunk_start: chunk_start.clone(),
                chunk_end: chunk_end.clone(),
                completed_at: completed_at.clone(),
                record: serde_json::to_string(record)
                    .map_err(|e| SinkError::Serialization(e.to_string()))?,
            });
        }

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        for row in &rows {
            writer
                .serialize(row)
                .map_err(|e| SinkError::Csv(format!("Failed to write row: {e}")))?;
        }
        writer.flush().map_err(|e| SinkError::Flush(e.to_string()))?;
        debug!(chunk = %batch.chunk, records = rows.len(), "Wrote CSV batch");
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
