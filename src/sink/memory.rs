//! In-memory sink collecting every delivered batch

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use super::{ChunkBatch, RecordSink, SinkResult};

/// Keeps delivered batches in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<ChunkBatch>>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every batch received so far
    pub fn batches(&self) -> Vec<ChunkBatch> {
        self.lock().clone()
    }

    /// Total records across all batches
    pub fn record_count(&self) -> usize {
        self.lock().iter().map(|b| b.records.len()).sum()
    }

    /// Drain and return every batch
    pub fn take(&self) -> Vec<ChunkBatch> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ChunkBatch>> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn write_batch(&self, batch: &ChunkBatch) -> SinkResult<()> {
        self.lock().push(batch.clone());
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        Ok(())
    }
}
