//! In-memory progress store

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{JobIdentity, ProgressRecord, ProgressStore, ProgressStoreError};
use crate::split::DateChunk;

type Records = HashMap<JobIdentity, BTreeMap<DateChunk, ProgressRecord>>;

/// Mutex-guarded map of completion records; lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    records: Mutex<Records>,
}

impl MemoryProgressStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held for `job`
    pub fn len(&self, job: &JobIdentity) -> usize {
        self.lock().get(job).map_or(0, BTreeMap::len)
    }

    /// Whether no record is held for `job`
    pub fn is_empty(&self, job: &JobIdentity) -> bool {
        self.len(job) == 0
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn is_complete(&self, job: &JobIdentity, chunk: &DateChunk) -> Result<bool, ProgressStoreError> {
        Ok(self
            .lock()
            .get(job)
            .is_some_and(|records| records.contains_key(chunk)))
    }

    async fn mark_complete(&self, job: &JobIdentity, record: ProgressRecord) -> Result<(), ProgressStoreError> {
        self.lock()
            .entry(job.clone())
            .or_default()
            .entry(record.chunk)
            .or_insert(record);
        Ok(())
    }

    async fn completed_chunks(&self, job: &JobIdentity) -> Result<Vec<ProgressRecord>, ProgressStoreError> {
        Ok(self
            .lock()
            .get(job)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn reset(&self, job: &JobIdentity) -> Result<usize, ProgressStoreError> {
        Ok(self.lock().remove(job).map_or(0, |records| records.len()))
    }
}
