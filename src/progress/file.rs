//! File-backed progress store
//!
//! One JSON document per job identity under a directory. Writes go through a
//! temp file in the same directory followed by an atomic rename, and every
//! read or read-modify-write holds an advisory lock on a sibling `.lock` file so
//! two processes resuming the same job never lose each other's records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{JobIdentity, ProgressRecord, ProgressStore, ProgressStoreError};
use crate::split::DateChunk;

/// Current progress document schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed document size (10 MB) to prevent memory exhaustion
pub const MAX_PROGRESS_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProgressDocument {
    schema_version: String,
    job: JobIdentity,
    records: Vec<ProgressRecord>,
    updated_at: DateTime<Utc>,
}

impl ProgressDocument {
    fn new(job: &JobIdentity) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            job: job.clone(),
            records: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Directory of per-job progress documents
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    /// Store documents under `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the documents
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `job`
    pub fn document_path(&self, job: &JobIdentity) -> PathBuf {
        self.dir.join(format!("{}.json", job.file_stem()))
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, ProgressStoreError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ProgressStoreError> + Send + 'static,
    {
        tokio::task::spawn_blocking(op)
            .await
            .map_err(|e| ProgressStoreError::Unavailable(format!("progress task failed: {e}")))?
    }
}

fn open_lock_file(path: &Path) -> Result<File, ProgressStoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ProgressStoreError::Io(e.to_string()))?;
    }
    let lock_path = path.with_extension("lock");
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| ProgressStoreError::Lock(format!("Failed to open lock file: {e}")))
}

/// Read a document; a missing file is an empty document
fn read_document(path: &Path, job: &JobIdentity) -> Result<ProgressDocument, ProgressStoreError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ProgressDocument::new(job)),
        Err(e) => return Err(ProgressStoreError::Io(e.to_string())),
    };
    if metadata.len() > MAX_PROGRESS_FILE_SIZE {
        return Err(ProgressStoreError::TooLarge {
            size: metadata.len(),
            max: MAX_PROGRESS_FILE_SIZE,
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ProgressStoreError::Io(e.to_string()))?;
    let document: ProgressDocument = serde_json::from_str(&contents).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Failed to deserialize progress document");
        ProgressStoreError::Corrupt(e.to_string())
    })?;

    if document.schema_version != SCHEMA_VERSION {
        return Err(ProgressStoreError::SchemaVersionMismatch {
            expected: SCHEMA_VERSION.to_string(),
            found: document.schema_version,
        });
    }
    if &document.job != job {
        return Err(ProgressStoreError::Corrupt(format!(
            "document belongs to job '{}', expected '{job}'",
            document.job
        )));
    }
    Ok(document)
}

/// Atomically replace the document at `path`
fn write_document(path: &Path, document: &ProgressDocument) -> Result<(), ProgressStoreError> {
    let json = serde_json::to_string_pretty(document)
        .map_err(|e| ProgressStoreError::Io(format!("Failed to serialize progress: {e}")))?;

    let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| ProgressStoreError::Io(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(json.as_bytes())
        .map_err(|e| ProgressStoreError::Io(format!("Failed to write temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| ProgressStoreError::Io(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| ProgressStoreError::Io(format!("Failed to sync temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| ProgressStoreError::Io(format!("Failed to persist temp file: {e}")))?;

    if let Ok(dir) = File::open(parent_dir) {
        let _ = dir.sync_all();
    }
    Ok(())
}

fn load_locked(path: PathBuf, job: JobIdentity) -> Result<ProgressDocument, ProgressStoreError> {
    let lock = RwLock::new(open_lock_file(&path)?);
    let _guard = lock
        .read()
        .map_err(|e| ProgressStoreError::Lock(format!("Failed to acquire read lock: {e}")))?;
    read_document(&path, &job)
}

fn update_locked<F>(path: PathBuf, job: JobIdentity, update: F) -> Result<usize, ProgressStoreError>
where
    F: FnOnce(&mut ProgressDocument) -> usize,
{
    let mut lock = RwLock::new(open_lock_file(&path)?);
    let _guard = lock
        .write()
        .map_err(|e| ProgressStoreError::Lock(format!("Failed to acquire write lock: {e}")))?;

    let mut document = read_document(&path, &job)?;
    let changed = update(&mut document);
    if changed > 0 {
        document.updated_at = Utc::now();
        write_document(&path, &document)?;
    }
    Ok(changed)
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn is_complete(&self, job: &JobIdentity, chunk: &DateChunk) -> Result<bool, ProgressStoreError> {
        let (path, job, chunk) = (self.document_path(job), job.clone(), *chunk);
        self.blocking(move || {
            let document = load_locked(path, job)?;
            Ok(document.records.iter().any(|r| r.chunk == chunk))
        })
        .await
    }

    async fn mark_complete(&self, job: &JobIdentity, record: ProgressRecord) -> Result<(), ProgressStoreError> {
        let path = self.document_path(job);
        let job = job.clone();
        let added = self
            .blocking(move || {
                update_locked(path, job, move |document| {
                    if document.records.iter().any(|r| r.chunk == record.chunk) {
                        return 0;
                    }
                    document.records.push(record);
                    document.records.sort_by_key(|r| r.chunk);
                    1
                })
            })
            .await?;
        if added == 0 {
            debug!("Chunk already recorded complete, nothing written");
        }
        Ok(())
    }

    async fn completed_chunks(&self, job: &JobIdentity) -> Result<Vec<ProgressRecord>, ProgressStoreError> {
        let (path, job) = (self.document_path(job), job.clone());
        self.blocking(move || Ok(load_locked(path, job)?.records)).await
    }

    async fn reset(&self, job: &JobIdentity) -> Result<usize, ProgressStoreError> {
        let path = self.document_path(job);
        let job = job.clone();
        let removed = self
            .blocking(move || {
                update_locked(path, job, |document| {
                    let removed = document.records.len();
                    document.records.clear();
                    removed
                })
            })
            .await?;
        info!(dir = %self.dir.display(), removed = removed, "Cleared progress document");
        Ok(removed)
    }
}
