//! Durable audit journal implementations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::{AuditError, AuditResult};
use crate::event::AuditRecord;

/// Trait implemented by durable audit journals.
#[async_trait]
pub trait AuditJournal: Send + Sync {
    /// Appends a record to the journal.
    async fn append(&self, record: &AuditRecord) -> AuditResult<()>;

    /// Returns the most recent `limit` records, ordered oldest to newest.
    async fn tail(&self, limit: usize) -> AuditResult<Vec<AuditRecord>>;

    /// Clears the journal contents.
    async fn clear(&self) -> AuditResult<()>;
}

/// File-backed journal writing newline-delimited JSON entries.
pub struct FileJournal {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl FileJournal {
    /// Opens (or creates) a journal file at the provided path.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while preparing the file.
    pub async fn open(path: impl Into<PathBuf>) -> AuditResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the underlying path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for FileJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileJournal").field("path", &self.path).finish_non_exhaustive()
    }
}

#[async_trait]
impl AuditJournal for FileJournal {
    async fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut guard = self.file.lock().await;
        guard.write_all(&line).await?;
        guard.flush().await?;
        Ok(())
    }

    async fn tail(&self, limit: usize) -> AuditResult<Vec<AuditRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        // Hold the lock so a concurrent append cannot leave a partial line.
        let _guard = self.file.lock().await;
        let data = fs::read(&self.path).await?;
        let lines: Vec<(usize, &[u8])> = data
            .split(|byte| *byte == b'\n')
            .enumerate()
            .filter(|(_, chunk)| !chunk.is_empty())
            .collect();
        let skip = lines.len().saturating_sub(limit);

        lines[skip..]
            .iter()
            .map(|(index, chunk)| {
                serde_json::from_slice::<AuditRecord>(chunk).map_err(|source| {
                    AuditError::CorruptLine {
                        path: self.path.clone(),
                        line: index + 1,
                        source,
                    }
                })
            })
            .collect()
    }

    async fn clear(&self) -> AuditResult<()> {
        let mut guard = self.file.lock().await;
        guard.rewind().await?;
        guard.set_len(0).await?;
        guard.flush().await?;
        Ok(())
    }
}

/// Journal that keeps records in memory; used when no path is configured.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditJournal for MemoryJournal {
    async fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn tail(&self, limit: usize) -> AuditResult<Vec<AuditRecord>> {
        let guard = self.records.lock().await;
        let skip = guard.len().saturating_sub(limit);
        Ok(guard[skip..].to_vec())
    }

    async fn clear(&self) -> AuditResult<()> {
        self.records.lock().await.clear();
        Ok(())
    }
}
