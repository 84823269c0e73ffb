use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::oplog::{OperationLogEntry, OperationType};
use crate::store::fs::write_atomic;

/// Append-only JSON-lines log of mutating operations.
///
/// The newest `retention` entries are kept in memory and on disk; once the
/// file grows past the bound it is compacted with an atomic rewrite.
/// Durability is best-effort: `record` never fails the caller.
pub struct OperationLog {
    path: PathBuf,
    retention: usize,
    entries: Mutex<Vec<OperationLogEntry>>,
}

impl OperationLog {
    pub async fn open(path: impl AsRef<Path>, retention: usize) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let retention = retention.max(1);
        let mut entries = Vec::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                for (n, line) in raw.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<OperationLogEntry>(line) {
                        Ok(entry) => entries.push(entry),
                        Err(e) => warn!("Skipping malformed operation log line {}: {e}", n + 1),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if entries.len() > retention {
            let excess = entries.len() - retention;
            entries.drain(..excess);
        }
        info!("Operation log opened at {} ({} entries)", path.display(), entries.len());

        Ok(Self {
            path,
            retention,
            entries: Mutex::new(entries),
        })
    }

    /// Appends `entry`. Storage failures are logged and swallowed.
    pub async fn record(&self, entry: OperationLogEntry) {
        let mut entries = self.entries.lock().await;
        let id = entry.id;
        let op = entry.operation_type;
        entries.push(entry);

        let result = if entries.len() > self.retention {
            let excess = entries.len() - self.retention;
            entries.drain(..excess);
            self.rewrite(&entries).await
        } else {
            self.append(entries.last()).await
        };

        match result {
            Ok(()) => debug!("Logged {op:?} operation {id}"),
            Err(e) => warn!("Operation log write failed for {op:?} {id}: {e}"),
        }
    }

    async fn append(&self, entry: Option<&OperationLogEntry>) -> Result<(), AppError> {
        let Some(entry) = entry else { return Ok(()) };
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn rewrite(&self, entries: &[OperationLogEntry]) -> Result<(), AppError> {
        let mut out = Vec::new();
        for entry in entries {
            out.extend(serde_json::to_vec(entry)?);
            out.push(b'\n');
        }
        write_atomic(&self.path, out).await?;
        debug!("Compacted operation log to {} entries", entries.len());
        Ok(())
    }

    /// Newest first.
    pub async fn list(&self, limit: usize, offset: usize) -> Vec<OperationLogEntry> {
        let entries = self.entries.lock().await;
        entries.iter().rev().skip(offset).take(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn get(&self, id: Uuid) -> Option<OperationLogEntry> {
        let entries = self.entries.lock().await;
        entries.iter().find(|e| e.id == id).cloned()
    }

    /// Whether a `rollback` entry already reverses `id`.
    pub async fn is_undone(&self, id: Uuid) -> bool {
        let entries = self.entries.lock().await;
        entries.iter().any(|e| {
            e.operation_type == OperationType::Rollback && e.details.undoes == Some(id)
        })
    }
}
