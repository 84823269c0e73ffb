use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::oplog::{OperationDetails, OperationLogEntry, OperationType, UndoItem};
use crate::oplog::OperationLog;
use crate::resumes::VersionManager;
use crate::store::Repository;

/// Reverses undoable log entries and records a `rollback` entry for each.
pub struct UndoService {
    log: Arc<OperationLog>,
    resumes: Arc<VersionManager>,
    repo: Arc<Repository>,
    // Serializes undo so two requests cannot both pass the already-undone check.
    running: Mutex<()>,
}

impl UndoService {
    pub fn new(log: Arc<OperationLog>, resumes: Arc<VersionManager>, repo: Arc<Repository>) -> Self {
        Self {
            log,
            resumes,
            repo,
            running: Mutex::new(()),
        }
    }

    pub async fn undo(&self, entry_id: Uuid, session_id: &str) -> Result<OperationLogEntry, AppError> {
        let _running = self.running.lock().await;

        let entry = self
            .log
            .get(entry_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Operation {entry_id} not found")))?;
        if !entry.can_undo {
            return Err(AppError::Unsupported(format!(
                "{:?} operation {entry_id} cannot be undone",
                entry.operation_type
            )));
        }
        if self.log.is_undone(entry_id).await {
            return Err(AppError::AlreadyUndone(format!(
                "Operation {entry_id} was already undone"
            )));
        }

        let reversed = match entry.operation_type {
            OperationType::Upload | OperationType::BulkImport => {
                self.reverse_uploads(&entry.details.undo_items).await?
            }
            other => {
                return Err(AppError::Unsupported(format!(
                    "No undo is defined for {other:?} operations"
                )))
            }
        };

        let rollback = OperationLogEntry::new(OperationType::Rollback, session_id).with_details(
            OperationDetails {
                affected_files: reversed,
                job_uuid: entry.details.job_uuid,
                undoes: Some(entry_id),
                user_action: Some(format!("undo {:?}", entry.operation_type)),
                ..Default::default()
            },
        );
        self.log.record(rollback.clone()).await;
        info!("Undid {:?} operation {entry_id}", entry.operation_type);
        Ok(rollback)
    }

    /// Removes each uploaded version, newest first, then deletes jobs the
    /// operation created once they hold no resumes. Versions already gone
    /// are skipped.
    async fn reverse_uploads(&self, items: &[UndoItem]) -> Result<Vec<String>, AppError> {
        let mut reversed = Vec::new();
        for item in items.iter().rev() {
            match self
                .resumes
                .remove_version(item.manifest_id, item.version_id)
                .await
            {
                Ok((_, version)) => reversed.push(version.managed_path),
                Err(AppError::NotFound(msg)) => {
                    warn!("Undo skipped version {}: {msg}", item.version_id)
                }
                Err(e) => return Err(e),
            }
        }

        let created: BTreeSet<Uuid> = items.iter().filter_map(|i| i.created_job).collect();
        for job_uuid in created {
            if !self.resumes.prune_empty_manifests(job_uuid).await? {
                info!("Keeping imported job {job_uuid}: it still has resumes");
                continue;
            }
            match self.repo.delete(job_uuid).await {
                Ok(()) | Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(reversed)
    }
}
