use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bulk_import::matcher::{best_match, JobCandidate};
use crate::config::ImportConfig;
use crate::errors::{AppError, ItemFailure};
use crate::models::import::{
    BulkImportOperation, BulkImportPreview, ImportReport, ImportStatus, MappingSource,
    PreviewStatus,
};
use crate::models::job::{CaptureMethod, JobRecord, ListFilter};
use crate::models::oplog::{OperationDetails, OperationLogEntry, OperationType, UndoItem};
use crate::oplog::OperationLog;
use crate::resumes::{naming, UploadRequest, VersionManager};
use crate::store::Repository;

/// Body of `update_mapping`. It replaces the item's mapping as a whole.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingUpdate {
    pub job_mapping: Option<Uuid>,
    pub manual_company: Option<String>,
    pub manual_role: Option<String>,
}

struct Session {
    operation: BulkImportOperation,
    cancel: Arc<AtomicBool>,
    executing: bool,
}

/// Reconciles a folder of resume files against job records.
///
/// Holds one operation per session id. `scan` replaces it; `execute` and
/// `cancel` move it to a terminal state. Items are imported independently,
/// so one failure never aborts the batch.
pub struct BulkImportReconciler {
    repo: Arc<Repository>,
    resumes: Arc<VersionManager>,
    oplog: Arc<OperationLog>,
    config: ImportConfig,
    sessions: Mutex<HashMap<String, Session>>,
}

impl BulkImportReconciler {
    pub fn new(
        repo: Arc<Repository>,
        resumes: Arc<VersionManager>,
        oplog: Arc<OperationLog>,
        config: ImportConfig,
    ) -> Self {
        Self {
            repo,
            resumes,
            oplog,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Scan ───────────────────────────────────────────────────────────────

    pub async fn scan(
        &self,
        session_id: &str,
        source_folder: impl AsRef<Path>,
    ) -> Result<BulkImportOperation, AppError> {
        let folder = source_folder.as_ref();
        if self.sessions().get(session_id).is_some_and(|s| s.executing) {
            return Err(AppError::InvalidState(
                "An import is executing for this session".to_string(),
            ));
        }

        let files = list_files(folder).await?;
        let jobs = self
            .repo
            .list(ListFilter::default())
            .await?
            .collect_all()
            .await?;
        let candidates: Vec<JobCandidate> = jobs.iter().filter_map(JobCandidate::of).collect();

        let mut items = Vec::with_capacity(files.len());
        for (filename, path) in files {
            items.push(self.preview(&filename, &path, &jobs, &candidates).await);
        }

        let operation = BulkImportOperation {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            source_folder: folder.to_string_lossy().into_owned(),
            preview_items: items,
            status: ImportStatus::Preview,
            created_at: Utc::now(),
        };
        let mapped = count_status(&operation, PreviewStatus::Mapped);
        let errors = count_status(&operation, PreviewStatus::Error);

        let replaced = self.sessions().insert(
            session_id.to_string(),
            Session {
                operation: operation.clone(),
                cancel: Arc::new(AtomicBool::new(false)),
                executing: false,
            },
        );
        if let Some(prev) = replaced {
            debug!("Scan replaced import {} for session {session_id}", prev.operation.id);
        }
        info!(
            "Bulk import {} scanned {}: {} files, {mapped} auto-mapped, {errors} errors",
            operation.id,
            operation.source_folder,
            operation.preview_items.len()
        );
        Ok(operation)
    }

    async fn preview(
        &self,
        filename: &str,
        path: &Path,
        jobs: &[JobRecord],
        candidates: &[JobCandidate],
    ) -> BulkImportPreview {
        let mut item = BulkImportPreview {
            id: Uuid::new_v4(),
            original_filename: filename.to_string(),
            original_path: path.to_string_lossy().into_owned(),
            proposed_filename: filename.to_string(),
            mapping: MappingSource::Unmapped,
            draft_company: None,
            draft_role: None,
            error_message: None,
        };

        let supported = naming::extension_of(filename)
            .is_some_and(|ext| self.resumes.config().supported_file_types.contains(&ext));
        if !supported {
            item.error_message = Some(format!(
                "Unsupported file type. Supported: {}",
                self.resumes.config().supported_file_types.join(", ")
            ));
            return item;
        }
        if let Err(e) = tokio::fs::File::open(path).await {
            item.error_message = Some(format!("File is not readable: {e}"));
            return item;
        }

        if let Some((uuid, score)) = best_match(filename, candidates, self.config.mapping_threshold)
        {
            if let Some(job) = jobs.iter().find(|j| j.uuid == uuid) {
                debug!("Guessed {} for {filename} (score {score:.2})", job.label());
                item.mapping = MappingSource::JobRef(uuid);
                item.proposed_filename = self.proposed_name(
                    job.company.as_deref(),
                    job.role.as_deref(),
                    filename,
                );
            }
        }
        item
    }

    fn proposed_name(&self, company: Option<&str>, role: Option<&str>, filename: &str) -> String {
        let components = naming::components_for(
            company,
            role,
            Utc::now(),
            self.resumes.config().naming_format,
        );
        let ext = naming::extension_of(filename).unwrap_or_default();
        format!("{}{ext}", naming::base_filename(&components))
    }

    // ── Mapping ────────────────────────────────────────────────────────────

    pub fn current(&self, session_id: &str) -> Result<BulkImportOperation, AppError> {
        self.sessions()
            .get(session_id)
            .map(|s| s.operation.clone())
            .ok_or_else(|| no_operation(session_id))
    }

    pub async fn update_mapping(
        &self,
        session_id: &str,
        item_id: Uuid,
        update: MappingUpdate,
    ) -> Result<BulkImportPreview, AppError> {
        let job = match update.job_mapping {
            Some(uuid) => {
                let job = self.repo.get(uuid).await?;
                if job.archived {
                    return Err(AppError::Validation(format!(
                        "Job {uuid} is archived and cannot receive imports"
                    )));
                }
                Some(job)
            }
            None => None,
        };

        let mut sessions = self.sessions();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| no_operation(session_id))?;
        if session.operation.status.is_terminal() || session.executing {
            return Err(AppError::InvalidState(format!(
                "Import {} is no longer editable",
                session.operation.id
            )));
        }
        let item = session
            .operation
            .preview_items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| AppError::NotFound(format!("Import item {item_id} not found")))?;
        if item.status() == PreviewStatus::Error {
            return Err(AppError::Validation(format!(
                "'{}' cannot be imported: {}",
                item.original_filename,
                item.error_message.as_deref().unwrap_or("error")
            )));
        }

        let trim = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        item.draft_company = trim(&update.manual_company);
        item.draft_role = trim(&update.manual_role);
        item.mapping = MappingSource::from_parts(
            update.job_mapping,
            item.draft_company.as_deref(),
            item.draft_role.as_deref(),
        );

        let proposed = match (&item.mapping, &job) {
            (MappingSource::JobRef(_), Some(job)) => Some(self.proposed_name(
                job.company.as_deref(),
                job.role.as_deref(),
                &item.original_filename,
            )),
            (MappingSource::Manual { company, role }, _) => Some(self.proposed_name(
                Some(company.as_str()),
                Some(role.as_str()),
                &item.original_filename,
            )),
            _ => None,
        };
        if let Some(name) = proposed {
            item.proposed_filename = name;
        }
        debug!("Import item {item_id} is now {:?}", item.status());
        Ok(item.clone())
    }

    // ── Execute / cancel ───────────────────────────────────────────────────

    /// Imports every mapped item. Per-item failures are reported, not raised.
    ///
    /// The run is bounded by the configured timeout. The deadline is checked
    /// between items and bounds each item's source read; a commit that has
    /// started always finishes. On expiry `BatchTimeout` carries the report.
    pub async fn execute(&self, session_id: &str) -> Result<ImportReport, AppError> {
        let (operation_id, items, cancel) = {
            let mut sessions = self.sessions();
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| no_operation(session_id))?;
            if session.operation.status.is_terminal() {
                return Err(AppError::InvalidState(format!(
                    "Import {} is already {:?}",
                    session.operation.id, session.operation.status
                )));
            }
            if session.executing {
                return Err(AppError::InvalidState(format!(
                    "Import {} is already executing",
                    session.operation.id
                )));
            }
            session.executing = true;
            let mapped: Vec<BulkImportPreview> = session
                .operation
                .preview_items
                .iter()
                .filter(|i| i.status() == PreviewStatus::Mapped)
                .cloned()
                .collect();
            (session.operation.id, mapped, session.cancel.clone())
        };

        info!("Executing import {operation_id}: {} mapped items", items.len());
        let deadline = Instant::now() + self.config.execute_timeout;
        let mut report = ImportReport::default();
        let mut undo_items = Vec::new();
        let mut timed_out = false;

        for (idx, item) in items.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                report
                    .skipped
                    .extend(items[idx..].iter().map(|i| i.original_filename.clone()));
                info!("Import {operation_id} cancelled after {idx} items");
                break;
            }
            if Instant::now() >= deadline {
                timed_out = true;
                report.failed.extend(items[idx..].iter().map(not_reached));
                break;
            }
            match self.import_item(item, deadline).await {
                Ok(undo) => {
                    report.successful.push(item.original_filename.clone());
                    undo_items.push(undo);
                }
                Err(AppError::Timeout(msg)) => {
                    warn!("Import {operation_id} ran out of time on {}", item.original_filename);
                    timed_out = true;
                    report.failed.push(ItemFailure {
                        filename: item.original_filename.clone(),
                        error: msg,
                    });
                    report.failed.extend(items[idx + 1..].iter().map(not_reached));
                    break;
                }
                Err(e) => {
                    warn!("Import of {} failed: {e}", item.original_filename);
                    report.failed.push(ItemFailure {
                        filename: item.original_filename.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if !undo_items.is_empty() {
            self.oplog
                .record(
                    OperationLogEntry::new(OperationType::BulkImport, session_id)
                        .with_details(OperationDetails {
                            affected_files: report.successful.clone(),
                            undo_items,
                            user_action: Some(format!("bulk import {operation_id}")),
                            ..Default::default()
                        })
                        .undoable(),
                )
                .await;
        }

        let status = {
            let mut sessions = self.sessions();
            match sessions.get_mut(session_id) {
                Some(session) if session.operation.id == operation_id => {
                    session.executing = false;
                    session.operation.status = if cancel.load(Ordering::SeqCst) {
                        ImportStatus::Cancelled
                    } else {
                        ImportStatus::Completed
                    };
                    session.operation.status
                }
                _ => ImportStatus::Completed,
            }
        };
        info!(
            "Import {operation_id} {status:?}: {} succeeded, {} failed, {} skipped",
            report.successful.len(),
            report.failed.len(),
            report.skipped.len()
        );

        if timed_out {
            return Err(AppError::BatchTimeout {
                message: format!(
                    "Import {operation_id} exceeded {}ms; {} items were committed",
                    self.config.execute_timeout.as_millis(),
                    report.successful.len()
                ),
                report,
            });
        }
        Ok(report)
    }

    async fn import_item(
        &self,
        item: &BulkImportPreview,
        deadline: Instant,
    ) -> Result<UndoItem, AppError> {
        let bytes = tokio::time::timeout_at(deadline, self.read_source(item))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "Reading '{}' did not finish before the import deadline",
                    item.original_filename
                ))
            })??;

        let (job_uuid, created_job) = match &item.mapping {
            MappingSource::JobRef(uuid) => (*uuid, None),
            MappingSource::Manual { company, role } => {
                self.resolve_manual(company, role, &item.original_path).await?
            }
            MappingSource::Unmapped => {
                return Err(AppError::Validation(format!(
                    "'{}' has no job mapping",
                    item.original_filename
                )))
            }
        };

        let stored = self
            .resumes
            .store(UploadRequest {
                job_uuid,
                bytes,
                original_filename: item.original_filename.clone(),
                original_path: Some(item.original_path.clone()),
                keep_original: None,
            })
            .await;

        match stored {
            Ok(stored) => Ok(UndoItem {
                created_job,
                ..stored.undo_item()
            }),
            Err(e) => {
                if let Some(created) = created_job {
                    if let Err(cleanup) = self.repo.delete(created).await {
                        warn!("Could not remove job {created} after failed import: {cleanup}");
                    }
                }
                Err(e)
            }
        }
    }

    /// Checks the source against upload limits and reads it.
    async fn read_source(&self, item: &BulkImportPreview) -> Result<Bytes, AppError> {
        let size = tokio::fs::metadata(&item.original_path).await?.len();
        self.resumes.validate(&item.original_filename, size)?;
        Ok(Bytes::from(tokio::fs::read(&item.original_path).await?))
    }

    /// Reuses a live job with the same company and role, or creates one.
    async fn resolve_manual(
        &self,
        company: &str,
        role: &str,
        source: &str,
    ) -> Result<(Uuid, Option<Uuid>), AppError> {
        let existing = self
            .repo
            .list(ListFilter::default())
            .await?
            .collect_all()
            .await?
            .into_iter()
            .find(|j| {
                j.company.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(company))
                    && j.role.as_deref().is_some_and(|r| r.eq_ignore_ascii_case(role))
            });
        if let Some(job) = existing {
            return Ok((job.uuid, None));
        }

        let now = Utc::now();
        let mut job = JobRecord::new(format!("{company} - {role}"), CaptureMethod::Manual)
            .with_company_role(Some(company.to_string()), Some(role.to_string()));
        job.imported_from = Some(source.to_string());
        job.imported_at = Some(now);
        let uuid = self.repo.create(job).await?;
        info!("Created job {uuid} for imported resume {source}");
        Ok((uuid, Some(uuid)))
    }

    /// Moves a preview to `cancelled`. A running execute stops before its
    /// next item; nothing already stored is reverted.
    pub fn cancel(&self, session_id: &str) -> Result<BulkImportOperation, AppError> {
        let mut sessions = self.sessions();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| no_operation(session_id))?;
        if session.operation.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Import {} is already {:?}",
                session.operation.id, session.operation.status
            )));
        }
        session.cancel.store(true, Ordering::SeqCst);
        if !session.executing {
            session.operation.status = ImportStatus::Cancelled;
            session.operation.preview_items.clear();
        }
        info!("Import {} cancel requested", session.operation.id);
        Ok(session.operation.clone())
    }
}

fn no_operation(session_id: &str) -> AppError {
    AppError::NotFound(format!("No bulk import for session '{session_id}'"))
}

fn not_reached(item: &BulkImportPreview) -> ItemFailure {
    ItemFailure {
        filename: item.original_filename.clone(),
        error: "Timed out before this item was imported".to_string(),
    }
}

fn count_status(op: &BulkImportOperation, status: PreviewStatus) -> usize {
    op.preview_items.iter().filter(|i| i.status() == status).count()
}

/// Regular, non-hidden files directly inside `folder`, sorted by name.
async fn list_files(folder: &Path) -> Result<Vec<(String, PathBuf)>, AppError> {
    let mut dir = match tokio::fs::read_dir(folder).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!(
                "Folder {} does not exist",
                folder.display()
            )))
        }
        Err(e) => {
            return Err(AppError::Validation(format!(
                "Cannot read folder {}: {e}",
                folder.display()
            )))
        }
    };

    let mut files = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type().await?.is_file() {
            files.push((name, entry.path()));
        }
    }
    files.sort();
    Ok(files)
}
