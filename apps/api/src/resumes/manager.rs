use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ResumeConfig;
use crate::errors::AppError;
use crate::hashing::file_checksum;
use crate::models::oplog::{OperationDetails, OperationLogEntry, OperationType, UndoItem};
use crate::models::resume::{ExtractionResult, ResumeManifestEntry, ResumeVersion};
use crate::oplog::OperationLog;
use crate::resumes::blob::BlobStore;
use crate::resumes::naming;
use crate::store::locks::LockTable;
use crate::store::Repository;

/// One file handed to [`VersionManager::upload`].
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub job_uuid: Uuid,
    pub bytes: Bytes,
    pub original_filename: String,
    /// Source location on disk, removed after storing when `keep_original`
    /// resolves to false.
    pub original_path: Option<String>,
    /// `None` uses the manifest's setting, or the configured default for a
    /// new manifest.
    pub keep_original: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct StoredVersion {
    pub manifest_id: Uuid,
    pub version: ResumeVersion,
}

impl StoredVersion {
    pub fn undo_item(&self) -> UndoItem {
        UndoItem {
            manifest_id: self.manifest_id,
            version_id: self.version.version_id,
            created_job: None,
        }
    }
}

/// Owns the resume files of every job and the active-version rule.
///
/// Uploads and deletions for one job are serialized by a per-job lock, so
/// manifest find-or-create, suffix assignment and the active flag flip all
/// see a stable manifest. The manifest write itself is a revision-checked
/// compare-and-swap; if it fails the stored file is removed again.
pub struct VersionManager {
    repo: Arc<Repository>,
    blobs: Arc<dyn BlobStore>,
    oplog: Arc<OperationLog>,
    config: ResumeConfig,
    job_locks: LockTable,
}

impl VersionManager {
    pub fn new(
        repo: Arc<Repository>,
        blobs: Arc<dyn BlobStore>,
        oplog: Arc<OperationLog>,
        config: ResumeConfig,
    ) -> Self {
        Self {
            repo,
            blobs,
            oplog,
            config,
            job_locks: LockTable::new(),
        }
    }

    pub fn config(&self) -> &ResumeConfig {
        &self.config
    }

    /// Checks extension and size; returns the lower-cased extension.
    pub fn validate(&self, filename: &str, size: u64) -> Result<String, AppError> {
        let ext = naming::extension_of(filename)
            .ok_or_else(|| AppError::Validation(format!("File '{filename}' has no extension")))?;
        if !self.config.supported_file_types.contains(&ext) {
            return Err(AppError::Validation(format!(
                "Unsupported file type '{ext}' for '{filename}'. Supported: {}",
                self.config.supported_file_types.join(", ")
            )));
        }
        if size > self.config.max_file_bytes {
            return Err(AppError::Validation(format!(
                "File '{filename}' is {size} bytes, above the {} byte limit",
                self.config.max_file_bytes
            )));
        }
        Ok(ext)
    }

    /// Stores a new active version and logs an undoable `upload` entry.
    pub async fn upload(&self, req: UploadRequest, session_id: &str) -> Result<ResumeVersion, AppError> {
        let job_uuid = req.job_uuid;
        let stored = self.store(req).await?;
        self.oplog
            .record(
                OperationLogEntry::new(OperationType::Upload, session_id)
                    .with_details(OperationDetails {
                        affected_files: vec![stored.version.managed_path.clone()],
                        job_uuid: Some(job_uuid),
                        undo_items: vec![stored.undo_item()],
                        ..Default::default()
                    })
                    .undoable(),
            )
            .await;
        Ok(stored.version)
    }

    /// Upload without an operation-log entry; bulk import logs one entry for
    /// the whole batch instead.
    pub async fn store(&self, req: UploadRequest) -> Result<StoredVersion, AppError> {
        let ext = self.validate(&req.original_filename, req.bytes.len() as u64)?;
        let checksum = file_checksum(&req.bytes);
        let job = self.repo.get(req.job_uuid).await?;

        let _guard = self.job_locks.write(req.job_uuid).await;

        let existing = self
            .repo
            .manifests_for_job(req.job_uuid)
            .await?
            .into_iter()
            .min_by_key(|m| m.created_at);
        let is_new = existing.is_none();
        let mut manifest = match existing {
            Some(m) => m,
            None => {
                let components = naming::components_for(
                    job.company.as_deref(),
                    job.role.as_deref(),
                    job.effective_timestamp(),
                    self.config.naming_format,
                );
                let base = naming::base_filename(&components);
                let mut m = ResumeManifestEntry::new(job.uuid, base, components);
                m.file_extension = ext.clone();
                m.keep_original = req.keep_original.unwrap_or(self.config.keep_original_default);
                m
            }
        };

        if manifest.has_checksum(&checksum) {
            return Err(AppError::DuplicateContent(format!(
                "'{}' is identical to a version already stored for job {}",
                req.original_filename, req.job_uuid
            )));
        }

        let suffix = naming::next_suffix(&manifest.versions);
        let key = format!("{}/{}{}{}", job.uuid, manifest.base_filename, suffix, ext);
        let managed_path = self.blobs.put(&key, req.bytes.clone()).await?;

        let version = ResumeVersion {
            version_id: Uuid::new_v4(),
            version_suffix: suffix,
            managed_path: managed_path.clone(),
            file_checksum: checksum,
            upload_timestamp: Utc::now(),
            original_path: req.original_path.clone(),
            original_filename: req.original_filename.clone(),
            is_active: true,
            extracted_text: None,
            extraction_status: None,
            extraction_error: None,
        };
        manifest.file_extension = ext;
        if let Some(keep) = req.keep_original {
            manifest.keep_original = keep;
        }
        manifest.push_active(version.clone());

        let committed = if is_new {
            self.repo.create_manifest(manifest).await
        } else {
            self.repo.put_manifest(manifest).await
        };
        let manifest = match committed {
            Ok(m) => m,
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&managed_path).await {
                    warn!("Could not remove orphaned resume file {managed_path}: {cleanup}");
                }
                return Err(e);
            }
        };

        if !manifest.keep_original {
            if let Some(original) = &req.original_path {
                if let Err(e) = tokio::fs::remove_file(original).await {
                    warn!("Stored {managed_path} but could not remove original {original}: {e}");
                }
            }
        }

        info!(
            "Stored resume version '{}' for job {} ({})",
            if version.version_suffix.is_empty() {
                "initial"
            } else {
                version.version_suffix.as_str()
            },
            job.uuid,
            managed_path
        );
        Ok(StoredVersion {
            manifest_id: manifest.id,
            version,
        })
    }

    /// Deletes a version and its file. If it was active the most recent
    /// remaining version is promoted. Logged, but not undoable since the
    /// bytes are gone.
    pub async fn delete_version(
        &self,
        manifest_id: Uuid,
        version_id: Uuid,
        session_id: &str,
    ) -> Result<ResumeManifestEntry, AppError> {
        let (manifest, removed) = self.remove_version(manifest_id, version_id).await?;
        self.oplog
            .record(
                OperationLogEntry::new(OperationType::Delete, session_id).with_details(
                    OperationDetails {
                        affected_files: vec![removed.managed_path],
                        job_uuid: Some(manifest.job_uuid),
                        user_action: Some(format!("delete version {version_id}")),
                        ..Default::default()
                    },
                ),
            )
            .await;
        Ok(manifest)
    }

    /// Unlogged removal, shared by `delete_version` and undo.
    pub async fn remove_version(
        &self,
        manifest_id: Uuid,
        version_id: Uuid,
    ) -> Result<(ResumeManifestEntry, ResumeVersion), AppError> {
        let current = self.repo.get_manifest(manifest_id).await?;
        let _guard = self.job_locks.write(current.job_uuid).await;

        let removed = self
            .repo
            .get_manifest(manifest_id)
            .await?
            .version(version_id)
            .cloned()
            .ok_or_else(|| version_not_found(manifest_id, version_id))?;

        let manifest = self
            .repo
            .update_manifest(manifest_id, |m| {
                m.remove_version(version_id)
                    .map(|_| ())
                    .ok_or_else(|| version_not_found(manifest_id, version_id))
            })
            .await?;

        if let Err(e) = self.blobs.delete(&removed.managed_path).await {
            warn!("Version {version_id} removed but file {} remains: {e}", removed.managed_path);
        }
        info!(
            "Removed version {version_id} from manifest {manifest_id}; {} remain",
            manifest.versions.len()
        );
        Ok((manifest, removed))
    }

    /// Pure read of a version's bytes.
    pub async fn read_version(
        &self,
        manifest_id: Uuid,
        version_id: Uuid,
    ) -> Result<(ResumeVersion, Bytes), AppError> {
        let manifest = self.repo.get_manifest(manifest_id).await?;
        let version = manifest
            .version(version_id)
            .cloned()
            .ok_or_else(|| version_not_found(manifest_id, version_id))?;
        let bytes = self.blobs.get(&version.managed_path).await?;
        Ok((version, bytes))
    }

    /// Records the external extractor's outcome on a version.
    pub async fn attach_extraction(
        &self,
        manifest_id: Uuid,
        version_id: Uuid,
        result: ExtractionResult,
    ) -> Result<ResumeVersion, AppError> {
        let manifest = self
            .repo
            .update_manifest(manifest_id, |m| {
                let v = m
                    .versions
                    .iter_mut()
                    .find(|v| v.version_id == version_id)
                    .ok_or_else(|| version_not_found(manifest_id, version_id))?;
                v.extracted_text = result.extracted_text.clone();
                v.extraction_status = Some(result.extraction_status);
                v.extraction_error = result.extraction_error.clone();
                m.last_updated = Utc::now();
                Ok(())
            })
            .await?;
        manifest
            .version(version_id)
            .cloned()
            .ok_or_else(|| version_not_found(manifest_id, version_id))
    }

    pub async fn list_for_job(&self, job_uuid: Uuid) -> Result<Vec<ResumeManifestEntry>, AppError> {
        self.repo.get(job_uuid).await?;
        self.repo.manifests_for_job(job_uuid).await
    }

    /// Deletes every manifest of a job that no longer holds versions.
    /// Returns whether the job is now free of resumes.
    pub async fn prune_empty_manifests(&self, job_uuid: Uuid) -> Result<bool, AppError> {
        let _guard = self.job_locks.write(job_uuid).await;
        let mut clear = true;
        for manifest in self.repo.manifests_for_job(job_uuid).await? {
            if manifest.versions.is_empty() {
                self.repo.delete_manifest(manifest.id).await?;
            } else {
                clear = false;
            }
        }
        Ok(clear)
    }
}

fn version_not_found(manifest_id: Uuid, version_id: Uuid) -> AppError {
    AppError::NotFound(format!(
        "Version {version_id} not found in manifest {manifest_id}"
    ))
}
