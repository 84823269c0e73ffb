use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilenameComponents {
    pub company: String,
    pub role: String,
    pub date: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Pending,
    Success,
    Failed,
}

/// Result handed over by the external resume text extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub extracted_text: Option<String>,
    pub extraction_status: ExtractionStatus,
    pub extraction_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResumeVersion {
    pub version_id: Uuid,
    pub version_suffix: String,
    pub managed_path: String,
    pub file_checksum: String,
    pub upload_timestamp: DateTime<Utc>,
    pub original_path: Option<String>,
    pub original_filename: String,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_status: Option<ExtractionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
}

/// All resume files uploaded for one job. Exactly one version is active
/// whenever `versions` is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResumeManifestEntry {
    pub id: Uuid,
    pub job_uuid: Uuid,
    pub base_filename: String,
    pub filename_components: FilenameComponents,
    pub file_extension: String,
    pub keep_original: bool,
    pub versions: Vec<ResumeVersion>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub revision: u64,
}

impl ResumeManifestEntry {
    pub fn new(job_uuid: Uuid, base_filename: String, components: FilenameComponents) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_uuid,
            base_filename,
            filename_components: components,
            file_extension: String::new(),
            keep_original: true,
            versions: Vec::new(),
            created_at: now,
            last_updated: now,
            revision: 0,
        }
    }

    pub fn active_version(&self) -> Option<&ResumeVersion> {
        self.versions.iter().find(|v| v.is_active)
    }

    pub fn version(&self, version_id: Uuid) -> Option<&ResumeVersion> {
        self.versions.iter().find(|v| v.version_id == version_id)
    }

    pub fn has_checksum(&self, checksum: &str) -> bool {
        self.versions.iter().any(|v| v.file_checksum == checksum)
    }

    /// Appends `version` as the active one, demoting whichever was active.
    pub fn push_active(&mut self, mut version: ResumeVersion) {
        for v in &mut self.versions {
            v.is_active = false;
        }
        version.is_active = true;
        self.versions.push(version);
        self.last_updated = Utc::now();
    }

    /// Removes a version. If it was active, the most recent remaining upload
    /// is promoted; an emptied manifest has no active version at all.
    pub fn remove_version(&mut self, version_id: Uuid) -> Option<ResumeVersion> {
        let idx = self.versions.iter().position(|v| v.version_id == version_id)?;
        let removed = self.versions.remove(idx);
        if removed.is_active {
            if let Some(next) = self
                .versions
                .iter_mut()
                .max_by_key(|v| v.upload_timestamp)
            {
                next.is_active = true;
            }
        }
        self.last_updated = Utc::now();
        Some(removed)
    }

    pub fn active_count(&self) -> usize {
        self.versions.iter().filter(|v| v.is_active).count()
    }
}
