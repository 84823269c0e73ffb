use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Preview,
    Completed,
    Cancelled,
}

impl ImportStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ImportStatus::Preview)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    Pending,
    Mapped,
    Error,
}

/// Where an import item's company/role come from.
///
/// `Manual` can only be built through [`MappingSource::from_parts`], which
/// rejects blank company or role, so a `Manual` value is always complete.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MappingSource {
    JobRef(Uuid),
    Manual { company: String, role: String },
    #[default]
    Unmapped,
}

impl MappingSource {
    /// A job reference wins; otherwise both manual fields must be non-blank.
    pub fn from_parts(
        job: Option<Uuid>,
        manual_company: Option<&str>,
        manual_role: Option<&str>,
    ) -> Self {
        if let Some(uuid) = job {
            return MappingSource::JobRef(uuid);
        }
        let company = manual_company.map(str::trim).filter(|s| !s.is_empty());
        let role = manual_role.map(str::trim).filter(|s| !s.is_empty());
        match (company, role) {
            (Some(company), Some(role)) => MappingSource::Manual {
                company: company.to_string(),
                role: role.to_string(),
            },
            _ => MappingSource::Unmapped,
        }
    }

    pub fn is_complete(&self) -> bool {
        !matches!(self, MappingSource::Unmapped)
    }
}

/// One file found by a bulk-import scan.
///
/// Status is derived rather than stored: an error message means `error`,
/// a complete mapping means `mapped`, anything else is `pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PreviewWire", from = "PreviewWire")]
pub struct BulkImportPreview {
    pub id: Uuid,
    pub original_filename: String,
    pub original_path: String,
    pub proposed_filename: String,
    pub mapping: MappingSource,
    /// Partial manual input kept so the caller can finish it later.
    pub draft_company: Option<String>,
    pub draft_role: Option<String>,
    pub error_message: Option<String>,
}

impl BulkImportPreview {
    pub fn status(&self) -> PreviewStatus {
        if self.error_message.is_some() {
            PreviewStatus::Error
        } else if self.mapping.is_complete() {
            PreviewStatus::Mapped
        } else {
            PreviewStatus::Pending
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreviewWire {
    id: Uuid,
    original_filename: String,
    original_path: String,
    proposed_filename: String,
    job_mapping: Option<Uuid>,
    manual_company: Option<String>,
    manual_role: Option<String>,
    status: PreviewStatus,
    error_message: Option<String>,
}

impl From<BulkImportPreview> for PreviewWire {
    fn from(p: BulkImportPreview) -> Self {
        let status = p.status();
        let (job_mapping, manual_company, manual_role) = match p.mapping {
            MappingSource::JobRef(uuid) => (Some(uuid), p.draft_company, p.draft_role),
            MappingSource::Manual { company, role } => (None, Some(company), Some(role)),
            MappingSource::Unmapped => (None, p.draft_company, p.draft_role),
        };
        PreviewWire {
            id: p.id,
            original_filename: p.original_filename,
            original_path: p.original_path,
            proposed_filename: p.proposed_filename,
            job_mapping,
            manual_company,
            manual_role,
            status,
            error_message: p.error_message,
        }
    }
}

impl From<PreviewWire> for BulkImportPreview {
    fn from(w: PreviewWire) -> Self {
        let mapping = MappingSource::from_parts(
            w.job_mapping,
            w.manual_company.as_deref(),
            w.manual_role.as_deref(),
        );
        BulkImportPreview {
            id: w.id,
            original_filename: w.original_filename,
            original_path: w.original_path,
            proposed_filename: w.proposed_filename,
            mapping,
            draft_company: w.manual_company,
            draft_role: w.manual_role,
            error_message: w.error_message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkImportOperation {
    pub id: Uuid,
    pub session_id: String,
    pub source_folder: String,
    pub preview_items: Vec<BulkImportPreview>,
    pub status: ImportStatus,
    pub created_at: DateTime<Utc>,
}

/// Outcome of `execute`: per-item, never collapsed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub successful: Vec<String>,
    pub failed: Vec<crate::errors::ItemFailure>,
    /// Mapped items not attempted because the run was cancelled.
    pub skipped: Vec<String>,
}

impl ImportReport {
    /// Turns a report with failures into `AppError::PartialFailure`.
    pub fn into_result(self) -> Result<Self, crate::errors::AppError> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(crate::errors::AppError::PartialFailure(self))
        }
    }
}
