use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Upload,
    BulkImport,
    Delete,
    Restore,
    Rename,
    Rollback,
}

/// Enough to reverse one committed upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UndoItem {
    pub manifest_id: Uuid,
    pub version_id: Uuid,
    /// Job record created solely for this upload (manual import mapping).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_job: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationDetails {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub undo_items: Vec<UndoItem>,
    /// For `rollback` entries: the entry that was reversed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undoes: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationLogEntry {
    pub id: Uuid,
    pub operation_type: OperationType,
    pub timestamp: DateTime<Utc>,
    pub affected_entity_ids: Vec<String>,
    #[serde(default)]
    pub details: OperationDetails,
    pub can_undo: bool,
    pub session_id: String,
}

impl OperationLogEntry {
    pub fn new(operation_type: OperationType, session_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_type,
            timestamp: Utc::now(),
            affected_entity_ids: Vec::new(),
            details: OperationDetails::default(),
            can_undo: false,
            session_id: session_id.into(),
        }
    }

    pub fn with_details(mut self, details: OperationDetails) -> Self {
        self.affected_entity_ids = details
            .undo_items
            .iter()
            .flat_map(|i| [i.manifest_id.to_string(), i.version_id.to_string()])
            .chain(details.job_uuid.map(|u| u.to_string()))
            .chain(details.undoes.map(|u| u.to_string()))
            .collect();
        self.details = details;
        self
    }

    pub fn undoable(mut self) -> Self {
        self.can_undo = true;
        self
    }
}
