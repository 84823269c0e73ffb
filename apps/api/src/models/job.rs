use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hashing::content_hash;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    #[default]
    Manual,
    UrlFetch,
    BrowserHelper,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    Interested,
    Applied,
    Interviewing,
    Offer,
    Rejected,
    Withdrawn,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeAction {
    Merge,
    Delete,
    Archive,
}

/// Lineage entry appended to a record's `merge_history`. Never mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MergeEvent {
    pub timestamp: DateTime<Utc>,
    pub action: MergeAction,
    pub source_uuids: BTreeSet<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_note: Option<String>,
}

/// A captured job description plus its application-tracking state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub uuid: Uuid,
    pub company: Option<String>,
    pub role: Option<String>,
    pub text: String,
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_html_path: Option<String>,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub content_hash: String,
    #[serde(default)]
    pub capture_method: CaptureMethod,
    #[serde(default)]
    pub application_status: ApplicationStatus,
    #[serde(default)]
    pub applied_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_reminder: Option<DateTime<Utc>>,
    #[serde(default)]
    pub followup_reminder: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_followup_enabled: bool,
    #[serde(default)]
    pub merged_from: BTreeSet<Uuid>,
    #[serde(default)]
    pub merge_history: Vec<MergeEvent>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<DateTime<Utc>>,
    /// Storage revision used for optimistic concurrency checks.
    #[serde(default)]
    pub revision: u64,
}

impl JobRecord {
    pub fn new(text: impl Into<String>, capture_method: CaptureMethod) -> Self {
        let text = text.into();
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            company: None,
            role: None,
            content_hash: content_hash(&text),
            text,
            source_url: None,
            source_html_path: None,
            captured_at: Some(now),
            fetched_at: now,
            capture_method,
            application_status: ApplicationStatus::default(),
            applied_date: None,
            last_updated: None,
            next_reminder: None,
            followup_reminder: None,
            auto_followup_enabled: false,
            merged_from: BTreeSet::new(),
            merge_history: Vec::new(),
            archived: false,
            archived_at: None,
            imported_from: None,
            imported_at: None,
            revision: 0,
        }
    }

    pub fn with_company_role(mut self, company: Option<String>, role: Option<String>) -> Self {
        self.company = company;
        self.role = role;
        self
    }

    /// Timestamp that decides which record is canonical within a duplicate group.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.captured_at.unwrap_or(self.fetched_at)
    }

    pub fn refresh_hash(&mut self) {
        self.content_hash = content_hash(&self.text);
    }

    /// Human label used in logs and proposed filenames.
    pub fn label(&self) -> String {
        format!(
            "{} / {}",
            self.company.as_deref().unwrap_or("Unknown Company"),
            self.role.as_deref().unwrap_or("Unknown Role")
        )
    }
}

/// Filter applied by `Repository::list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilter {
    #[serde(default)]
    pub include_archived: bool,
    pub status: Option<ApplicationStatus>,
    /// Only records whose normalised text hashes to this value.
    #[serde(alias = "contentHash")]
    pub content_hash: Option<String>,
    pub limit: Option<usize>,
}

impl ListFilter {
    pub fn matches(&self, job: &JobRecord) -> bool {
        if job.archived && !self.include_archived {
            return false;
        }
        if self
            .content_hash
            .as_deref()
            .is_some_and(|hash| hash != job.content_hash)
        {
            return false;
        }
        match self.status {
            Some(status) => job.application_status == status,
            None => true,
        }
    }
}
