use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::job::{ApplicationStatus, CaptureMethod, JobRecord, ListFilter};
use crate::models::oplog::{OperationDetails, OperationLogEntry, OperationType};
use crate::oplog::OperationLog;
use crate::store::Repository;

const FOLLOWUP_AFTER_DAYS: i64 = 7;

/// What a capture source hands over.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureInput {
    pub text: String,
    pub source_url: Option<String>,
    pub source_html: Option<String>,
    #[serde(default)]
    pub capture_method: CaptureMethod,
    pub company: Option<String>,
    pub role: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_followup_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutcome {
    pub job: JobRecord,
    /// Live records whose normalised text is identical.
    pub exact_duplicates: Vec<Uuid>,
}

/// Editable fields. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    pub company: Option<String>,
    pub role: Option<String>,
    pub text: Option<String>,
    pub source_url: Option<String>,
    pub auto_followup_enabled: Option<bool>,
}

pub struct JobService {
    repo: Arc<Repository>,
    oplog: Arc<OperationLog>,
}

impl JobService {
    pub fn new(repo: Arc<Repository>, oplog: Arc<OperationLog>) -> Self {
        Self { repo, oplog }
    }

    pub async fn capture(&self, input: CaptureInput) -> Result<CaptureOutcome, AppError> {
        if input.text.trim().is_empty() {
            return Err(AppError::Validation("Captured text is empty".to_string()));
        }
        let mut record = JobRecord::new(input.text, input.capture_method)
            .with_company_role(non_blank(input.company), non_blank(input.role));
        record.source_url = non_blank(input.source_url);
        record.auto_followup_enabled = input.auto_followup_enabled;
        if let Some(at) = input.captured_at {
            record.captured_at = Some(at);
        }
        if let Some(html) = input.source_html.filter(|h| !h.trim().is_empty()) {
            record.source_html_path = Some(self.repo.store_source_html(record.uuid, &html).await?);
        }

        let exact_duplicates = self.live_with_hash(&record.content_hash).await?;
        let uuid = self.repo.create(record).await?;
        if !exact_duplicates.is_empty() {
            info!("Captured job {uuid} has {} exact duplicates", exact_duplicates.len());
        }
        Ok(CaptureOutcome {
            job: self.repo.get(uuid).await?,
            exact_duplicates,
        })
    }

    async fn live_with_hash(&self, hash: &str) -> Result<Vec<Uuid>, AppError> {
        let mut live = Vec::new();
        for uuid in self.repo.find_by_content_hash(hash) {
            match self.repo.get(uuid).await {
                Ok(job) if !job.archived => live.push(uuid),
                Ok(_) | Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(live)
    }

    pub async fn get(&self, uuid: Uuid) -> Result<JobRecord, AppError> {
        self.repo.get(uuid).await
    }

    pub async fn list(&self, filter: ListFilter) -> Result<Vec<JobRecord>, AppError> {
        self.repo.list_recent(filter).await
    }

    pub async fn edit(&self, uuid: Uuid, patch: JobPatch) -> Result<JobRecord, AppError> {
        if patch.text.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(AppError::Validation("Job text must not be empty".to_string()));
        }
        self.repo
            .update(uuid, |job| {
                if let Some(company) = &patch.company {
                    job.company = non_blank(Some(company.clone()));
                }
                if let Some(role) = &patch.role {
                    job.role = non_blank(Some(role.clone()));
                }
                if let Some(text) = &patch.text {
                    job.text = text.clone();
                }
                if let Some(url) = &patch.source_url {
                    job.source_url = non_blank(Some(url.clone()));
                }
                if let Some(enabled) = patch.auto_followup_enabled {
                    job.auto_followup_enabled = enabled;
                }
                job.last_updated = Some(Utc::now());
                Ok(())
            })
            .await
    }

    pub async fn delete(&self, uuid: Uuid, session_id: &str) -> Result<(), AppError> {
        self.repo.delete(uuid).await?;
        self.oplog
            .record(
                OperationLogEntry::new(OperationType::Delete, session_id).with_details(
                    OperationDetails {
                        job_uuid: Some(uuid),
                        user_action: Some("delete job".to_string()),
                        ..Default::default()
                    },
                ),
            )
            .await;
        Ok(())
    }

    /// Moving to `applied` stamps the applied date once and, with auto
    /// follow-up on, schedules a follow-up reminder a week later.
    pub async fn set_status(&self, uuid: Uuid, status: ApplicationStatus) -> Result<JobRecord, AppError> {
        let job = self
            .repo
            .update(uuid, |job| {
                let now = Utc::now();
                job.application_status = status;
                job.last_updated = Some(now);
                if status == ApplicationStatus::Applied {
                    let applied = *job.applied_date.get_or_insert(now);
                    if job.auto_followup_enabled && job.followup_reminder.is_none() {
                        job.followup_reminder = Some(applied + Duration::days(FOLLOWUP_AFTER_DAYS));
                    }
                }
                Ok(())
            })
            .await?;
        info!("Job {uuid} status set to {status:?}");
        Ok(job)
    }

    /// `None` clears the reminder.
    pub async fn set_reminder(
        &self,
        uuid: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<JobRecord, AppError> {
        if let Some(at) = at {
            if at <= Utc::now() {
                return Err(AppError::Validation(format!(
                    "Reminder time {at} is not in the future"
                )));
            }
        }
        self.repo
            .update(uuid, |job| {
                job.next_reminder = at;
                job.last_updated = Some(Utc::now());
                Ok(())
            })
            .await
    }

    pub async fn restore(&self, uuid: Uuid, session_id: &str) -> Result<JobRecord, AppError> {
        let job = self
            .repo
            .update(uuid, |job| {
                if !job.archived {
                    return Err(AppError::InvalidState(format!("Job {uuid} is not archived")));
                }
                job.archived = false;
                job.archived_at = None;
                job.last_updated = Some(Utc::now());
                Ok(())
            })
            .await?;
        self.oplog
            .record(
                OperationLogEntry::new(OperationType::Restore, session_id).with_details(
                    OperationDetails {
                        job_uuid: Some(uuid),
                        user_action: Some("restore job".to_string()),
                        ..Default::default()
                    },
                ),
            )
            .await;
        info!("Restored job {uuid}");
        Ok(job)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::hashing::content_hash;

    async fn service(dir: &tempfile::TempDir) -> JobService {
        let repo = Arc::new(
            Repository::open(dir.path(), &StoreConfig::default())
                .await
                .unwrap(),
        );
        let oplog = Arc::new(
            OperationLog::open(dir.path().join("operations.log"), 50)
                .await
                .unwrap(),
        );
        JobService::new(repo, oplog)
    }

    fn input(text: &str) -> CaptureInput {
        CaptureInput {
            text: text.to_string(),
            company: Some(" Acme ".into()),
            role: Some("".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_capture_trims_fields_and_stores_html() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let out = svc
            .capture(CaptureInput {
                source_html: Some("<html>posting</html>".into()),
                ..input("Staff engineer")
            })
            .await
            .unwrap();
        assert_eq!(out.job.company.as_deref(), Some("Acme"));
        assert_eq!(out.job.role, None);
        let html = out.job.source_html_path.unwrap();
        assert_eq!(std::fs::read_to_string(html).unwrap(), "<html>posting</html>");
        assert!(out.exact_duplicates.is_empty());
    }

    #[tokio::test]
    async fn test_capture_reports_exact_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let first = svc.capture(input("Build the thing")).await.unwrap();
        let second = svc.capture(input("build  THE thing")).await.unwrap();
        assert_eq!(second.exact_duplicates, vec![first.job.uuid]);
        let same = svc
            .list(ListFilter {
                content_hash: Some(content_hash("BUILD the thing")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(same.len(), 2);
    }

    #[tokio::test]
    async fn test_capture_rejects_blank_text() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        assert!(matches!(
            svc.capture(input("  ")).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_applied_sets_date_once_and_followup() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let job = svc
            .capture(CaptureInput {
                auto_followup_enabled: true,
                ..input("Role")
            })
            .await
            .unwrap()
            .job;

        let applied = svc.set_status(job.uuid, ApplicationStatus::Applied).await.unwrap();
        let date = applied.applied_date.unwrap();
        assert_eq!(applied.followup_reminder, Some(date + Duration::days(7)));

        svc.set_status(job.uuid, ApplicationStatus::Interviewing).await.unwrap();
        let again = svc.set_status(job.uuid, ApplicationStatus::Applied).await.unwrap();
        assert_eq!(again.applied_date, Some(date));
    }

    #[tokio::test]
    async fn test_reminder_must_be_in_future() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let job = svc.capture(input("Role")).await.unwrap().job;
        assert!(matches!(
            svc.set_reminder(job.uuid, Some(Utc::now() - Duration::hours(1))).await,
            Err(AppError::Validation(_))
        ));
        let later = Utc::now() + Duration::days(2);
        let updated = svc.set_reminder(job.uuid, Some(later)).await.unwrap();
        assert_eq!(updated.next_reminder, Some(later));
        let cleared = svc.set_reminder(job.uuid, None).await.unwrap();
        assert_eq!(cleared.next_reminder, None);
    }

    #[tokio::test]
    async fn test_restore_requires_archived_and_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let job = svc.capture(input("Role")).await.unwrap().job;
        assert!(matches!(
            svc.restore(job.uuid, "s").await,
            Err(AppError::InvalidState(_))
        ));

        svc.repo
            .update(job.uuid, |j| {
                j.archived = true;
                j.archived_at = Some(Utc::now());
                Ok(())
            })
            .await
            .unwrap();
        let restored = svc.restore(job.uuid, "s").await.unwrap();
        assert!(!restored.archived);
        assert!(restored.archived_at.is_none());
        let logged = svc.oplog.list(1, 0).await.remove(0);
        assert_eq!(logged.operation_type, OperationType::Restore);
        assert!(!logged.can_undo);
    }

    #[tokio::test]
    async fn test_edit_text_recomputes_hash() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir).await;
        let job = svc.capture(input("old body")).await.unwrap().job;
        let edited = svc
            .edit(
                job.uuid,
                JobPatch {
                    text: Some("New Body".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.content_hash, content_hash("new body"));
        assert_eq!(edited.company.as_deref(), Some("Acme"));
    }
}
