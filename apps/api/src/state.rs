use std::convert::Infallible;
use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::info;

use crate::bulk_import::BulkImportReconciler;
use crate::config::Config;
use crate::dedup::engine::DuplicateEngine;
use crate::dedup::scoring::WeightedJaccardScorer;
use crate::errors::AppError;
use crate::jobs::JobService;
use crate::oplog::{OperationLog, UndoService};
use crate::resumes::blob::FsBlobStore;
use crate::resumes::VersionManager;
use crate::store::Repository;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
    /// Pluggable similarity scorer lives inside. Default: WeightedJaccardScorer.
    pub dedup: Arc<DuplicateEngine>,
    pub resumes: Arc<VersionManager>,
    pub importer: Arc<BulkImportReconciler>,
    pub oplog: Arc<OperationLog>,
    pub undo: Arc<UndoService>,
}

impl AppState {
    /// Opens everything under `config.data_dir` and wires the components.
    pub async fn build(config: &Config) -> Result<Self, AppError> {
        let data_dir = &config.data_dir;
        let repo = Arc::new(Repository::open(data_dir, &config.store).await?);
        let oplog = Arc::new(
            OperationLog::open(data_dir.join("operations.log"), config.store.oplog_retention)
                .await?,
        );
        let blobs = Arc::new(FsBlobStore::open(data_dir.join("resumes")).await?);

        let scorer = Arc::new(WeightedJaccardScorer::from_config(&config.dedup));
        let dedup = Arc::new(DuplicateEngine::new(
            repo.clone(),
            scorer,
            config.dedup.clone(),
        ));
        let resumes = Arc::new(VersionManager::new(
            repo.clone(),
            blobs,
            oplog.clone(),
            config.resume.clone(),
        ));
        let importer = Arc::new(BulkImportReconciler::new(
            repo.clone(),
            resumes.clone(),
            oplog.clone(),
            config.import.clone(),
        ));
        let undo = Arc::new(UndoService::new(oplog.clone(), resumes.clone(), repo.clone()));
        let jobs = Arc::new(JobService::new(repo, oplog.clone()));

        info!("Application state ready (data dir {})", data_dir.display());
        Ok(Self {
            jobs,
            dedup,
            resumes,
            importer,
            oplog,
            undo,
        })
    }
}

pub const SESSION_HEADER: &str = "x-session-id";
const DEFAULT_SESSION: &str = "default";

/// Caller session taken from the `x-session-id` header; `default` if absent.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_SESSION);
        Ok(SessionId(session.to_string()))
    }
}
