use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::dedup::engine::DeduplicationResult;
use crate::errors::AppError;
use crate::models::job::JobRecord;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub surviving_uuid: Uuid,
    pub note: Option<String>,
}

/// POST /api/v1/duplicates/scan
pub async fn handle_scan(
    State(state): State<AppState>,
    body: Option<Json<ScanRequest>>,
) -> Result<Json<DeduplicationResult>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let result = state.dedup.scan_all(req.threshold).await?;
    Ok(Json(result))
}

/// POST /api/v1/duplicates/:group_id/merge
pub async fn handle_merge(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<MergeRequest>,
) -> Result<Json<JobRecord>, AppError> {
    let survivor = state
        .dedup
        .merge(group_id, req.surviving_uuid, req.note)
        .await?;
    Ok(Json(survivor))
}

/// POST /api/v1/duplicates/auto-merge
pub async fn handle_auto_merge(
    State(state): State<AppState>,
) -> Result<Json<Vec<JobRecord>>, AppError> {
    Ok(Json(state.dedup.auto_merge().await?))
}
