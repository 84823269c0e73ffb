use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::bulk_import::MappingUpdate;
use crate::errors::AppError;
use crate::models::import::{BulkImportOperation, BulkImportPreview, ImportReport};
use crate::state::{AppState, SessionId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub source_folder: String,
}

/// POST /api/v1/bulk-import/scan
pub async fn handle_scan(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Json(req): Json<ScanRequest>,
) -> Result<Json<BulkImportOperation>, AppError> {
    let op = state.importer.scan(&session, &req.source_folder).await?;
    Ok(Json(op))
}

/// GET /api/v1/bulk-import
pub async fn handle_current(
    State(state): State<AppState>,
    SessionId(session): SessionId,
) -> Result<Json<BulkImportOperation>, AppError> {
    Ok(Json(state.importer.current(&session)?))
}

/// PATCH /api/v1/bulk-import/items/:item_id
pub async fn handle_update_mapping(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path(item_id): Path<Uuid>,
    Json(update): Json<MappingUpdate>,
) -> Result<Json<BulkImportPreview>, AppError> {
    let item = state
        .importer
        .update_mapping(&session, item_id, update)
        .await?;
    Ok(Json(item))
}

/// POST /api/v1/bulk-import/execute
///
/// 200 when every mapped item imported, 207 with per-item detail otherwise,
/// 504 with the same detail when the run hit its deadline.
pub async fn handle_execute(
    State(state): State<AppState>,
    SessionId(session): SessionId,
) -> Result<Json<ImportReport>, AppError> {
    let report = state.importer.execute(&session).await?;
    Ok(Json(report.into_result()?))
}

/// POST /api/v1/bulk-import/cancel
pub async fn handle_cancel(
    State(state): State<AppState>,
    SessionId(session): SessionId,
) -> Result<Json<BulkImportOperation>, AppError> {
    Ok(Json(state.importer.cancel(&session)?))
}
