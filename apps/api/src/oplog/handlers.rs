use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::oplog::OperationLogEntry;
use crate::state::{AppState, SessionId};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPage {
    pub entries: Vec<OperationLogEntry>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// GET /api/v1/operations
pub async fn handle_list(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Json<OperationPage> {
    let limit = page.limit.min(500);
    Json(OperationPage {
        entries: state.oplog.list(limit, page.offset).await,
        total: state.oplog.len().await,
        limit,
        offset: page.offset,
    })
}

/// POST /api/v1/operations/:id/undo
pub async fn handle_undo(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path(id): Path<Uuid>,
) -> Result<Json<OperationLogEntry>, AppError> {
    Ok(Json(state.undo.undo(id, &session).await?))
}
