use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::jobs::{CaptureInput, CaptureOutcome, JobPatch};
use crate::models::job::{ApplicationStatus, JobRecord, ListFilter};
use crate::state::{AppState, SessionId};

#[derive(Deserialize)]
pub struct StatusChange {
    pub status: ApplicationStatus,
}

#[derive(Deserialize)]
pub struct ReminderChange {
    pub at: Option<DateTime<Utc>>,
}

/// POST /api/v1/jobs
pub async fn handle_capture(
    State(state): State<AppState>,
    Json(input): Json<CaptureInput>,
) -> Result<(StatusCode, Json<CaptureOutcome>), AppError> {
    let outcome = state.jobs.capture(input).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/v1/jobs
pub async fn handle_list(
    State(state): State<AppState>,
    Query(filter): Query<ListFilter>,
) -> Result<Json<Vec<JobRecord>>, AppError> {
    Ok(Json(state.jobs.list(filter).await?))
}

/// GET /api/v1/jobs/:uuid
pub async fn handle_get(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<JobRecord>, AppError> {
    Ok(Json(state.jobs.get(uuid).await?))
}

/// PATCH /api/v1/jobs/:uuid
pub async fn handle_edit(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(patch): Json<JobPatch>,
) -> Result<Json<JobRecord>, AppError> {
    Ok(Json(state.jobs.edit(uuid, patch).await?))
}

/// DELETE /api/v1/jobs/:uuid
pub async fn handle_delete(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path(uuid): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.jobs.delete(uuid, &session).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/jobs/:uuid/status
pub async fn handle_set_status(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(req): Json<StatusChange>,
) -> Result<Json<JobRecord>, AppError> {
    Ok(Json(state.jobs.set_status(uuid, req.status).await?))
}

/// PUT /api/v1/jobs/:uuid/reminder
pub async fn handle_set_reminder(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(req): Json<ReminderChange>,
) -> Result<Json<JobRecord>, AppError> {
    Ok(Json(state.jobs.set_reminder(uuid, req.at).await?))
}

/// POST /api/v1/jobs/:uuid/restore
pub async fn handle_restore(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path(uuid): Path<Uuid>,
) -> Result<Json<JobRecord>, AppError> {
    Ok(Json(state.jobs.restore(uuid, &session).await?))
}
