use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::{ExtractionResult, ResumeManifestEntry, ResumeVersion};
use crate::resumes::UploadRequest;
use crate::state::{AppState, SessionId};

/// POST /api/v1/jobs/:uuid/resumes
///
/// Multipart fields: `file` (required, with filename) and optional
/// `keepOriginal` (`true`/`false`).
pub async fn handle_upload(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path(job_uuid): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ResumeVersion>), AppError> {
    let limit = state.resumes.config().max_file_bytes;
    let mut file: Option<(String, Bytes)> = None;
    let mut keep_original = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit, "Malformed multipart body"))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::Validation("File field has no filename".into()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, limit, "Could not read upload"))?;
                file = Some((filename, data));
            }
            Some("keepOriginal") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, limit, "Bad keepOriginal field"))?;
                keep_original = Some(raw.trim().eq_ignore_ascii_case("true"));
            }
            _ => {}
        }
    }

    let (original_filename, bytes) =
        file.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;
    let version = state
        .resumes
        .upload(
            UploadRequest {
                job_uuid,
                bytes,
                original_filename,
                original_path: None,
                keep_original,
            },
            &session,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(version)))
}

fn multipart_error(e: MultipartError, limit: u64, context: &str) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Validation(format!("Upload is above the {limit} byte limit"))
    } else {
        AppError::Validation(format!("{context}: {e}"))
    }
}

/// GET /api/v1/jobs/:uuid/resumes
pub async fn handle_list(
    State(state): State<AppState>,
    Path(job_uuid): Path<Uuid>,
) -> Result<Json<Vec<ResumeManifestEntry>>, AppError> {
    Ok(Json(state.resumes.list_for_job(job_uuid).await?))
}

/// GET /api/v1/resumes/:manifest_id/versions/:version_id
pub async fn handle_download(
    State(state): State<AppState>,
    Path((manifest_id, version_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let (version, bytes) = state.resumes.read_version(manifest_id, version_id).await?;
    let filename = version
        .managed_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(&version.original_filename)
        .replace('"', "");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

/// DELETE /api/v1/resumes/:manifest_id/versions/:version_id
pub async fn handle_delete_version(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path((manifest_id, version_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ResumeManifestEntry>, AppError> {
    let manifest = state
        .resumes
        .delete_version(manifest_id, version_id, &session)
        .await?;
    Ok(Json(manifest))
}

/// PUT /api/v1/resumes/:manifest_id/versions/:version_id/extraction
pub async fn handle_attach_extraction(
    State(state): State<AppState>,
    Path((manifest_id, version_id)): Path<(Uuid, Uuid)>,
    Json(result): Json<ExtractionResult>,
) -> Result<Json<ResumeVersion>, AppError> {
    let version = state
        .resumes
        .attach_extraction(manifest_id, version_id, result)
        .await?;
    Ok(Json(version))
}
