pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Router,
};

use crate::state::AppState;
use crate::{bulk_import, dedup, jobs, oplog, resumes};

/// Headroom for multipart boundaries and part headers around a resume file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.resumes.config().max_file_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health::health_handler))
        // Job records
        .route(
            "/api/v1/jobs",
            post(jobs::handlers::handle_capture).get(jobs::handlers::handle_list),
        )
        .route(
            "/api/v1/jobs/:uuid",
            get(jobs::handlers::handle_get)
                .patch(jobs::handlers::handle_edit)
                .delete(jobs::handlers::handle_delete),
        )
        .route(
            "/api/v1/jobs/:uuid/status",
            put(jobs::handlers::handle_set_status),
        )
        .route(
            "/api/v1/jobs/:uuid/reminder",
            put(jobs::handlers::handle_set_reminder),
        )
        .route(
            "/api/v1/jobs/:uuid/restore",
            post(jobs::handlers::handle_restore),
        )
        // Duplicate detection
        .route("/api/v1/duplicates/scan", post(dedup::handlers::handle_scan))
        .route(
            "/api/v1/duplicates/auto-merge",
            post(dedup::handlers::handle_auto_merge),
        )
        .route(
            "/api/v1/duplicates/:group_id/merge",
            post(dedup::handlers::handle_merge),
        )
        // Resume versions
        .route(
            "/api/v1/jobs/:uuid/resumes",
            post(resumes::handlers::handle_upload)
                .get(resumes::handlers::handle_list)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/v1/resumes/:manifest_id/versions/:version_id",
            get(resumes::handlers::handle_download).delete(resumes::handlers::handle_delete_version),
        )
        .route(
            "/api/v1/resumes/:manifest_id/versions/:version_id/extraction",
            put(resumes::handlers::handle_attach_extraction),
        )
        // Bulk import
        .route("/api/v1/bulk-import", get(bulk_import::handlers::handle_current))
        .route(
            "/api/v1/bulk-import/scan",
            post(bulk_import::handlers::handle_scan),
        )
        .route(
            "/api/v1/bulk-import/items/:item_id",
            patch(bulk_import::handlers::handle_update_mapping),
        )
        .route(
            "/api/v1/bulk-import/execute",
            post(bulk_import::handlers::handle_execute),
        )
        .route(
            "/api/v1/bulk-import/cancel",
            post(bulk_import::handlers::handle_cancel),
        )
        // Operation log
        .route("/api/v1/operations", get(oplog::handlers::handle_list))
        .route(
            "/api/v1/operations/:id/undo",
            post(oplog::handlers::handle_undo),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ResumeConfig};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app(dir: &tempfile::TempDir) -> Router {
        app_with(dir, ResumeConfig::default()).await
    }

    async fn app_with(dir: &tempfile::TempDir, resume: ResumeConfig) -> Router {
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            port: 0,
            rust_log: "debug".to_string(),
            dedup: Default::default(),
            resume,
            import: Default::default(),
            store: Default::default(),
        };
        build_router(AppState::build(&config).await.unwrap())
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_upload(uri: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let boundary = "jobvault-upload-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;
        let (status, body) = send(
            &app,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "jobvault");
    }

    #[tokio::test]
    async fn test_capture_then_fetch_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;
        let capture = json!({"text": "Rust engineer, storage", "company": "Acme", "role": "SWE"});

        let (status, first) = send(&app, json_request("POST", "/api/v1/jobs", capture.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let uuid = first["job"]["uuid"].as_str().unwrap().to_string();
        assert_eq!(first["job"]["applicationStatus"], "interested");

        let (status, _) = send(&app, json_request("POST", "/api/v1/jobs", capture)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, fetched) = send(
            &app,
            Request::builder()
                .uri(format!("/api/v1/jobs/{uuid}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["company"], "Acme");

        let (status, scan) =
            send(&app, json_request("POST", "/api/v1/duplicates/scan", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(scan["totalDuplicatesFound"], 1);
        assert_eq!(scan["duplicateGroups"][0]["maxSimilarity"], 1.0);
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let (status, body) = send(
            &app,
            Request::builder()
                .uri(format!("/api/v1/jobs/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, _) = send(
            &app,
            Request::builder()
                .uri("/api/v1/bulk-import")
                .header(crate::state::SESSION_HEADER, "nobody")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            send(&app, json_request("POST", "/api/v1/jobs", json!({"text": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_bulk_import_partial_failure_is_multi_status() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;
        let inbox = dir.path().join("inbox");
        std::fs::create_dir(&inbox).unwrap();
        std::fs::write(inbox.join("Acme_SWE.pdf"), b"ok").unwrap();
        std::fs::write(inbox.join("Acme_SWE_copy.pdf"), b"ok").unwrap();

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/jobs",
                json!({"text": "posting", "company": "Acme", "role": "SWE"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, op) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/bulk-import/scan",
                json!({"sourceFolder": inbox.to_string_lossy()}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(op["previewItems"][0]["status"], "mapped");
        assert_eq!(op["previewItems"][1]["status"], "mapped");

        // Second file has identical bytes, so its upload is rejected.
        let (status, body) =
            send(&app, json_request("POST", "/api/v1/bulk-import/execute", json!({}))).await;
        assert_eq!(status, StatusCode::MULTI_STATUS);
        assert_eq!(body["successful"].as_array().unwrap().len(), 1);
        assert_eq!(body["failed"].as_array().unwrap().len(), 1);

        let (status, ops) = send(
            &app,
            Request::builder()
                .uri("/api/v1/operations?limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ops["entries"][0]["operationType"], "bulk_import");
    }

    #[tokio::test]
    async fn test_upload_size_limit_follows_resume_config() {
        const LIMIT: u64 = 3 * 1024 * 1024;
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(
            &dir,
            ResumeConfig {
                max_file_bytes: LIMIT,
                ..Default::default()
            },
        )
        .await;
        let (_, created) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/jobs",
                json!({"text": "posting", "company": "Acme", "role": "SWE"}),
            ),
        )
        .await;
        let uri = format!("/api/v1/jobs/{}/resumes", created["job"]["uuid"].as_str().unwrap());

        // Above axum's 2 MiB default, still under the configured limit.
        let under = vec![b'a'; LIMIT as usize - 1024];
        let (status, version) = send(&app, multipart_upload(&uri, "cv.pdf", &under)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(version["isActive"], true);

        let over = vec![b'b'; LIMIT as usize + 1];
        let (status, body) = send(&app, multipart_upload(&uri, "cv.pdf", &over)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains(&format!("{LIMIT} byte limit")));

        let far_over = vec![b'c'; LIMIT as usize + 512 * 1024];
        let (status, body) = send(&app, multipart_upload(&uri, "cv.pdf", &far_over)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains(&format!("{LIMIT} byte limit")));
    }

    #[tokio::test]
    async fn test_list_jobs_by_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;
        let (_, first) = send(
            &app,
            json_request("POST", "/api/v1/jobs", json!({"text": "Rust engineer, storage"})),
        )
        .await;
        send(
            &app,
            json_request("POST", "/api/v1/jobs", json!({"text": "rust ENGINEER,  storage"})),
        )
        .await;
        send(&app, json_request("POST", "/api/v1/jobs", json!({"text": "Go engineer"}))).await;

        let hash = first["job"]["contentHash"].as_str().unwrap();
        let (status, jobs) = send(
            &app,
            Request::builder()
                .uri(format!("/api/v1/jobs?contentHash={hash}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(jobs.as_array().unwrap().len(), 2);
    }
}
