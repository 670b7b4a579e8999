//! Defines routes for the image upload service.
//!
//! ## Structure
//! - `GET  /`              — upload form and image links
//! - `POST /upload`        — ingest the `form_file` field, redirect to `/`
//! - `GET  /files`         — JSON list of image names
//! - `GET  /files/{name}`  — serve one image (cache, then bucket)
//! - `GET  /file/{name}`   — same as above
//! - `GET  /healthz`, `GET /readyz` — probes

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::{get_image, upload_image},
        page_handlers::{index, list_files},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router. Uploads may carry up to `max_upload_bytes` of body.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", get(index))
        .route(
            "/upload",
            post(upload_image).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/files", get(list_files))
        .route("/files/{name}", get(get_image))
        .route("/file/{name}", get(get_image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::analysis::AnalysisResult,
        services::{
            analyzer::ContentAnalyzer,
            blob_store::BlobStore,
            file_cache::{CachePolicy, FileCache},
            testing::{BrokenStore, FixedAnalyzer, memory_blob_store},
            upload_service::UploadService,
        },
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use bytes::Bytes;
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-IMAGE-STORE-BOUNDARY";

    async fn test_app(
        store: Arc<dyn BlobStore>,
        analyzer: Option<Arc<dyn ContentAnalyzer>>,
    ) -> (TempDir, Router) {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(
            dir.path().join("files"),
            store.clone(),
            CachePolicy::Unbounded,
        );
        cache.init().await.unwrap();
        let uploads = UploadService::new(store.clone(), analyzer, dir.path().join("uploads"));
        uploads.init().await.unwrap();
        let app = routes(1024 * 1024).with_state(AppState::new(store, cache, uploads));
        (dir, app)
    }

    fn multipart_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    fn assert_redirects_home(response: &axum::response::Response) {
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn test_upload_then_list_and_fetch() {
        let store = memory_blob_store();
        let (dir, app) = test_app(store.clone(), None).await;

        let response = app
            .clone()
            .oneshot(multipart_request("form_file", "photo.JPG", b"\xFF\xD8jpeg"))
            .await
            .unwrap();
        assert_redirects_home(&response);
        assert_eq!(store.list_names().await.unwrap(), vec!["photo.JPG"]);
        assert!(std::fs::read_dir(dir.path().join("uploads")).unwrap().next().is_none());

        let response = app.clone().oneshot(get("/files")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let names: Vec<String> = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(names, vec!["photo.JPG"]);

        let response = app.clone().oneshot(get("/files/photo.JPG")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(response.headers()["x-cache"], "MISS");
        assert_eq!(body_bytes(response).await.as_ref(), b"\xFF\xD8jpeg");

        let response = app.oneshot(get("/file/photo.JPG")).await.unwrap();
        assert_eq!(response.headers()["x-cache"], "HIT");
        assert!(dir.path().join("files").join("photo.JPG").is_file());
    }

    #[tokio::test]
    async fn test_non_jpeg_upload_is_dropped_but_redirects() {
        let store = memory_blob_store();
        let (_dir, app) = test_app(store.clone(), None).await;

        let response = app
            .oneshot(multipart_request("form_file", "document.pdf", b"%PDF-1.4"))
            .await
            .unwrap();
        assert_redirects_home(&response);
        assert!(store.list_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_file_field_redirects() {
        let store = memory_blob_store();
        let (_dir, app) = test_app(store.clone(), None).await;

        let response = app
            .oneshot(multipart_request("other_field", "photo.jpg", b"jpeg"))
            .await
            .unwrap();
        assert_redirects_home(&response);
        assert!(store.list_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_store_failure_is_server_error() {
        let analyzer = Arc::new(FixedAnalyzer::new(AnalysisResult::new("t", "d")));
        let (_dir, app) = test_app(Arc::new(BrokenStore), Some(analyzer)).await;

        let response = app
            .oneshot(multipart_request("form_file", "photo.jpg", b"jpeg"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_empty_upload_is_bad_request() {
        let (_dir, app) = test_app(memory_blob_store(), None).await;
        let response = app
            .oneshot(multipart_request("form_file", "photo.jpg", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_listing_excludes_sidecars() {
        let store = memory_blob_store();
        let analyzer = Arc::new(FixedAnalyzer::new(AnalysisResult::new("t", "d")));
        let (_dir, app) = test_app(store.clone(), Some(analyzer)).await;

        let response = app
            .clone()
            .oneshot(multipart_request("form_file", "cat.jpeg", b"jpeg"))
            .await
            .unwrap();
        assert_redirects_home(&response);
        assert_eq!(store.list_names().await.unwrap().len(), 2);

        let response = app.clone().oneshot(get("/files")).await.unwrap();
        let names: Vec<String> = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(names, vec!["cat.jpeg"]);

        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
        assert!(html.contains(r#"href="/files/cat.jpeg""#));
        assert!(!html.contains("cat.json"));
    }

    #[tokio::test]
    async fn test_reserved_character_names_round_trip() {
        let store = memory_blob_store();
        let (_dir, app) = test_app(store.clone(), None).await;

        for (name, encoded) in [
            ("50%off.jpg", "50%25off.jpg"),
            ("photo#1.jpg", "photo%231.jpg"),
            ("a[1].jpg", "a%5B1%5D.jpg"),
        ] {
            let response = app
                .clone()
                .oneshot(multipart_request("form_file", name, name.as_bytes()))
                .await
                .unwrap();
            assert_redirects_home(&response);

            let response = app.clone().oneshot(get("/")).await.unwrap();
            let html = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
            assert!(html.contains(&format!(r#"href="/files/{encoded}""#)));

            let response = app
                .clone()
                .oneshot(get(&format!("/files/{encoded}")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "fetching {name:?}");
            assert_eq!(body_bytes(response).await.as_ref(), name.as_bytes());
        }

        let response = app.oneshot(get("/files")).await.unwrap();
        let mut names: Vec<String> = serde_json::from_slice(&body_bytes(response).await).unwrap();
        names.sort();
        assert_eq!(names, vec!["50%off.jpg", "a[1].jpg", "photo#1.jpg"]);
    }

    #[tokio::test]
    async fn test_every_listed_upload_is_servable() {
        let store = memory_blob_store();
        let (_dir, app) = test_app(store.clone(), None).await;

        for name in ["my..trip.jpg", ".hidden.jpg", ".jpg"] {
            let response = app
                .clone()
                .oneshot(multipart_request("form_file", name, b"jpeg"))
                .await
                .unwrap();
            assert_redirects_home(&response);
        }

        let response = app.clone().oneshot(get("/files")).await.unwrap();
        let names: Vec<String> = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(names, vec!["my..trip.jpg"]);

        let response = app.oneshot(get("/files/my..trip.jpg")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let (dir, app) = test_app(memory_blob_store(), None).await;
        let response = app.oneshot(get("/files/ghost.jpg")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!dir.path().join("files").join("ghost.jpg").exists());
    }

    #[tokio::test]
    async fn test_fetch_traversal_is_rejected() {
        let (_dir, app) = test_app(memory_blob_store(), None).await;
        let response = app
            .oneshot(get("/files/..%2F..%2Fetc%2Fpasswd"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_png_content_type() {
        let store = memory_blob_store();
        store
            .put_bytes(Bytes::from_static(b"png"), "logo.png", "image/png")
            .await
            .unwrap();
        let (_dir, app) = test_app(store, None).await;

        let response = app.oneshot(get("/file/logo.png")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    }

    #[tokio::test]
    async fn test_store_outage_statuses() {
        let (_dir, app) = test_app(Arc::new(BrokenStore), None).await;

        for uri in ["/", "/files", "/files/a.jpg", "/readyz"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(
                response.status(),
                StatusCode::SERVICE_UNAVAILABLE,
                "unexpected status for {uri}"
            );
        }
    }

    #[tokio::test]
    async fn test_probes() {
        let (_dir, app) = test_app(memory_blob_store(), None).await;

        let response = app.clone().oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["status"], "ok");

        let response = app.oneshot(get("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["checks"]["bucket"]["ok"], true);
        assert_eq!(json["checks"]["disk"]["ok"], true);
    }
}
