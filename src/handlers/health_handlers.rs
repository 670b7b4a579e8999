//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks bucket access and cache disk I/O

use crate::{services::file_cache::CacheStats, state::AppState};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde::Serialize;
use std::{collections::HashMap, path::Path};
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

/// `GET /healthz`
///
/// Liveness probe. Never performs I/O.
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
            uptime_secs,
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Lists the bucket.
/// 2. Performs a best-effort write/read/delete under the cache root.
///
/// HTTP 200 when all checks pass, HTTP 503 when any check fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let bucket_check = match state.store.list_names().await {
        Ok(_) => (true, None::<String>),
        Err(e) => (false, Some(e.to_string())),
    };

    let disk_check = check_disk(state.cache.root()).await;

    let overall_ok = bucket_check.0 && disk_check.0;

    let mut checks = HashMap::new();
    checks.insert(
        "bucket",
        CheckStatus {
            ok: bucket_check.0,
            error: bucket_check.1,
        },
    );
    checks.insert(
        "disk",
        CheckStatus {
            ok: disk_check.0,
            error: disk_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok { "ok".into() } else { "error".into() },
        checks,
        cache: state.cache.stats().await.ok(),
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Write, read back and delete a scratch file under `root`.
///
/// A failed delete keeps the check passing but is reported in the error field.
async fn check_disk(root: &Path) -> (bool, Option<String>) {
    let tmp_path = root.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp_path, b"readyz").await {
        return (false, Some(format!("could not write tmp file: {}", e)));
    }

    let read_back = fs::read(&tmp_path).await;
    let removal = fs::remove_file(&tmp_path).await;
    if let Err(e) = &removal {
        warn!(path = %tmp_path.display(), error = %e, "could not remove readiness file");
    }

    match (read_back, removal) {
        (Ok(bytes), Ok(_)) if bytes == b"readyz" => (true, None),
        (Ok(bytes), Err(e)) if bytes == b"readyz" => {
            (true, Some(format!("could not remove tmp file: {}", e)))
        }
        (Ok(_), _) => (false, Some("file content mismatch".to_string())),
        (Err(e), _) => (false, Some(format!("could not read tmp file: {}", e))),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    uptime_secs: u64,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
    cache: Option<CacheStats>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
