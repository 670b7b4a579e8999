use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    analyzer::{ContentAnalyzer, GeminiAnalyzer},
    blob_store::{BlobStore, ObjectStoreBlobStore},
    file_cache::{CachePolicy, FileCache},
    upload_service::UploadService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("image_store=info,tower_http=info")),
        )
        .init();

    // --- Parse config (fails fast on a missing API key) ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting image-store with config: {:?}", cfg);

    // --- Remote bucket ---
    let store: Arc<dyn BlobStore> = Arc::new(ObjectStoreBlobStore::from_url(&cfg.bucket_url)?);
    tracing::info!(bucket = %cfg.bucket_url, "blob store configured");

    // --- Local cache + upload staging ---
    let cache = FileCache::new(
        &cfg.cache_dir,
        store.clone(),
        CachePolicy::from_limit(cfg.cache_max_bytes),
    );
    cache.init().await?;

    let analyzer = match &cfg.analyzer {
        Some(analyzer_cfg) => {
            let gemini: Arc<dyn ContentAnalyzer> = Arc::new(GeminiAnalyzer::new(
                analyzer_cfg.api_key.clone(),
                analyzer_cfg.model.clone(),
                analyzer_cfg.timeout,
            )?
            .with_endpoint(analyzer_cfg.endpoint.clone()));
            tracing::info!(model = %analyzer_cfg.model, "image analysis enabled");
            Some(gemini)
        }
        None => None,
    };
    let uploads = UploadService::new(store.clone(), analyzer, &cfg.upload_dir);
    uploads.init().await?;

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes)
        .layer(TraceLayer::new_for_http())
        .with_state(state::AppState::new(store, cache, uploads));

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
