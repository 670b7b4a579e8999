//! Shared state handed to every handler.

use crate::services::{blob_store::BlobStore, file_cache::FileCache, upload_service::UploadService};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BlobStore>,
    pub cache: FileCache,
    pub uploads: UploadService,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn BlobStore>, cache: FileCache, uploads: UploadService) -> Self {
        Self {
            store,
            cache,
            uploads,
            started_at: Utc::now(),
        }
    }
}
