//! src/services/upload_service.rs
//!
//! Upload workflow: validate -> stage -> (analyze) -> store -> (store sidecar) -> clean up.
//!
//! The filename is validated before anything touches the filesystem. Accepted
//! uploads are staged at `<staging_root>/<uuid>/<basename>` so concurrent uploads
//! never share a file, and the staging directory is removed on every exit path.

use crate::{
    models::object::{
        JPEG_CONTENT_TYPE, JSON_CONTENT_TYPE, base_name, check_object_name, is_jpeg_name,
        sidecar_name,
    },
    services::{
        analyzer::ContentAnalyzer,
        blob_store::{BlobStore, StoreError},
    },
};
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to stage upload: {0}")]
    Staging(#[from] io::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Why an upload was skipped without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// No file, or a filename with nothing usable in it.
    MissingFile,
    /// Not a `.jpg`/`.jpeg` file.
    UnsupportedType(String),
    /// A name the local cache could never serve back.
    InvalidName { name: String, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Stored {
        name: String,
        /// Name of the sidecar metadata object, when analysis is enabled.
        metadata: Option<String>,
    },
    Dropped(DropReason),
}

#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn BlobStore>,
    analyzer: Option<Arc<dyn ContentAnalyzer>>,
    staging_root: PathBuf,
}

impl UploadService {
    pub fn new(
        store: Arc<dyn BlobStore>,
        analyzer: Option<Arc<dyn ContentAnalyzer>>,
        staging_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            analyzer,
            staging_root: staging_root.into(),
        }
    }

    pub fn analysis_enabled(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Create the staging directory. Called once at startup.
    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.staging_root).await?;
        info!(
            staging_root = %self.staging_root.display(),
            analysis = self.analysis_enabled(),
            "upload service initialized"
        );
        Ok(())
    }

    /// Validate a client-supplied filename, returning the object name to store under.
    pub fn validate(filename: Option<&str>) -> Result<String, DropReason> {
        let name = filename.and_then(base_name).ok_or(DropReason::MissingFile)?;
        if !is_jpeg_name(&name) {
            return Err(DropReason::UnsupportedType(name));
        }
        match check_object_name(&name) {
            Ok(()) => Ok(name),
            Err(reason) => Err(DropReason::InvalidName { name, reason }),
        }
    }

    /// Run the full workflow for one uploaded file.
    pub async fn ingest(&self, filename: Option<&str>, data: Bytes) -> UploadResult<UploadOutcome> {
        let name = match Self::validate(filename) {
            Ok(name) => name,
            Err(reason) => return Ok(UploadOutcome::Dropped(reason)),
        };

        let staging_dir = self.staging_root.join(Uuid::new_v4().to_string());
        fs::create_dir(&staging_dir).await?;
        let result = self.store_staged(&staging_dir, &name, data).await;
        remove_staging(&staging_dir).await;

        if let Err(err) = &result {
            warn!(name = %name, error = %err, "upload failed");
        }
        result
    }

    async fn store_staged(
        &self,
        staging_dir: &Path,
        name: &str,
        data: Bytes,
    ) -> UploadResult<UploadOutcome> {
        let local_path = staging_dir.join(name);
        fs::write(&local_path, &data).await?;
        debug!(path = %local_path.display(), size = data.len(), "staged upload");

        let analysis = match &self.analyzer {
            Some(analyzer) => Some(analyzer.analyze(&local_path).await),
            None => None,
        };

        let stored_name = self.store.put_file(&local_path, JPEG_CONTENT_TYPE).await?;

        let metadata = match analysis {
            Some(analysis) => {
                let payload = serde_json::to_vec(&analysis)
                    .map_err(|err| StoreError::InvalidPayload(err.to_string()))?;
                let sidecar = self
                    .store
                    .put_bytes(
                        Bytes::from(payload),
                        &sidecar_name(&stored_name),
                        JSON_CONTENT_TYPE,
                    )
                    .await?;
                Some(sidecar)
            }
            None => None,
        };

        Ok(UploadOutcome::Stored {
            name: stored_name,
            metadata,
        })
    }
}

async fn remove_staging(dir: &Path) {
    match fs::remove_dir_all(dir).await {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(path = %dir.display(), error = %err, "failed to remove staging directory"),
    }
}
