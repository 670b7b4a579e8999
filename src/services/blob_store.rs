//! src/services/blob_store.rs
//!
//! Remote bucket access. Every component talks to the bucket through the
//! `BlobStore` trait; `ObjectStoreBlobStore` is the production implementation on
//! top of the `object_store` crate (GCS, S3, local filesystem or in-memory).

use crate::models::object::file_name_of;
use anyhow::Context as _;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, ObjectStoreScheme, PutOptions,
    PutPayload, aws::AmazonS3Builder, gcp::GoogleCloudStorageBuilder, parse_url,
    path::{DELIMITER, Path as ObjectPath},
};
use std::{io, path::Path, sync::Arc};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operations the service needs from the remote bucket.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Every object name in the bucket, in provider order.
    async fn list_names(&self) -> StoreResult<Vec<String>>;

    /// Upload the file at `local_path` under its base file name and return that name.
    ///
    /// Two local files with the same base name overwrite each other remotely.
    async fn put_file(&self, local_path: &Path, content_type: &str) -> StoreResult<String>;

    /// Upload `payload` under an explicit `name`.
    async fn put_bytes(&self, payload: Bytes, name: &str, content_type: &str)
    -> StoreResult<String>;

    /// Download `name` to `destination`, replacing whatever is there.
    ///
    /// On error the destination may hold a partial file; callers own cleanup.
    async fn get_to_file(&self, name: &str, destination: &Path) -> StoreResult<()>;
}

/// `BlobStore` backed by any `object_store` implementation.
#[derive(Clone)]
pub struct ObjectStoreBlobStore {
    store: Arc<dyn ObjectStore>,

    /// Key prefix inside the bucket; empty for the bucket root.
    prefix: ObjectPath,

    /// Whether the backend accepts object attributes (content type).
    supports_attributes: bool,
}

impl ObjectStoreBlobStore {
    pub fn with_store(store: Arc<dyn ObjectStore>, prefix: ObjectPath) -> Self {
        Self {
            store,
            prefix,
            supports_attributes: true,
        }
    }

    /// Build a store from a bucket URL such as `gs://bucket`, `s3://bucket/prefix`,
    /// `file:///srv/images` or `memory:///`.
    ///
    /// Cloud credentials come from the provider's usual environment variables.
    pub fn from_url(bucket_url: &str) -> anyhow::Result<Self> {
        let url = bucket_url
            .parse::<Url>()
            .with_context(|| format!("parsing bucket url `{}`", bucket_url))?;
        let (scheme, prefix) = ObjectStoreScheme::parse(&url)
            .with_context(|| format!("unsupported bucket url `{}`", bucket_url))?;
        // LocalFileSystem rejects puts that carry attributes.
        let supports_attributes = !matches!(scheme, ObjectStoreScheme::Local);

        let store: Arc<dyn ObjectStore> = match scheme {
            ObjectStoreScheme::GoogleCloudStorage => Arc::new(
                GoogleCloudStorageBuilder::from_env()
                    .with_url(bucket_url)
                    .build()
                    .context("building GCS client")?,
            ),
            ObjectStoreScheme::AmazonS3 => Arc::new(
                AmazonS3Builder::from_env()
                    .with_url(bucket_url)
                    .build()
                    .context("building S3 client")?,
            ),
            _ => {
                let (store, _) = parse_url(&url)?;
                Arc::from(store)
            }
        };

        let mut blob_store = Self::with_store(store, prefix);
        blob_store.supports_attributes = supports_attributes;
        Ok(blob_store)
    }

    /// Bucket key for `name`, kept verbatim (no percent-encoding).
    fn object_path(&self, name: &str) -> StoreResult<ObjectPath> {
        let invalid = |detail: &str| {
            StoreError::InvalidPayload(format!("invalid object name `{}`: {}", name, detail))
        };
        if name.is_empty() {
            return Err(invalid("empty"));
        }
        if name.contains(DELIMITER) {
            return Err(invalid("contains a path separator"));
        }
        let prefix = self.prefix.as_ref();
        let key = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", prefix, DELIMITER, name)
        };
        ObjectPath::parse(key).map_err(|err| invalid(&err.to_string()))
    }

    /// Strip the configured prefix from a listed location.
    fn relative_name(&self, location: &ObjectPath) -> String {
        let full = location.as_ref();
        let prefix = self.prefix.as_ref();
        if prefix.is_empty() {
            return full.to_string();
        }
        full.strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(DELIMITER))
            .unwrap_or(full)
            .to_string()
    }

    fn put_options(&self, content_type: &str) -> PutOptions {
        let mut attributes = Attributes::new();
        if self.supports_attributes {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(content_type.to_string()),
            );
        }
        PutOptions {
            attributes,
            ..Default::default()
        }
    }
}

/// Map provider errors onto the service taxonomy.
fn map_store_error(name: &str, err: object_store::Error) -> StoreError {
    match err {
        object_store::Error::NotFound { .. } => StoreError::NotFound(name.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobStore {
    async fn list_names(&self) -> StoreResult<Vec<String>> {
        let prefix = (!self.prefix.as_ref().is_empty()).then_some(&self.prefix);
        let mut listing = self.store.list(prefix);
        let mut names = Vec::new();
        while let Some(meta) = listing.next().await {
            let meta = meta.map_err(|err| StoreError::Unavailable(err.to_string()))?;
            names.push(self.relative_name(&meta.location));
        }
        debug!(count = names.len(), "listed bucket");
        Ok(names)
    }

    async fn put_file(&self, local_path: &Path, content_type: &str) -> StoreResult<String> {
        let name = file_name_of(local_path).ok_or_else(|| {
            StoreError::InvalidPayload(format!("`{}` has no file name", local_path.display()))
        })?;
        let payload = fs::read(local_path).await.map_err(|err| {
            StoreError::InvalidPayload(format!("cannot read `{}`: {}", local_path.display(), err))
        })?;
        self.put_bytes(Bytes::from(payload), name, content_type)
            .await
    }

    async fn put_bytes(
        &self,
        payload: Bytes,
        name: &str,
        content_type: &str,
    ) -> StoreResult<String> {
        if name.is_empty() {
            return Err(StoreError::InvalidPayload("object name is empty".into()));
        }
        if payload.is_empty() {
            return Err(StoreError::InvalidPayload(format!("`{}` is empty", name)));
        }

        let location = self.object_path(name)?;
        let size_bytes = payload.len();
        self.store
            .put_opts(
                &location,
                PutPayload::from(payload),
                self.put_options(content_type),
            )
            .await
            .map_err(|err| map_store_error(name, err))?;

        debug!(name, size_bytes, content_type, "uploaded object");
        Ok(name.to_string())
    }

    async fn get_to_file(&self, name: &str, destination: &Path) -> StoreResult<()> {
        let location = self.object_path(name)?;
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|err| map_store_error(name, err))?;

        let mut file = File::create(destination).await?;
        let mut stream = result.into_stream();
        let mut size_bytes: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| map_store_error(name, err))?;
            size_bytes += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;

        debug!(name, size_bytes, destination = %destination.display(), "downloaded object");
        Ok(())
    }
}
