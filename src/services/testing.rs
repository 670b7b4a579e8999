//! Test doubles for the blob store and content analyzer.

use crate::{
    models::analysis::AnalysisResult,
    services::{
        analyzer::ContentAnalyzer,
        blob_store::{BlobStore, ObjectStoreBlobStore, StoreError, StoreResult},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::{memory::InMemory, path::Path as ObjectPath};
use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{fs::File, io::AsyncWriteExt};

/// In-memory bucket behind the production adapter.
pub fn memory_blob_store() -> Arc<ObjectStoreBlobStore> {
    Arc::new(ObjectStoreBlobStore::with_store(
        Arc::new(InMemory::new()),
        ObjectPath::default(),
    ))
}

/// Wraps a store and counts downloads.
pub struct CountingStore {
    pub inner: Arc<dyn BlobStore>,
    pub downloads: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self {
            inner,
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for CountingStore {
    async fn list_names(&self) -> StoreResult<Vec<String>> {
        self.inner.list_names().await
    }

    async fn put_file(&self, local_path: &Path, content_type: &str) -> StoreResult<String> {
        self.inner.put_file(local_path, content_type).await
    }

    async fn put_bytes(
        &self,
        payload: Bytes,
        name: &str,
        content_type: &str,
    ) -> StoreResult<String> {
        self.inner.put_bytes(payload, name, content_type).await
    }

    async fn get_to_file(&self, name: &str, destination: &Path) -> StoreResult<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_to_file(name, destination).await
    }
}

/// Serves a single object, writing it in two halves with a pause in between.
pub struct SlowStore {
    pub name: String,
    pub payload: Vec<u8>,
    pub pause: Duration,
}

#[async_trait]
impl BlobStore for SlowStore {
    async fn list_names(&self) -> StoreResult<Vec<String>> {
        Ok(vec![self.name.clone()])
    }

    async fn put_file(&self, _local_path: &Path, _content_type: &str) -> StoreResult<String> {
        Err(StoreError::Unavailable("read-only".into()))
    }

    async fn put_bytes(&self, _: Bytes, _: &str, _: &str) -> StoreResult<String> {
        Err(StoreError::Unavailable("read-only".into()))
    }

    async fn get_to_file(&self, name: &str, destination: &Path) -> StoreResult<()> {
        if name != self.name {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let (head, tail) = self.payload.split_at(self.payload.len() / 2);
        let mut file = File::create(destination).await?;
        file.write_all(head).await?;
        file.flush().await?;
        tokio::time::sleep(self.pause).await;
        file.write_all(tail).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Every call fails. Downloads leave a partial file behind before failing.
pub struct BrokenStore;

#[async_trait]
impl BlobStore for BrokenStore {
    async fn list_names(&self) -> StoreResult<Vec<String>> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn put_file(&self, _local_path: &Path, _content_type: &str) -> StoreResult<String> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn put_bytes(&self, _: Bytes, _: &str, _: &str) -> StoreResult<String> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn get_to_file(&self, _name: &str, destination: &Path) -> StoreResult<()> {
        tokio::fs::write(destination, b"partial").await?;
        Err(StoreError::Unavailable("connection reset".into()))
    }
}

/// Returns a fixed result and counts calls.
pub struct FixedAnalyzer {
    pub result: AnalysisResult,
    pub calls: AtomicUsize,
}

impl FixedAnalyzer {
    pub fn new(result: AnalysisResult) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentAnalyzer for FixedAnalyzer {
    async fn analyze(&self, _image_path: &Path) -> AnalysisResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}
