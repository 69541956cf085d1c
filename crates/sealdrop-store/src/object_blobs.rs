//! Object-storage blob backend (S3 in production, in-memory in tests).

use std::sync::Arc;

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::{debug, info};

use crate::blob_store::{validate_blob_id, BlobStore};
use crate::error::{Result, StoreError};

/// Blobs as `files/<id>` objects in a bucket.
#[derive(Debug, Clone)]
pub struct ObjectBlobStore {
    inner: Arc<dyn ObjectStore>,
}

impl ObjectBlobStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// S3 bucket with credentials, region and endpoint taken from the
    /// standard `AWS_*` environment variables.
    pub fn s3(bucket: &str) -> Result<Self> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()?;

        info!(bucket, "S3 blob store initialized");
        Ok(Self::new(Arc::new(store)))
    }

    fn object_path(id: &str) -> Result<ObjectPath> {
        validate_blob_id(id)?;
        Ok(ObjectPath::from(format!("files/{id}")))
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn save(&self, id: &str, data: &[u8]) -> Result<()> {
        let path = Self::object_path(id)?;
        self.inner
            .put(&path, PutPayload::from(data.to_vec()))
            .await?;
        debug!(id, size = data.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let path = Self::object_path(id)?;
        match self.inner.get(&path).await {
            Ok(result) => Ok(result.bytes().await?.to_vec()),
            Err(object_store::Error::NotFound { .. }) => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = Self::object_path(id)?;
        match self.inner.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn kind(&self) -> &'static str {
        "object"
    }
}
