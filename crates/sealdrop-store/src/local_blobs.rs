use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::blob_store::{validate_blob_id, BlobStore};
use crate::error::{Result, StoreError};

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in target.strip_prefix(base).unwrap_or(target).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            _ => {
                return Err(StoreError::InvalidBlobId(target.display().to_string()));
            }
        }
    }
    if !resolved.starts_with(base) {
        return Err(StoreError::InvalidBlobId(target.display().to_string()));
    }
    Ok(resolved)
}

/// Blobs as `<id>.bin` files in one flat directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub async fn new(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;
        let base_path = base_path.canonicalize()?;

        info!(path = %base_path.display(), "Local blob store initialized");

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn blob_path(&self, id: &str) -> Result<PathBuf> {
        validate_blob_id(id)?;
        ensure_within(&self.base_path, &self.base_path.join(format!("{id}.bin")))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn save(&self, id: &str, data: &[u8]) -> Result<()> {
        let path = self.blob_path(id)?;
        // Write-then-rename so readers never see a partial blob.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(id, size = data.len(), "Stored blob");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(id)?;
        match fs::read(&path).await {
            Ok(data) => {
                debug!(id, size = data.len(), "Retrieved blob");
                Ok(data)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.blob_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(id, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}
