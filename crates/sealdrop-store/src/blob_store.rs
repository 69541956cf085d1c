//! Blob storage abstraction.
//!
//! A blob is the opaque ciphertext of one uploaded file, keyed by the file
//! id. The relay never interprets blob contents.

use async_trait::async_trait;

use crate::error::{Result, StoreError};

/// Longest accepted blob id. Server-assigned ids are 36-char UUIDs.
const MAX_BLOB_ID_LEN: usize = 128;

/// Byte storage keyed by file id.
///
/// Implementations must be safe to share across request handlers.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` under `id`, replacing any previous content.
    async fn save(&self, id: &str, data: &[u8]) -> Result<()>;

    /// Read the blob stored under `id`. [`StoreError::NotFound`] if absent.
    async fn get(&self, id: &str) -> Result<Vec<u8>>;

    /// Remove the blob stored under `id`. Deleting a missing blob succeeds.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Short backend name for logs.
    fn kind(&self) -> &'static str;
}

/// Reject ids that could name something outside the blob namespace.
pub fn validate_blob_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id.len() <= MAX_BLOB_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidBlobId(id.to_string()))
    }
}
