//! The storage authority: metadata in SQLite, ciphertext in a [`BlobStore`].
//!
//! One [`Storage`] is built at startup and shared behind an `Arc` by every
//! request handler. Blob I/O never runs while the metadata lock is held.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use sealdrop_shared::models::{Challenge, FileMetadata, Session, User};

use crate::blob_store::BlobStore;
use crate::database::Database;
use crate::error::{Result, StoreError};

pub struct Storage {
    db: Database,
    blobs: Arc<dyn BlobStore>,
}

impl Storage {
    pub fn new(db: Database, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    // -- users ----------------------------------------------------------

    pub fn create_user(&self, user: &User) -> Result<()> {
        self.db.insert_user(user)
    }

    pub fn get_user(&self, username: &str) -> Result<User> {
        self.db.get_user(username)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.list_users()
    }

    /// Remove a user together with every file they sent or received.
    ///
    /// Stops at the first file that cannot be deleted; the user row is only
    /// removed once none of their files remain.
    pub async fn delete_user(&self, username: &str) -> Result<bool> {
        for meta in self.db.list_files_involving(username)? {
            self.delete_file(&meta.id).await?;
        }
        self.db.delete_user(username)
    }

    // -- files ----------------------------------------------------------

    /// Persist ciphertext then metadata.
    ///
    /// A taken id is refused before any ciphertext is written. If the
    /// metadata insert fails the blob is removed again so that no
    /// unreachable ciphertext is left behind; the insert error is returned.
    /// A duplicate id that slipped past the first check keeps its blob,
    /// since that blob belongs to the existing record.
    pub async fn save_file(&self, meta: &FileMetadata, content: &[u8]) -> Result<()> {
        match self.db.get_file(&meta.id) {
            Ok(_) => return Err(StoreError::AlreadyExists),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e),
        }

        self.blobs.save(&meta.id, content).await?;

        if let Err(e) = self.db.insert_file(meta) {
            if matches!(e, StoreError::AlreadyExists) {
                warn!(id = %meta.id, "file id taken concurrently; blob left to its record");
            } else if let Err(cleanup) = self.blobs.delete(&meta.id).await {
                warn!(id = %meta.id, error = %cleanup, "failed to remove blob after metadata insert failure");
            }
            return Err(e);
        }

        debug!(id = %meta.id, size = content.len(), "file saved");
        Ok(())
    }

    pub fn get_file(&self, id: &str) -> Result<FileMetadata> {
        self.db.get_file(id)
    }

    pub async fn get_file_content(&self, id: &str) -> Result<Vec<u8>> {
        self.blobs.get(id).await
    }

    /// Files addressed to `recipient`, oldest first.
    pub fn list_files(&self, recipient: &str) -> Result<Vec<FileMetadata>> {
        self.db.list_files_for_recipient(recipient)
    }

    /// Delete ciphertext then metadata.
    ///
    /// A blob failure aborts before the metadata row is touched, so the
    /// record stays listable and the delete can be retried.
    pub async fn delete_file(&self, id: &str) -> Result<bool> {
        if let Err(e) = self.blobs.delete(id).await {
            error!(id, error = %e, "blob delete failed; metadata kept");
            return Err(e);
        }
        self.db.delete_file(id)
    }

    // -- sessions -------------------------------------------------------

    pub fn create_session(&self, session: &Session) -> Result<()> {
        self.db.insert_session(session)
    }

    pub fn lookup_live_session(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Session>> {
        self.db.lookup_live_session(token, now)
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        self.db.delete_session(token)
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        self.db.purge_expired_sessions(now)
    }

    // -- challenges -----------------------------------------------------

    pub fn put_challenge(&self, challenge: &Challenge) -> Result<()> {
        self.db.upsert_challenge(challenge)
    }

    pub fn take_challenge(&self, username: &str) -> Result<Option<Challenge>> {
        self.db.take_challenge(username)
    }

    pub fn purge_stale_challenges(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.db.purge_stale_challenges(cutoff)
    }
}
