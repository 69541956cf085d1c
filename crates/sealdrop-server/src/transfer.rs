//! Enrollment and file transfer operations behind the HTTP handlers.
//!
//! The relay only ever sees public keys and ciphertext. Every file operation
//! runs on behalf of an [`AuthenticatedUser`]; the sender of an upload and
//! the inbox being listed are taken from that identity, never from the
//! request body.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{error, info, warn};
use uuid::Uuid;

use sealdrop_shared::constants::{MAX_USERNAME_LEN, PUBKEY_SIZE};
use sealdrop_shared::crypto::public_key_from_slice;
use sealdrop_shared::identity::fingerprint;
use sealdrop_shared::models::{FileMetadata, User};
use sealdrop_shared::protocol::{DeleteResponse, DownloadResponse, RegisterRequest, UploadRequest};
use sealdrop_store::{Storage, StoreError};

use crate::auth::{now, AuthenticatedUser};
use crate::error::ServerError;

pub struct TransferService {
    storage: Arc<Storage>,
    registration_token: Option<String>,
    max_file_size: usize,
}

impl TransferService {
    pub fn new(
        storage: Arc<Storage>,
        registration_token: Option<String>,
        max_file_size: usize,
    ) -> Self {
        Self {
            storage,
            registration_token,
            max_file_size,
        }
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    // -- identities -----------------------------------------------------

    /// Enroll a new identity.
    ///
    /// When a registration token is configured the presented one must match
    /// before anything else is looked at.
    pub fn register(
        &self,
        presented_token: Option<&str>,
        request: RegisterRequest,
    ) -> Result<User, ServerError> {
        if let Some(expected) = &self.registration_token {
            let presented = presented_token.unwrap_or("");
            let matches: bool = presented.as_bytes().ct_eq(expected.as_bytes()).into();
            if !matches {
                warn!(username = %request.username, "registration rejected: bad token");
                return Err(ServerError::Forbidden("invalid registration token"));
            }
        }

        validate_username(&request.username)?;
        let user = User {
            identity_public_key: key_field("identity_public_key", &request.identity_public_key)?,
            exchange_public_key: key_field("exchange_public_key", &request.exchange_public_key)?,
            username: request.username,
        };

        match self.storage.create_user(&user) {
            Ok(()) => {}
            Err(StoreError::AlreadyExists) => {
                return Err(ServerError::Conflict("username already registered"))
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            username = %user.username,
            identity = %fingerprint(&user.identity_public_key),
            exchange = %fingerprint(&user.exchange_public_key),
            "user registered"
        );
        Ok(user)
    }

    /// Public keys of one user, for senders addressing a new recipient.
    pub fn lookup_user(&self, username: &str) -> Result<User, ServerError> {
        self.storage.get_user(username).map_err(not_found("user"))
    }

    pub fn list_users(&self) -> Result<Vec<User>, ServerError> {
        Ok(self.storage.list_users()?)
    }

    // -- files ----------------------------------------------------------

    /// Store a sealed file for its recipient. Id and timestamp are assigned
    /// here; client-supplied values are discarded.
    pub async fn upload(
        &self,
        caller: &AuthenticatedUser,
        request: UploadRequest,
    ) -> Result<FileMetadata, ServerError> {
        let UploadRequest {
            metadata,
            encrypted_content,
        } = request;

        if metadata.recipient.trim().is_empty() {
            return Err(ServerError::Validation("recipient is required".into()));
        }
        if metadata.file_name.trim().is_empty() {
            return Err(ServerError::Validation("file_name is required".into()));
        }
        let encrypted_key = key_field("encrypted_key", &metadata.encrypted_key)?;
        if encrypted_content.is_empty() {
            return Err(ServerError::Validation("encrypted_content is empty".into()));
        }
        if encrypted_content.len() > self.max_file_size {
            return Err(ServerError::PayloadTooLarge {
                size: encrypted_content.len(),
                max: self.max_file_size,
            });
        }

        self.storage
            .get_user(&metadata.recipient)
            .map_err(not_found("recipient"))?;

        let record = FileMetadata {
            id: Uuid::new_v4().to_string(),
            sender: caller.username.clone(),
            recipient: metadata.recipient,
            file_name: metadata.file_name,
            encrypted_key,
            timestamp: now(),
            auto_delete: metadata.auto_delete,
        };
        self.storage.save_file(&record, &encrypted_content).await?;

        info!(
            id = %record.id,
            sender = %record.sender,
            recipient = %record.recipient,
            size = encrypted_content.len(),
            auto_delete = record.auto_delete,
            "file uploaded"
        );
        Ok(record)
    }

    /// The caller's inbox, oldest first.
    pub fn list(&self, caller: &AuthenticatedUser) -> Result<Vec<FileMetadata>, ServerError> {
        Ok(self.storage.list_files(&caller.username)?)
    }

    /// Fetch metadata and ciphertext. Does not apply auto-delete; the caller
    /// runs [`Self::complete_download`] once the response body has gone out.
    pub async fn download(
        &self,
        caller: &AuthenticatedUser,
        id: &str,
    ) -> Result<DownloadResponse, ServerError> {
        let metadata = self.authorized_record(caller, id)?;
        let encrypted_content = self
            .storage
            .get_file_content(&metadata.id)
            .await
            .map_err(not_found("file content"))?;

        info!(id = %metadata.id, username = %caller.username, "file downloaded");
        Ok(DownloadResponse {
            metadata,
            encrypted_content,
        })
    }

    /// Apply auto-delete after a download was handed off. Failure is logged
    /// and left for the user to clean up with an explicit delete.
    pub async fn complete_download(&self, metadata: &FileMetadata) {
        if !metadata.auto_delete {
            return;
        }
        match self.storage.delete_file(&metadata.id).await {
            Ok(_) => info!(id = %metadata.id, "file auto-deleted after download"),
            Err(e) => error!(id = %metadata.id, error = %e, "auto-delete failed"),
        }
    }

    /// Delete a file. Only its sender or recipient may do so.
    pub async fn delete(
        &self,
        caller: &AuthenticatedUser,
        id: &str,
    ) -> Result<DeleteResponse, ServerError> {
        let metadata = self.authorized_record(caller, id)?;
        let deleted = self.storage.delete_file(&metadata.id).await?;

        info!(id = %metadata.id, username = %caller.username, "file deleted");
        Ok(DeleteResponse { deleted })
    }

    fn authorized_record(
        &self,
        caller: &AuthenticatedUser,
        id: &str,
    ) -> Result<FileMetadata, ServerError> {
        if id.is_empty() {
            return Err(ServerError::Validation("id is required".into()));
        }
        let metadata = self.storage.get_file(id).map_err(not_found("file"))?;
        if !metadata.involves(&caller.username) {
            warn!(id, username = %caller.username, "file access forbidden");
            return Err(ServerError::Forbidden("not a party to this file"));
        }
        Ok(metadata)
    }
}

fn not_found(what: &'static str) -> impl Fn(StoreError) -> ServerError {
    move |e| match e {
        StoreError::NotFound => ServerError::NotFound(what),
        other => other.into(),
    }
}

fn validate_username(username: &str) -> Result<(), ServerError> {
    if username.is_empty() {
        return Err(ServerError::Validation("username is required".into()));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(ServerError::Validation(format!(
            "username longer than {MAX_USERNAME_LEN} bytes"
        )));
    }
    if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ServerError::Validation(
            "username must not contain whitespace".into(),
        ));
    }
    Ok(())
}

fn key_field(name: &str, bytes: &[u8]) -> Result<[u8; PUBKEY_SIZE], ServerError> {
    public_key_from_slice(bytes).map_err(|e| ServerError::Validation(format!("{name}: {e}")))
}
