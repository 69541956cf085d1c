//! One enrolled identity talking to one relay.
//!
//! The private halves of both key pairs stay in [`KeyBundle`] and never
//! leave this process. Sessions are obtained on demand: any call that needs
//! one logs in first when there is no live session.

use chrono::Utc;
use tracing::{info, warn};

use sealdrop_shared::crypto::{open_from_sender, seal_for_recipient};
use sealdrop_shared::identity::{ExchangeKeyPair, IdentityKeyPair, KeyBundle};
use sealdrop_shared::models::{FileMetadata, Session, User};
use sealdrop_shared::protocol::{
    AuthChallenge, AuthResponse, DownloadResponse, UploadMetadata, UploadRequest,
};

use crate::api::ApiClient;
use crate::error::{ClientError, Result};

/// A downloaded and decrypted file.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub metadata: FileMetadata,
    pub plaintext: Vec<u8>,
}

pub struct Account {
    api: ApiClient,
    username: String,
    keys: KeyBundle,
    session: Option<Session>,
}

impl Account {
    pub fn new(api: ApiClient, username: impl Into<String>, keys: KeyBundle) -> Self {
        Self {
            api,
            username: username.into(),
            keys,
            session: None,
        }
    }

    /// Fresh key pairs for a username that has not enrolled yet.
    pub fn generate(api: ApiClient, username: impl Into<String>) -> Result<Self> {
        Ok(Self::new(api, username, KeyBundle::generate()?))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn keys(&self) -> &KeyBundle {
        &self.keys
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Register the public halves of this account's keys.
    pub async fn enroll(&self, registration_token: Option<&str>) -> Result<User> {
        let user = self
            .api
            .register(&self.keys.registration(&self.username), registration_token)
            .await?;
        info!(username = %user.username, "enrolled");
        Ok(user)
    }

    /// Run the challenge-response exchange and keep the resulting session.
    pub async fn login(&mut self) -> Result<&Session> {
        let challenge = self.api.challenge(&self.username).await?;
        let response = answer_challenge(&challenge, &self.keys.identity);
        let session = self.api.login(&response).await?;
        info!(username = %self.username, expires_at = %session.expires_at, "logged in");
        Ok(self.session.insert(session))
    }

    async fn token(&mut self) -> Result<String> {
        if let Some(s) = &self.session {
            if !s.is_expired_at(Utc::now()) {
                return Ok(s.token.clone());
            }
        }
        Ok(self.login().await?.token.clone())
    }

    /// Seal `plaintext` for `recipient` and upload it.
    ///
    /// The recipient's exchange key is looked up on the relay.
    pub async fn send(
        &mut self,
        recipient: &str,
        file_name: &str,
        plaintext: &[u8],
        auto_delete: bool,
    ) -> Result<FileMetadata> {
        let recipient = self.api.lookup_user(recipient).await?;
        let request = seal_upload(&recipient, file_name, plaintext, auto_delete)?;
        let token = self.token().await?;
        let record = self.api.upload(&token, &request).await?;
        info!(id = %record.id, recipient = %record.recipient, "file sent");
        Ok(record)
    }

    /// Files waiting for this account.
    pub async fn inbox(&mut self) -> Result<Vec<FileMetadata>> {
        let token = self.token().await?;
        self.api.list_files(&token).await
    }

    /// Download and decrypt one file.
    ///
    /// If decryption fails the error is returned and nothing is deleted;
    /// the relay may still have removed an `auto_delete` file on its side.
    pub async fn fetch(&mut self, id: &str) -> Result<ReceivedFile> {
        let token = self.token().await?;
        let response = self.api.download(&token, id).await?;
        match open_download(&response, &self.keys.exchange) {
            Ok(plaintext) => Ok(ReceivedFile {
                metadata: response.metadata,
                plaintext,
            }),
            Err(e) => {
                warn!(id, error = %e, "downloaded file could not be opened");
                Err(e)
            }
        }
    }

    pub async fn delete(&mut self, id: &str) -> Result<bool> {
        let token = self.token().await?;
        Ok(self.api.delete_file(&token, id).await?.deleted)
    }

    /// Revoke the current session on the relay.
    pub async fn logout(&mut self) -> Result<()> {
        let session = self.session.take().ok_or(ClientError::NotLoggedIn)?;
        self.api.logout(&session.token).await
    }
}

/// Sign the nonce string exactly as issued.
pub fn answer_challenge(challenge: &AuthChallenge, identity: &IdentityKeyPair) -> AuthResponse {
    AuthResponse {
        username: challenge.username.clone(),
        nonce: challenge.nonce.clone(),
        signature: identity.sign(challenge.nonce.as_bytes()).to_vec(),
    }
}

/// Build an upload for `recipient` under a one-time exchange key pair.
pub fn seal_upload(
    recipient: &User,
    file_name: &str,
    plaintext: &[u8],
    auto_delete: bool,
) -> Result<UploadRequest> {
    let sealed = seal_for_recipient(plaintext, &recipient.exchange_public_key)?;

    Ok(UploadRequest {
        metadata: UploadMetadata {
            recipient: recipient.username.clone(),
            file_name: file_name.to_string(),
            encrypted_key: sealed.ephemeral_public.to_vec(),
            auto_delete,
            ..Default::default()
        },
        encrypted_content: sealed.ciphertext,
    })
}

/// Open a downloaded file with the recipient's long-term exchange key.
pub fn open_download(response: &DownloadResponse, keys: &ExchangeKeyPair) -> Result<Vec<u8>> {
    Ok(open_from_sender(
        &response.encrypted_content,
        &response.metadata.encrypted_key,
        keys,
    )?)
}
