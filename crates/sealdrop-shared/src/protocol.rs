use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encoding::base64_bytes;
use crate::models::FileMetadata;

/// Enrollment payload: the public halves of both key pairs.
///
/// Keys travel as plain byte vectors so the server can report a wrong length
/// as a validation error instead of a decode failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(with = "base64_bytes")]
    pub identity_public_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub exchange_public_key: Vec<u8>,
}

/// Challenge issued by the server for one username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthChallenge {
    pub username: String,
    /// Base64 encoding of 32 random bytes. Clients sign the UTF-8 bytes of
    /// this string exactly as received.
    pub nonce: String,
}

/// Client's answer to an [`AuthChallenge`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub username: String,
    pub nonce: String,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

/// Metadata as submitted by an uploader.
///
/// `id`, `sender` and `timestamp` are accepted for compatibility and then
/// discarded; the server assigns all three.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub recipient: String,
    pub file_name: String,
    /// Ephemeral sender exchange public key (must be 32 bytes).
    #[serde(with = "base64_bytes")]
    pub encrypted_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_delete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub metadata: UploadMetadata,
    #[serde(with = "base64_bytes")]
    pub encrypted_content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub metadata: FileMetadata,
    #[serde(with = "base64_bytes")]
    pub encrypted_content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Body of every non-2xx API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
