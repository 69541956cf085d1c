//! Records persisted by the server and exchanged over the API.
//!
//! Binary fields serialize as base64 strings; fixed-size keys keep their
//! exact length through every round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::PUBKEY_SIZE;
use crate::encoding::base64_array;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered identity. Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique username, the primary key.
    pub username: String,
    /// Ed25519 verifying key used to check login signatures.
    #[serde(with = "base64_array")]
    pub identity_public_key: [u8; PUBKEY_SIZE],
    /// X25519 public key files addressed to this user are sealed under.
    #[serde(with = "base64_array")]
    pub exchange_public_key: [u8; PUBKEY_SIZE],
}

// ---------------------------------------------------------------------------
// File metadata
// ---------------------------------------------------------------------------

/// Metadata for one encrypted file held by the relay. The ciphertext itself
/// lives in the blob store under the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// Server-assigned identifier (UUID v4).
    pub id: String,
    pub sender: String,
    pub recipient: String,
    /// Original file name as supplied by the sender.
    pub file_name: String,
    /// The sender's one-time exchange public key. Not a wrapped key: there is
    /// no symmetric key in this scheme.
    #[serde(with = "base64_array")]
    pub encrypted_key: [u8; PUBKEY_SIZE],
    /// Server-assigned upload time.
    pub timestamp: DateTime<Utc>,
    /// Remove the file right after its first successful download.
    pub auto_delete: bool,
}

impl FileMetadata {
    /// Whether `username` is the sender or the recipient.
    pub fn involves(&self, username: &str) -> bool {
        self.sender == username || self.recipient == username
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Bearer credential issued after a successful challenge-response login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ---------------------------------------------------------------------------
// Challenge
// ---------------------------------------------------------------------------

/// A single-use login nonce. Server-internal; clients only see
/// [`crate::protocol::AuthChallenge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub username: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}
