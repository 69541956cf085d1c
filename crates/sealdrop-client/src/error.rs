use reqwest::StatusCode;
use thiserror::Error;

use sealdrop_shared::{CryptoError, IdentityError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),

    /// Sealing or opening a file failed. Opening failures leave the server
    /// copy untouched.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Not logged in")]
    NotLoggedIn,
}

impl ClientError {
    /// HTTP status of a server-side rejection, if that is what this is.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::HttpStatus(status, _) => Some(*status),
            ClientError::Reqwest(e) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
