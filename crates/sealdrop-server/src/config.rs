//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the relay can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sealdrop_shared::constants::{
    CHALLENGE_TTL_SECS, DEFAULT_HTTP_PORT, MAX_FILE_SIZE, SESSION_TTL_SECS,
};

/// Name of the SQLite file inside the data directory.
const DATABASE_FILE: &str = "sealdrop.db";

/// Sub-directory of the data directory holding local blobs.
const BLOB_DIR: &str = "blobs";

/// Where ciphertext is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// `<data_dir>/blobs/<id>.bin`
    Local,
    /// An S3 bucket; credentials come from the standard `AWS_*` variables.
    S3 { bucket: String },
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8082`
    pub http_addr: SocketAddr,

    /// Directory holding the metadata database and local blobs.
    /// Env: `DATA_DIR`
    /// Default: `./server_data`
    pub data_dir: PathBuf,

    /// Env: `STORAGE_TYPE` (`local` | `s3`), `AWS_BUCKET`
    /// Default: local
    pub storage: StorageBackend,

    /// Shared secret required in `X-Registration-Token` to enroll.
    /// Env: `REGISTRATION_TOKEN`
    /// Default: unset (open registration).
    pub registration_token: Option<String>,

    /// Largest accepted ciphertext in bytes.
    /// Env: `MAX_FILE_SIZE`
    /// Default: 50 MiB
    pub max_file_size: usize,

    /// Env: `SESSION_TTL_SECS`
    pub session_ttl: Duration,

    /// Env: `CHALLENGE_TTL_SECS`
    pub challenge_ttl: Duration,

    /// Interval of the background purge of expired sessions (zero disables).
    /// Env: `SESSION_SWEEP_SECS`
    /// Default: 600
    pub session_sweep_interval: Duration,
}

// Keeps the registration token out of startup logs.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("data_dir", &self.data_dir)
            .field("storage", &self.storage)
            .field("registration_gated", &self.registration_token.is_some())
            .field("max_file_size", &self.max_file_size)
            .field("session_ttl", &self.session_ttl)
            .field("challenge_ttl", &self.challenge_ttl)
            .field("session_sweep_interval", &self.session_sweep_interval)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            data_dir: PathBuf::from("./server_data"),
            storage: StorageBackend::Local,
            registration_token: None,
            max_file_size: MAX_FILE_SIZE,
            session_ttl: Duration::from_secs(SESSION_TTL_SECS as u64),
            challenge_ttl: Duration::from_secs(CHALLENGE_TTL_SECS as u64),
            session_sweep_interval: Duration::from_secs(600),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Malformed values are logged and replaced by their default; the only
    /// hard error is an S3 backend without a bucket.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            parse_into(&mut config.http_addr, "HTTP_ADDR", &addr);
        }

        if let Some(dir) = lookup("DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        match lookup("STORAGE_TYPE").as_deref().map(str::trim) {
            None | Some("") | Some("local") => {}
            Some("s3") => {
                let bucket = lookup("AWS_BUCKET").filter(|b| !b.is_empty()).ok_or_else(|| {
                    anyhow::anyhow!("STORAGE_TYPE=s3 requires AWS_BUCKET to be set")
                })?;
                config.storage = StorageBackend::S3 { bucket };
            }
            Some(other) => {
                tracing::warn!(value = %other, "Unknown STORAGE_TYPE, using local");
            }
        }

        if let Some(token) = lookup("REGISTRATION_TOKEN") {
            if !token.is_empty() {
                config.registration_token = Some(token);
            }
        }

        if let Some(val) = lookup("MAX_FILE_SIZE") {
            parse_into(&mut config.max_file_size, "MAX_FILE_SIZE", &val);
        }

        if let Some(val) = lookup("SESSION_TTL_SECS") {
            parse_secs(&mut config.session_ttl, "SESSION_TTL_SECS", &val);
        }

        if let Some(val) = lookup("CHALLENGE_TTL_SECS") {
            parse_secs(&mut config.challenge_ttl, "CHALLENGE_TTL_SECS", &val);
        }

        if let Some(val) = lookup("SESSION_SWEEP_SECS") {
            parse_secs(&mut config.session_sweep_interval, "SESSION_SWEEP_SECS", &val);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join(BLOB_DIR)
    }
}

fn parse_into<T: FromStr>(slot: &mut T, key: &str, raw: &str) {
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "Invalid value, using default"),
    }
}

fn parse_secs(slot: &mut Duration, key: &str, raw: &str) {
    let mut secs = slot.as_secs();
    parse_into(&mut secs, key, raw);
    *slot = Duration::from_secs(secs);
}
