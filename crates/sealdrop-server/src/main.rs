//! # sealdrop-server
//!
//! Relay for end-to-end encrypted file drops.
//!
//! This binary provides:
//! - **Enrollment** of identities (public signing + exchange keys only)
//! - **Challenge-response login** issuing short-lived bearer sessions
//! - **Sealed file relay**: ciphertext is stored as opaque blobs (local disk
//!   or S3) until the recipient downloads or either party deletes it
//! - **REST API** (axum) for all of the above

mod api;
mod auth;
mod config;
mod error;
mod transfer;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sealdrop_store::{BlobStore, Database, LocalBlobStore, ObjectBlobStore, Storage};

use crate::api::AppState;
use crate::auth::{AuthPolicy, Authenticator};
use crate::config::{ServerConfig, StorageBackend};
use crate::transfer::TransferService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,sealdrop_server=debug,sealdrop_store=info")
        }))
        .init();

    info!("Starting sealdrop relay v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env()?;
    info!(?config, "Loaded configuration");
    if config.registration_token.is_none() {
        warn!("REGISTRATION_TOKEN not set: registration is open to anyone");
    }

    // -----------------------------------------------------------------------
    // 3. Initialize storage
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path())?;

    let blobs: Arc<dyn BlobStore> = match &config.storage {
        StorageBackend::Local => Arc::new(LocalBlobStore::new(config.blob_dir()).await?),
        StorageBackend::S3 { bucket } => Arc::new(ObjectBlobStore::s3(bucket)?),
    };
    info!(backend = blobs.kind(), "Blob store ready");

    let storage = Arc::new(Storage::new(db, blobs));

    let policy = AuthPolicy {
        session_ttl: config.session_ttl,
        challenge_ttl: config.challenge_ttl,
    };
    let app_state = AppState {
        auth: Arc::new(Authenticator::new(storage.clone(), policy)),
        transfers: Arc::new(TransferService::new(
            storage,
            config.registration_token.clone(),
            config.max_file_size,
        )),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Expiry is enforced on every lookup; the sweep only reclaims space.
    if !config.session_sweep_interval.is_zero() {
        let auth = app_state.auth.clone();
        let every = config.session_sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match auth.purge_expired() {
                    Ok((0, 0)) => {}
                    Ok((sessions, challenges)) => {
                        info!(sessions, challenges, "Purged expired auth state")
                    }
                    Err(e) => tracing::error!(error = %e, "Session sweep failed"),
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
