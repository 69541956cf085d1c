//! # sealdrop-store
//!
//! Server-side persistence for the sealdrop relay.
//!
//! Metadata (users, file records, sessions, login challenges) lives in a
//! single SQLite database wrapped by [`Database`]. Ciphertext lives in a
//! pluggable [`BlobStore`]: a local directory or an object store bucket.
//! [`Storage`] ties the two together and owns the ordering rules between
//! blob and metadata writes.

pub mod blob_store;
pub mod database;
pub mod local_blobs;
pub mod migrations;
pub mod object_blobs;
pub mod storage;

mod challenges;
mod error;
mod files;
mod sessions;
mod users;

pub use blob_store::BlobStore;
pub use database::Database;
pub use error::{Result, StoreError};
pub use local_blobs::LocalBlobStore;
pub use object_blobs::ObjectBlobStore;
pub use storage::Storage;
