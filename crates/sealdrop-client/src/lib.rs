//! # sealdrop-client
//!
//! Client side of the sealdrop relay: a typed HTTP API client and an
//! [`Account`] that enrolls, logs in, and sends or receives sealed files.
//! All encryption and decryption happens here; the relay only sees
//! ciphertext and public keys.

pub mod account;
pub mod api;
pub mod error;

pub use account::{open_download, seal_upload, Account, ReceivedFile};
pub use api::ApiClient;
pub use error::{ClientError, Result};
