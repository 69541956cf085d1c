//! # sealdrop-shared
//!
//! Types and primitives shared by the sealdrop server and client: the two
//! per-identity key pairs, the file transfer cipher, and the records and
//! request shapes that cross the wire.

pub mod constants;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod identity;
pub mod models;
pub mod protocol;

pub use error::{CryptoError, IdentityError};
