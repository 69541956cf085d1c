/// Application name
pub const APP_NAME: &str = "sealdrop";

/// crypto_box (XSalsa20-Poly1305) nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authenticator appended to every sealed payload
pub const TAG_SIZE: usize = 16;

/// Ed25519 verifying key and X25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Ed25519 signing key in keypair form (seed || public key)
pub const SIGNING_KEYPAIR_SIZE: usize = 64;

/// Ed25519 signature size in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// X25519 static secret size in bytes
pub const EXCHANGE_SECRET_SIZE: usize = 32;

/// Raw bytes of randomness behind every login challenge
pub const CHALLENGE_NONCE_BYTES: usize = 32;

/// Raw bytes of randomness behind every session token
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Default session lifetime (24 hours)
pub const SESSION_TTL_SECS: i64 = 24 * 60 * 60;

/// Default lifetime of an unanswered challenge (5 minutes)
pub const CHALLENGE_TTL_SECS: i64 = 5 * 60;

/// Maximum accepted username length
pub const MAX_USERNAME_LEN: usize = 64;

/// Maximum ciphertext size in bytes (50 MiB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8082;

/// Default server URL used by clients
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8082";

/// Header carrying the shared registration token
pub const REGISTRATION_TOKEN_HEADER: &str = "X-Registration-Token";
