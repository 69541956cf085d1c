//! v001 -- Initial schema creation.
//!
//! Creates the four relay tables: `users`, `files`, `sessions`, and
//! `challenges`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (registered identities, public halves only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    username            TEXT PRIMARY KEY NOT NULL,
    identity_public_key BLOB NOT NULL,            -- 32-byte Ed25519 verifying key
    exchange_public_key BLOB NOT NULL,            -- 32-byte X25519 public key
    created_at          TEXT NOT NULL             -- RFC-3339, UTC
);

-- ----------------------------------------------------------------
-- Files (metadata; ciphertext lives in the blob store under `id`)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS files (
    id            TEXT PRIMARY KEY NOT NULL,      -- UUID v4, server-assigned
    sender        TEXT NOT NULL,
    recipient     TEXT NOT NULL,
    file_name     TEXT NOT NULL,
    encrypted_key BLOB NOT NULL,                  -- 32-byte ephemeral X25519 public key
    auto_delete   INTEGER NOT NULL DEFAULT 0,     -- boolean 0/1
    timestamp     TEXT NOT NULL,

    FOREIGN KEY (sender) REFERENCES users(username),
    FOREIGN KEY (recipient) REFERENCES users(username)
);

CREATE INDEX IF NOT EXISTS idx_files_recipient_ts ON files(recipient, timestamp);

-- ----------------------------------------------------------------
-- Sessions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sessions (
    token      TEXT PRIMARY KEY NOT NULL,
    username   TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (username) REFERENCES users(username) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);

-- ----------------------------------------------------------------
-- Challenges (at most one outstanding nonce per user)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS challenges (
    username   TEXT PRIMARY KEY NOT NULL,
    nonce      TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (username) REFERENCES users(username) ON DELETE CASCADE
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
