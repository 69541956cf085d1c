use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use sealdrop_shared::models::Session;

use crate::database::{decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};

impl Database {
    pub fn insert_session(&self, session: &Session) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO sessions (token, username, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    session.token,
                    session.username,
                    encode_ts(&session.expires_at),
                    encode_ts(&Utc::now()),
                ],
            )
            .map_err(StoreError::from_insert)?;
        Ok(())
    }

    /// Fetch a session regardless of expiry.
    pub fn get_session(&self, token: &str) -> Result<Session> {
        self.lock()?
            .query_row(
                "SELECT token, username, expires_at FROM sessions WHERE token = ?1",
                params![token],
                row_to_session,
            )
            .map_err(StoreError::from_lookup)
    }

    /// Resolve a bearer token to a live session.
    ///
    /// An expired session is deleted in the same critical section that
    /// observed it, so two concurrent lookups can never both accept it.
    /// Returns `None` for unknown and expired tokens alike.
    pub fn lookup_live_session(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Session>> {
        let conn = self.lock()?;
        let session = conn
            .query_row(
                "SELECT token, username, expires_at FROM sessions WHERE token = ?1",
                params![token],
                row_to_session,
            )
            .optional()?;

        match session {
            Some(s) if s.is_expired_at(now) => {
                conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
                tracing::debug!(username = %s.username, "purged expired session on lookup");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let affected = self
            .lock()?
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(affected > 0)
    }

    /// Remove every session whose expiry is at or before `now`.
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let affected = self.lock()?.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![encode_ts(&now)],
        )?;
        Ok(affected)
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let expires_at: String = row.get(2)?;

    Ok(Session {
        token: row.get(0)?,
        username: row.get(1)?,
        expires_at: decode_ts(2, &expires_at)?,
    })
}
