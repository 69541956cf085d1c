use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use sealdrop_shared::models::Challenge;

use crate::database::{decode_ts, encode_ts, Database};
use crate::error::Result;

impl Database {
    /// Store a fresh nonce for `challenge.username`, replacing any
    /// outstanding one.
    pub fn upsert_challenge(&self, challenge: &Challenge) -> Result<()> {
        self.lock()?.execute(
            "INSERT INTO challenges (username, nonce, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(username) DO UPDATE SET
                nonce = excluded.nonce,
                created_at = excluded.created_at",
            params![
                challenge.username,
                challenge.nonce,
                encode_ts(&challenge.created_at),
            ],
        )?;
        Ok(())
    }

    /// Remove and return the outstanding challenge for `username`.
    ///
    /// Single statement: of two concurrent callers at most one gets `Some`.
    pub fn take_challenge(&self, username: &str) -> Result<Option<Challenge>> {
        let challenge = self
            .lock()?
            .query_row(
                "DELETE FROM challenges WHERE username = ?1
                 RETURNING username, nonce, created_at",
                params![username],
                |row| {
                    let created_at: String = row.get(2)?;
                    Ok(Challenge {
                        username: row.get(0)?,
                        nonce: row.get(1)?,
                        created_at: decode_ts(2, &created_at)?,
                    })
                },
            )
            .optional()?;
        Ok(challenge)
    }

    /// Drop challenges issued before `cutoff`.
    pub fn purge_stale_challenges(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let affected = self.lock()?.execute(
            "DELETE FROM challenges WHERE created_at < ?1",
            params![encode_ts(&cutoff)],
        )?;
        Ok(affected)
    }
}
