use chrono::Utc;
use rusqlite::params;

use sealdrop_shared::models::User;

use crate::database::{decode_key, encode_ts, Database};
use crate::error::{Result, StoreError};

impl Database {
    /// Register a user. Usernames are immutable once taken.
    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO users (username, identity_public_key, exchange_public_key, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.username,
                    &user.identity_public_key[..],
                    &user.exchange_public_key[..],
                    encode_ts(&Utc::now()),
                ],
            )
            .map_err(StoreError::from_insert)?;
        Ok(())
    }

    pub fn get_user(&self, username: &str) -> Result<User> {
        self.lock()?
            .query_row(
                "SELECT username, identity_public_key, exchange_public_key
                 FROM users
                 WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .map_err(StoreError::from_lookup)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT username, identity_public_key, exchange_public_key
             FROM users
             ORDER BY username ASC",
        )?;
        let rows = stmt.query_map([], row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    // ON DELETE CASCADE: sessions + challenges go with it; files must be
    // removed first (see Storage::delete_user)
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        let affected = self
            .lock()?
            .execute("DELETE FROM users WHERE username = ?1", params![username])?;
        Ok(affected > 0)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let username: String = row.get(0)?;
    let identity_public_key = decode_key(1, row.get(1)?)?;
    let exchange_public_key = decode_key(2, row.get(2)?)?;

    Ok(User {
        username,
        identity_public_key,
        exchange_public_key,
    })
}
