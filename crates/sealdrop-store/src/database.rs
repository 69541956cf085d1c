//! Database connection management.
//!
//! The [`Database`] struct owns a single [`rusqlite::Connection`] behind a
//! mutex and guarantees that migrations are run before any other operation.
//! Every table operation takes the lock for the duration of its statement(s),
//! so a read-then-write sequence inside one operation is atomic with respect
//! to every other caller.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Thread-safe wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at an explicit path.
    ///
    /// Parent directories are created as needed.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open a private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection.
    ///
    /// Callers should prefer the typed helpers; direct access is for
    /// multi-statement sequences that must not interleave with other callers.
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Return the filesystem path of the open database (`None` in memory).
    pub fn path(&self) -> Result<Option<PathBuf>> {
        let conn = self.lock()?;
        Ok(conn
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from))
    }
}

/// Timestamps are stored as fixed-width RFC 3339 in UTC so that SQL string
/// comparison matches chronological order.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(column: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn decode_key(column: usize, bytes: Vec<u8>) -> rusqlite::Result<[u8; 32]> {
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Blob,
            Box::new(StoreError::Corrupt(format!("expected 32-byte key, found {len} bytes"))),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");

        let db = Database::open_at(&path).expect("should open");
        assert!(db.path().unwrap().is_some());
        assert!(path.exists());

        // Reopening runs no migration twice.
        drop(db);
        Database::open_at(&path).expect("should reopen");
    }

    #[test]
    fn in_memory_has_no_path() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.path().unwrap().is_none());
    }

    #[test]
    fn timestamps_sort_lexicographically() {
        let early = DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = early + chrono::Duration::milliseconds(1500);
        assert!(encode_ts(&early) < encode_ts(&late));
        assert_eq!(decode_ts(0, &encode_ts(&late)).unwrap(), late);
    }
}
