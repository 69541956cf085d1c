use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (database directory, local blobs).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Object storage backend error.
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// A lookup expected exactly one row or blob but found none.
    #[error("Record not found")]
    NotFound,

    /// A unique key (username, file id, token) is already taken.
    #[error("Record already exists")]
    AlreadyExists,

    /// A blob id that could escape the blob namespace.
    #[error("Invalid blob id: {0}")]
    InvalidBlobId(String),

    /// A stored row failed to decode.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Another thread panicked while holding the connection.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Map a SQLite unique/primary key violation to [`StoreError::AlreadyExists`].
    pub(crate) fn from_insert(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                StoreError::AlreadyExists
            }
            other => StoreError::Sqlite(other),
        }
    }

    pub(crate) fn from_lookup(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Sqlite(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
