use rusqlite::params;

use sealdrop_shared::models::FileMetadata;

use crate::database::{decode_key, decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};

const FILE_COLUMNS: &str =
    "id, sender, recipient, file_name, encrypted_key, auto_delete, timestamp";

impl Database {
    /// Insert file metadata. Both parties must already be registered.
    pub fn insert_file(&self, meta: &FileMetadata) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO files (id, sender, recipient, file_name, encrypted_key, auto_delete, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    meta.id,
                    meta.sender,
                    meta.recipient,
                    meta.file_name,
                    &meta.encrypted_key[..],
                    meta.auto_delete,
                    encode_ts(&meta.timestamp),
                ],
            )
            .map_err(StoreError::from_insert)?;
        Ok(())
    }

    pub fn get_file(&self, id: &str) -> Result<FileMetadata> {
        self.lock()?
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"),
                params![id],
                row_to_file,
            )
            .map_err(StoreError::from_lookup)
    }

    /// Files addressed to `recipient`, oldest first.
    pub fn list_files_for_recipient(&self, recipient: &str) -> Result<Vec<FileMetadata>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE recipient = ?1
             ORDER BY timestamp ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![recipient], row_to_file)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Every file `username` sent or received.
    pub fn list_files_involving(&self, username: &str) -> Result<Vec<FileMetadata>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE sender = ?1 OR recipient = ?1
             ORDER BY timestamp ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![username], row_to_file)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Returns `false` when no row matched.
    pub fn delete_file(&self, id: &str) -> Result<bool> {
        let affected = self
            .lock()?
            .execute("DELETE FROM files WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileMetadata> {
    let timestamp: String = row.get(6)?;

    Ok(FileMetadata {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        file_name: row.get(3)?,
        encrypted_key: decode_key(4, row.get(4)?)?,
        auto_delete: row.get(5)?,
        timestamp: decode_ts(6, &timestamp)?,
    })
}
