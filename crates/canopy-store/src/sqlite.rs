//! SQLite implementation of the store trait.
//!
//! The primary persistent backend, using rusqlite with bundled SQLite.
//! Thread-safe via an internal mutex around the connection.

use std::path::Path;
use std::sync::Mutex;

use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use canopy_core::Hash32;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::MessageStore;

/// SQLite-based store implementation.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }
}

impl MessageStore for SqliteStore {
    fn add(&self, payload: &[u8]) -> Result<Hash32> {
        let hash = Hash32::hash(payload);
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO payloads (hash, payload, ingested_at)
                 VALUES (?1, ?2, ?3)",
                params![hash.as_bytes().as_slice(), payload, migration::now_millis()],
            )?;
            if changed > 0 {
                debug!(hash = %hash, bytes = payload.len(), "stored payload");
            }
            Ok(hash)
        })
    }

    fn get(&self, hash: &Hash32) -> Result<Option<Bytes>> {
        self.with_conn(|conn| {
            let payload: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT payload FROM payloads WHERE hash = ?1",
                    params![hash.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(payload.map(Bytes::from))
        })
    }

    fn contains(&self, hash: &Hash32) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM payloads WHERE hash = ?1",
                    params![hash.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    fn len(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM payloads", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_get_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let hash = store.add(b"canopy payload").unwrap();
        assert_eq!(hash, Hash32::hash(b"canopy payload"));
        assert_eq!(store.get(&hash).unwrap().unwrap().as_ref(), b"canopy payload");
        assert!(store.contains(&hash).unwrap());
    }

    #[test]
    fn test_add_is_idempotent() {
        let store = SqliteStore::open_memory().unwrap();
        let a = store.add(b"same bytes").unwrap();
        let b = store.add(b"same bytes").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_missing_payload() {
        let store = SqliteStore::open_memory().unwrap();
        let hash = Hash32::hash(b"never stored");
        assert!(store.get(&hash).unwrap().is_none());
        assert!(!store.contains(&hash).unwrap());
        assert!(store.is_empty().unwrap());
    }
}
