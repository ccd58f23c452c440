//! In-memory implementation of the store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use canopy_core::Hash32;

use crate::error::{Result, StoreError};
use crate::traits::MessageStore;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    payloads: RwLock<HashMap<Hash32, Bytes>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            payloads: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for MemoryStore {
    fn add(&self, payload: &[u8]) -> Result<Hash32> {
        let hash = Hash32::hash(payload);
        let mut payloads = self.payloads.write().map_err(|_| StoreError::Poisoned)?;
        payloads
            .entry(hash)
            .or_insert_with(|| Bytes::copy_from_slice(payload));
        Ok(hash)
    }

    fn get(&self, hash: &Hash32) -> Result<Option<Bytes>> {
        let payloads = self.payloads.read().map_err(|_| StoreError::Poisoned)?;
        Ok(payloads.get(hash).cloned())
    }

    fn contains(&self, hash: &Hash32) -> Result<bool> {
        let payloads = self.payloads.read().map_err(|_| StoreError::Poisoned)?;
        Ok(payloads.contains_key(hash))
    }

    fn len(&self) -> Result<u64> {
        let payloads = self.payloads.read().map_err(|_| StoreError::Poisoned)?;
        Ok(payloads.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.add(b"hello").unwrap();
        let b = store.add(b"hello").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_get_roundtrip() {
        let store = MemoryStore::new();
        let hash = store.add(b"payload bytes").unwrap();
        assert_eq!(store.get(&hash).unwrap().unwrap().as_ref(), b"payload bytes");
        assert!(store.contains(&hash).unwrap());
        assert!(store.get(&Hash32::hash(b"other")).unwrap().is_none());
    }
}
