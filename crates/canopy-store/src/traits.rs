//! Store trait: the abstract interface for payload persistence.
//!
//! Payloads are content-addressed: the key is the Blake3 hash of the
//! bytes, so insertion is idempotent by construction and the same bytes
//! can never collide with different content. Implementations include
//! SQLite (primary) and in-memory (for tests).

use bytes::Bytes;
use canopy_core::Hash32;

use crate::error::Result;

/// Content-addressed payload storage.
///
/// All methods are synchronous; callers that need to keep an event loop
/// responsive wrap the store in their own blocking layer.
pub trait MessageStore: Send + Sync {
    /// Insert a payload and return its content hash.
    ///
    /// Inserting the same bytes twice is a no-op returning the same hash.
    fn add(&self, payload: &[u8]) -> Result<Hash32>;

    /// Fetch a payload by content hash.
    fn get(&self, hash: &Hash32) -> Result<Option<Bytes>>;

    /// Check whether a payload is present without fetching it.
    fn contains(&self, hash: &Hash32) -> Result<bool>;

    /// Number of distinct payloads stored.
    fn len(&self) -> Result<u64>;

    /// Whether the store holds no payloads.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
