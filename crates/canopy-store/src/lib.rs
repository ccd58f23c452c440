//! # Canopy Store
//!
//! Content-addressed payload storage behind the [`MessageStore`] trait.
//! The sync layer keeps hashes in the tree and bytes in the store; a
//! payload's key is the Blake3 hash of its bytes, so inserts are
//! idempotent and a hash fetched from the tree always names exactly one
//! payload.
//!
//! The primary implementation is [`SqliteStore`], with [`MemoryStore`]
//! for tests.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::MessageStore;
