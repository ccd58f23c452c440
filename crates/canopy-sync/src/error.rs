//! Error types for the sync module.
//!
//! Protocol and format errors are fatal to the connection; the transport
//! tears the session down on any of them. Verification failures never
//! appear here - an unverifiable leaf is dropped and the protocol
//! proceeds as if it had not arrived.

use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A frame could not be decoded. Fatal to the connection.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A message referenced a stream id with no binding. Fatal.
    #[error("unknown stream id {0}")]
    UnknownStream(u32),

    /// A bind referenced an object kind outside the closed set. Fatal.
    #[error("unknown object kind {0}")]
    UnknownKind(u8),

    /// A bind tried to rebind a stream to a different object. Fatal.
    #[error("stream {0} already bound to a different object")]
    Rebind(u32),

    /// A locally produced leaf exceeds the wire limit. Rejected before
    /// it can reach the tree or the wire.
    #[error("leaf payload of {0} bytes exceeds the wire limit")]
    LeafTooLarge(usize),

    /// An object name exceeds the wire limit.
    #[error("object name of {0} bytes exceeds the wire limit")]
    NameTooLarge(usize),

    /// A lock guarding shared object state was poisoned.
    #[error("object lock poisoned")]
    Poisoned,

    /// Tree operation failed.
    #[error("tree error: {0}")]
    Tree(#[from] canopy_tree::TreeError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] canopy_store::StoreError),

    /// Core primitive failure (range arithmetic, encoding).
    #[error("core error: {0}")]
    Core(#[from] canopy_core::CoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
