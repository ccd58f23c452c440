//! Error types for the identity module.

use thiserror::Error;

/// Errors that can occur in the identity database.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// A block or height leaf failed to decode.
    #[error("decode error: {0}")]
    Decode(String),

    /// Core primitive failure.
    #[error("core error: {0}")]
    Core(#[from] canopy_core::CoreError),

    /// A lock guarding the fork database was poisoned.
    #[error("identity lock poisoned")]
    Poisoned,

    /// Sync-layer failure while publishing a height leaf.
    #[error("sync error: {0}")]
    Sync(#[from] canopy_sync::SyncError),
}

/// Result type for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;
