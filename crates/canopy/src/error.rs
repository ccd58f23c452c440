//! Engine-level errors.

use canopy_core::{ObjectId, ObjectKind};
use thiserror::Error;

/// Errors surfaced by the [`Engine`](crate::Engine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// An object is already open under a different kind.
    #[error("object {id} is open as {open:?}, not {requested:?}")]
    KindMismatch {
        id: ObjectId,
        open: ObjectKind,
        requested: ObjectKind,
    },

    /// Core primitive failure.
    #[error("core error: {0}")]
    Core(#[from] canopy_core::CoreError),

    /// Storage failure.
    #[error("store error: {0}")]
    Store(#[from] canopy_store::StoreError),

    /// Sync-layer failure.
    #[error("sync error: {0}")]
    Sync(#[from] canopy_sync::SyncError),

    /// Identity-chain failure.
    #[error("identity error: {0}")]
    Identity(#[from] canopy_identity::IdentityError),

    /// A lock guarding engine state was poisoned.
    #[error("engine lock poisoned")]
    Poisoned,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
