//! Error types for the paged tree.

use thiserror::Error;

/// Errors from paged-tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A set would allocate a page past the configured capacity.
    #[error("page {page} exceeds the configured limit of {limit} pages")]
    PageLimit { page: u64, limit: u64 },

    /// Page-address arithmetic left the addressable space.
    #[error("address arithmetic overflow at level {level}")]
    AddressOverflow { level: u8 },

    /// A range failed the alignment invariant.
    #[error(transparent)]
    Range(#[from] canopy_core::CoreError),
}

/// Result type for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;
