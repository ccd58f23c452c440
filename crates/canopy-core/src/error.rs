//! Error types for canopy core primitives.

use thiserror::Error;

/// Core errors from primitive operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("misaligned range: start {start} is not a multiple of 2^{depth}")]
    MisalignedRange { start: u64, depth: u8 },

    #[error("range depth {0} exceeds the addressable maximum of 64")]
    DepthOverflow(u8),

    #[error("cannot split a leaf range")]
    SplitLeaf,

    #[error("unknown object kind: {0}")]
    UnknownObjectKind(u8),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}
