//! # Canopy Core
//!
//! Pure primitives for the canopy sync engine: hashes, keys, the range
//! algebra over tree addresses, canonical CBOR encoding, and the merge
//! contract replicated objects implement.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Hash32`] - Blake3 digest with an `EMPTY` sentinel for bare subtrees
//! - [`SeqRange`] - Address of a node in the implicit binary position tree
//! - [`ObjectId`] - `{owner, name}` identifier for one replicated object
//! - [`ObjectSchema`] - The commutative/associative/idempotent merge seam
//!
//! ## Canonicalization
//!
//! Leaf payloads and identity blocks are encoded with deterministic CBOR
//! so identical logical values hash identically everywhere. See
//! [`canonical`].

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod range;
pub mod schema;
pub mod types;

pub use canonical::encode_canonical;
pub use crypto::{Hash32, Keypair, PublicKey, Signature};
pub use error::CoreError;
pub use range::SeqRange;
pub use schema::{Effects, ObjectSchema};
pub use types::{ObjectId, ObjectKind};
