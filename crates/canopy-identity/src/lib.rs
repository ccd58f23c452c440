//! # Canopy Identity
//!
//! Self-certifying identity chains replicated without coordination.
//!
//! An identity is a chain of signed blocks, each rotating to a new key
//! and naming the witnesses entitled to endorse its successor. Replicas
//! gossip *every* block they have seen, grouped by height, and each
//! independently derives the canonical chain by a deterministic fork
//! choice: the group with the most distinct witness signatures wins.
//! Because the replicated state is the full fork set and the per-height
//! merge is a semilattice join, replicas converge no matter the order
//! blocks arrive in.

pub mod block;
pub mod error;
pub mod forkdb;
pub mod schema;

pub use block::{IdentityBlock, WitnessSignature};
pub use error::{IdentityError, Result};
pub use forkdb::{
    decode_height_leaf, encode_height_leaf, merge_groups, CanonicalEntry, ForkDb,
};
pub use schema::{IdentityDb, IdentitySchema};
