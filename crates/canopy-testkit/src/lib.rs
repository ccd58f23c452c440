//! # Canopy Testkit
//!
//! Testing utilities for Canopy.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: known canonical encodings, deterministic block
//!   constructions, and pinned page-layout coordinates for
//!   cross-implementation verification
//! - **Generators**: proptest strategies for property-based testing
//! - **Fixtures**: engines, deterministic keypairs, and an in-memory
//!   wire for two-peer convergence tests
//!
//! ## Property testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use canopy_testkit::generators::seq_range;
//!
//! proptest! {
//!     #[test]
//!     fn split_halves_rejoin(range in seq_range()) {
//!         if !range.is_leaf() {
//!             let (left, right) = range.split().unwrap();
//!             prop_assert_eq!(left.parent().unwrap(), range);
//!             prop_assert_eq!(left.sibling().unwrap(), right);
//!         }
//!     }
//! }
//! ```
//!
//! ## Fixtures
//!
//! ```rust
//! use canopy::ObjectKind;
//! use canopy_testkit::fixtures::{multi_party_fixtures, SessionPair};
//!
//! let parties = multi_party_fixtures(2);
//! let chat = parties[0].object("chat");
//! parties[0].publish("chat", 0, b"hello");
//!
//! let mut pair = SessionPair::connect(&parties[0].engine, &parties[1].engine);
//! pair.initiator.session.push(chat, ObjectKind::Channel);
//! pair.pump();
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_party_fixtures, SessionPair, TestFixture, WireEnd};
pub use vectors::{
    block_from_vector, block_vectors, canonical_vectors, page_number_vectors, page_vectors,
    verify_canonical_vectors, verify_page_vectors, BlockVector, CanonicalVector, PageVector,
};
