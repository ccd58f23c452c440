//! # Canopy Tree
//!
//! The paged dense Merkle tree: one 32-byte hash per address of the
//! implicit binary tree over integer positions, grouped into fixed-size
//! pages for locality.
//!
//! ## Layout
//!
//! Each page holds one complete subtree of [`PAGE_DEPTH`] levels in
//! implicit-heap order (node `k`'s children at `2k` and `2k + 1`, slot 0
//! reserved), so a page is a flat array of [`PAGE_SLOTS`] hashes — 4 KiB.
//! Pages themselves form a tree numbered in generalized in-order: the
//! pages of any complete subtree occupy contiguous page numbers, left
//! subtrees first, then the subtree root's page, then right subtrees. The
//! address ↔ (page, slot) mapping is pure arithmetic; see [`page`].
//!
//! ## Laziness
//!
//! Pages allocate as the high-water mark of set positions grows, and a
//! fresh page starts all-empty so implicit-empty descendants hash
//! correctly. Reads above the logical root synthesize hashes by folding
//! with the empty sentinel instead of allocating speculative pages.

pub mod error;
pub mod page;
pub mod tree;

pub use error::{Result, TreeError};
pub use page::{
    page_at, page_number, page_of, page_root, range_of, Page, PageAddress, PAGE_DEPTH, PAGE_SLOTS,
};
pub use tree::{PagedTree, TreeConfig};
