//! Structural equivalence of the paged tree against a sparse reference
//! model, and round-trip properties of the page-address arithmetic.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use canopy_core::{Hash32, SeqRange};
use canopy_tree::{page_at, page_number, page_of, range_of, PagedTree, PAGE_SLOTS};

/// Sparse reference model: leaves in a map, every internal hash computed
/// on demand by recursive descent. Obviously correct, nowhere near fast.
struct ReferenceTree {
    leaves: BTreeMap<u64, Hash32>,
    high_water: u64,
}

impl ReferenceTree {
    fn new() -> Self {
        Self {
            leaves: BTreeMap::new(),
            high_water: 0,
        }
    }

    fn set(&mut self, position: u64, hash: Hash32) {
        if hash.is_empty() {
            self.leaves.remove(&position);
        } else {
            self.leaves.insert(position, hash);
        }
        if position + 1 > self.high_water {
            self.high_water = position + 1;
        }
    }

    fn root(&self) -> SeqRange {
        SeqRange::covering(self.high_water)
    }

    fn get(&self, range: &SeqRange) -> Hash32 {
        let end = range.end();
        if self.leaves.range(range.start..end).next().is_none() {
            return Hash32::EMPTY;
        }
        if range.is_leaf() {
            return self.leaves[&range.start];
        }
        let (left, right) = range.split().unwrap();
        Hash32::combine(&self.get(&left), &self.get(&right))
    }
}

fn leaf_hash(n: u64) -> Hash32 {
    Hash32::hash(&n.to_be_bytes())
}

#[test]
fn test_paged_matches_reference_over_random_history() {
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);
    let mut paged = PagedTree::new();
    let mut reference = ReferenceTree::new();

    for step in 0..10_000u64 {
        let position = rng.gen_range(0..1u64 << 16);
        // Mostly inserts, some overwrites of the same position with fresh
        // data, occasionally a clear.
        let hash = match rng.gen_range(0..10u32) {
            0 => Hash32::EMPTY,
            _ => leaf_hash(position ^ (step << 17)),
        };
        paged.set(position, hash).unwrap();
        reference.set(position, hash);

        if step % 97 == 0 {
            assert_eq!(paged.root(), reference.root(), "root range at step {step}");
            assert_eq!(
                paged.get(&paged.root()),
                reference.get(&reference.root()),
                "root hash at step {step}"
            );
        }
    }

    // Probe every depth of the final tree at random offsets.
    let root = paged.root();
    for depth in 0..=root.depth {
        for _ in 0..32 {
            let span = 1u64 << depth;
            let start = rng.gen_range(0..(1u64 << root.depth) / span) * span;
            let range = SeqRange::new(start, depth).unwrap();
            assert_eq!(
                paged.get(&range),
                reference.get(&range),
                "mismatch at {range:?}"
            );
        }
    }
}

#[test]
fn test_insertion_order_does_not_matter() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut entries: Vec<(u64, Hash32)> = (0..500u64)
        .map(|_| {
            let position = rng.gen_range(0..1u64 << 20);
            (position, leaf_hash(position))
        })
        .collect();

    let mut forward = PagedTree::new();
    for (position, hash) in &entries {
        forward.set(*position, *hash).unwrap();
    }

    entries.reverse();
    let mut backward = PagedTree::new();
    for (position, hash) in &entries {
        backward.set(*position, *hash).unwrap();
    }

    assert_eq!(forward.root(), backward.root());
    assert_eq!(forward.get(&forward.root()), backward.get(&backward.root()));
}

proptest! {
    #[test]
    fn prop_page_number_roundtrip(level in 0u8..4, index in 0u64..1 << 21) {
        let number = page_number(level, index);
        prop_assert_eq!(page_at(number), (level, index));
    }

    #[test]
    fn prop_node_address_roundtrip(start in 0u64..1 << 40, depth in 0u8..40) {
        let start = start >> depth << depth;
        let range = SeqRange::new(start, depth).unwrap();
        let addr = page_of(&range);
        prop_assert!(addr.slot >= 1 && addr.slot < PAGE_SLOTS);
        prop_assert_eq!(range_of(addr.page, addr.slot), Some(range));
    }

    #[test]
    fn prop_sibling_shares_page(start in 0u64..1 << 30, depth in 0u8..30) {
        let start = start >> depth << depth;
        let range = SeqRange::new(start, depth).unwrap();
        let sibling = range.sibling().unwrap();
        // Binary siblings always sit in the same page unless the node is a
        // page root, whose sibling roots the adjacent page.
        let a = page_of(&range);
        let b = page_of(&sibling);
        if a.slot == 1 {
            prop_assert_eq!(b.slot, 1);
            prop_assert_ne!(a.page, b.page);
        } else {
            prop_assert_eq!(a.page, b.page);
            prop_assert_eq!(b.slot, a.slot ^ 1);
        }
    }
}
