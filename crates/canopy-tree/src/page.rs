//! Pages and the page-address arithmetic.
//!
//! A page stores one complete subtree of [`PAGE_DEPTH`] levels as an
//! implicit heap: the subtree root at slot 1, node `k`'s children at `2k`
//! and `2k + 1`, slot 0 reserved. A page at page-level `L` covers node
//! depths `[L*P, (L+1)*P)` (`P = PAGE_DEPTH`); its root node is the range
//! `{index << top, top}` with `top = (L+1)*P - 1`.
//!
//! Pages form a `2^P`-ary tree (every bottom-row node of a page parents
//! two child-page roots). Page numbers are assigned by generalized
//! in-order traversal: a page's left half child subtrees first, then the
//! page itself, then the right half. Under this numbering the pages of any
//! complete subtree occupy one contiguous run of page numbers, which keeps
//! neighbouring data in neighbouring storage.

use canopy_core::{Hash32, SeqRange};

/// Levels of the node tree held by one page.
pub const PAGE_DEPTH: u8 = 7;

/// Slots per page: `2^PAGE_DEPTH` hashes, 4 KiB per page.
pub const PAGE_SLOTS: usize = 1 << PAGE_DEPTH;

/// Child pages per page.
const FANOUT: u64 = 1 << PAGE_DEPTH;

/// Child subtrees on each side of a page in the in-order layout.
const HALF: u64 = FANOUT / 2;

/// Deepest page level reachable from 64-bit positions.
const MAX_LEVEL: u8 = 9;

/// One page: a complete `PAGE_DEPTH`-level subtree of hashes.
#[derive(Clone)]
pub struct Page {
    slots: [Hash32; PAGE_SLOTS],
}

impl Page {
    /// A fresh page with every slot empty.
    ///
    /// All-empty initialization is what makes lazy allocation sound: a
    /// subtree's hash is identical whether it was computed before or after
    /// the page existed.
    pub fn new() -> Self {
        Self {
            slots: [Hash32::EMPTY; PAGE_SLOTS],
        }
    }

    /// Read a slot.
    pub fn get(&self, slot: usize) -> Hash32 {
        self.slots[slot]
    }

    /// Write a slot.
    pub fn set(&mut self, slot: usize, hash: Hash32) {
        self.slots[slot] = hash;
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

/// A node address resolved to storage coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageAddress {
    /// In-order page number.
    pub page: u64,
    /// Implicit-heap slot within the page (1-based; slot 0 reserved).
    pub slot: usize,
}

/// Depth of the root node of a page at `level`.
pub fn top_depth(level: u8) -> u32 {
    (level as u32 + 1) * PAGE_DEPTH as u32 - 1
}

/// Page level holding nodes of `depth`.
pub fn level_of(depth: u8) -> u8 {
    depth / PAGE_DEPTH
}

/// Number of pages in the complete subtree under a page at `level`.
pub fn subtree_pages(level: u8) -> u64 {
    debug_assert!(level <= MAX_LEVEL);
    let mut pages = 1u64;
    for _ in 0..level {
        pages = pages * FANOUT + 1;
    }
    pages
}

/// In-order page number of the page at `(level, index)`.
pub fn page_number(level: u8, index: u64) -> u64 {
    // Offset of the page within its own subtree: after its left half.
    let mut number = if level == 0 {
        0
    } else {
        HALF * subtree_pages(level - 1)
    };
    let mut level = level;
    let mut index = index;
    while index > 0 {
        let child = index % FANOUT;
        index /= FANOUT;
        number += child * subtree_pages(level) + u64::from(child >= HALF);
        level += 1;
    }
    number
}

/// Invert [`page_number`]: which `(level, index)` owns page `number`.
pub fn page_at(number: u64) -> (u8, u64) {
    // Smallest leftmost-spine subtree containing this page number.
    let mut level = 0u8;
    while level < MAX_LEVEL && subtree_pages(level) <= number {
        level += 1;
    }
    let mut index = 0u64;
    let mut base = 0u64;
    loop {
        if level == 0 {
            return (0, index);
        }
        let offset = number - base;
        let child_pages = subtree_pages(level - 1);
        let self_position = HALF * child_pages;
        if offset == self_position {
            return (level, index);
        }
        let child = if offset < self_position {
            offset / child_pages
        } else {
            HALF + (offset - self_position - 1) / child_pages
        };
        base += child * child_pages + u64::from(child >= HALF);
        index = index * FANOUT + child;
        level -= 1;
    }
}

/// Resolve a node address to its page number and in-page slot.
pub fn page_of(range: &SeqRange) -> PageAddress {
    let level = level_of(range.depth);
    let top = top_depth(level);
    let rel = top - range.depth as u32;
    let index = shr(range.start, top);
    let within = shr(range.start, range.depth as u32) & ((1u64 << rel) - 1);
    PageAddress {
        page: page_number(level, index),
        slot: ((1u64 << rel) | within) as usize,
    }
}

/// The range addressed by a page's root slot, when it is addressable
/// (pages at the deepest level root above depth 64 have none).
pub fn page_root(number: u64) -> Option<SeqRange> {
    range_of(number, 1)
}

/// Invert [`page_of`]: the range stored at `(page number, slot)`.
///
/// Returns `None` for the reserved slot 0, out-of-range slots, and slots
/// whose depth falls outside the 64-bit address space.
pub fn range_of(number: u64, slot: usize) -> Option<SeqRange> {
    if slot == 0 || slot >= PAGE_SLOTS {
        return None;
    }
    let (level, index) = page_at(number);
    let top = top_depth(level);
    let rel = 63 - (slot as u64).leading_zeros();
    let depth = top - rel;
    if depth > 64 {
        return None;
    }
    let within = slot as u64 - (1u64 << rel);
    let start = shl(shl(index, rel) | within, depth);
    SeqRange::new(start, depth as u8).ok()
}

/// Leaf positions covered by a page (half-open; saturating end).
pub fn page_span(number: u64) -> (u64, u64) {
    let (level, index) = page_at(number);
    let top = top_depth(level);
    let start = shl(index, top);
    let end = if index.checked_add(1).map(|i| shl_overflows(i, top)).unwrap_or(true) {
        u64::MAX
    } else {
        shl(index + 1, top)
    };
    (start, end)
}

fn shr(x: u64, s: u32) -> u64 {
    if s >= 64 {
        0
    } else {
        x >> s
    }
}

fn shl(x: u64, s: u32) -> u64 {
    if s >= 64 {
        0
    } else {
        x << s
    }
}

fn shl_overflows(x: u64, s: u32) -> bool {
    s >= 64 || x.leading_zeros() < s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtree_pages_recurrence() {
        assert_eq!(subtree_pages(0), 1);
        assert_eq!(subtree_pages(1), FANOUT + 1);
        assert_eq!(subtree_pages(2), FANOUT * (FANOUT + 1) + 1);
    }

    #[test]
    fn test_leftmost_spine_numbers() {
        // The leftmost leaf page is page 0; each spine ancestor sits after
        // its HALF left child subtrees.
        assert_eq!(page_number(0, 0), 0);
        assert_eq!(page_number(1, 0), HALF);
        assert_eq!(page_number(2, 0), HALF * subtree_pages(1));
    }

    #[test]
    fn test_subtree_contiguity_level_one() {
        // All pages under the level-1 page at index 0 must fall inside
        // [0, subtree_pages(1)), with the level-1 page after its left half.
        let span = subtree_pages(1);
        for leaf in 0..FANOUT {
            let n = page_number(0, leaf);
            assert!(n < span, "leaf page {leaf} numbered {n} outside span {span}");
            if leaf < HALF {
                assert!(n < page_number(1, 0));
            } else {
                assert!(n > page_number(1, 0));
            }
        }
    }

    #[test]
    fn test_page_number_roundtrip() {
        for level in 0..3u8 {
            for index in 0..200u64 {
                let n = page_number(level, index);
                assert_eq!(page_at(n), (level, index), "level {level} index {index}");
            }
        }
    }

    #[test]
    fn test_leaf_address_roundtrip() {
        for position in [0u64, 1, 63, 64, 65, 4095, 4096, 1 << 20] {
            let range = SeqRange::leaf(position);
            let addr = page_of(&range);
            assert_eq!(range_of(addr.page, addr.slot), Some(range));
        }
    }

    #[test]
    fn test_internal_address_roundtrip() {
        for depth in 1..20u8 {
            let range = SeqRange::new(0, depth).unwrap();
            let addr = page_of(&range);
            assert!(addr.slot >= 1 && addr.slot < PAGE_SLOTS);
            assert_eq!(range_of(addr.page, addr.slot), Some(range));
        }
    }

    #[test]
    fn test_bottom_row_slots() {
        // A leaf lands in the bottom row of its level-0 page.
        let addr = page_of(&SeqRange::leaf(5));
        assert_eq!(addr.page, 0);
        assert_eq!(addr.slot, (1 << (PAGE_DEPTH - 1)) + 5);
    }

    #[test]
    fn test_page_span() {
        let (start, end) = page_span(0);
        assert_eq!((start, end), (0, HALF));
        let leaf_one = page_number(0, 1);
        assert_eq!(page_span(leaf_one), (HALF, 2 * HALF));
    }
}
