//! The paged dense Merkle tree.

use canopy_core::{Hash32, SeqRange};
use tracing::trace;

use crate::error::{Result, TreeError};
use crate::page::{level_of, page_of, page_span, top_depth, Page, PageAddress, PAGE_DEPTH};

/// Tuning knobs for a tree instance.
#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// Hard cap on allocated page numbers; a `set` needing a page past
    /// this fails with [`TreeError::PageLimit`].
    pub max_pages: u64,
    /// How many positions below the high-water mark to retain when
    /// pruning. Retention is an explicit choice: `None` never prunes.
    pub retention_depth: Option<u64>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_pages: 1 << 32,
            retention_depth: None,
        }
    }
}

/// A dense hash tree over integer positions, stored in lazily allocated
/// fixed-size pages.
///
/// The tree records one 32-byte hash per set position and maintains every
/// internal combination up to its logical root. Addresses deeper than the
/// logical root are synthesized on read by folding with the empty
/// sentinel, so storage stays proportional to the high-water mark rather
/// than eventual capacity.
pub struct PagedTree {
    pages: Vec<Option<Box<Page>>>,
    high_water: u64,
    config: TreeConfig,
}

impl PagedTree {
    /// Create an empty tree with default configuration.
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Create an empty tree with the given configuration.
    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            pages: Vec::new(),
            high_water: 0,
            config,
        }
    }

    /// One past the highest position ever set.
    pub fn high_water(&self) -> u64 {
        self.high_water
    }

    /// Number of page slots currently addressable (allocated or not).
    pub fn page_count(&self) -> u64 {
        self.pages.len() as u64
    }

    /// The smallest `{0, depth}` range covering the high-water mark.
    pub fn root(&self) -> SeqRange {
        SeqRange::covering(self.high_water)
    }

    /// Hash at an address.
    ///
    /// Allocated addresses are a direct slot read; unallocated ones are
    /// empty; `{0, depth}` above the logical root folds the root hash with
    /// the empty sentinel instead of allocating speculative pages.
    pub fn get(&self, range: &SeqRange) -> Hash32 {
        let root = self.root();
        if range.depth > root.depth {
            if range.start != 0 {
                return Hash32::EMPTY;
            }
            let mut hash = self.node(&root);
            for _ in root.depth..range.depth {
                hash = Hash32::combine(&hash, &Hash32::EMPTY);
            }
            return hash;
        }
        self.node(range)
    }

    /// Set the hash at a leaf position and recompute every ancestor up to
    /// the logical root.
    ///
    /// Setting [`Hash32::EMPTY`] clears the position. Within a page the
    /// walk recomputes heap parents; at a page boundary it jumps to the
    /// parent page via the address arithmetic, stopping once the page root
    /// is at or past the tree's logical height.
    pub fn set(&mut self, position: u64, hash: Hash32) -> Result<()> {
        let old_root_depth = self.root().depth;
        if position.saturating_add(1) > self.high_water {
            self.high_water = position.saturating_add(1);
        }
        let root_depth = self.root().depth;
        if root_depth > old_root_depth {
            self.grow_spine(old_root_depth, root_depth)?;
        }
        trace!(position, root_depth, "tree set");

        let mut range = SeqRange::leaf(position);
        let mut hash = hash;
        loop {
            let addr = page_of(&range);
            self.write_and_recompute(addr, hash)?;

            let level = level_of(range.depth);
            let top = top_depth(level);
            if top >= root_depth as u32 {
                break;
            }

            // The page root's parent lives in the next page level's bottom
            // row; its sibling is another page's root (empty if that page
            // was never touched).
            let top = top as u8;
            let page_root = SeqRange {
                start: range.start >> top << top,
                depth: top,
            };
            let own = self.node(&page_root);
            let sibling = self.node(&page_root.sibling()?);
            hash = if page_root.is_left_child() {
                Hash32::combine(&own, &sibling)
            } else {
                Hash32::combine(&sibling, &own)
            };
            range = page_root.parent()?;
        }
        Ok(())
    }

    /// Write a slot and recompute its heap ancestors within the page.
    fn write_and_recompute(&mut self, addr: PageAddress, hash: Hash32) -> Result<()> {
        let page = self.page_mut(addr.page)?;
        page.set(addr.slot, hash);
        let mut slot = addr.slot;
        while slot > 1 {
            slot >>= 1;
            let combined = Hash32::combine(&page.get(2 * slot), &page.get(2 * slot + 1));
            page.set(slot, combined);
        }
        Ok(())
    }

    /// Extend the left spine when the root depth grows.
    ///
    /// Every set recomputes all in-page ancestors, so within a page the
    /// levels above the old root are already current. The links that cross
    /// a page boundary (depths that are multiples of `PAGE_DEPTH`) were
    /// skipped by earlier walks that stopped at the old logical height and
    /// must be written now, before the new position's own walk runs.
    fn grow_spine(&mut self, old_depth: u8, new_depth: u8) -> Result<()> {
        let step = PAGE_DEPTH as u32;
        let mut depth = (old_depth as u32 / step + 1) * step;
        while depth <= new_depth as u32 {
            let child = SeqRange {
                start: 0,
                depth: depth as u8 - 1,
            };
            let hash = Hash32::combine(&self.node(&child), &self.node(&child.sibling()?));
            let parent = SeqRange {
                start: 0,
                depth: depth as u8,
            };
            self.write_and_recompute(page_of(&parent), hash)?;
            depth += step;
        }
        Ok(())
    }

    /// Truncate or extend the page vector.
    ///
    /// Shrinking drops pages; reads of dropped addresses return the empty
    /// sentinel from then on.
    pub fn resize(&mut self, page_count: u64) {
        self.pages.resize_with(page_count as usize, || None);
    }

    /// Drop pages entirely below the retention horizon.
    ///
    /// No-op unless [`TreeConfig::retention_depth`] is set. Hashes stored
    /// in retained pages are untouched, so summaries above the horizon
    /// keep verifying; dropped leaf data can no longer be served.
    pub fn prune(&mut self) {
        let Some(retention) = self.config.retention_depth else {
            return;
        };
        let horizon = self.high_water.saturating_sub(retention);
        for number in 0..self.pages.len() as u64 {
            if self.pages[number as usize].is_none() {
                continue;
            }
            let (start, end) = page_span(number);
            if end <= horizon && end > start {
                self.pages[number as usize] = None;
            }
        }
    }

    fn node(&self, range: &SeqRange) -> Hash32 {
        let addr = page_of(range);
        match self.pages.get(addr.page as usize) {
            Some(Some(page)) => page.get(addr.slot),
            _ => Hash32::EMPTY,
        }
    }

    fn page_mut(&mut self, number: u64) -> Result<&mut Page> {
        if number >= self.config.max_pages {
            return Err(TreeError::PageLimit {
                page: number,
                limit: self.config.max_pages,
            });
        }
        let index = number as usize;
        if index >= self.pages.len() {
            self.pages.resize_with(index + 1, || None);
        }
        Ok(self.pages[index].get_or_insert_with(|| Box::new(Page::new())))
    }
}

impl Default for PagedTree {
    fn default() -> Self {
        Self::new()
    }
}
