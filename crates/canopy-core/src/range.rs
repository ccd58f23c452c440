//! The range algebra: addresses in an implicit binary tree over positions.
//!
//! A `SeqRange` names an aligned power-of-two span of integer positions.
//! Every node in the (unboundedly extensible) binary tree is addressed by
//! one range: depth 0 is a single leaf position, each extra level doubles
//! the span. Every concrete tree instance reuses these addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Maximum addressable depth: a depth-64 range covers all of `u64`.
pub const MAX_DEPTH: u8 = 64;

/// An aligned range of `2^depth` positions starting at `start`.
///
/// Invariant: `start` is a multiple of `2^depth`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeqRange {
    /// First position in the range.
    pub start: u64,
    /// Tree depth: the range covers `2^depth` positions.
    pub depth: u8,
}

impl SeqRange {
    /// Create a range, enforcing alignment.
    pub fn new(start: u64, depth: u8) -> Result<Self, CoreError> {
        if depth > MAX_DEPTH {
            return Err(CoreError::DepthOverflow(depth));
        }
        if depth < MAX_DEPTH && start & (span_of(depth) - 1) != 0 {
            return Err(CoreError::MisalignedRange { start, depth });
        }
        if depth == MAX_DEPTH && start != 0 {
            return Err(CoreError::MisalignedRange { start, depth });
        }
        Ok(Self { start, depth })
    }

    /// The leaf range for a single position.
    pub const fn leaf(position: u64) -> Self {
        Self {
            start: position,
            depth: 0,
        }
    }

    /// Number of positions covered, saturating at `u64::MAX` for depth 64.
    pub fn span(&self) -> u64 {
        span_of(self.depth)
    }

    /// One past the last covered position (saturating).
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.span())
    }

    /// True if this is a single position.
    pub fn is_leaf(&self) -> bool {
        self.depth == 0
    }

    /// True if `position` falls inside this range.
    pub fn contains(&self, position: u64) -> bool {
        position >= self.start && (self.depth >= MAX_DEPTH || position < self.end())
    }

    /// True if `other` is fully inside this range.
    pub fn contains_range(&self, other: &SeqRange) -> bool {
        other.depth <= self.depth && self.contains(other.start)
    }

    /// Split into the two child ranges. Leaves cannot be split.
    pub fn split(&self) -> Result<(SeqRange, SeqRange), CoreError> {
        if self.is_leaf() {
            return Err(CoreError::SplitLeaf);
        }
        let child_depth = self.depth - 1;
        let left = SeqRange {
            start: self.start,
            depth: child_depth,
        };
        let right = SeqRange {
            start: self.start + span_of(child_depth),
            depth: child_depth,
        };
        Ok((left, right))
    }

    /// The parent range one level up.
    pub fn parent(&self) -> Result<SeqRange, CoreError> {
        if self.depth >= MAX_DEPTH {
            return Err(CoreError::DepthOverflow(self.depth + 1));
        }
        let parent_depth = self.depth + 1;
        Ok(SeqRange {
            start: self.start & !(span_of(parent_depth) - 1),
            depth: parent_depth,
        })
    }

    /// The sibling range under the shared parent.
    pub fn sibling(&self) -> Result<SeqRange, CoreError> {
        if self.depth >= MAX_DEPTH {
            return Err(CoreError::DepthOverflow(self.depth + 1));
        }
        Ok(SeqRange {
            start: self.start ^ span_of(self.depth),
            depth: self.depth,
        })
    }

    /// True if this range is the left child of its parent.
    pub fn is_left_child(&self) -> bool {
        self.depth < MAX_DEPTH && self.start & span_of(self.depth) == 0
    }

    /// Smallest `{0, depth}` range covering positions `[0, high_water)`.
    ///
    /// This is the tree-root rule: the root grows only when the high-water
    /// mark crosses a power-of-two boundary.
    pub fn covering(high_water: u64) -> Self {
        let mut depth = 0u8;
        while depth < MAX_DEPTH && span_of(depth) < high_water {
            depth += 1;
        }
        Self { start: 0, depth }
    }
}

impl fmt::Debug for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqRange({}+2^{})", self.start, self.depth)
    }
}

impl fmt::Display for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

fn span_of(depth: u8) -> u64 {
    if depth >= MAX_DEPTH {
        u64::MAX
    } else {
        1u64 << depth
    }
}
