//! The merge contract: how conflicting leaves for one key reconcile.
//!
//! Each replicated object supplies an [`ObjectSchema`]: a key extractor
//! mapping a raw leaf payload to its tree position, and a merge function
//! combining two views of the same position. Merge must be commutative,
//! associative, and idempotent — the engine's central invariant. Under
//! those laws, a replica's root hash is a deterministic function of the
//! *set* of leaves it has observed, never of arrival order, so repeated
//! pairwise merges between peers converge.

use crate::types::{ObjectId, ObjectKind};

/// Side effects surfaced while applying a leaf.
///
/// Applying a leaf may create new interest (a subscription-set entry names
/// another object to sync); the session drains these after each dispatch.
#[derive(Debug, Default)]
pub struct Effects {
    pushes: Vec<(ObjectId, ObjectKind)>,
}

impl Effects {
    /// Create an empty effect set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the session start syncing another object.
    pub fn push(&mut self, id: ObjectId, kind: ObjectKind) {
        self.pushes.push((id, kind));
    }

    /// Drain the requested pushes.
    pub fn take_pushes(&mut self) -> Vec<(ObjectId, ObjectKind)> {
        std::mem::take(&mut self.pushes)
    }
}

/// Validation, placement, and merge rules for one object kind.
///
/// Positions must be a pure function of the payload: replicas only agree
/// on tree shape if every peer places a given leaf at the same address.
pub trait ObjectSchema: Send + Sync {
    /// Validate a raw leaf and extract its tree position.
    ///
    /// Returning `None` marks the payload invalid; the protocol drops it
    /// without merging or storing (verification failures are recoverable).
    fn position(&self, payload: &[u8]) -> Option<u64>;

    /// Combine two leaves that occupy the same position.
    ///
    /// Required laws, for all `a`, `b`, `c`:
    /// `merge(a, b) == merge(b, a)`;
    /// `merge(merge(a, b), c) == merge(a, merge(b, c))`;
    /// `merge(a, a) == a`.
    fn merge(&self, ours: &[u8], theirs: &[u8]) -> Vec<u8>;

    /// Observe a leaf after it is applied to the tree.
    ///
    /// Default is a no-op; schemas with derived state (fork choice) or
    /// cascading interest (subscription sets) override it.
    fn applied(&self, payload: &[u8], fx: &mut Effects) {
        let _ = (payload, fx);
    }
}
