//! The recursive tree-diff reconciliation state machine.
//!
//! A [`Replicator`] binds one paged tree, one content-addressed store,
//! and one merge schema. Its only state beyond the tree is an outbound
//! queue of pending ranges, so arbitrary reordering and duplication of
//! inbound messages are tolerated: comparisons are hash-based and merge
//! is idempotent, so reprocessing anything is safe.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use canopy_core::{Effects, Hash32, ObjectSchema, SeqRange};
use canopy_store::MessageStore;
use canopy_tree::{PagedTree, TreeConfig};

use crate::error::{Result, SyncError};
use crate::messages::{limits, SyncMessage};

/// The closed interface a session drives on each bound object.
///
/// All three object kinds implement it via [`Replicator`] with their own
/// schemas; the registry selects which to construct from the kind tag.
pub trait ReplicatedObject: Send {
    /// Announce the local root, opening (or restarting) reconciliation.
    fn start(&mut self, out: &mut Vec<SyncMessage>);

    /// Process one inbound protocol message.
    fn recv(
        &mut self,
        message: &SyncMessage,
        out: &mut Vec<SyncMessage>,
        fx: &mut Effects,
    ) -> Result<()>;

    /// Perform one bounded unit of outbound work. Returns whether more
    /// work remains queued.
    fn send_step(&mut self, out: &mut Vec<SyncMessage>) -> Result<bool>;

    /// Whether outbound work is queued.
    fn has_pending(&self) -> bool;
}

/// Reconciliation state for one replicated object.
pub struct Replicator {
    tree: PagedTree,
    store: Arc<dyn MessageStore>,
    schema: Arc<dyn ObjectSchema>,
    pending: VecDeque<SeqRange>,
}

impl Replicator {
    /// Create a replicator over a fresh tree.
    pub fn new(store: Arc<dyn MessageStore>, schema: Arc<dyn ObjectSchema>) -> Self {
        Self::with_tree(PagedTree::new(), store, schema)
    }

    /// Create a replicator over a fresh tree with the given tuning.
    pub fn with_config(
        config: TreeConfig,
        store: Arc<dyn MessageStore>,
        schema: Arc<dyn ObjectSchema>,
    ) -> Self {
        Self::with_tree(PagedTree::with_config(config), store, schema)
    }

    /// Create a replicator over an existing tree.
    pub fn with_tree(
        tree: PagedTree,
        store: Arc<dyn MessageStore>,
        schema: Arc<dyn ObjectSchema>,
    ) -> Self {
        Self {
            tree,
            store,
            schema,
            pending: VecDeque::new(),
        }
    }

    /// The underlying tree.
    pub fn tree(&self) -> &PagedTree {
        &self.tree
    }

    /// Hash at the logical root.
    pub fn root_hash(&self) -> Hash32 {
        self.tree.get(&self.tree.root())
    }

    /// Apply a locally produced leaf, merging with any existing value.
    ///
    /// This is the publish path: same validation and merge as an inbound
    /// `Leaf`, without protocol traffic. Returns the position, or `None`
    /// when the schema rejects the payload. A payload over the wire leaf
    /// limit errors here: once in the tree it could never be synced, as
    /// every peer would reject its frame.
    pub fn insert(&mut self, payload: &[u8], fx: &mut Effects) -> Result<Option<u64>> {
        if payload.len() > limits::MAX_LEAF_BYTES {
            return Err(SyncError::LeafTooLarge(payload.len()));
        }
        let Some(position) = self.schema.position(payload) else {
            return Ok(None);
        };
        self.apply(position, payload, fx)?;
        Ok(Some(position))
    }

    /// Merge `payload` into `position`; returns `(had_prior, changed)`.
    fn apply(&mut self, position: u64, payload: &[u8], fx: &mut Effects) -> Result<(bool, bool)> {
        let leaf = SeqRange::leaf(position);
        let existing = self.tree.get(&leaf);
        let prior = if existing.is_empty() {
            None
        } else {
            self.store.get(&existing)?
        };
        let merged = match &prior {
            Some(ours) => self.schema.merge(ours, payload),
            None => payload.to_vec(),
        };
        let new_hash = Hash32::hash(&merged);
        if new_hash == existing {
            return Ok((prior.is_some(), false));
        }
        self.store.add(&merged)?;
        self.tree.set(position, new_hash)?;
        self.schema.applied(&merged, fx);
        Ok((prior.is_some(), true))
    }

    fn enqueue(&mut self, range: SeqRange) {
        if !self.pending.contains(&range) {
            self.pending.push_back(range);
        }
    }

    /// Compare an inbound hash claim against the local tree.
    fn on_node(
        &mut self,
        range: &SeqRange,
        peer_hash: &Hash32,
        out: &mut Vec<SyncMessage>,
    ) -> Result<()> {
        let local = self.tree.get(range);
        trace!(%range, %local, peer = %peer_hash, "compare");
        if local == *peer_hash {
            out.push(SyncMessage::Ack { range: *range });
            return Ok(());
        }
        if local.is_empty() {
            // "Send me this": an empty reply invites the peer's data.
            out.push(SyncMessage::Node {
                range: *range,
                hash: local,
            });
            return Ok(());
        }
        if peer_hash.is_empty() || range.is_leaf() {
            // Either we own data the peer lacks, or a true value conflict
            // at a leaf; both sides eventually send theirs and merge.
            self.enqueue(*range);
            return Ok(());
        }
        let (left, right) = range.split()?;
        out.push(SyncMessage::Node {
            range: left,
            hash: self.tree.get(&left),
        });
        out.push(SyncMessage::Node {
            range: right,
            hash: self.tree.get(&right),
        });
        Ok(())
    }

    /// Validate and merge one inbound leaf.
    fn on_leaf(
        &mut self,
        payload: &[u8],
        out: &mut Vec<SyncMessage>,
        fx: &mut Effects,
    ) -> Result<()> {
        let Some(position) = self.schema.position(payload) else {
            warn!(bytes = payload.len(), "dropping invalid leaf");
            return Ok(());
        };
        let (had_prior, changed) = self.apply(position, payload, fx)?;
        if had_prior && changed {
            // A genuine two-sided merge: the peer lacks the combined
            // value, so echo it back.
            let leaf = SeqRange::leaf(position);
            let hash = self.tree.get(&leaf);
            if let Some(merged) = self.store.get(&hash)? {
                out.push(SyncMessage::Leaf { payload: merged });
                return Ok(());
            }
        }
        out.push(SyncMessage::Ack {
            range: SeqRange::leaf(position),
        });
        Ok(())
    }
}

impl ReplicatedObject for Replicator {
    fn start(&mut self, out: &mut Vec<SyncMessage>) {
        let root = self.tree.root();
        let hash = self.tree.get(&root);
        debug!(%root, %hash, "announcing root");
        out.push(SyncMessage::Root { range: root, hash });
    }

    fn recv(
        &mut self,
        message: &SyncMessage,
        out: &mut Vec<SyncMessage>,
        fx: &mut Effects,
    ) -> Result<()> {
        match message {
            SyncMessage::Root { range, hash } | SyncMessage::Node { range, hash } => {
                self.on_node(range, hash, out)
            }
            SyncMessage::Leaf { payload } => self.on_leaf(payload, out, fx),
            SyncMessage::Ack { range } => {
                trace!(%range, "peer settled");
                Ok(())
            }
            SyncMessage::Bind { .. } | SyncMessage::Null => {
                debug!("session-level message reached replicator; ignoring");
                Ok(())
            }
        }
    }

    fn send_step(&mut self, out: &mut Vec<SyncMessage>) -> Result<bool> {
        // Splitting walks depth-first toward a leaf, so one call does at
        // most tree-height splits and emits at most one leaf.
        while let Some(front) = self.pending.front().copied() {
            if front.is_leaf() {
                self.pending.pop_front();
                let hash = self.tree.get(&front);
                let payload = if hash.is_empty() {
                    None
                } else {
                    self.store.get(&hash)?
                };
                match payload {
                    Some(payload) => out.push(SyncMessage::Leaf { payload }),
                    // Pruned or never stored: settle the range instead.
                    None => out.push(SyncMessage::Ack { range: front }),
                }
                return Ok(self.has_pending());
            }
            self.pending.pop_front();
            let (left, right) = front.split()?;
            // Right first, so the left child is served before it.
            for child in [right, left] {
                if self.tree.get(&child).is_empty() {
                    out.push(SyncMessage::Ack { range: child });
                } else {
                    self.pending.push_front(child);
                }
            }
        }
        Ok(false)
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use canopy_store::MemoryStore;

    /// Position = first 8 payload bytes BE; merge = smaller hash wins.
    struct TestSchema;

    impl ObjectSchema for TestSchema {
        fn position(&self, payload: &[u8]) -> Option<u64> {
            let head: [u8; 8] = payload.get(..8)?.try_into().ok()?;
            Some(u64::from_be_bytes(head))
        }

        fn merge(&self, ours: &[u8], theirs: &[u8]) -> Vec<u8> {
            if Hash32::hash(ours) <= Hash32::hash(theirs) {
                ours.to_vec()
            } else {
                theirs.to_vec()
            }
        }
    }

    fn replicator() -> Replicator {
        Replicator::new(Arc::new(MemoryStore::new()), Arc::new(TestSchema))
    }

    fn payload(position: u64, body: &[u8]) -> Vec<u8> {
        let mut buf = position.to_be_bytes().to_vec();
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn test_equal_roots_ack_immediately() {
        let mut a = replicator();
        let mut b = replicator();
        let mut fx = Effects::new();
        a.insert(&payload(0, b"same"), &mut fx).unwrap();
        b.insert(&payload(0, b"same"), &mut fx).unwrap();

        let mut announce = Vec::new();
        a.start(&mut announce);
        let mut reply = Vec::new();
        b.recv(&announce[0], &mut reply, &mut fx).unwrap();
        assert!(matches!(reply[0], SyncMessage::Ack { .. }));
        assert!(!b.has_pending());
    }

    #[test]
    fn test_empty_side_requests_data() {
        let mut a = replicator();
        let mut b = replicator();
        let mut fx = Effects::new();
        a.insert(&payload(3, b"data"), &mut fx).unwrap();

        let mut announce = Vec::new();
        a.start(&mut announce);
        let mut reply = Vec::new();
        b.recv(&announce[0], &mut reply, &mut fx).unwrap();
        // Empty local hash echoed back means "send me this".
        assert!(matches!(
            reply[0],
            SyncMessage::Node { hash, .. } if hash.is_empty()
        ));

        let mut queued = Vec::new();
        a.recv(&reply[0], &mut queued, &mut fx).unwrap();
        assert!(a.has_pending());
    }

    #[test]
    fn test_insert_rejects_oversized_payload() {
        let mut a = replicator();
        let mut fx = Effects::new();
        let root_before = a.root_hash();

        let big = payload(1, &vec![0u8; limits::MAX_LEAF_BYTES]);
        let err = a.insert(&big, &mut fx).unwrap_err();
        assert!(matches!(err, SyncError::LeafTooLarge(_)));
        // Nothing entered the tree, so nothing poisonous can be framed.
        assert_eq!(a.root_hash(), root_before);
        assert!(!a.has_pending());
    }

    #[test]
    fn test_invalid_leaf_dropped_without_mutation() {
        let mut b = replicator();
        let mut fx = Effects::new();
        let root_before = b.root_hash();
        let mut out = Vec::new();
        b.recv(
            &SyncMessage::Leaf {
                payload: Bytes::from_static(b"short"),
            },
            &mut out,
            &mut fx,
        )
        .unwrap();
        assert!(out.is_empty());
        assert_eq!(b.root_hash(), root_before);
    }

    #[test]
    fn test_idempotent_resend_yields_only_ack() {
        let mut b = replicator();
        let mut fx = Effects::new();
        let leaf = SyncMessage::Leaf {
            payload: Bytes::from(payload(5, b"v")),
        };
        let mut first = Vec::new();
        b.recv(&leaf, &mut first, &mut fx).unwrap();
        assert!(matches!(first[0], SyncMessage::Ack { .. }));
        let root = b.root_hash();

        let mut second = Vec::new();
        b.recv(&leaf, &mut second, &mut fx).unwrap();
        assert_eq!(second.len(), 1);
        assert!(matches!(second[0], SyncMessage::Ack { .. }));
        assert_eq!(b.root_hash(), root);
    }

    #[test]
    fn test_two_sided_conflict_echoes_merge() {
        let mut a = replicator();
        let mut b = replicator();
        let mut fx = Effects::new();
        a.insert(&payload(2, b"left"), &mut fx).unwrap();
        b.insert(&payload(2, b"right"), &mut fx).unwrap();

        let winner = TestSchema.merge(&payload(2, b"left"), &payload(2, b"right"));

        // b receives a's leaf: a genuine merge, echoed back.
        let mut out = Vec::new();
        b.recv(
            &SyncMessage::Leaf {
                payload: Bytes::from(payload(2, b"left")),
            },
            &mut out,
            &mut fx,
        )
        .unwrap();
        match &out[0] {
            SyncMessage::Leaf { payload } => assert_eq!(payload.as_ref(), &winner[..]),
            SyncMessage::Ack { .. } => {
                // The merge picked b's own value; no mutation, so no echo.
                assert_eq!(winner, payload(2, b"right"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_send_step_acks_empty_children() {
        let mut a = replicator();
        let mut fx = Effects::new();
        a.insert(&payload(0, b"x"), &mut fx).unwrap();
        a.insert(&payload(5, b"y"), &mut fx).unwrap();

        // Peer claims the whole root range is empty on its side.
        let root = a.tree().root();
        let mut out = Vec::new();
        a.on_node(&root, &Hash32::EMPTY, &mut out).unwrap();
        assert!(a.has_pending());

        let mut sent = Vec::new();
        while a.send_step(&mut sent).unwrap() {}
        let leaves = sent
            .iter()
            .filter(|m| matches!(m, SyncMessage::Leaf { .. }))
            .count();
        let acks = sent
            .iter()
            .filter(|m| matches!(m, SyncMessage::Ack { .. }))
            .count();
        assert_eq!(leaves, 2);
        assert!(acks > 0, "empty subtrees must be settled, not sent");
    }
}
