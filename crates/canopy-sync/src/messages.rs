//! Sync protocol message types.
//!
//! Four messages carry the recursive tree diff (`Root`, `Node`, `Leaf`,
//! `Ack`); two more belong to the session layer (`Bind`, `Null`). Every
//! frame travels on a stream id that names one bound object.

use bytes::Bytes;

use canopy_core::{Hash32, ObjectId, ObjectKind, SeqRange};

/// Identifies one bound object within a session.
pub type StreamId = u32;

/// Message size limits.
pub mod limits {
    /// Max leaf payload bytes in a `Leaf` frame.
    pub const MAX_LEAF_BYTES: usize = 1 << 20;
    /// Max object name bytes in a `Bind` frame.
    pub const MAX_NAME_BYTES: usize = 1 << 10;
}

/// Sync protocol messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Associate a stream id with an object before its first diff message.
    Bind {
        /// The object being announced.
        object_id: ObjectId,
        /// Which handler the registry should construct for it.
        kind: ObjectKind,
    },

    /// Announce the local tree root: the opening move of reconciliation.
    Root {
        /// The root range (smallest cover of the high-water mark).
        range: SeqRange,
        /// Local hash at that range.
        hash: Hash32,
    },

    /// Compare one tree address.
    Node {
        /// The address under comparison.
        range: SeqRange,
        /// Sender's hash at that address.
        hash: Hash32,
    },

    /// Carry one leaf payload.
    Leaf {
        /// Opaque payload; the bound object's schema validates it.
        payload: Bytes,
    },

    /// The sender has nothing bound for this stream.
    Null,

    /// The sender agrees with (or has nothing for) this range.
    Ack {
        /// The settled range.
        range: SeqRange,
    },
}

impl SyncMessage {
    /// Wire tag for this message kind.
    pub fn kind_tag(&self) -> u8 {
        match self {
            SyncMessage::Bind { .. } => 1,
            SyncMessage::Root { .. } => 2,
            SyncMessage::Node { .. } => 3,
            SyncMessage::Leaf { .. } => 4,
            SyncMessage::Null => 5,
            SyncMessage::Ack { .. } => 6,
        }
    }
}
