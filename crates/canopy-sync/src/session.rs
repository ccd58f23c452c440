//! Per-connection session: multiplexes objects over stream ids.
//!
//! One session serves one connection. The stream id space is split by
//! direction - the initiator allocates even ids, the responder odd - so
//! both peers announcing objects at once can never collide. Ids come
//! from a per-side free list and bind to one open object each; a FIFO of
//! locally requested objects feeds new bindings, and a FIFO of pending
//! streams schedules bounded outbound work. Both peers may bind the same
//! object under different stream ids - the handles are shared through
//! the object index, so traffic on either id reaches the same state.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace};

use canopy_core::{Effects, ObjectId, ObjectKind};

use crate::error::{Result, SyncError};
use crate::messages::{StreamId, SyncMessage};
use crate::objects::{ObjectHandle, ObjectIndex};
use crate::transport::Sink;

/// Which end of the connection this session is.
///
/// The diff algorithm is symmetric; the role selects the half of the
/// stream id space this side allocates from (initiator even, responder
/// odd) and the duplicate-suppression policy (the responder does not
/// re-announce objects the peer has already bound).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The side that opened the connection.
    Initiator,
    /// The side that accepted it.
    Responder,
}

struct BoundStream {
    object_id: ObjectId,
    handle: ObjectHandle,
}

/// Session state for one connection.
pub struct SyncSession {
    role: Role,
    index: Arc<ObjectIndex>,
    streams: Vec<Option<BoundStream>>,
    free_streams: Vec<StreamId>,
    next_stream: StreamId,
    queued_objects: VecDeque<(ObjectId, ObjectKind)>,
    streams_pending: VecDeque<StreamId>,
    announced: HashSet<ObjectId>,
    peer_bound: HashSet<ObjectId>,
    declined: HashSet<StreamId>,
}

impl SyncSession {
    /// Create a session over a shared object index.
    pub fn new(role: Role, index: Arc<ObjectIndex>) -> Self {
        Self {
            role,
            index,
            streams: Vec::new(),
            free_streams: Vec::new(),
            next_stream: match role {
                Role::Initiator => 0,
                Role::Responder => 1,
            },
            queued_objects: VecDeque::new(),
            streams_pending: VecDeque::new(),
            announced: HashSet::new(),
            peer_bound: HashSet::new(),
            declined: HashSet::new(),
        }
    }

    /// Queue an object for syncing.
    ///
    /// Used both for objects the caller wants and for ones discovered
    /// indirectly (a subscription-set leaf can push again, cascading
    /// interest). Each object is announced at most once per session.
    pub fn push(&mut self, id: ObjectId, kind: ObjectKind) {
        if self.announced.contains(&id) {
            return;
        }
        if self.role == Role::Responder && self.peer_bound.contains(&id) {
            trace!(%id, "suppressing re-announce of peer-bound object");
            return;
        }
        self.announced.insert(id.clone());
        self.queued_objects.push_back((id, kind));
    }

    /// Whether any outbound work remains.
    pub fn has_pending(&self) -> bool {
        !self.streams_pending.is_empty() || !self.queued_objects.is_empty()
    }

    /// Process one inbound message.
    pub fn recv(
        &mut self,
        stream_id: StreamId,
        message: SyncMessage,
        sink: &mut impl Sink,
    ) -> Result<()> {
        match message {
            SyncMessage::Bind { object_id, kind } => self.on_bind(stream_id, object_id, kind, sink),
            SyncMessage::Null => self.on_null(stream_id, sink),
            other => self.dispatch(stream_id, other, sink),
        }
    }

    /// Perform one bounded unit of outbound work.
    ///
    /// Drains one step of a pending stream if any exist; otherwise
    /// starts the next queued object, announcing its binding before its
    /// first protocol message.
    pub fn send(&mut self, sink: &mut impl Sink) -> Result<()> {
        while let Some(stream_id) = self.streams_pending.pop_front() {
            let Some(stream) = self.stream(stream_id) else {
                continue; // released since it was queued
            };
            let handle = stream.handle.clone();
            let mut out = Vec::new();
            let more = handle
                .object
                .lock()
                .map_err(|_| SyncError::Poisoned)?
                .send_step(&mut out)?;
            for message in out {
                sink.deliver(stream_id, message)?;
            }
            if more {
                self.streams_pending.push_back(stream_id);
            }
            return Ok(());
        }

        if let Some((object_id, kind)) = self.queued_objects.pop_front() {
            let Some(handle) = self.index.open(&object_id, kind)? else {
                debug!(%object_id, "queued object has no handler; skipping");
                return Ok(());
            };
            let stream_id = self.allocate(object_id.clone(), handle.clone());
            debug!(%object_id, stream_id, "announcing object");
            sink.deliver(
                stream_id,
                SyncMessage::Bind {
                    object_id,
                    kind: handle.kind,
                },
            )?;
            let mut out = Vec::new();
            {
                let mut object = handle.object.lock().map_err(|_| SyncError::Poisoned)?;
                object.start(&mut out);
                if object.has_pending() {
                    self.mark_pending(stream_id);
                }
            }
            for message in out {
                sink.deliver(stream_id, message)?;
            }
        }
        Ok(())
    }

    /// Release a stream whose exchange has completed, returning its id
    /// to the free list.
    pub fn release(&mut self, stream_id: StreamId) {
        if let Some(slot) = self.streams.get_mut(stream_id as usize) {
            if slot.take().is_some() {
                self.streams_pending.retain(|&sid| sid != stream_id);
                // Only ids from this side's half are ours to reuse;
                // peer-announced ids just unbind.
                if stream_id % 2 == self.next_stream % 2 {
                    self.free_streams.push(stream_id);
                }
            }
        }
    }

    fn on_bind(
        &mut self,
        stream_id: StreamId,
        object_id: ObjectId,
        kind: ObjectKind,
        sink: &mut impl Sink,
    ) -> Result<()> {
        self.peer_bound.insert(object_id.clone());
        let Some(handle) = self.index.open(&object_id, kind)? else {
            // Declined: the peer still reacts to the Null (announcing
            // its root unilaterally), so remember the stream and drop
            // whatever arrives on it instead of failing the connection.
            debug!(%object_id, stream_id, "declining bind for unregistered kind");
            self.declined.insert(stream_id);
            sink.deliver(stream_id, SyncMessage::Null)?;
            return Ok(());
        };
        self.bind(stream_id, object_id, handle.clone())?;
        // Announce our own root on the same stream, making the exchange
        // two-sided: each peer compares inside the other's root range.
        let mut out = Vec::new();
        handle
            .object
            .lock()
            .map_err(|_| SyncError::Poisoned)?
            .start(&mut out);
        for message in out {
            sink.deliver(stream_id, message)?;
        }
        Ok(())
    }

    fn on_null(&mut self, stream_id: StreamId, sink: &mut impl Sink) -> Result<()> {
        // The peer has nothing bound; if we hold a local object on this
        // stream, it still announces its root unilaterally.
        let Some(stream) = self.stream(stream_id) else {
            if self.declined.contains(&stream_id) {
                trace!(stream_id, "ignoring message on declined stream");
                return Ok(());
            }
            return Err(SyncError::UnknownStream(stream_id));
        };
        let handle = stream.handle.clone();
        let mut out = Vec::new();
        handle
            .object
            .lock()
            .map_err(|_| SyncError::Poisoned)?
            .start(&mut out);
        for message in out {
            sink.deliver(stream_id, message)?;
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        stream_id: StreamId,
        message: SyncMessage,
        sink: &mut impl Sink,
    ) -> Result<()> {
        let Some(stream) = self.stream(stream_id) else {
            if self.declined.contains(&stream_id) {
                trace!(stream_id, "dropping traffic on declined stream");
                return Ok(());
            }
            return Err(SyncError::UnknownStream(stream_id));
        };
        let handle = stream.handle.clone();
        let mut out = Vec::new();
        let mut fx = Effects::new();
        let pending = {
            let mut object = handle.object.lock().map_err(|_| SyncError::Poisoned)?;
            object.recv(&message, &mut out, &mut fx)?;
            object.has_pending()
        };
        for message in out {
            sink.deliver(stream_id, message)?;
        }
        for (id, kind) in fx.take_pushes() {
            self.push(id, kind);
        }
        if pending {
            self.mark_pending(stream_id);
        }
        Ok(())
    }

    fn stream(&self, stream_id: StreamId) -> Option<&BoundStream> {
        self.streams.get(stream_id as usize).and_then(Option::as_ref)
    }

    fn bind(&mut self, stream_id: StreamId, object_id: ObjectId, handle: ObjectHandle) -> Result<()> {
        let index = stream_id as usize;
        if index >= self.streams.len() {
            self.streams.resize_with(index + 1, || None);
        }
        match &self.streams[index] {
            Some(bound) if bound.object_id != object_id => Err(SyncError::Rebind(stream_id)),
            Some(_) => Ok(()), // idempotent rebind
            None => {
                self.streams[index] = Some(BoundStream { object_id, handle });
                Ok(())
            }
        }
    }

    fn allocate(&mut self, object_id: ObjectId, handle: ObjectHandle) -> StreamId {
        let stream_id = match self.free_streams.pop() {
            Some(id) => id,
            None => {
                let id = self.next_stream;
                self.next_stream += 2; // stay in this side's half
                id
            }
        };
        let index = stream_id as usize;
        if index >= self.streams.len() {
            self.streams.resize_with(index + 1, || None);
        }
        self.streams[index] = Some(BoundStream { object_id, handle });
        stream_id
    }

    fn mark_pending(&mut self, stream_id: StreamId) {
        if !self.streams_pending.contains(&stream_id) {
            self.streams_pending.push_back(stream_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use canopy_core::PublicKey;
    use canopy_store::MemoryStore;

    use crate::objects::Registry;
    use crate::replicator::Replicator;
    use crate::schemas::ChannelSchema;

    fn index() -> Arc<ObjectIndex> {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let mut registry = Registry::new();
        registry.register(
            ObjectKind::Channel,
            Box::new(move |_id| {
                Arc::new(Mutex::new(Replicator::new(
                    store.clone(),
                    Arc::new(ChannelSchema),
                )))
            }),
        );
        Arc::new(ObjectIndex::new(registry))
    }

    fn object() -> ObjectId {
        ObjectId::new(PublicKey::from_bytes([1; 32]), "chat")
    }

    #[test]
    fn test_send_announces_bind_then_root() {
        let mut session = SyncSession::new(Role::Initiator, index());
        session.push(object(), ObjectKind::Channel);
        assert!(session.has_pending());

        let mut sink: Vec<(StreamId, SyncMessage)> = Vec::new();
        session.send(&mut sink).unwrap();
        assert!(matches!(sink[0].1, SyncMessage::Bind { .. }));
        assert!(matches!(sink[1].1, SyncMessage::Root { .. }));
        assert_eq!(sink[0].0, sink[1].0);
        assert!(!session.has_pending());
    }

    #[test]
    fn test_push_deduplicates() {
        let mut session = SyncSession::new(Role::Initiator, index());
        session.push(object(), ObjectKind::Channel);
        session.push(object(), ObjectKind::Channel);

        let mut sink: Vec<(StreamId, SyncMessage)> = Vec::new();
        session.send(&mut sink).unwrap();
        session.send(&mut sink).unwrap();
        let binds = sink
            .iter()
            .filter(|(_, m)| matches!(m, SyncMessage::Bind { .. }))
            .count();
        assert_eq!(binds, 1);
    }

    #[test]
    fn test_responder_suppresses_peer_bound_objects() {
        let mut session = SyncSession::new(Role::Responder, index());
        let mut sink: Vec<(StreamId, SyncMessage)> = Vec::new();
        session
            .recv(
                0,
                SyncMessage::Bind {
                    object_id: object(),
                    kind: ObjectKind::Channel,
                },
                &mut sink,
            )
            .unwrap();
        // Bind answered with our root on the same stream.
        assert!(matches!(sink[0].1, SyncMessage::Root { .. }));

        session.push(object(), ObjectKind::Channel);
        assert!(!session.has_pending());
    }

    #[test]
    fn test_unknown_stream_is_fatal() {
        let mut session = SyncSession::new(Role::Initiator, index());
        let mut sink: Vec<(StreamId, SyncMessage)> = Vec::new();
        let err = session
            .recv(
                3,
                SyncMessage::Ack {
                    range: canopy_core::SeqRange::leaf(0),
                },
                &mut sink,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownStream(3)));
    }

    #[test]
    fn test_bind_for_unsupported_kind_answers_null() {
        // Registry only supports Channel; an Identity bind is declined.
        let mut session = SyncSession::new(Role::Responder, index());
        let mut sink: Vec<(StreamId, SyncMessage)> = Vec::new();
        session
            .recv(
                0,
                SyncMessage::Bind {
                    object_id: object(),
                    kind: ObjectKind::Identity,
                },
                &mut sink,
            )
            .unwrap();
        assert_eq!(sink[0].1, SyncMessage::Null);
    }

    #[test]
    fn test_simultaneous_announcements_use_disjoint_ids() {
        // Both peers flush an announcement before seeing each other's:
        // the normal opening schedule on a full-duplex transport. The
        // per-direction id halves keep the binds from colliding.
        let shared = index();
        let mut a = SyncSession::new(Role::Initiator, shared.clone());
        let mut b = SyncSession::new(Role::Responder, shared);
        a.push(object(), ObjectKind::Channel);
        b.push(
            ObjectId::new(PublicKey::from_bytes([2; 32]), "other"),
            ObjectKind::Channel,
        );

        let mut from_a: Vec<(StreamId, SyncMessage)> = Vec::new();
        let mut from_b: Vec<(StreamId, SyncMessage)> = Vec::new();
        a.send(&mut from_a).unwrap();
        b.send(&mut from_b).unwrap();
        assert_eq!(from_a[0].0 % 2, 0);
        assert_eq!(from_b[0].0 % 2, 1);

        // Cross-deliver the queued openings; neither side may fail.
        let mut sink: Vec<(StreamId, SyncMessage)> = Vec::new();
        for (stream_id, message) in from_b {
            a.recv(stream_id, message, &mut sink).unwrap();
        }
        for (stream_id, message) in from_a {
            b.recv(stream_id, message, &mut sink).unwrap();
        }
    }

    #[test]
    fn test_declined_stream_drops_later_traffic() {
        // Registry only supports Channel; the Identity bind is declined
        // with Null, and the peer's follow-up root announcement on that
        // stream is dropped rather than failing the connection.
        let mut session = SyncSession::new(Role::Responder, index());
        let mut sink: Vec<(StreamId, SyncMessage)> = Vec::new();
        session
            .recv(
                0,
                SyncMessage::Bind {
                    object_id: object(),
                    kind: ObjectKind::Identity,
                },
                &mut sink,
            )
            .unwrap();
        assert_eq!(sink[0].1, SyncMessage::Null);

        sink.clear();
        session
            .recv(
                0,
                SyncMessage::Root {
                    range: canopy_core::SeqRange::leaf(0),
                    hash: canopy_core::Hash32::hash(b"x"),
                },
                &mut sink,
            )
            .unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_release_recycles_stream_id() {
        let mut session = SyncSession::new(Role::Initiator, index());
        session.push(object(), ObjectKind::Channel);
        let mut sink: Vec<(StreamId, SyncMessage)> = Vec::new();
        session.send(&mut sink).unwrap();
        let stream_id = sink[0].0;

        session.release(stream_id);
        session.push(
            ObjectId::new(PublicKey::from_bytes([2; 32]), "other"),
            ObjectKind::Channel,
        );
        sink.clear();
        session.send(&mut sink).unwrap();
        assert_eq!(sink[0].0, stream_id);
    }

    #[test]
    fn test_released_peer_stream_stays_in_peer_half() {
        // Unbinding a peer-announced id must not hand it to the local
        // allocator, or a later announcement could collide with the
        // peer's next allocation of the same id.
        let mut session = SyncSession::new(Role::Responder, index());
        let mut sink: Vec<(StreamId, SyncMessage)> = Vec::new();
        session
            .recv(
                0,
                SyncMessage::Bind {
                    object_id: object(),
                    kind: ObjectKind::Channel,
                },
                &mut sink,
            )
            .unwrap();
        session.release(0);

        session.push(
            ObjectId::new(PublicKey::from_bytes([2; 32]), "other"),
            ObjectKind::Channel,
        );
        sink.clear();
        session.send(&mut sink).unwrap();
        assert_eq!(sink[0].0 % 2, 1);
    }
}
