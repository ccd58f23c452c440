//! The Engine: one host's replicated objects behind a single API.
//!
//! An engine owns the message store, the object index every session
//! shares, and typed handles to the objects opened so far. Sessions
//! created by one engine all resolve objects through the same index, so
//! any number of concurrent connections converge on one replica state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use canopy_core::{Effects, Hash32, Keypair, ObjectId, ObjectKind, PublicKey};
use canopy_identity::{IdentityBlock, IdentityDb};
use canopy_store::{MemoryStore, MessageStore, SqliteStore};
use canopy_sync::{
    ChannelMessage, ChannelSchema, ObjectIndex, Registry, Replicator, Role, SubscriptionEntry,
    SubscriptionSchema, SyncSession,
};

use crate::error::{EngineError, Result};

type ReplicatorMap = Arc<Mutex<HashMap<ObjectId, Arc<Mutex<Replicator>>>>>;
type IdentityMap = Arc<Mutex<HashMap<ObjectId, Arc<IdentityDb>>>>;

/// A host's view of the replicated world.
pub struct Engine {
    keypair: Keypair,
    store: Arc<dyn MessageStore>,
    index: Arc<ObjectIndex>,
    channels: ReplicatorMap,
    subscriptions: ReplicatorMap,
    identities: IdentityMap,
}

impl Engine {
    /// Create an engine over an existing store.
    ///
    /// Registers constructors for every object kind, so objects a peer
    /// announces mid-session open lazily with the right schema.
    pub fn new(keypair: Keypair, store: Arc<dyn MessageStore>) -> Self {
        let channels: ReplicatorMap = Arc::default();
        let subscriptions: ReplicatorMap = Arc::default();
        let identities: IdentityMap = Arc::default();

        let mut registry = Registry::new();
        registry.register(
            ObjectKind::Channel,
            replicator_constructor(store.clone(), channels.clone(), || Arc::new(ChannelSchema)),
        );
        registry.register(
            ObjectKind::Subscriptions,
            replicator_constructor(store.clone(), subscriptions.clone(), || {
                Arc::new(SubscriptionSchema)
            }),
        );
        let ctor_store = store.clone();
        let ctor_identities = identities.clone();
        registry.register(
            ObjectKind::Identity,
            Box::new(move |id| {
                let db = Arc::new(IdentityDb::open(id.clone(), ctor_store.clone()));
                let object = db.handle().object;
                if let Ok(mut map) = ctor_identities.lock() {
                    map.insert(id.clone(), db);
                }
                object
            }),
        );

        info!(owner = %hex::encode(keypair.public_key().as_bytes()), "engine starting");
        Self {
            keypair,
            store,
            index: Arc::new(ObjectIndex::new(registry)),
            channels,
            subscriptions,
            identities,
        }
    }

    /// An engine over a fresh in-memory store.
    pub fn in_memory(keypair: Keypair) -> Self {
        Self::new(keypair, Arc::new(MemoryStore::new()))
    }

    /// An engine over a SQLite store at the given path.
    pub fn open(keypair: Keypair, path: impl AsRef<std::path::Path>) -> Result<Self> {
        let store = SqliteStore::open(path)?;
        Ok(Self::new(keypair, Arc::new(store)))
    }

    /// This host's public key.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// This host's signing keypair.
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// The backing message store.
    pub fn store(&self) -> Arc<dyn MessageStore> {
        self.store.clone()
    }

    /// The shared object index.
    pub fn index(&self) -> Arc<ObjectIndex> {
        self.index.clone()
    }

    /// Start a sync session for one connection.
    pub fn session(&self, role: Role) -> SyncSession {
        SyncSession::new(role, self.index.clone())
    }

    /// The object id of a stream this host owns.
    pub fn own_object(&self, name: &str) -> ObjectId {
        ObjectId::new(self.keypair.public_key(), name)
    }

    // ── Channels ──────────────────────────────────────────────────────

    /// Open (or create) a channel object.
    pub fn open_channel(&self, id: &ObjectId) -> Result<Arc<Mutex<Replicator>>> {
        self.open_typed(id, ObjectKind::Channel, &self.channels)
    }

    /// Publish a message into a channel at a sequence position.
    ///
    /// Returns the tree position the leaf landed at, or `None` if the
    /// schema rejected the payload.
    pub fn publish(
        &self,
        channel: &ObjectId,
        seq: u64,
        body: Vec<u8>,
        fx: &mut Effects,
    ) -> Result<Option<u64>> {
        let message = ChannelMessage { seq, body }.encode();
        let replicator = self.open_channel(channel)?;
        let mut rep = replicator.lock().map_err(|_| EngineError::Poisoned)?;
        Ok(rep.insert(&message, fx)?)
    }

    /// A channel's current root hash.
    pub fn channel_root(&self, channel: &ObjectId) -> Result<Hash32> {
        let replicator = self.open_channel(channel)?;
        let rep = replicator.lock().map_err(|_| EngineError::Poisoned)?;
        Ok(rep.root_hash())
    }

    // ── Subscriptions ─────────────────────────────────────────────────

    /// Open (or create) a subscription-set object.
    pub fn open_subscriptions(&self, id: &ObjectId) -> Result<Arc<Mutex<Replicator>>> {
        self.open_typed(id, ObjectKind::Subscriptions, &self.subscriptions)
    }

    /// Record interest in another object.
    ///
    /// The entry replicates like any leaf; every replica that applies it
    /// starts syncing the target object too.
    pub fn subscribe(
        &self,
        subscriptions: &ObjectId,
        seq: u64,
        target: &ObjectId,
        kind: ObjectKind,
        fx: &mut Effects,
    ) -> Result<Option<u64>> {
        let entry = SubscriptionEntry {
            seq,
            owner: target.owner,
            name: target.name.clone(),
            kind,
        }
        .encode();
        let replicator = self.open_subscriptions(subscriptions)?;
        let mut rep = replicator.lock().map_err(|_| EngineError::Poisoned)?;
        Ok(rep.insert(&entry, fx)?)
    }

    // ── Identity ──────────────────────────────────────────────────────

    /// Open (or create) an identity chain.
    pub fn identity(&self, id: &ObjectId) -> Result<Arc<IdentityDb>> {
        self.index.open(id, ObjectKind::Identity)?;
        let map = self.identities.lock().map_err(|_| EngineError::Poisoned)?;
        match map.get(id) {
            Some(db) => Ok(db.clone()),
            None => {
                let open = self.open_kind_of(id)?;
                Err(EngineError::KindMismatch {
                    id: id.clone(),
                    open,
                    requested: ObjectKind::Identity,
                })
            }
        }
    }

    /// Merge a block into an identity chain and publish it.
    pub fn append_identity(
        &self,
        id: &ObjectId,
        block: IdentityBlock,
        fx: &mut Effects,
    ) -> Result<()> {
        let db = self.identity(id)?;
        db.append(block, fx)?;
        Ok(())
    }

    fn open_typed(
        &self,
        id: &ObjectId,
        kind: ObjectKind,
        map: &ReplicatorMap,
    ) -> Result<Arc<Mutex<Replicator>>> {
        self.index.open(id, kind)?;
        let map = map.lock().map_err(|_| EngineError::Poisoned)?;
        match map.get(id) {
            Some(replicator) => Ok(replicator.clone()),
            None => {
                let open = self.open_kind_of(id)?;
                Err(EngineError::KindMismatch {
                    id: id.clone(),
                    open,
                    requested: kind,
                })
            }
        }
    }

    fn open_kind_of(&self, id: &ObjectId) -> Result<ObjectKind> {
        let handle = self
            .index
            .lookup(id)?
            .ok_or(EngineError::Poisoned)?;
        Ok(handle.kind)
    }
}

/// Constructor recording every replicator it builds in a typed map.
fn replicator_constructor(
    store: Arc<dyn MessageStore>,
    map: ReplicatorMap,
    schema: impl Fn() -> Arc<dyn canopy_core::ObjectSchema> + Send + Sync + 'static,
) -> canopy_sync::Constructor {
    Box::new(move |id| {
        let replicator = Arc::new(Mutex::new(Replicator::new(store.clone(), schema())));
        if let Ok(mut map) = map.lock() {
            map.insert(id.clone(), replicator.clone());
        }
        replicator
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(seed: u8) -> Engine {
        Engine::in_memory(Keypair::from_seed(&[seed; 32]))
    }

    #[test]
    fn test_publish_and_root() {
        let engine = engine(1);
        let channel = engine.own_object("chat");
        let mut fx = Effects::new();

        assert!(engine.channel_root(&channel).unwrap().is_empty());
        let position = engine
            .publish(&channel, 0, b"hello".to_vec(), &mut fx)
            .unwrap();
        assert_eq!(position, Some(0));
        assert!(!engine.channel_root(&channel).unwrap().is_empty());
    }

    #[test]
    fn test_kind_mismatch_is_an_error() {
        let engine = engine(1);
        let id = engine.own_object("thing");
        engine.open_channel(&id).unwrap();
        assert!(matches!(
            engine.open_subscriptions(&id),
            Err(EngineError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_identity_opens_once() {
        let engine = engine(1);
        let id = engine.own_object("identity");
        let first = engine.identity(&id).unwrap();
        let second = engine.identity(&id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_sessions_share_the_index() {
        let engine = engine(1);
        let channel = engine.own_object("chat");
        let mut fx = Effects::new();
        engine.publish(&channel, 0, b"hi".to_vec(), &mut fx).unwrap();

        let mut session = engine.session(Role::Initiator);
        session.push(channel, ObjectKind::Channel);
        assert!(session.has_pending());
    }
}
