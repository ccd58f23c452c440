//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::collections::VecDeque;

use canopy::{Effects, Engine, Role, StreamId, SyncMessage, SyncSession};
use canopy_core::{Hash32, Keypair, ObjectId, PublicKey};
use canopy_identity::IdentityBlock;

/// A test fixture with a deterministic keypair and in-memory engine.
pub struct TestFixture {
    pub keypair: Keypair,
    pub engine: Engine,
}

impl TestFixture {
    /// Create a fixture with a random keypair.
    pub fn new() -> Self {
        Self::from_keypair(Keypair::generate())
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::from_keypair(Keypair::from_seed(&seed))
    }

    fn from_keypair(keypair: Keypair) -> Self {
        let engine = Engine::in_memory(keypair.clone());
        Self { keypair, engine }
    }

    /// Get the fixture's public key.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// An object id owned by this fixture.
    pub fn object(&self, name: &str) -> ObjectId {
        self.engine.own_object(name)
    }

    /// Publish into an owned channel, discarding effects.
    pub fn publish(&self, name: &str, seq: u64, body: &[u8]) -> Option<u64> {
        let mut fx = Effects::new();
        self.engine
            .publish(&self.object(name), seq, body.to_vec(), &mut fx)
            .expect("publish")
    }

    /// Build a genesis identity block witnessed by this fixture's key.
    pub fn genesis_block(&self) -> IdentityBlock {
        let mut block = IdentityBlock::new(
            Hash32::EMPTY,
            self.public_key(),
            vec![self.public_key()],
            0,
        );
        block.sign_with(&self.keypair, 0);
        block
    }

    /// Build a successor block witnessed by this fixture's key.
    pub fn next_block(&self, previous: &IdentityBlock) -> IdentityBlock {
        let mut block = IdentityBlock::new(
            previous.header_hash(),
            self.public_key(),
            previous.witness_keys.clone(),
            previous.height + 1,
        );
        block.sign_with(&self.keypair, 0);
        block
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple fixtures with distinct deterministic keys.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            seed[1] = 0xf1;
            TestFixture::with_seed(seed)
        })
        .collect()
}

/// One endpoint of an in-memory wire.
pub struct WireEnd {
    pub session: SyncSession,
    pub inbox: VecDeque<(StreamId, SyncMessage)>,
}

/// A pair of sessions joined by a lossless FIFO wire.
pub struct SessionPair {
    pub initiator: WireEnd,
    pub responder: WireEnd,
}

impl SessionPair {
    /// Connect two engines.
    pub fn connect(initiator: &Engine, responder: &Engine) -> Self {
        Self {
            initiator: WireEnd {
                session: initiator.session(Role::Initiator),
                inbox: VecDeque::new(),
            },
            responder: WireEnd {
                session: responder.session(Role::Responder),
                inbox: VecDeque::new(),
            },
        }
    }

    /// Drive both sessions until neither has work, or panic after the
    /// iteration budget.
    pub fn pump(&mut self) {
        for _ in 0..100_000 {
            let mut out: Vec<(StreamId, SyncMessage)> = Vec::new();
            if self.initiator.session.has_pending() {
                self.initiator.session.send(&mut out).expect("send");
                self.responder.inbox.extend(out.drain(..));
            }
            if self.responder.session.has_pending() {
                self.responder.session.send(&mut out).expect("send");
                self.initiator.inbox.extend(out.drain(..));
            }
            if let Some((stream_id, message)) = self.initiator.inbox.pop_front() {
                let mut replies = Vec::new();
                self.initiator
                    .session
                    .recv(stream_id, message, &mut replies)
                    .expect("recv");
                self.responder.inbox.extend(replies);
            }
            if let Some((stream_id, message)) = self.responder.inbox.pop_front() {
                let mut replies = Vec::new();
                self.responder
                    .session
                    .recv(stream_id, message, &mut replies)
                    .expect("recv");
                self.initiator.inbox.extend(replies);
            }
            if self.is_quiescent() {
                return;
            }
        }
        panic!("session pair never went quiescent");
    }

    fn is_quiescent(&self) -> bool {
        !self.initiator.session.has_pending()
            && !self.responder.session.has_pending()
            && self.initiator.inbox.is_empty()
            && self.responder.inbox.is_empty()
    }
}
