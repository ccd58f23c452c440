//! # Canopy
//!
//! Coordination-free replication of keyed record sets.
//!
//! Each replicated object is a dense Merkle tree over integer positions;
//! replicas converge by comparing subtree hashes and exchanging only the
//! leaves that differ. Conflicting leaves at one position reconcile
//! through a per-kind merge that is commutative, associative, and
//! idempotent, so the outcome never depends on delivery order.
//!
//! The [`Engine`] is the front door: it owns the store and the object
//! index, opens channels, subscription sets, and identity chains, and
//! mints [`SyncSession`]s for connections. The engine performs no I/O -
//! feed inbound frames to a session and write its output frames to your
//! transport.
//!
//! ```
//! use canopy::{Effects, Engine, Keypair, ObjectKind, Role};
//!
//! let engine = Engine::in_memory(Keypair::from_seed(&[7; 32]));
//! let chat = engine.own_object("chat");
//!
//! let mut fx = Effects::new();
//! engine.publish(&chat, 0, b"hello".to_vec(), &mut fx).unwrap();
//!
//! let mut session = engine.session(Role::Initiator);
//! session.push(chat, ObjectKind::Channel);
//! ```

pub mod engine;
pub mod error;

pub use engine::Engine;
pub use error::{EngineError, Result};

pub use canopy_core::{Effects, Hash32, Keypair, ObjectId, ObjectKind, PublicKey, SeqRange};
pub use canopy_identity::{ForkDb, IdentityBlock, IdentityDb};
pub use canopy_store::{MemoryStore, MessageStore, SqliteStore};
pub use canopy_sync::{
    ChannelMessage, Role, StreamId, SubscriptionEntry, SyncMessage, SyncSession,
};
