//! # Canopy Sync
//!
//! The anti-entropy layer: two replicas of a keyed record set converge
//! by exchanging only the parts that differ, with no coordinator and no
//! ordered-delivery assumption.
//!
//! ## Layers
//!
//! - [`Replicator`] runs the recursive tree diff for one object: compare
//!   hashes top-down, descend only on mismatch, merge leaves on receipt.
//! - [`SyncSession`] multiplexes many objects over stream ids on one
//!   connection, opening objects lazily and cascading discovery.
//! - [`codec`] frames messages for the wire; [`Sink`] is the seam to the
//!   transport - the core itself performs no I/O.
//!
//! Every call does a bounded amount of work, so a session is safe to
//! drive from one event loop per connection. Dropping a session discards
//! its queues; calling `start` again after reconnecting is always
//! correct, merge idempotence makes reprocessing safe.

pub mod codec;
pub mod error;
pub mod messages;
pub mod objects;
pub mod replicator;
pub mod schemas;
pub mod session;
pub mod transport;

pub use error::{Result, SyncError};
pub use messages::{StreamId, SyncMessage};
pub use objects::{Constructor, ObjectHandle, ObjectIndex, Registry};
pub use replicator::{ReplicatedObject, Replicator};
pub use schemas::{ChannelMessage, ChannelSchema, SubscriptionEntry, SubscriptionSchema};
pub use session::{Role, SyncSession};
pub use transport::{FrameSink, Sink};
