//! Strong type definitions for replicated-object identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::PublicKey;
use crate::error::CoreError;

/// Names one replicated object: a dataset reconciled independently of all
/// others, owned by a single identity.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// The owning identity's public key.
    pub owner: PublicKey,
    /// Object name within the owner's namespace.
    pub name: String,
}

impl ObjectId {
    /// Create an object identifier.
    pub fn new(owner: PublicKey, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
        }
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}/{})", &self.owner.to_hex()[..16], self.name)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", &self.owner.to_hex()[..16], self.name)
    }
}

/// The closed set of replicated-object kinds.
///
/// The kind selects which handler the registry constructs when an object
/// is opened; it is carried on the wire in `Bind` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObjectKind {
    /// An append-only message channel keyed by sequence number.
    Channel = 1,
    /// A subscription set; applying its leaves cascades interest.
    Subscriptions = 2,
    /// A self-certifying identity chain keyed by height.
    Identity = 3,
}

impl ObjectKind {
    /// Convert to the wire tag.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from the wire tag.
    pub fn from_u8(value: u8) -> Result<Self, CoreError> {
        match value {
            1 => Ok(Self::Channel),
            2 => Ok(Self::Subscriptions),
            3 => Ok(Self::Identity),
            other => Err(CoreError::UnknownObjectKind(other)),
        }
    }
}
