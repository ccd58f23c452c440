//! Shipped leaf schemas: message channels and subscription sets.
//!
//! Both key their leaves by an explicit sequence number inside the
//! payload (positions must be a pure function of the bytes, or replicas
//! disagree on tree shape) and resolve same-position conflicts by
//! keeping the payload with the smaller content hash - a deterministic
//! total order, so the merge is commutative, associative, and
//! idempotent.

use ciborium::value::Value;

use canopy_core::canonical::{
    decode_value, encode_canonical, map_get_bytes, map_get_text, map_get_u64,
};
use canopy_core::{CoreError, Effects, Hash32, ObjectId, ObjectKind, ObjectSchema, PublicKey};

/// Keep whichever payload hashes smaller. Ties mean equal bytes.
fn smaller_by_hash(ours: &[u8], theirs: &[u8]) -> Vec<u8> {
    if Hash32::hash(ours) <= Hash32::hash(theirs) {
        ours.to_vec()
    } else {
        theirs.to_vec()
    }
}

/// One message in an append-only channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    /// Position in the channel.
    pub seq: u64,
    /// Opaque message body.
    pub body: Vec<u8>,
}

impl ChannelMessage {
    /// Canonical CBOR bytes: `{1: seq, 2: body}`.
    pub fn encode(&self) -> Vec<u8> {
        encode_canonical(&Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(self.seq.into())),
            (Value::Integer(2.into()), Value::Bytes(self.body.clone())),
        ]))
    }

    /// Parse from canonical CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        let Value::Map(entries) = decode_value(bytes)? else {
            return Err(CoreError::DecodingError("channel leaf not a map".into()));
        };
        Ok(Self {
            seq: map_get_u64(&entries, 1)?,
            body: map_get_bytes(&entries, 2)?.to_vec(),
        })
    }
}

/// Schema for append-only message channels keyed by sequence number.
pub struct ChannelSchema;

impl ObjectSchema for ChannelSchema {
    fn position(&self, payload: &[u8]) -> Option<u64> {
        ChannelMessage::decode(payload).ok().map(|m| m.seq)
    }

    fn merge(&self, ours: &[u8], theirs: &[u8]) -> Vec<u8> {
        smaller_by_hash(ours, theirs)
    }
}

/// One entry in a subscription set: interest in another object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEntry {
    /// Position in the subscription set.
    pub seq: u64,
    /// Owner of the referenced object.
    pub owner: PublicKey,
    /// Name of the referenced object.
    pub name: String,
    /// Kind of the referenced object.
    pub kind: ObjectKind,
}

impl SubscriptionEntry {
    /// Canonical CBOR bytes: `{1: seq, 2: owner, 3: name, 4: kind}`.
    pub fn encode(&self) -> Vec<u8> {
        encode_canonical(&Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(self.seq.into())),
            (
                Value::Integer(2.into()),
                Value::Bytes(self.owner.as_bytes().to_vec()),
            ),
            (Value::Integer(3.into()), Value::Text(self.name.clone())),
            (
                Value::Integer(4.into()),
                Value::Integer(self.kind.to_u8().into()),
            ),
        ]))
    }

    /// Parse from canonical CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        let Value::Map(entries) = decode_value(bytes)? else {
            return Err(CoreError::DecodingError(
                "subscription leaf not a map".into(),
            ));
        };
        let owner: [u8; 32] = map_get_bytes(&entries, 2)?
            .try_into()
            .map_err(|_| CoreError::DecodingError("owner key not 32 bytes".into()))?;
        let kind = map_get_u64(&entries, 4)?;
        let kind = u8::try_from(kind)
            .map_err(|_| CoreError::UnknownObjectKind(u8::MAX))
            .and_then(ObjectKind::from_u8)?;
        Ok(Self {
            seq: map_get_u64(&entries, 1)?,
            owner: PublicKey::from_bytes(owner),
            name: map_get_text(&entries, 3)?.to_owned(),
            kind,
        })
    }

    /// The referenced object's identifier.
    pub fn object_id(&self) -> ObjectId {
        ObjectId::new(self.owner, self.name.clone())
    }
}

/// Schema for subscription sets. Applying an entry cascades interest:
/// the session starts syncing the referenced object too.
pub struct SubscriptionSchema;

impl ObjectSchema for SubscriptionSchema {
    fn position(&self, payload: &[u8]) -> Option<u64> {
        SubscriptionEntry::decode(payload).ok().map(|e| e.seq)
    }

    fn merge(&self, ours: &[u8], theirs: &[u8]) -> Vec<u8> {
        smaller_by_hash(ours, theirs)
    }

    fn applied(&self, payload: &[u8], fx: &mut Effects) {
        if let Ok(entry) = SubscriptionEntry::decode(payload) {
            fx.push(entry.object_id(), entry.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_channel_roundtrip() {
        let message = ChannelMessage {
            seq: 42,
            body: b"hello".to_vec(),
        };
        assert_eq!(
            ChannelMessage::decode(&message.encode()).unwrap(),
            message
        );
        assert_eq!(ChannelSchema.position(&message.encode()), Some(42));
    }

    #[test]
    fn test_subscription_roundtrip_and_cascade() {
        let entry = SubscriptionEntry {
            seq: 1,
            owner: PublicKey::from_bytes([9; 32]),
            name: "feed".into(),
            kind: ObjectKind::Channel,
        };
        let bytes = entry.encode();
        assert_eq!(SubscriptionEntry::decode(&bytes).unwrap(), entry);

        let mut fx = Effects::new();
        SubscriptionSchema.applied(&bytes, &mut fx);
        let pushes = fx.take_pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].0, entry.object_id());
        assert_eq!(pushes[0].1, ObjectKind::Channel);
    }

    #[test]
    fn test_garbage_payload_is_invalid() {
        assert_eq!(ChannelSchema.position(b"not cbor"), None);
        assert_eq!(SubscriptionSchema.position(&[0xff, 0x00]), None);
    }

    proptest! {
        #[test]
        fn prop_merge_laws(
            a in proptest::collection::vec(any::<u8>(), 0..64),
            b in proptest::collection::vec(any::<u8>(), 0..64),
            c in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let schema = ChannelSchema;
            prop_assert_eq!(schema.merge(&a, &b), schema.merge(&b, &a));
            prop_assert_eq!(
                schema.merge(&schema.merge(&a, &b), &c),
                schema.merge(&a, &schema.merge(&b, &c))
            );
            prop_assert_eq!(schema.merge(&a, &a), a);
        }
    }
}
