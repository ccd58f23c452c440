//! Proptest generators for property-based testing.

use proptest::prelude::*;

use canopy_core::{Hash32, Keypair, ObjectId, ObjectKind, PublicKey, SeqRange};
use canopy_identity::IdentityBlock;
use canopy_sync::{ChannelMessage, SubscriptionEntry};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random public key.
pub fn public_key() -> impl Strategy<Value = PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

/// Generate a random hash.
pub fn hash32() -> impl Strategy<Value = Hash32> {
    any::<[u8; 32]>().prop_map(Hash32::from_bytes)
}

/// Generate an aligned range (bounded so cases stay meaningful).
pub fn seq_range() -> impl Strategy<Value = SeqRange> {
    (0u8..=32, 0u64..=0xFFFF).prop_map(|(depth, index)| {
        SeqRange::new(index << depth, depth).expect("aligned by construction")
    })
}

/// Generate an object kind.
pub fn object_kind() -> impl Strategy<Value = ObjectKind> {
    prop_oneof![
        Just(ObjectKind::Channel),
        Just(ObjectKind::Subscriptions),
        Just(ObjectKind::Identity),
    ]
}

/// Generate an object name.
pub fn object_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,31}".prop_map(String::from)
}

/// Generate an object id.
pub fn object_id() -> impl Strategy<Value = ObjectId> {
    (public_key(), object_name()).prop_map(|(owner, name)| ObjectId::new(owner, name))
}

/// Generate payload bytes up to a maximum length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate an encoded channel message.
pub fn channel_message() -> impl Strategy<Value = Vec<u8>> {
    (0u64..=1_000_000, payload(256)).prop_map(|(seq, body)| ChannelMessage { seq, body }.encode())
}

/// Generate an encoded subscription entry.
pub fn subscription_entry() -> impl Strategy<Value = Vec<u8>> {
    (0u64..=1_000_000, object_id(), object_kind()).prop_map(|(seq, id, kind)| {
        SubscriptionEntry {
            seq,
            owner: id.owner,
            name: id.name,
            kind,
        }
        .encode()
    })
}

/// Generate a signed identity block at the given height.
pub fn identity_block(height: u64) -> impl Strategy<Value = IdentityBlock> {
    (
        hash32(),
        any::<[u8; 32]>(),
        prop::collection::vec(any::<[u8; 32]>(), 1..=4),
    )
        .prop_map(move |(previous, key_seed, signer_seeds)| {
            let mut block = IdentityBlock::new(
                previous,
                Keypair::from_seed(&key_seed).public_key(),
                Vec::new(),
                height,
            );
            for seed in signer_seeds {
                block.sign_with(&Keypair::from_seed(&seed), 0);
            }
            block
        })
}
