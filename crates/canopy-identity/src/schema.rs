//! Syncing an identity chain as a replicated object.
//!
//! The tree position of an identity leaf is its chain height; the leaf
//! payload at that position is the full group list for the height. Two
//! replicas disagreeing on a height merge by group union, so the fork
//! database on every replica eventually observes every group and both
//! derive the same canonical chain.

use std::sync::{Arc, Mutex};

use tracing::warn;

use canopy_core::{Effects, Hash32, ObjectId, ObjectKind, ObjectSchema};
use canopy_store::MessageStore;
use canopy_sync::{ObjectHandle, Replicator};

use crate::block::IdentityBlock;
use crate::error::{IdentityError, Result};
use crate::forkdb::{decode_height_leaf, encode_height_leaf, merge_groups, ForkDb};

/// [`ObjectSchema`] for identity chains.
///
/// `position` rejects a leaf outright if *any* of its signatures fails
/// to verify. Stripping just the bad signature inside `merge` would
/// break idempotence, so validation happens once, up front, and merge
/// only ever sees leaves whose every signature checks out.
pub struct IdentitySchema {
    db: Arc<Mutex<ForkDb>>,
}

impl IdentitySchema {
    /// Schema feeding the given fork database.
    pub fn new(db: Arc<Mutex<ForkDb>>) -> Self {
        Self { db }
    }
}

impl ObjectSchema for IdentitySchema {
    fn position(&self, payload: &[u8]) -> Option<u64> {
        let groups = decode_height_leaf(payload).ok()?;
        if !groups.iter().all(IdentityBlock::verify) {
            warn!("identity leaf with unverifiable signature dropped");
            return None;
        }
        groups.first().map(|g| g.height)
    }

    fn merge(&self, ours: &[u8], theirs: &[u8]) -> Vec<u8> {
        match (decode_height_leaf(ours), decode_height_leaf(theirs)) {
            (Ok(a), Ok(b)) => encode_height_leaf(&merge_groups(&a, &b)),
            // Unreachable for leaves that passed position; still total
            // and commutative so the merge laws hold unconditionally.
            _ => {
                if Hash32::hash(ours) <= Hash32::hash(theirs) {
                    ours.to_vec()
                } else {
                    theirs.to_vec()
                }
            }
        }
    }

    fn applied(&self, payload: &[u8], _fx: &mut Effects) {
        let Ok(groups) = decode_height_leaf(payload) else {
            return;
        };
        let Some(first) = groups.first() else { return };
        let height = first.height;
        match self.db.lock() {
            Ok(mut db) => db.merge_height(height, groups),
            Err(_) => warn!("fork database lock poisoned; leaf not applied"),
        }
    }
}

/// An identity chain wired for replication.
///
/// Owns the fork database and a [`Replicator`] whose schema feeds it;
/// local appends and remote leaves land in the same place.
pub struct IdentityDb {
    id: ObjectId,
    db: Arc<Mutex<ForkDb>>,
    replicator: Arc<Mutex<Replicator>>,
}

impl IdentityDb {
    /// Open an identity object backed by the given store.
    pub fn open(id: ObjectId, store: Arc<dyn MessageStore>) -> Self {
        let db = Arc::new(Mutex::new(ForkDb::new()));
        let schema = Arc::new(IdentitySchema::new(db.clone()));
        let replicator = Arc::new(Mutex::new(Replicator::new(store, schema)));
        Self { id, db, replicator }
    }

    /// The object id this chain syncs under.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Merge a locally observed block and publish its height leaf.
    pub fn append(&self, block: IdentityBlock, fx: &mut Effects) -> Result<()> {
        let height = block.height;
        let leaf = {
            let mut db = self.db.lock().map_err(|_| IdentityError::Poisoned)?;
            db.merge_block(block);
            db.leaf_at(height)
        };
        let Some(leaf) = leaf else { return Ok(()) };
        self.replicator
            .lock()
            .map_err(|_| IdentityError::Poisoned)?
            .insert(&leaf, fx)?;
        Ok(())
    }

    /// Read the fork database.
    pub fn with_db<R>(&self, f: impl FnOnce(&ForkDb) -> R) -> Result<R> {
        let db = self.db.lock().map_err(|_| IdentityError::Poisoned)?;
        Ok(f(&db))
    }

    /// The canonical tip's header hash, if a chain exists.
    pub fn canonical_head(&self) -> Result<Option<Hash32>> {
        self.with_db(|db| db.canonical_head().map(|entry| entry.hash))
    }

    /// A session-bindable handle to the underlying replicator.
    pub fn handle(&self) -> ObjectHandle {
        ObjectHandle {
            kind: ObjectKind::Identity,
            object: self.replicator.clone(),
        }
    }

    /// The replicator, for direct inspection.
    pub fn replicator(&self) -> Arc<Mutex<Replicator>> {
        self.replicator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{Keypair, PublicKey};
    use canopy_store::MemoryStore;

    fn keypair(seed: u8) -> Keypair {
        Keypair::from_seed(&[seed; 32])
    }

    fn signed_block(previous: Hash32, height: u64, signer_seeds: &[u8]) -> IdentityBlock {
        let mut b = IdentityBlock::new(
            previous,
            keypair(1).public_key(),
            vec![keypair(2).public_key()],
            height,
        );
        for &seed in signer_seeds {
            b.sign_with(&keypair(seed), 0);
        }
        b
    }

    fn identity_id() -> ObjectId {
        ObjectId::new(PublicKey::from_bytes([0x1d; 32]), "identity")
    }

    #[test]
    fn test_position_is_height() {
        let schema = IdentitySchema::new(Arc::new(Mutex::new(ForkDb::new())));
        let leaf = encode_height_leaf(&[signed_block(Hash32::EMPTY, 6, &[3])]);
        assert_eq!(schema.position(&leaf), Some(6));
    }

    #[test]
    fn test_position_rejects_bad_signature() {
        let schema = IdentitySchema::new(Arc::new(Mutex::new(ForkDb::new())));
        let mut block = signed_block(Hash32::EMPTY, 0, &[3]);
        block.signatures[0].sequence += 1;
        let leaf = encode_height_leaf(&[block]);
        assert_eq!(schema.position(&leaf), None);
    }

    #[test]
    fn test_merge_unions_groups() {
        let schema = IdentitySchema::new(Arc::new(Mutex::new(ForkDb::new())));
        let ours = encode_height_leaf(&[signed_block(Hash32::EMPTY, 0, &[3])]);
        let theirs = encode_height_leaf(&[signed_block(Hash32::EMPTY, 0, &[4])]);

        let merged = schema.merge(&ours, &theirs);
        assert_eq!(merged, schema.merge(&theirs, &ours));
        let groups = decode_height_leaf(&merged).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].signatures.len(), 2);
    }

    #[test]
    fn test_applied_leaf_reaches_fork_db() {
        let db = IdentityDb::open(identity_id(), Arc::new(MemoryStore::new()));
        let leaf = encode_height_leaf(&[signed_block(Hash32::EMPTY, 0, &[3, 4])]);

        let mut fx = Effects::new();
        let replicator = db.replicator();
        let position = replicator.lock().unwrap().insert(&leaf, &mut fx).unwrap();
        assert_eq!(position, Some(0));

        assert_eq!(db.with_db(|db| db.canonical().len()).unwrap(), 1);
        assert_eq!(
            db.with_db(|db| db.canonical()[0].block.signatures.len())
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_append_publishes_merged_leaf() {
        let db = IdentityDb::open(identity_id(), Arc::new(MemoryStore::new()));
        let mut fx = Effects::new();

        let genesis = signed_block(Hash32::EMPTY, 0, &[3]);
        let next = signed_block(genesis.header_hash(), 1, &[3, 4]);
        db.append(genesis.clone(), &mut fx).unwrap();
        db.append(next, &mut fx).unwrap();

        assert_eq!(db.with_db(|db| db.canonical().len()).unwrap(), 2);
        assert!(db.canonical_head().unwrap().is_some());

        // The published tree covers both heights.
        let root = db.replicator().lock().unwrap().root_hash();
        assert!(!root.is_empty());
    }
}
