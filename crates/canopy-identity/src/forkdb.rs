//! The fork database: competing identity blocks and the canonical chain.
//!
//! Every block ever observed stays grouped by height. The canonical
//! chain is *derived* state: height by height from genesis, among the
//! groups chained to the canonical block below, the one with the most
//! distinct signers wins (smaller header hash on ties). Any change to a
//! group's signature set recomputes the chain, and a flipped pick at
//! some height silently discards everything the old chain held above it.

use std::collections::BTreeMap;

use ciborium::value::Value;
use tracing::debug;

use canopy_core::canonical::{decode_value, encode_canonical};
use canopy_core::{Hash32, PublicKey};

use crate::block::IdentityBlock;
use crate::error::{IdentityError, Result};

/// One canonical block and its header hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEntry {
    /// Header hash successors chain to.
    pub hash: Hash32,
    /// The merged group at this height.
    pub block: IdentityBlock,
}

/// All observed identity blocks plus the derived canonical chain.
#[derive(Debug, Default)]
pub struct ForkDb {
    heights: BTreeMap<u64, Vec<IdentityBlock>>,
    canonical: Vec<CanonicalEntry>,
}

impl ForkDb {
    /// An empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one block into its height group and recompute the chain.
    pub fn merge_block(&mut self, block: IdentityBlock) {
        let height = block.height;
        let groups = self.heights.entry(height).or_default();
        *groups = merge_groups(groups, std::slice::from_ref(&block));
        self.recompute();
    }

    /// Merge a full height group list (from an applied sync leaf).
    pub fn merge_height(&mut self, height: u64, groups: Vec<IdentityBlock>) {
        let entry = self.heights.entry(height).or_default();
        *entry = merge_groups(entry, &groups);
        self.recompute();
    }

    /// Groups observed at a height, in canonical order.
    pub fn groups_at(&self, height: u64) -> &[IdentityBlock] {
        self.heights.get(&height).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The height leaf payload for syncing, if the height has groups.
    pub fn leaf_at(&self, height: u64) -> Option<Vec<u8>> {
        let groups = self.heights.get(&height)?;
        Some(encode_height_leaf(groups))
    }

    /// The canonical chain, genesis first.
    pub fn canonical(&self) -> &[CanonicalEntry] {
        &self.canonical
    }

    /// The chain's tip.
    pub fn canonical_head(&self) -> Option<&CanonicalEntry> {
        self.canonical.last()
    }

    fn recompute(&mut self) {
        let old_len = self.canonical.len();
        let mut canonical = Vec::new();
        let mut previous = Hash32::EMPTY;
        let mut height = 0u64;
        while let Some(groups) = self.heights.get(&height) {
            let best = groups
                .iter()
                .filter(|g| g.previous_hash == previous)
                .map(|g| (g.header_hash(), g))
                .max_by(|(hash_a, a), (hash_b, b)| {
                    // Most distinct signers wins; smaller hash on ties.
                    (distinct_signers(a).cmp(&distinct_signers(b)))
                        .then_with(|| hash_b.cmp(hash_a))
                });
            let Some((hash, block)) = best else { break };
            previous = hash;
            canonical.push(CanonicalEntry {
                hash,
                block: block.clone(),
            });
            height += 1;
        }
        if canonical.len() < old_len {
            debug!(
                from = canonical.len(),
                discarded = old_len - canonical.len(),
                "canonical chain truncated by fork choice"
            );
        }
        self.canonical = canonical;
    }
}

/// Merge two group lists, unioning signature sets of equal headers.
///
/// A signature commits to the whole header, so union happens only
/// between blocks whose headers hash identically; groups are keyed by
/// header hash and returned sorted by it. Set union keeping the highest
/// sequence per signer is commutative, associative, and idempotent, and
/// the sort is deterministic, so this is a lawful merge.
pub fn merge_groups(ours: &[IdentityBlock], theirs: &[IdentityBlock]) -> Vec<IdentityBlock> {
    let mut merged: BTreeMap<Hash32, IdentityBlock> = BTreeMap::new();
    for block in ours.iter().chain(theirs) {
        match merged.entry(block.header_hash()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(canonicalize(block));
            }
            std::collections::btree_map::Entry::Occupied(mut slot) => {
                union_signatures(slot.get_mut(), block);
            }
        }
    }
    merged.into_values().collect()
}

/// Collapse a block's signature list to one entry per signer.
///
/// Decoded blocks may carry several endorsements from one signer; only
/// the highest sequence survives, so a repeat signer never counts as
/// more than one vote in fork choice.
fn canonicalize(block: &IdentityBlock) -> IdentityBlock {
    let mut canonical = block.clone();
    canonical.signatures.clear();
    union_signatures(&mut canonical, block);
    canonical
}

/// Distinct signers endorsing a group: the fork-choice weight.
fn distinct_signers(block: &IdentityBlock) -> usize {
    let mut signers: Vec<&PublicKey> = block.signatures.iter().map(|s| &s.signer).collect();
    signers.sort();
    signers.dedup();
    signers.len()
}

/// Union `from`'s signatures into `into`, keeping the highest sequence
/// per signer (smaller signature bytes break exact-sequence ties).
fn union_signatures(into: &mut IdentityBlock, from: &IdentityBlock) {
    for sig in &from.signatures {
        match into.signatures.iter_mut().find(|s| s.signer == sig.signer) {
            Some(existing) => {
                let replace = sig.sequence > existing.sequence
                    || (sig.sequence == existing.sequence
                        && sig.signature.as_bytes() < existing.signature.as_bytes());
                if replace {
                    *existing = sig.clone();
                }
            }
            None => into.signatures.push(sig.clone()),
        }
    }
    into.sort_signatures();
}

/// Canonical CBOR bytes of a height's group list.
pub fn encode_height_leaf(groups: &[IdentityBlock]) -> Vec<u8> {
    encode_canonical(&Value::Array(
        groups.iter().map(IdentityBlock::to_value).collect(),
    ))
}

/// Parse a height leaf: a non-empty list of same-height groups.
pub fn decode_height_leaf(bytes: &[u8]) -> Result<Vec<IdentityBlock>> {
    let Value::Array(values) = decode_value(bytes)? else {
        return Err(IdentityError::Decode("height leaf not an array".into()));
    };
    let groups = values
        .iter()
        .map(IdentityBlock::from_value)
        .collect::<Result<Vec<_>>>()?;
    let Some(first) = groups.first() else {
        return Err(IdentityError::Decode("height leaf empty".into()));
    };
    if !groups.iter().all(|g| g.height == first.height) {
        return Err(IdentityError::Decode("mixed heights in one leaf".into()));
    }
    Ok(groups)
}
