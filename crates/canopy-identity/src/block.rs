//! Identity blocks: signed key-rotation records.
//!
//! A block's identity is the hash of its header - everything except the
//! signature set - so accumulating witness signatures never changes the
//! hash a successor chains to. Blocks sharing `(previous_hash,
//! public_key)` are views of one logical block and merge by signature
//! union.

use ciborium::value::Value;

use canopy_core::canonical::{
    decode_value, encode_canonical, map_get_array, map_get_bytes, map_get_u64,
};
use canopy_core::{Hash32, Keypair, PublicKey, Signature};

use crate::error::{IdentityError, Result};

/// One witness's endorsement of a block.
///
/// `sequence` versions the endorsement: a signer may re-sign later with
/// a higher sequence, and merges keep only the highest per signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessSignature {
    /// Per-signer version of this endorsement.
    pub sequence: u64,
    /// Signature over the header bytes and the sequence.
    pub signature: Signature,
    /// The signing identity.
    pub signer: PublicKey,
}

/// One record in an identity chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityBlock {
    /// Header hash of the block this one succeeds; the empty hash for
    /// a genesis block.
    pub previous_hash: Hash32,
    /// The key this block rotates to.
    pub public_key: PublicKey,
    /// Keys entitled to witness the *next* block.
    pub witness_keys: Vec<PublicKey>,
    /// Chain height, genesis = 0.
    pub height: u64,
    /// Accumulated witness endorsements.
    pub signatures: Vec<WitnessSignature>,
}

impl IdentityBlock {
    /// Create an unsigned block.
    pub fn new(
        previous_hash: Hash32,
        public_key: PublicKey,
        witness_keys: Vec<PublicKey>,
        height: u64,
    ) -> Self {
        Self {
            previous_hash,
            public_key,
            witness_keys,
            height,
            signatures: Vec::new(),
        }
    }

    /// The group key: blocks agreeing on it are views of one block.
    pub fn group_key(&self) -> (Hash32, PublicKey) {
        (self.previous_hash, self.public_key)
    }

    /// Canonical bytes of the header (everything but signatures).
    pub fn header_bytes(&self) -> Vec<u8> {
        encode_canonical(&self.header_value())
    }

    /// The block's identity: hash of the header bytes.
    pub fn header_hash(&self) -> Hash32 {
        Hash32::hash(&self.header_bytes())
    }

    /// The message a witness signs for a given sequence.
    pub fn signing_message(&self, sequence: u64) -> Vec<u8> {
        let mut message = self.header_bytes();
        message.extend_from_slice(&sequence.to_be_bytes());
        message
    }

    /// Endorse this block, replacing any prior endorsement by the same
    /// signer with a lower sequence.
    pub fn sign_with(&mut self, keypair: &Keypair, sequence: u64) {
        let signature = WitnessSignature {
            sequence,
            signature: keypair.sign(&self.signing_message(sequence)),
            signer: keypair.public_key(),
        };
        self.signatures
            .retain(|s| s.signer != signature.signer || s.sequence > sequence);
        if !self.signatures.iter().any(|s| s.signer == signature.signer) {
            self.signatures.push(signature);
        }
        self.sort_signatures();
    }

    /// Verify every endorsement on this block.
    pub fn verify(&self) -> bool {
        self.signatures.iter().all(|s| {
            s.signer
                .verify(&self.signing_message(s.sequence), &s.signature)
                .is_ok()
        })
    }

    /// Sort signatures into canonical order (by signer key).
    pub fn sort_signatures(&mut self) {
        self.signatures.sort_by(|a, b| a.signer.cmp(&b.signer));
    }

    fn header_value(&self) -> Value {
        Value::Map(vec![
            (
                Value::Integer(1.into()),
                Value::Bytes(self.previous_hash.as_bytes().to_vec()),
            ),
            (
                Value::Integer(2.into()),
                Value::Bytes(self.public_key.as_bytes().to_vec()),
            ),
            (
                Value::Integer(3.into()),
                Value::Array(
                    self.witness_keys
                        .iter()
                        .map(|k| Value::Bytes(k.as_bytes().to_vec()))
                        .collect(),
                ),
            ),
            (Value::Integer(4.into()), Value::Integer(self.height.into())),
        ])
    }

    /// The block as a CBOR value, signatures included.
    pub fn to_value(&self) -> Value {
        let Value::Map(mut entries) = self.header_value() else {
            unreachable!("header is always a map");
        };
        entries.push((
            Value::Integer(5.into()),
            Value::Array(
                self.signatures
                    .iter()
                    .map(|s| {
                        Value::Map(vec![
                            (Value::Integer(1.into()), Value::Integer(s.sequence.into())),
                            (
                                Value::Integer(2.into()),
                                Value::Bytes(s.signature.as_bytes().to_vec()),
                            ),
                            (
                                Value::Integer(3.into()),
                                Value::Bytes(s.signer.as_bytes().to_vec()),
                            ),
                        ])
                    })
                    .collect(),
            ),
        ));
        Value::Map(entries)
    }

    /// Parse a block from a CBOR value.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Map(entries) = value else {
            return Err(IdentityError::Decode("block not a map".into()));
        };
        let previous_hash = Hash32::from_bytes(fixed::<32>(map_get_bytes(entries, 1)?)?);
        let public_key = PublicKey::from_bytes(fixed::<32>(map_get_bytes(entries, 2)?)?);
        let witness_keys = map_get_array(entries, 3)?
            .iter()
            .map(|v| match v {
                Value::Bytes(b) => Ok(PublicKey::from_bytes(fixed::<32>(b)?)),
                _ => Err(IdentityError::Decode("witness key not bytes".into())),
            })
            .collect::<Result<Vec<_>>>()?;
        let height = map_get_u64(entries, 4)?;
        let signatures = map_get_array(entries, 5)?
            .iter()
            .map(|v| {
                let Value::Map(sig) = v else {
                    return Err(IdentityError::Decode("signature not a map".into()));
                };
                Ok(WitnessSignature {
                    sequence: map_get_u64(sig, 1)?,
                    signature: Signature::from_bytes(fixed::<64>(map_get_bytes(sig, 2)?)?),
                    signer: PublicKey::from_bytes(fixed::<32>(map_get_bytes(sig, 3)?)?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            previous_hash,
            public_key,
            witness_keys,
            height,
            signatures,
        })
    }

    /// Canonical CBOR bytes of the whole block.
    pub fn encode(&self) -> Vec<u8> {
        encode_canonical(&self.to_value())
    }

    /// Parse a block from canonical CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_value(&decode_value(bytes)?)
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| IdentityError::Decode(format!("expected {N} bytes, got {}", bytes.len())))
}
