//! Golden test vectors for deterministic verification.
//!
//! Canonical CBOR vectors pin the byte-level encoding, block vectors pin
//! header hashing, and page vectors pin the in-order page layout across
//! implementations. The expected CBOR bytes follow RFC 8949
//! deterministic encoding, written out by hand; the page coordinates are
//! worked out by hand from the layout rules.

use ciborium::value::Value;

use canopy_core::canonical::encode_canonical;
use canopy_core::{Hash32, Keypair, SeqRange};
use canopy_identity::IdentityBlock;
use canopy_tree::page;

/// A canonical-encoding golden vector.
pub struct CanonicalVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// The value to encode.
    pub value: Value,
    /// Expected canonical bytes, hex.
    pub expected_hex: &'static str,
}

/// All canonical-encoding vectors.
pub fn canonical_vectors() -> Vec<CanonicalVector> {
    vec![
        CanonicalVector {
            name: "integer zero",
            value: Value::Integer(0.into()),
            expected_hex: "00",
        },
        CanonicalVector {
            name: "integer 23 stays immediate",
            value: Value::Integer(23.into()),
            expected_hex: "17",
        },
        CanonicalVector {
            name: "integer 24 takes one extra byte",
            value: Value::Integer(24.into()),
            expected_hex: "1818",
        },
        CanonicalVector {
            name: "integer 1000",
            value: Value::Integer(1000.into()),
            expected_hex: "1903e8",
        },
        CanonicalVector {
            name: "two byte string",
            value: Value::Bytes(vec![0xde, 0xad]),
            expected_hex: "42dead",
        },
        CanonicalVector {
            name: "text hi",
            value: Value::Text("hi".into()),
            expected_hex: "626869",
        },
        CanonicalVector {
            name: "array of two small integers",
            value: Value::Array(vec![Value::Integer(1.into()), Value::Integer(2.into())]),
            expected_hex: "820102",
        },
        CanonicalVector {
            name: "single entry map",
            value: Value::Map(vec![(Value::Integer(1.into()), Value::Text("a".into()))]),
            expected_hex: "a1016161",
        },
    ]
}

/// Verify every canonical vector, returning (name, matched, got-hex).
pub fn verify_canonical_vectors() -> Vec<(String, bool, String)> {
    canonical_vectors()
        .iter()
        .map(|v| {
            let got = hex::encode(encode_canonical(&v.value));
            let matched = got == v.expected_hex;
            (v.name.to_string(), matched, got)
        })
        .collect()
}

/// A deterministic identity-block vector.
pub struct BlockVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Seed for the rotated-to key.
    pub key_seed: [u8; 32],
    /// Seeds for the witness keys, in order.
    pub witness_seeds: &'static [[u8; 32]],
    /// Chain height.
    pub height: u64,
}

/// All identity-block vectors.
pub fn block_vectors() -> Vec<BlockVector> {
    vec![
        BlockVector {
            name: "genesis with one witness",
            key_seed: [0x42; 32],
            witness_seeds: &[[0x01; 32]],
            height: 0,
        },
        BlockVector {
            name: "height three, two witnesses",
            key_seed: [0x42; 32],
            witness_seeds: &[[0x01; 32], [0x02; 32]],
            height: 3,
        },
        BlockVector {
            name: "no witnesses",
            key_seed: [0x00; 32],
            witness_seeds: &[],
            height: 1,
        },
    ]
}

/// Build the block a vector describes.
pub fn block_from_vector(vector: &BlockVector) -> IdentityBlock {
    IdentityBlock::new(
        Hash32::EMPTY,
        Keypair::from_seed(&vector.key_seed).public_key(),
        vector
            .witness_seeds
            .iter()
            .map(|seed| Keypair::from_seed(seed).public_key())
            .collect(),
        vector.height,
    )
}

/// A page-layout golden vector: one tree address pinned to its storage
/// coordinates.
pub struct PageVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Range start.
    pub start: u64,
    /// Range depth.
    pub depth: u8,
    /// Expected in-order page number.
    pub page: u64,
    /// Expected in-page slot.
    pub slot: usize,
}

/// All page-layout vectors, worked out by hand for depth-7 pages.
pub fn page_vectors() -> Vec<PageVector> {
    vec![
        PageVector {
            name: "first leaf opens the bottom row of page zero",
            start: 0,
            depth: 0,
            page: 0,
            slot: 64,
        },
        PageVector {
            name: "leaf five sits five slots along",
            start: 5,
            depth: 0,
            page: 0,
            slot: 69,
        },
        PageVector {
            name: "last leaf of page zero",
            start: 63,
            depth: 0,
            page: 0,
            slot: 127,
        },
        PageVector {
            name: "leaf 64 starts the second leaf page",
            start: 64,
            depth: 0,
            page: 1,
            slot: 64,
        },
        PageVector {
            name: "page zero's root node is its slot one",
            start: 0,
            depth: 6,
            page: 0,
            slot: 1,
        },
        PageVector {
            name: "depth seven crosses into the first level-one page",
            start: 0,
            depth: 7,
            page: 64,
            slot: 64,
        },
        PageVector {
            name: "the level-one page root",
            start: 0,
            depth: 13,
            page: 64,
            slot: 1,
        },
        PageVector {
            name: "second leaf page's root node",
            start: 64,
            depth: 6,
            page: 1,
            slot: 1,
        },
    ]
}

/// In-order page numbers pinned for depth-7 pages: the leftmost 128
/// leaf pages, then their level-one parent after its left half.
pub fn page_number_vectors() -> Vec<(u8, u64, u64)> {
    vec![
        (0, 0, 0),
        (0, 1, 1),
        (0, 63, 63),
        (1, 0, 64),
        (0, 64, 65),
        (0, 127, 128),
        (0, 128, 129),
        (1, 1, 193),
        (2, 0, 8256),
    ]
}

/// Verify every page vector both directions, returning (name, matched).
pub fn verify_page_vectors() -> Vec<(String, bool)> {
    page_vectors()
        .iter()
        .map(|v| {
            let matched = match SeqRange::new(v.start, v.depth) {
                Ok(range) => {
                    let addr = page::page_of(&range);
                    addr.page == v.page
                        && addr.slot == v.slot
                        && page::range_of(v.page, v.slot) == Some(range)
                }
                Err(_) => false,
            };
            (v.name.to_string(), matched)
        })
        .collect()
}
