//! Wire codec: fixed framing for sync messages.
//!
//! Frame layout: `[kind: u8][stream_id: u32 BE][body]`. Bodies use fixed
//! widths throughout - ranges as 8-byte big-endian start plus 1-byte
//! depth, hashes as 32 raw bytes, leaf payloads length-prefixed. Any
//! frame that fails to decode is fatal to the connection.

use bytes::{BufMut, Bytes};

use canopy_core::{Hash32, ObjectId, ObjectKind, PublicKey, SeqRange};

use crate::error::{Result, SyncError};
use crate::messages::{limits, StreamId, SyncMessage};

/// Encode one frame.
///
/// Enforces the same size limits as [`decode`]: an oversized leaf or
/// object name errors here instead of framing bytes every peer would
/// reject as malformed.
pub fn encode(stream_id: StreamId, message: &SyncMessage) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(64);
    buf.put_u8(message.kind_tag());
    buf.put_u32(stream_id);
    match message {
        SyncMessage::Bind { object_id, kind } => {
            if object_id.name.len() > limits::MAX_NAME_BYTES {
                return Err(SyncError::NameTooLarge(object_id.name.len()));
            }
            buf.put_slice(object_id.owner.as_bytes());
            buf.put_u8(kind.to_u8());
            buf.put_u16(object_id.name.len() as u16);
            buf.put_slice(object_id.name.as_bytes());
        }
        SyncMessage::Root { range, hash } | SyncMessage::Node { range, hash } => {
            put_range(&mut buf, range);
            buf.put_slice(hash.as_bytes());
        }
        SyncMessage::Leaf { payload } => {
            if payload.len() > limits::MAX_LEAF_BYTES {
                return Err(SyncError::LeafTooLarge(payload.len()));
            }
            buf.put_u32(payload.len() as u32);
            buf.put_slice(payload);
        }
        SyncMessage::Null => {}
        SyncMessage::Ack { range } => {
            put_range(&mut buf, range);
        }
    }
    Ok(buf)
}

/// Decode one frame. The slice must contain exactly one frame.
pub fn decode(bytes: &[u8]) -> Result<(StreamId, SyncMessage)> {
    let mut cursor = Cursor::new(bytes);
    let kind = cursor.u8()?;
    let stream_id = cursor.u32()?;
    let message = match kind {
        1 => {
            let owner = PublicKey::from_bytes(cursor.array::<32>()?);
            let raw_kind = cursor.u8()?;
            let kind =
                ObjectKind::from_u8(raw_kind).map_err(|_| SyncError::UnknownKind(raw_kind))?;
            let name_len = cursor.u16()? as usize;
            if name_len > limits::MAX_NAME_BYTES {
                return Err(SyncError::Malformed(format!(
                    "bind name of {name_len} bytes exceeds limit"
                )));
            }
            let name = std::str::from_utf8(cursor.slice(name_len)?)
                .map_err(|_| SyncError::Malformed("bind name not UTF-8".into()))?
                .to_owned();
            SyncMessage::Bind {
                object_id: ObjectId::new(owner, name),
                kind,
            }
        }
        2 | 3 => {
            let range = cursor.range()?;
            let hash = Hash32::from_bytes(cursor.array::<32>()?);
            if kind == 2 {
                SyncMessage::Root { range, hash }
            } else {
                SyncMessage::Node { range, hash }
            }
        }
        4 => {
            let len = cursor.u32()? as usize;
            if len > limits::MAX_LEAF_BYTES {
                return Err(SyncError::Malformed(format!(
                    "leaf payload of {len} bytes exceeds limit"
                )));
            }
            let payload = Bytes::copy_from_slice(cursor.slice(len)?);
            SyncMessage::Leaf { payload }
        }
        5 => SyncMessage::Null,
        6 => SyncMessage::Ack {
            range: cursor.range()?,
        },
        other => {
            return Err(SyncError::Malformed(format!("unknown frame kind {other}")));
        }
    };
    if !cursor.is_empty() {
        return Err(SyncError::Malformed(format!(
            "{} trailing bytes after frame",
            cursor.remaining()
        )));
    }
    Ok((stream_id, message))
}

fn put_range(buf: &mut Vec<u8>, range: &SeqRange) {
    buf.put_u64(range.start);
    buf.put_u8(range.depth);
}

/// Bounds-checked reader over one frame.
struct Cursor<'a> {
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < len {
            return Err(SyncError::Malformed(format!(
                "frame truncated: wanted {len} bytes, {} left",
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.slice(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn range(&mut self) -> Result<SeqRange> {
        let start = self.u64()?;
        let depth = self.u8()?;
        SeqRange::new(start, depth)
            .map_err(|e| SyncError::Malformed(format!("invalid range: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(stream_id: StreamId, message: SyncMessage) {
        let frame = encode(stream_id, &message).unwrap();
        let (sid, decoded) = decode(&frame).unwrap();
        assert_eq!(sid, stream_id);
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_roundtrip_every_kind() {
        let range = SeqRange::new(64, 3).unwrap();
        let hash = Hash32::hash(b"x");
        roundtrip(
            0,
            SyncMessage::Bind {
                object_id: ObjectId::new(PublicKey::from_bytes([7; 32]), "chat"),
                kind: ObjectKind::Channel,
            },
        );
        roundtrip(1, SyncMessage::Root { range, hash });
        roundtrip(900, SyncMessage::Node { range, hash });
        roundtrip(
            2,
            SyncMessage::Leaf {
                payload: Bytes::from_static(b"payload"),
            },
        );
        roundtrip(3, SyncMessage::Null);
        roundtrip(u32::MAX, SyncMessage::Ack { range });
    }

    #[test]
    fn test_oversized_leaf_rejected_at_encode() {
        let payload = Bytes::from(vec![0u8; limits::MAX_LEAF_BYTES + 1]);
        let err = encode(0, &SyncMessage::Leaf { payload }).unwrap_err();
        assert!(matches!(err, SyncError::LeafTooLarge(_)));
    }

    #[test]
    fn test_leaf_at_the_limit_roundtrips() {
        roundtrip(
            0,
            SyncMessage::Leaf {
                payload: Bytes::from(vec![7u8; limits::MAX_LEAF_BYTES]),
            },
        );
    }

    #[test]
    fn test_oversized_name_rejected_at_encode() {
        let bind = SyncMessage::Bind {
            object_id: ObjectId::new(
                PublicKey::from_bytes([7; 32]),
                "n".repeat(limits::MAX_NAME_BYTES + 1),
            ),
            kind: ObjectKind::Channel,
        };
        let err = encode(0, &bind).unwrap_err();
        assert!(matches!(err, SyncError::NameTooLarge(_)));
    }

    #[test]
    fn test_truncated_frame_is_fatal() {
        let frame = encode(0, &SyncMessage::Root {
            range: SeqRange::leaf(9),
            hash: Hash32::hash(b"x"),
        })
        .unwrap();
        assert!(matches!(
            decode(&frame[..frame.len() - 1]),
            Err(SyncError::Malformed(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_are_fatal() {
        let mut frame = encode(0, &SyncMessage::Null).unwrap();
        frame.push(0);
        assert!(matches!(decode(&frame), Err(SyncError::Malformed(_))));
    }

    #[test]
    fn test_unknown_kind_is_fatal() {
        let frame = [9u8, 0, 0, 0, 0];
        assert!(matches!(decode(&frame), Err(SyncError::Malformed(_))));
    }

    #[test]
    fn test_misaligned_range_is_fatal() {
        let mut frame = vec![6u8]; // Ack
        frame.extend_from_slice(&[0, 0, 0, 0]); // stream 0
        frame.extend_from_slice(&3u64.to_be_bytes()); // start 3
        frame.push(1); // depth 1: misaligned
        assert!(matches!(decode(&frame), Err(SyncError::Malformed(_))));
    }

    #[test]
    fn test_unknown_object_kind_is_fatal() {
        let bind = SyncMessage::Bind {
            object_id: ObjectId::new(PublicKey::from_bytes([7; 32]), "chat"),
            kind: ObjectKind::Channel,
        };
        let mut frame = encode(0, &bind).unwrap();
        frame[5 + 32] = 99; // overwrite the kind tag
        assert!(matches!(decode(&frame), Err(SyncError::UnknownKind(99))));
    }
}
