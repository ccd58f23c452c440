//! Transport seam: where protocol messages leave the core.
//!
//! The core performs no I/O. A session writes every outbound message
//! into a [`Sink`]; the host encodes and moves the bytes, feeds inbound
//! frames back through `recv`, and keeps calling `send` while
//! `has_pending` holds.

use crate::codec;
use crate::error::Result;
use crate::messages::{StreamId, SyncMessage};

/// Receives outbound messages from a session.
pub trait Sink {
    /// Accept one outbound message for a stream.
    ///
    /// Fails when the message cannot leave (an encoding sink rejects
    /// oversized frames, for example); the failure surfaces through the
    /// session call that produced the message.
    fn deliver(&mut self, stream_id: StreamId, message: SyncMessage) -> Result<()>;
}

/// The simplest sink: collect messages for the host to drain.
impl Sink for Vec<(StreamId, SyncMessage)> {
    fn deliver(&mut self, stream_id: StreamId, message: SyncMessage) -> Result<()> {
        self.push((stream_id, message));
        Ok(())
    }
}

/// A sink that encodes each message to wire bytes as it arrives.
pub struct FrameSink<F: FnMut(Vec<u8>)> {
    emit: F,
}

impl<F: FnMut(Vec<u8>)> FrameSink<F> {
    /// Wrap a byte-frame consumer.
    pub fn new(emit: F) -> Self {
        Self { emit }
    }
}

impl<F: FnMut(Vec<u8>)> Sink for FrameSink<F> {
    fn deliver(&mut self, stream_id: StreamId, message: SyncMessage) -> Result<()> {
        (self.emit)(codec::encode(stream_id, &message)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sink_encodes() {
        let mut frames = Vec::new();
        {
            let mut sink = FrameSink::new(|frame| frames.push(frame));
            sink.deliver(7, SyncMessage::Null).unwrap();
        }
        let (stream_id, message) = codec::decode(&frames[0]).unwrap();
        assert_eq!(stream_id, 7);
        assert_eq!(message, SyncMessage::Null);
    }

    #[test]
    fn test_frame_sink_surfaces_encode_errors() {
        use crate::messages::limits;

        let mut frames = Vec::new();
        {
            let mut sink = FrameSink::new(|frame| frames.push(frame));
            let payload = bytes::Bytes::from(vec![0u8; limits::MAX_LEAF_BYTES + 1]);
            assert!(sink.deliver(1, SyncMessage::Leaf { payload }).is_err());
        }
        // The oversized message produced no frame at all.
        assert!(frames.is_empty());
    }
}
