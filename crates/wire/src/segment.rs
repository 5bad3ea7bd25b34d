//! Mux segment framing.
//!
//! One physical connection carries both mini-protocols. Each segment is an
//! 8-byte header plus up to 64 KiB of payload:
//!
//! ```text
//! [timestamp_micros: u32 BE][protocol_and_dir: u16 BE][length: u16 BE][payload]
//! ```
//!
//! The high bit of the protocol word marks the transmission direction
//! (set = node→client). A logical message larger than one segment is split
//! across consecutive segments of the same protocol and reassembled in order.

use std::collections::VecDeque;
use thiserror::Error;

/// Length of the segment header in bytes.
pub const SEGMENT_HEADER_LEN: usize = 8;

/// Maximum payload bytes a single segment can carry.
pub const MAX_SEGMENT_PAYLOAD: usize = u16::MAX as usize;

/// Bit marking a segment sent by the responder (the node).
const RESPONDER_BIT: u16 = 0x8000;

/// Errors from segment framing.
///
/// Every variant invalidates the whole connection: a corrupt segment stream
/// cannot be trusted to resynchronize, so all protocol channels on the
/// connection are torn down together.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown protocol id: {0}")]
    UnknownProtocol(u16),

    #[error("segment with unexpected direction for protocol {0:?}")]
    UnexpectedDirection(ProtocolId),

    #[error("stream ended mid-segment ({0} residual bytes)")]
    TruncatedSegment(usize),
}

/// Mini-protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ProtocolId {
    /// Local transaction submission.
    TxSubmission = 6,
    /// Local mempool monitoring.
    TxMonitor = 9,
}

impl ProtocolId {
    /// All protocols carried on a connection.
    pub const ALL: [ProtocolId; 2] = [ProtocolId::TxSubmission, ProtocolId::TxMonitor];

    /// Parse a protocol id from its wire value (direction bit stripped).
    pub fn from_wire(value: u16) -> Option<Self> {
        match value {
            6 => Some(ProtocolId::TxSubmission),
            9 => Some(ProtocolId::TxMonitor),
            _ => None,
        }
    }

    /// String label for logging and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolId::TxSubmission => "txsubmission",
            ProtocolId::TxMonitor => "txmonitor",
        }
    }
}

/// Which side of the connection sent a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client (gateway) → node.
    FromInitiator,
    /// Node → client.
    FromResponder,
}

/// Decoded segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Sender's transmission timestamp, microseconds (lower 32 bits).
    pub timestamp_micros: u32,
    /// Protocol the payload belongs to.
    pub protocol: ProtocolId,
    /// Transmission direction.
    pub direction: Direction,
    /// Payload length in bytes.
    pub length: u16,
}

impl SegmentHeader {
    /// Encode the header into its 8-byte wire form.
    pub fn encode(&self) -> [u8; SEGMENT_HEADER_LEN] {
        let mut proto = self.protocol as u16;
        if self.direction == Direction::FromResponder {
            proto |= RESPONDER_BIT;
        }
        let mut out = [0u8; SEGMENT_HEADER_LEN];
        out[0..4].copy_from_slice(&self.timestamp_micros.to_be_bytes());
        out[4..6].copy_from_slice(&proto.to_be_bytes());
        out[6..8].copy_from_slice(&self.length.to_be_bytes());
        out
    }

    /// Decode a header from its 8-byte wire form.
    pub fn decode(bytes: &[u8; SEGMENT_HEADER_LEN]) -> Result<Self, FrameError> {
        let timestamp_micros = u32::from_be_bytes(bytes[0..4].try_into().expect("4 bytes"));
        let proto_word = u16::from_be_bytes(bytes[4..6].try_into().expect("2 bytes"));
        let length = u16::from_be_bytes(bytes[6..8].try_into().expect("2 bytes"));

        let direction = if proto_word & RESPONDER_BIT != 0 {
            Direction::FromResponder
        } else {
            Direction::FromInitiator
        };
        let protocol = ProtocolId::from_wire(proto_word & !RESPONDER_BIT)
            .ok_or(FrameError::UnknownProtocol(proto_word & !RESPONDER_BIT))?;

        Ok(Self {
            timestamp_micros,
            protocol,
            direction,
            length,
        })
    }
}

/// A complete reassembled segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: SegmentHeader,
    pub payload: Vec<u8>,
}

/// Frame a message's bytes into one or more segments for transmission.
///
/// Payloads larger than [`MAX_SEGMENT_PAYLOAD`] are split across consecutive
/// segments carrying the same protocol id and direction.
pub fn encode_segments(
    protocol: ProtocolId,
    direction: Direction,
    timestamp_micros: u32,
    payload: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + SEGMENT_HEADER_LEN);
    let mut chunks = payload.chunks(MAX_SEGMENT_PAYLOAD);
    // An empty payload still produces one zero-length segment.
    let mut emit = |chunk: &[u8]| {
        let header = SegmentHeader {
            timestamp_micros,
            protocol,
            direction,
            length: chunk.len() as u16,
        };
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(chunk);
    };
    match chunks.next() {
        Some(first) => {
            emit(first);
            for chunk in chunks {
                emit(chunk);
            }
        }
        None => emit(&[]),
    }
    out
}

/// Incremental segment decoder.
///
/// Feed raw socket bytes in with [`SegmentDecoder::feed`], then drain complete
/// segments with [`SegmentDecoder::next_segment`]. The decoder validates that
/// every inbound segment travels in the expected direction; on the client
/// side that is [`Direction::FromResponder`].
#[derive(Debug)]
pub struct SegmentDecoder {
    expect: Direction,
    buf: VecDeque<u8>,
}

impl SegmentDecoder {
    /// Create a decoder expecting segments in the given direction.
    pub fn new(expect: Direction) -> Self {
        Self {
            expect,
            buf: VecDeque::new(),
        }
    }

    /// Append raw bytes read from the connection.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes);
    }

    /// Pop the next complete segment, if one is buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn next_segment(&mut self) -> Result<Option<Segment>, FrameError> {
        if self.buf.len() < SEGMENT_HEADER_LEN {
            return Ok(None);
        }
        let mut header_bytes = [0u8; SEGMENT_HEADER_LEN];
        for (i, b) in self.buf.iter().take(SEGMENT_HEADER_LEN).enumerate() {
            header_bytes[i] = *b;
        }
        let header = SegmentHeader::decode(&header_bytes)?;
        if header.direction != self.expect {
            return Err(FrameError::UnexpectedDirection(header.protocol));
        }
        let total = SEGMENT_HEADER_LEN + header.length as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        self.buf.drain(..SEGMENT_HEADER_LEN);
        let payload: Vec<u8> = self.buf.drain(..header.length as usize).collect();
        Ok(Some(Segment { header, payload }))
    }

    /// Check for leftover bytes after the peer closed the stream.
    ///
    /// A clean close leaves nothing buffered; residual bytes mean the stream
    /// ended mid-segment.
    pub fn finish(&self) -> Result<(), FrameError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(FrameError::TruncatedSegment(self.buf.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = SegmentHeader {
            timestamp_micros: 123_456,
            protocol: ProtocolId::TxMonitor,
            direction: Direction::FromResponder,
            length: 42,
        };
        let decoded = SegmentHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let mut bytes = SegmentHeader {
            timestamp_micros: 0,
            protocol: ProtocolId::TxSubmission,
            direction: Direction::FromInitiator,
            length: 0,
        }
        .encode();
        // Overwrite the protocol word with an id nothing speaks.
        bytes[4..6].copy_from_slice(&77u16.to_be_bytes());
        assert_eq!(
            SegmentHeader::decode(&bytes),
            Err(FrameError::UnknownProtocol(77))
        );
    }

    #[test]
    fn test_decoder_single_segment() {
        let wire = encode_segments(
            ProtocolId::TxSubmission,
            Direction::FromResponder,
            7,
            b"hello",
        );
        let mut decoder = SegmentDecoder::new(Direction::FromResponder);
        decoder.feed(&wire);
        let seg = decoder.next_segment().unwrap().unwrap();
        assert_eq!(seg.header.protocol, ProtocolId::TxSubmission);
        assert_eq!(seg.payload, b"hello");
        assert!(decoder.next_segment().unwrap().is_none());
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_decoder_partial_feed() {
        let wire = encode_segments(
            ProtocolId::TxMonitor,
            Direction::FromResponder,
            0,
            b"payload bytes",
        );
        let mut decoder = SegmentDecoder::new(Direction::FromResponder);
        // Feed one byte at a time; a segment must only appear once complete.
        for (i, byte) in wire.iter().enumerate() {
            decoder.feed(&[*byte]);
            let seg = decoder.next_segment().unwrap();
            if i < wire.len() - 1 {
                assert!(seg.is_none(), "segment completed early at byte {i}");
            } else {
                assert_eq!(seg.unwrap().payload, b"payload bytes");
            }
        }
    }

    #[test]
    fn test_decoder_interleaved_protocols() {
        let mut wire = encode_segments(ProtocolId::TxSubmission, Direction::FromResponder, 0, b"a");
        wire.extend(encode_segments(
            ProtocolId::TxMonitor,
            Direction::FromResponder,
            0,
            b"b",
        ));
        wire.extend(encode_segments(
            ProtocolId::TxSubmission,
            Direction::FromResponder,
            0,
            b"c",
        ));

        let mut decoder = SegmentDecoder::new(Direction::FromResponder);
        decoder.feed(&wire);

        let protocols: Vec<(ProtocolId, Vec<u8>)> = std::iter::from_fn(|| {
            decoder
                .next_segment()
                .unwrap()
                .map(|s| (s.header.protocol, s.payload))
        })
        .collect();

        assert_eq!(
            protocols,
            vec![
                (ProtocolId::TxSubmission, b"a".to_vec()),
                (ProtocolId::TxMonitor, b"b".to_vec()),
                (ProtocolId::TxSubmission, b"c".to_vec()),
            ]
        );
    }

    #[test]
    fn test_large_payload_split_and_reassembled() {
        let payload = vec![0x5a; MAX_SEGMENT_PAYLOAD + 1000];
        let wire = encode_segments(
            ProtocolId::TxSubmission,
            Direction::FromInitiator,
            1,
            &payload,
        );
        // Two segments: one full, one carrying the remainder.
        assert_eq!(wire.len(), payload.len() + 2 * SEGMENT_HEADER_LEN);

        let mut decoder = SegmentDecoder::new(Direction::FromInitiator);
        decoder.feed(&wire);
        let first = decoder.next_segment().unwrap().unwrap();
        let second = decoder.next_segment().unwrap().unwrap();
        assert_eq!(first.payload.len(), MAX_SEGMENT_PAYLOAD);
        assert_eq!(second.payload.len(), 1000);

        let mut reassembled = first.payload;
        reassembled.extend(second.payload);
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn test_wrong_direction_is_connection_failure() {
        let wire = encode_segments(ProtocolId::TxMonitor, Direction::FromInitiator, 0, b"x");
        let mut decoder = SegmentDecoder::new(Direction::FromResponder);
        decoder.feed(&wire);
        assert_eq!(
            decoder.next_segment(),
            Err(FrameError::UnexpectedDirection(ProtocolId::TxMonitor))
        );
    }

    #[test]
    fn test_truncated_stream_detected() {
        let wire = encode_segments(ProtocolId::TxMonitor, Direction::FromResponder, 0, b"abc");
        let mut decoder = SegmentDecoder::new(Direction::FromResponder);
        decoder.feed(&wire[..wire.len() - 1]);
        assert!(decoder.next_segment().unwrap().is_none());
        assert!(matches!(decoder.finish(), Err(FrameError::TruncatedSegment(_))));
    }

    #[test]
    fn test_empty_payload_emits_one_segment() {
        let wire = encode_segments(ProtocolId::TxSubmission, Direction::FromInitiator, 0, &[]);
        assert_eq!(wire.len(), SEGMENT_HEADER_LEN);
        let mut decoder = SegmentDecoder::new(Direction::FromInitiator);
        decoder.feed(&wire);
        let seg = decoder.next_segment().unwrap().unwrap();
        assert!(seg.payload.is_empty());
    }
}
