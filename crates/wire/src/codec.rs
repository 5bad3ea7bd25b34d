//! Message framing and encoding inside a protocol channel.
//!
//! # Wire Format
//!
//! ```text
//! [len: u32 BE][version: u8][payload: SBOR-encoded message]
//! ```
//!
//! `len` counts the version byte plus the payload. The length prefix exists
//! because SBOR payloads are not self-delimiting once a message is split
//! across mux segments.

use thiserror::Error;

/// Current wire format version.
pub const WIRE_VERSION: u8 = 1;

/// Maximum bytes one logical message may occupy (version byte + payload).
pub const MAX_MESSAGE_BYTES: usize = 2 * 1024 * 1024;

/// Errors from message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown wire version: {0}")]
    UnknownVersion(u8),

    #[error("message too short")]
    MessageTooShort,

    #[error("message length {0} exceeds maximum {MAX_MESSAGE_BYTES}")]
    MessageTooLarge(usize),

    #[error("SBOR decode error: {0}")]
    SborDecode(String),

    #[error("SBOR encode error: {0}")]
    SborEncode(String),
}

/// Encode a message into a complete channel frame.
pub fn encode_frame<M: sbor::BasicEncode>(message: &M) -> Result<Vec<u8>, CodecError> {
    let payload =
        sbor::basic_encode(message).map_err(|e| CodecError::SborEncode(format!("{e:?}")))?;
    let len = 1 + payload.len();
    if len > MAX_MESSAGE_BYTES {
        return Err(CodecError::MessageTooLarge(len));
    }
    let mut out = Vec::with_capacity(4 + len);
    out.extend_from_slice(&(len as u32).to_be_bytes());
    out.push(WIRE_VERSION);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a message from the body of a frame (version byte + payload).
pub fn decode_frame<M: sbor::BasicDecode>(body: &[u8]) -> Result<M, CodecError> {
    let Some((&version, payload)) = body.split_first() else {
        return Err(CodecError::MessageTooShort);
    };
    if version != WIRE_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }
    sbor::basic_decode(payload).map_err(|e| CodecError::SborDecode(format!("{e:?}")))
}

/// Incremental reassembly of message frames from segment payloads.
///
/// One assembler exists per protocol channel. Segment payloads are appended
/// in arrival order; complete frame bodies pop out as they materialize.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buf: Vec<u8>,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reassembled segment payload.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame body (version byte + payload), if any.
    pub fn next_body(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes(self.buf[0..4].try_into().expect("4 bytes")) as usize;
        if len == 0 {
            return Err(CodecError::MessageTooShort);
        }
        if len > MAX_MESSAGE_BYTES {
            return Err(CodecError::MessageTooLarge(len));
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        let body = self.buf[4..4 + len].to_vec();
        self.buf.drain(..4 + len);
        Ok(Some(body))
    }

    /// Bytes buffered but not yet forming a complete frame.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{TxMonitorMessage, TxSubmissionMessage};
    use nodegate_types::{RawTx, RejectReason};

    #[test]
    fn test_frame_roundtrip() {
        let msg = TxSubmissionMessage::SubmitTx {
            tx: RawTx::new(vec![1, 2, 3, 4]),
        };
        let frame = encode_frame(&msg).unwrap();

        let mut assembler = MessageAssembler::new();
        assembler.feed(&frame);
        let body = assembler.next_body().unwrap().unwrap();
        let back: TxSubmissionMessage = decode_frame(&body).unwrap();
        assert_eq!(back, msg);
        assert_eq!(assembler.pending_bytes(), 0);
    }

    #[test]
    fn test_frame_split_across_feeds() {
        let msg = TxMonitorMessage::Acquired { slot: 991 };
        let frame = encode_frame(&msg).unwrap();
        let (a, b) = frame.split_at(frame.len() / 2);

        let mut assembler = MessageAssembler::new();
        assembler.feed(a);
        assert!(assembler.next_body().unwrap().is_none());
        assembler.feed(b);
        let body = assembler.next_body().unwrap().unwrap();
        let back: TxMonitorMessage = decode_frame(&body).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_back_to_back_frames() {
        let first = encode_frame(&TxMonitorMessage::Acquire).unwrap();
        let second = encode_frame(&TxMonitorMessage::GetSizes).unwrap();

        let mut assembler = MessageAssembler::new();
        assembler.feed(&first);
        assembler.feed(&second);

        let a: TxMonitorMessage = decode_frame(&assembler.next_body().unwrap().unwrap()).unwrap();
        let b: TxMonitorMessage = decode_frame(&assembler.next_body().unwrap().unwrap()).unwrap();
        assert_eq!(a, TxMonitorMessage::Acquire);
        assert_eq!(b, TxMonitorMessage::GetSizes);
        assert!(assembler.next_body().unwrap().is_none());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut frame = encode_frame(&TxMonitorMessage::Acquire).unwrap();
        frame[4] = 99;
        let mut assembler = MessageAssembler::new();
        assembler.feed(&frame);
        let body = assembler.next_body().unwrap().unwrap();
        let result: Result<TxMonitorMessage, _> = decode_frame(&body);
        assert!(matches!(result, Err(CodecError::UnknownVersion(99))));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut assembler = MessageAssembler::new();
        assembler.feed(&((MAX_MESSAGE_BYTES as u32 + 1).to_be_bytes()));
        assert!(matches!(
            assembler.next_body(),
            Err(CodecError::MessageTooLarge(_))
        ));
    }

    #[test]
    fn test_garbage_payload_is_decode_error() {
        let body = [WIRE_VERSION, 0xff, 0xfe, 0xfd];
        let result: Result<TxSubmissionMessage, _> = decode_frame(&body);
        assert!(matches!(result, Err(CodecError::SborDecode(_))));
    }

    #[test]
    fn test_reject_reason_survives_roundtrip() {
        let msg = TxSubmissionMessage::RejectTx {
            reason: RejectReason::new("already-in-mempool"),
        };
        let frame = encode_frame(&msg).unwrap();
        let mut assembler = MessageAssembler::new();
        assembler.feed(&frame);
        let back: TxSubmissionMessage =
            decode_frame(&assembler.next_body().unwrap().unwrap()).unwrap();
        match back {
            TxSubmissionMessage::RejectTx { reason } => {
                assert_eq!(reason.as_str(), "already-in-mempool")
            }
            other => panic!("expected RejectTx, got {other:?}"),
        }
    }
}
