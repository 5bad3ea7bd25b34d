//! Wire layer for the nodegate protocol bridge.
//!
//! This crate is sans-I/O: it defines the mux segment framing, the two
//! mini-protocol message enums, and the message codec, all as pure
//! encode/decode routines plus incremental reassembly state machines. The
//! bridge crate drives it against a real socket.
//!
//! # Layering
//!
//! ```text
//! socket bytes
//!   └─ mux segments        [timestamp u32][protocol+dir u16][length u16][payload]
//!        └─ message frames [len u32][version u8][SBOR payload]
//!             └─ typed messages (TxSubmissionMessage / TxMonitorMessage)
//! ```
//!
//! Segments of different protocols may interleave on the wire; bytes for one
//! protocol are reassembled strictly in arrival order. Any malformed segment
//! or frame is a connection-level failure, never a per-protocol one.

mod codec;
mod message;
mod segment;

pub use codec::{
    decode_frame, encode_frame, CodecError, MessageAssembler, MAX_MESSAGE_BYTES, WIRE_VERSION,
};
pub use message::{TxMonitorMessage, TxSubmissionMessage};
pub use segment::{
    encode_segments, Direction, FrameError, ProtocolId, Segment, SegmentDecoder, SegmentHeader,
    MAX_SEGMENT_PAYLOAD, SEGMENT_HEADER_LEN,
};
