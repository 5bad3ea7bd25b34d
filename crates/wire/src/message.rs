//! Mini-protocol message types.
//!
//! Each mini-protocol's messages form a closed enum matched exhaustively by
//! its state machine. A message that does not decode is a transport failure,
//! never silently ignored.

use nodegate_types::{MempoolSizes, MempoolTx, RawTx, RejectReason, TxId};

/// Messages of the transaction submission mini-protocol.
///
/// Agency alternates strictly: the client sends `SubmitTx` from Idle, then
/// the node holds agency until it answers `AcceptTx` or `RejectTx`.
#[derive(Debug, Clone, PartialEq, Eq, sbor::prelude::BasicSbor)]
pub enum TxSubmissionMessage {
    /// Client → node: submit one transaction.
    SubmitTx { tx: RawTx },
    /// Node → client: the transaction entered the mempool.
    AcceptTx,
    /// Node → client: the transaction was refused.
    RejectTx { reason: RejectReason },
    /// Client → node: terminate the protocol.
    Done,
}

/// Messages of the mempool monitoring mini-protocol.
///
/// The client acquires a point-in-time snapshot, issues any number of
/// queries against it (one outstanding at a time), then releases it.
#[derive(Debug, Clone, PartialEq, Eq, sbor::prelude::BasicSbor)]
pub enum TxMonitorMessage {
    /// Client → node: acquire a mempool snapshot.
    Acquire,
    /// Node → client: snapshot acquired at the given slot.
    Acquired { slot: u64 },
    /// Client → node: release the current snapshot.
    Release,
    /// Node → client: snapshot released.
    Released,
    /// Client → node: is the transaction present in the snapshot?
    HasTx { id: TxId },
    /// Node → client: presence reply.
    ReplyHasTx { has: bool },
    /// Client → node: advance the snapshot cursor by one transaction.
    NextTx,
    /// Node → client: the next transaction, or `None` past the end.
    ReplyNextTx { tx: Option<MempoolTx> },
    /// Client → node: report snapshot sizes.
    GetSizes,
    /// Node → client: sizes reply.
    ReplyGetSizes { sizes: MempoolSizes },
    /// Client → node: terminate the protocol.
    Done,
}
