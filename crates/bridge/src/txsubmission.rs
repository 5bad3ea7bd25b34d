//! Transaction submission mini-protocol client.
//!
//! The state machine is two states deep: Idle (client agency) and Busy
//! (node agency, one submit outstanding). Strict alternation means a second
//! submit can never start while one is outstanding; the serializer enforces
//! that by running exchanges one at a time.

use crate::connection::{Channel, ExchangeFailure};
use nodegate_types::{RawTx, RejectReason};
use nodegate_wire::TxSubmissionMessage;

/// Client-side protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SubmissionState {
    /// Client holds agency and may submit.
    #[default]
    Idle,
    /// Node holds agency; a reply is owed.
    Busy,
}

/// Terminal outcome of a submission.
///
/// A rejection is a successful exchange: the node answered, it just said no.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The transaction entered the node's mempool.
    Accepted,
    /// The node refused the transaction.
    Rejected { reason: RejectReason },
}

/// Run one complete submit exchange: Idle → Busy → Idle.
pub(crate) async fn submit_exchange(
    channel: &mut Channel,
    tx: RawTx,
) -> Result<SubmitOutcome, ExchangeFailure> {
    channel.send(&TxSubmissionMessage::SubmitTx { tx }).await?;
    match channel.recv::<TxSubmissionMessage>().await? {
        TxSubmissionMessage::AcceptTx => Ok(SubmitOutcome::Accepted),
        TxSubmissionMessage::RejectTx { reason } => Ok(SubmitOutcome::Rejected { reason }),
        other => Err(ExchangeFailure::Protocol(format!(
            "unexpected message while awaiting submit reply: {other:?}"
        ))),
    }
}
