//! Bridge error taxonomy.
//!
//! Every fallible bridge operation resolves to exactly one of these kinds.
//! A node's *rejection* of a transaction is not an error; it is a successful
//! protocol outcome carried in [`crate::SubmitOutcome`].

use thiserror::Error;

/// Errors surfaced by bridge calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The caller asked for something the protocol state machine forbids.
    ///
    /// Raised locally before any wire traffic; the connection stays healthy.
    #[error("protocol state violation: {0}")]
    StateContract(String),

    /// The call's deadline passed.
    ///
    /// `in_flight` distinguishes a call that expired while queued (no wire
    /// effect) from one that expired while the node held agency (the
    /// connection is torn down, because the reply can no longer be matched
    /// to a request).
    #[error("call timed out while {}", if *in_flight { "awaiting the node's reply" } else { "queued" })]
    Timeout { in_flight: bool },

    /// The byte stream itself failed or carried something unintelligible.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The connection went away under the call, or was never available.
    #[error("connection to the node was lost")]
    ConnectionLost,
}

impl BridgeError {
    /// Short stable label for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::StateContract(_) => "state_contract",
            BridgeError::Timeout { in_flight: false } => "timeout_queued",
            BridgeError::Timeout { in_flight: true } => "timeout_in_flight",
            BridgeError::Transport(_) => "transport",
            BridgeError::ConnectionLost => "connection_lost",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_distinguishes_phases() {
        let queued = BridgeError::Timeout { in_flight: false };
        let in_flight = BridgeError::Timeout { in_flight: true };
        assert!(queued.to_string().contains("queued"));
        assert!(in_flight.to_string().contains("awaiting"));
    }

    #[test]
    fn test_kind_labels_are_stable() {
        assert_eq!(BridgeError::ConnectionLost.kind(), "connection_lost");
        assert_eq!(
            BridgeError::StateContract("x".into()).kind(),
            "state_contract"
        );
    }
}
