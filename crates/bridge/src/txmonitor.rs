//! Mempool monitoring mini-protocol client.
//!
//! Sessions move between Idle and Acquired. Every query runs against the
//! snapshot named by its token; tokens from a previous session (or a
//! previous connection) are refused locally, before any wire traffic, so a
//! caller's mistake never costs the connection.

use crate::connection::{Channel, ExchangeFailure};
use crate::error::BridgeError;
use nodegate_types::{MempoolSizes, MempoolTx, TxId};
use nodegate_wire::TxMonitorMessage;
use std::fmt;

/// Opaque handle naming one acquired mempool snapshot.
///
/// Tokens are minted per acquisition and die with the session that minted
/// them. They carry no meaning beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotToken(String);

impl SnapshotToken {
    pub(crate) fn mint(counter: u64) -> Self {
        Self(format!("{counter:016x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SnapshotToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SnapshotToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for SnapshotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One monitor operation as issued by a caller.
#[derive(Debug, Clone)]
pub(crate) enum MonitorRequest {
    Acquire,
    HasTx { token: SnapshotToken, id: TxId },
    NextTx { token: SnapshotToken },
    Sizes { token: SnapshotToken },
    Release { token: SnapshotToken },
}

impl MonitorRequest {
    /// Short stable label for logging and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorRequest::Acquire => "acquire",
            MonitorRequest::HasTx { .. } => "has_tx",
            MonitorRequest::NextTx { .. } => "next_tx",
            MonitorRequest::Sizes { .. } => "sizes",
            MonitorRequest::Release { .. } => "release",
        }
    }
}

/// Successful result of a monitor operation.
#[derive(Debug, Clone)]
pub(crate) enum MonitorReply {
    Acquired { token: SnapshotToken, slot: u64 },
    HasTx(bool),
    NextTx(Option<MempoolTx>),
    Sizes(MempoolSizes),
    Released,
}

/// Client-side session state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum MonitorState {
    /// No snapshot held; only Acquire is legal.
    #[default]
    Idle,
    /// A snapshot is held under the given token.
    Acquired { token: SnapshotToken, slot: u64 },
}

impl MonitorState {
    /// Check a request against the session without touching the wire.
    ///
    /// A violation leaves the session, and the connection, untouched.
    pub fn validate(&self, request: &MonitorRequest) -> Result<(), BridgeError> {
        match (self, request) {
            (MonitorState::Idle, MonitorRequest::Acquire) => Ok(()),
            (MonitorState::Acquired { .. }, MonitorRequest::Acquire) => Err(
                BridgeError::StateContract("a snapshot is already acquired".into()),
            ),
            (MonitorState::Idle, _) => {
                Err(BridgeError::StateContract("no snapshot acquired".into()))
            }
            (
                MonitorState::Acquired { token, .. },
                MonitorRequest::HasTx { token: requested, .. }
                | MonitorRequest::NextTx { token: requested }
                | MonitorRequest::Sizes { token: requested }
                | MonitorRequest::Release { token: requested },
            ) => {
                if token == requested {
                    Ok(())
                } else {
                    Err(BridgeError::StateContract("unknown snapshot token".into()))
                }
            }
        }
    }
}

/// Run one monitor exchange. The caller validates the reply variant against
/// the request.
pub(crate) async fn monitor_exchange(
    channel: &mut Channel,
    request: &MonitorRequest,
) -> Result<TxMonitorMessage, ExchangeFailure> {
    let message = match request {
        MonitorRequest::Acquire => TxMonitorMessage::Acquire,
        MonitorRequest::HasTx { id, .. } => TxMonitorMessage::HasTx { id: *id },
        MonitorRequest::NextTx { .. } => TxMonitorMessage::NextTx,
        MonitorRequest::Sizes { .. } => TxMonitorMessage::GetSizes,
        MonitorRequest::Release { .. } => TxMonitorMessage::Release,
    };
    channel.send(&message).await?;
    channel.recv().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acquired() -> MonitorState {
        MonitorState::Acquired {
            token: SnapshotToken::mint(7),
            slot: 100,
        }
    }

    #[test]
    fn test_acquire_from_idle_is_legal() {
        assert!(MonitorState::Idle.validate(&MonitorRequest::Acquire).is_ok());
    }

    #[test]
    fn test_double_acquire_is_a_state_violation() {
        let err = acquired().validate(&MonitorRequest::Acquire).unwrap_err();
        assert!(matches!(err, BridgeError::StateContract(_)));
    }

    #[test]
    fn test_query_without_snapshot_is_a_state_violation() {
        let err = MonitorState::Idle
            .validate(&MonitorRequest::NextTx {
                token: SnapshotToken::mint(1),
            })
            .unwrap_err();
        assert!(matches!(err, BridgeError::StateContract(_)));
    }

    #[test]
    fn test_stale_token_is_refused() {
        let err = acquired()
            .validate(&MonitorRequest::Sizes {
                token: SnapshotToken::mint(99),
            })
            .unwrap_err();
        assert!(matches!(err, BridgeError::StateContract(_)));
    }

    #[test]
    fn test_matching_token_passes() {
        let state = acquired();
        let token = match &state {
            MonitorState::Acquired { token, .. } => token.clone(),
            MonitorState::Idle => unreachable!(),
        };
        assert!(state
            .validate(&MonitorRequest::Release { token })
            .is_ok());
    }

    #[test]
    fn test_tokens_are_unique_per_mint() {
        assert_ne!(SnapshotToken::mint(1), SnapshotToken::mint(2));
    }
}
