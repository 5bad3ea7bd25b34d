//! Transaction value types carried over the wire.

use crate::txid::TxId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger era a raw transaction was built for.
///
/// The gateway does not interpret transaction bodies; the era tag is carried
/// opaquely so the node can pick the right decoder.
pub const DEFAULT_ERA: u16 = 6;

/// A raw transaction as submitted by an external caller.
///
/// The body bytes are opaque to the gateway; only the node validates them.
#[derive(Debug, Clone, PartialEq, Eq, sbor::prelude::BasicSbor)]
pub struct RawTx {
    /// Era tag the transaction body is encoded for.
    pub era: u16,
    /// Opaque transaction body bytes.
    pub bytes: Vec<u8>,
}

impl RawTx {
    /// Create a transaction for the default era.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            era: DEFAULT_ERA,
            bytes,
        }
    }

    /// Create a transaction for an explicit era.
    pub fn with_era(era: u16, bytes: Vec<u8>) -> Self {
        Self { era, bytes }
    }

    /// Compute this transaction's id.
    pub fn id(&self) -> TxId {
        TxId::digest(&self.bytes)
    }
}

/// A transaction as reported from the node's mempool.
#[derive(Debug, Clone, PartialEq, Eq, sbor::prelude::BasicSbor)]
pub struct MempoolTx {
    /// Transaction id.
    pub id: TxId,
    /// Opaque transaction body bytes.
    pub bytes: Vec<u8>,
}

/// Opaque rejection reason reported by the node for a refused transaction.
///
/// Not an error: a rejection is a valid protocol outcome surfaced to the
/// caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sbor::prelude::BasicSbor)]
pub struct RejectReason(pub String);

impl RejectReason {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_tx_defaults_to_current_era() {
        let tx = RawTx::new(vec![1, 2, 3]);
        assert_eq!(tx.era, DEFAULT_ERA);
    }

    #[test]
    fn test_raw_tx_id_matches_digest() {
        let tx = RawTx::new(vec![9, 9, 9]);
        assert_eq!(tx.id(), TxId::digest(&[9, 9, 9]));
    }

    #[test]
    fn test_reject_reason_display() {
        let reason = RejectReason::new("already-in-mempool");
        assert_eq!(reason.to_string(), "already-in-mempool");
    }
}
