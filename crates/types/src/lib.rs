//! Core types for the nodegate mini-protocol gateway.
//!
//! This crate provides the foundational types shared by the wire layer, the
//! protocol bridge, and the HTTP gateway:
//!
//! - **Identifiers**: [`TxId`]
//! - **Transactions**: [`RawTx`], [`MempoolTx`], [`RejectReason`]
//! - **Mempool**: [`MempoolSizes`]
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod mempool;
mod transaction;
mod txid;

pub use mempool::MempoolSizes;
pub use transaction::{MempoolTx, RawTx, RejectReason};
pub use txid::{HexError, TxId};

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Create a test transaction with deterministic contents from a seed byte.
    pub fn test_tx(seed: u8) -> RawTx {
        RawTx::new(vec![seed, seed.wrapping_add(1), seed.wrapping_add(2), 0xd8])
    }

    /// Create a mempool entry for a test transaction.
    pub fn test_mempool_tx(seed: u8) -> MempoolTx {
        let tx = test_tx(seed);
        MempoolTx {
            id: TxId::digest(&tx.bytes),
            bytes: tx.bytes,
        }
    }
}
