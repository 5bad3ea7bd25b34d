//! Mempool measurement types.

use serde::{Deserialize, Serialize};

/// Size and occupancy of the node's mempool at a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sbor::prelude::BasicSbor)]
pub struct MempoolSizes {
    /// Configured mempool capacity in bytes.
    pub capacity_bytes: u64,
    /// Bytes currently occupied by pending transactions.
    pub current_size_bytes: u64,
    /// Number of transactions in the snapshot.
    pub number_of_txs: u32,
}
