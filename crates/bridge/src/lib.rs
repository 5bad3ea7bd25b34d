//! Client bridge to a node's local mini-protocol socket.
//!
//! One [`NodeBridge`] owns one connection to the node and multiplexes two
//! mini-protocols over it: transaction submission and mempool monitoring.
//! Calls from any number of tasks are serialized per protocol channel and
//! run strictly one at a time, which is what the node's agency-alternating
//! protocols require.
//!
//! # Failure Model
//!
//! - A node's *rejection* of a transaction is a successful outcome
//!   ([`SubmitOutcome::Rejected`]), not an error.
//! - Illegal operations (querying without a snapshot, stale tokens) fail
//!   locally with [`BridgeError::StateContract`] and cost nothing.
//! - A timeout while queued is clean; a timeout while the node holds agency
//!   tears the connection down, because the late reply could no longer be
//!   matched to its request.
//! - A lost connection fails every queued call, invalidates all snapshot
//!   tokens, and (per configuration) redials with exponential backoff.

mod bridge;
mod config;
mod connection;
mod error;
mod serializer;
mod txmonitor;
mod txsubmission;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use bridge::NodeBridge;
pub use config::BridgeConfig;
pub use connection::{
    BoxFuture, Connector, Liveness, NodeAddress, NodeStream, SocketConnector,
};
pub use error::BridgeError;
pub use txmonitor::SnapshotToken;
pub use txsubmission::SubmitOutcome;
