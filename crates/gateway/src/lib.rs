//! HTTP gateway exposing a node's local mini-protocols.
//!
//! The gateway fronts a node's local socket with an HTTP+JSON API:
//! transaction submission and mempool snapshot inspection, plus the usual
//! operational probes. The protocol legwork lives in `nodegate-bridge`;
//! this crate maps its calls and failure modes onto HTTP.

pub mod metrics;
pub mod rpc;
pub mod telemetry;

pub use rpc::{create_router, RpcServer, RpcServerConfig, RpcServerError, RpcServerHandle, RpcState};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryError, TelemetryGuard};
