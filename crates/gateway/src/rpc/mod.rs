//! HTTP+JSON API over the node bridge.
//!
//! Endpoint groups:
//! - **Probes**: `GET /health`, `GET /ready`, `GET /metrics`
//! - **Submission**: `POST /api/v1/tx`
//! - **Mempool snapshots**: `POST /api/v1/mempool/snapshot`, then queries
//!   and release under `/api/v1/mempool/snapshot/{token}`

mod handlers;
mod routes;
mod server;
mod state;
mod types;

pub use routes::create_router;
pub use server::{RpcServer, RpcServerConfig, RpcServerError, RpcServerHandle};
pub use state::RpcState;
pub use types::{
    ErrorResponse, HasTxResponse, HealthResponse, NextTxResponse, ReadyResponse, ReleaseResponse,
    SizesResponse, SnapshotResponse, SubmitTxRequest, SubmitTxResponse, TxEntry,
};
