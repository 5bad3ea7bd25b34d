//! API endpoint handlers.

use super::state::RpcState;
use super::types::*;
use crate::metrics;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use nodegate_bridge::{BridgeError, SubmitOutcome};
use nodegate_types::{RawTx, TxId};
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::info;

// ═══════════════════════════════════════════════════════════════════════════
// Health & Readiness
// ═══════════════════════════════════════════════════════════════════════════

/// Handler for `GET /health` - liveness probe.
///
/// Returns 200 OK if the server is running. This indicates the process is
/// alive but not necessarily ready to serve traffic.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Handler for `GET /ready` - readiness probe.
///
/// Returns 200 OK when the node connection is up, 503 otherwise.
pub async fn ready_handler(State(state): State<RpcState>) -> impl IntoResponse {
    let ready = state.bridge.is_ready();
    metrics::set_connection_ready(ready);
    let (status, label) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };
    (
        status,
        Json(ReadyResponse {
            status: label.to_string(),
            ready,
        }),
    )
}

/// Handler for `GET /metrics` - Prometheus metrics in text format.
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(error) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(?error, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("failed to encode metrics")),
        )
            .into_response();
    }

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

// ═══════════════════════════════════════════════════════════════════════════
// Transaction Submission
// ═══════════════════════════════════════════════════════════════════════════

/// Handler for `POST /api/v1/tx` - submit a transaction to the node.
///
/// The node's verdict maps to the status code: 202 for an accepted
/// transaction, 400 with the node's reason for a rejected one.
pub async fn submit_tx_handler(
    State(state): State<RpcState>,
    Json(request): Json<SubmitTxRequest>,
) -> Response {
    let bytes = match hex::decode(&request.tx_hex) {
        Ok(bytes) => bytes,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::with_details(
                    "invalid transaction hex",
                    error.to_string(),
                )),
            )
                .into_response();
        }
    };
    if bytes.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("empty transaction body")),
        )
            .into_response();
    }

    let tx = match request.era {
        Some(era) => RawTx::with_era(era, bytes),
        None => RawTx::new(bytes),
    };
    let tx_id = tx.id().to_hex();

    let started = Instant::now();
    match state.bridge.submit(tx).await {
        Ok(SubmitOutcome::Accepted) => {
            call_succeeded("submit", started);
            metrics::record_submission(true);
            info!(%tx_id, "transaction accepted");
            (
                StatusCode::ACCEPTED,
                Json(SubmitTxResponse {
                    accepted: true,
                    tx_id,
                    reason: None,
                    error: None,
                }),
            )
                .into_response()
        }
        Ok(SubmitOutcome::Rejected { reason }) => {
            call_succeeded("submit", started);
            metrics::record_submission(false);
            info!(%tx_id, %reason, "transaction rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(SubmitTxResponse {
                    accepted: false,
                    tx_id,
                    reason: Some(reason.to_string()),
                    error: None,
                }),
            )
                .into_response()
        }
        Err(error) => call_failed("submit", started, error),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Mempool Snapshots
// ═══════════════════════════════════════════════════════════════════════════

/// Handler for `POST /api/v1/mempool/snapshot` - acquire a snapshot.
pub async fn acquire_snapshot_handler(State(state): State<RpcState>) -> Response {
    let started = Instant::now();
    match state.bridge.acquire().await {
        Ok((token, slot)) => {
            call_succeeded("acquire", started);
            info!(token = %token, slot, "mempool snapshot acquired");
            (
                StatusCode::CREATED,
                Json(SnapshotResponse {
                    token: token.to_string(),
                    slot,
                }),
            )
                .into_response()
        }
        Err(error) => call_failed("acquire", started, error),
    }
}

/// Handler for `GET /api/v1/mempool/snapshot/{token}/sizes`.
pub async fn snapshot_sizes_handler(
    State(state): State<RpcState>,
    Path(token): Path<String>,
) -> Response {
    let started = Instant::now();
    match state.bridge.sizes(token.into()).await {
        Ok(sizes) => {
            call_succeeded("sizes", started);
            Json(SizesResponse {
                capacity_bytes: sizes.capacity_bytes,
                current_size_bytes: sizes.current_size_bytes,
                number_of_txs: sizes.number_of_txs,
            })
            .into_response()
        }
        Err(error) => call_failed("sizes", started, error),
    }
}

/// Handler for `GET /api/v1/mempool/snapshot/{token}/tx/{id}`.
pub async fn snapshot_has_tx_handler(
    State(state): State<RpcState>,
    Path((token, id)): Path<(String, String)>,
) -> Response {
    let tx_id = match TxId::from_hex(&id) {
        Ok(tx_id) => tx_id,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::with_details(
                    "invalid transaction id",
                    error.to_string(),
                )),
            )
                .into_response();
        }
    };

    let started = Instant::now();
    match state.bridge.has_tx(token.into(), tx_id).await {
        Ok(present) => {
            call_succeeded("has_tx", started);
            Json(HasTxResponse {
                tx_id: tx_id.to_hex(),
                present,
            })
            .into_response()
        }
        Err(error) => call_failed("has_tx", started, error),
    }
}

/// Handler for `POST /api/v1/mempool/snapshot/{token}/next` - advance the
/// snapshot cursor.
pub async fn snapshot_next_tx_handler(
    State(state): State<RpcState>,
    Path(token): Path<String>,
) -> Response {
    let started = Instant::now();
    match state.bridge.next_tx(token.into()).await {
        Ok(tx) => {
            call_succeeded("next_tx", started);
            Json(NextTxResponse {
                tx: tx.map(|tx| TxEntry {
                    id: tx.id.to_hex(),
                    bytes_hex: hex::encode(&tx.bytes),
                }),
            })
            .into_response()
        }
        Err(error) => call_failed("next_tx", started, error),
    }
}

/// Handler for `DELETE /api/v1/mempool/snapshot/{token}` - release the
/// snapshot.
pub async fn release_snapshot_handler(
    State(state): State<RpcState>,
    Path(token): Path<String>,
) -> Response {
    let started = Instant::now();
    match state.bridge.release(token.into()).await {
        Ok(()) => {
            call_succeeded("release", started);
            info!("mempool snapshot released");
            Json(ReleaseResponse { released: true }).into_response()
        }
        Err(error) => call_failed("release", started, error),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Error Mapping
// ═══════════════════════════════════════════════════════════════════════════

fn call_succeeded(operation: &str, started: Instant) {
    metrics::record_node_call(operation, "ok", started.elapsed().as_secs_f64());
}

/// Map a bridge failure to an HTTP response.
///
/// Protocol contract violations are the caller's fault (409). A call that
/// expired while queued never reached the node (408); one that expired
/// mid-exchange cost the connection (504). Transport faults and a down
/// connection surface as gateway errors (502, 503).
fn call_failed(operation: &str, started: Instant, error: BridgeError) -> Response {
    metrics::record_node_call(operation, error.kind(), started.elapsed().as_secs_f64());
    let status = match &error {
        BridgeError::StateContract(_) => StatusCode::CONFLICT,
        BridgeError::Timeout { in_flight: false } => StatusCode::REQUEST_TIMEOUT,
        BridgeError::Timeout { in_flight: true } => StatusCode::GATEWAY_TIMEOUT,
        BridgeError::Transport(_) => StatusCode::BAD_GATEWAY,
        BridgeError::ConnectionLost => StatusCode::SERVICE_UNAVAILABLE,
    };
    tracing::warn!(operation, %error, status = %status, "node call failed");
    (
        status,
        Json(ErrorResponse::with_details(error.kind(), error.to_string())),
    )
        .into_response()
}
