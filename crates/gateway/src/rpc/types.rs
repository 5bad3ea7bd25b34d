//! Request and response types for the gateway API.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// Health & Readiness
// ═══════════════════════════════════════════════════════════════════════════

/// Response for `/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Response for `/ready` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub status: String,
    pub ready: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// Transaction Submission
// ═══════════════════════════════════════════════════════════════════════════

/// Request body for `POST /api/v1/tx`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTxRequest {
    /// Hex-encoded raw transaction bytes.
    pub tx_hex: String,
    /// Ledger era tag. Defaults to the current era when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub era: Option<u16>,
}

/// Response for `POST /api/v1/tx`.
///
/// A node rejection is reported with `accepted: false` and the node's
/// `reason`; `error` is reserved for malformed requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTxResponse {
    /// Whether the node accepted the transaction into its mempool.
    pub accepted: bool,
    /// Transaction id (hex-encoded).
    pub tx_id: String,
    /// Node's rejection reason, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Error message for requests that never reached the node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Mempool Snapshots
// ═══════════════════════════════════════════════════════════════════════════

/// Response for `POST /api/v1/mempool/snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    /// Opaque snapshot token; path parameter for all queries against it.
    pub token: String,
    /// Slot the snapshot was taken at.
    pub slot: u64,
}

/// Response for `GET /api/v1/mempool/snapshot/{token}/sizes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizesResponse {
    pub capacity_bytes: u64,
    pub current_size_bytes: u64,
    pub number_of_txs: u32,
}

/// Response for `GET /api/v1/mempool/snapshot/{token}/tx/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasTxResponse {
    /// Queried transaction id (hex-encoded).
    pub tx_id: String,
    /// Whether the snapshot contains it.
    pub present: bool,
}

/// One mempool transaction as returned by the cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxEntry {
    /// Transaction id (hex-encoded).
    pub id: String,
    /// Raw transaction bytes (hex-encoded).
    pub bytes_hex: String,
}

/// Response for `POST /api/v1/mempool/snapshot/{token}/next`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextTxResponse {
    /// The next transaction, or `null` once the snapshot is exhausted.
    pub tx: Option<TxEntry>,
}

/// Response for `DELETE /api/v1/mempool/snapshot/{token}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub released: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// Error Response
// ═══════════════════════════════════════════════════════════════════════════

/// Generic error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
