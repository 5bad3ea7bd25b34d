//! Shared state for API handlers.

use nodegate_bridge::NodeBridge;
use std::sync::Arc;

/// State shared across all handlers.
#[derive(Clone)]
pub struct RpcState {
    /// Handle to the node's local socket.
    pub bridge: Arc<NodeBridge>,
}

impl RpcState {
    pub fn new(bridge: Arc<NodeBridge>) -> Self {
        Self { bridge }
    }
}
