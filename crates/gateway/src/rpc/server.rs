//! HTTP server lifecycle.

use super::routes::create_router;
use super::state::RpcState;
use crate::metrics;
use nodegate_bridge::{Liveness, NodeBridge};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Error)]
pub enum RpcServerError {
    #[error("Failed to bind listen address: {0}")]
    Bind(#[from] std::io::Error),
}

/// Configuration for the API server.
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8090)),
        }
    }
}

/// The gateway's API server.
pub struct RpcServer {
    config: RpcServerConfig,
    state: RpcState,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, bridge: Arc<NodeBridge>) -> Self {
        Self {
            config,
            state: RpcState::new(bridge),
        }
    }

    /// Bind the listener and start serving in a background task.
    pub async fn start(self) -> Result<RpcServerHandle, RpcServerError> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "API server listening");

        // Track the bridge's liveness continuously so the connection gauge
        // reflects drops and reconnects even when nobody polls /ready.
        let bridge = self.state.bridge.clone();
        metrics::set_connection_ready(bridge.is_ready());
        let watcher = tokio::spawn(async move {
            let mut seen = bridge.liveness();
            loop {
                seen = bridge.liveness_changed(seen).await;
                metrics::set_connection_ready(seen == Liveness::Ready);
                if seen == Liveness::Closed {
                    break;
                }
            }
        });

        let router = create_router(self.state);
        let task = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, router).await {
                tracing::error!(%error, "API server exited");
            }
        });

        Ok(RpcServerHandle {
            local_addr,
            task,
            watcher,
        })
    }
}

/// Handle to a running API server.
pub struct RpcServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
    watcher: JoinHandle<()>,
}

impl RpcServerHandle {
    /// The address the server is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the server immediately.
    pub fn abort(&self) {
        self.task.abort();
        self.watcher.abort();
    }

    /// Wait for the server task to finish.
    pub async fn join(self) {
        let _ = self.task.await;
        self.watcher.abort();
    }
}
