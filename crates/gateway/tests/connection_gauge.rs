//! Connection gauge tracking.
//!
//! Lives in its own test binary: the gauge is registered in the process-wide
//! Prometheus registry, and other tests set it through the readiness handler.

use nodegate_bridge::testing::{spawn_mock_node, MockNodeConfig};
use nodegate_bridge::{BridgeConfig, NodeBridge};
use nodegate_gateway::metrics;
use nodegate_gateway::rpc::{RpcServer, RpcServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

async fn wait_for_gauge(value: f64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if metrics::metrics().connection_ready.get() == value {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "connection gauge never reached {value}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connection_gauge_follows_liveness_without_ready_polls() {
    let (connector, node) = spawn_mock_node(MockNodeConfig::default());
    let bridge = Arc::new(NodeBridge::connect_with(
        connector,
        BridgeConfig::for_testing().with_reconnect(false),
    ));
    let config = RpcServerConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
    };
    let server = RpcServer::new(config, bridge).start().await.unwrap();

    // No request ever hits /ready; the gauge must move on its own.
    wait_for_gauge(1.0).await;
    node.drop_connection();
    wait_for_gauge(0.0).await;

    server.abort();
}
