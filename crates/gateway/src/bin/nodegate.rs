//! nodegate - HTTP gateway for a node's local mini-protocol socket.

use anyhow::{bail, Context};
use clap::Parser;
use nodegate_bridge::{BridgeConfig, NodeAddress, NodeBridge};
use nodegate_gateway::rpc::{RpcServer, RpcServerConfig};
use nodegate_gateway::telemetry::{init_telemetry, TelemetryConfig};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "nodegate",
    about = "HTTP gateway for a node's local mini-protocols"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node socket path (overrides config).
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Node TCP address (overrides config).
    #[arg(long)]
    tcp: Option<String>,

    /// API listen address (overrides config).
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    #[serde(default)]
    node: NodeSection,
    #[serde(default)]
    api: ApiSection,
    #[serde(default)]
    bridge: BridgeSection,
    #[serde(default)]
    telemetry: TelemetrySection,
}

/// Where to find the node's local socket. Exactly one of the two transports
/// must be configured.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeSection {
    socket_path: Option<PathBuf>,
    tcp_addr: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApiSection {
    #[serde(default = "default_listen_addr")]
    listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8090))
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BridgeSection {
    #[serde(default = "default_call_timeout_ms")]
    call_timeout_ms: u64,
    #[serde(default = "default_queue_depth")]
    queue_depth: usize,
    #[serde(default = "default_reconnect")]
    reconnect: bool,
    #[serde(default = "default_initial_backoff_ms")]
    initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    max_backoff_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_queue_depth() -> usize {
    64
}

fn default_reconnect() -> bool {
    true
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            queue_depth: default_queue_depth(),
            reconnect: default_reconnect(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TelemetrySection {
    #[serde(default = "default_service_name")]
    service_name: String,
    #[serde(default)]
    otlp_endpoint: Option<String>,
    #[serde(default = "default_sampling_ratio")]
    sampling_ratio: f64,
}

fn default_service_name() -> String {
    "nodegate".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            otlp_endpoint: None,
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

impl Config {
    fn load(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(socket) = &cli.socket {
            self.node.socket_path = Some(socket.clone());
            self.node.tcp_addr = None;
        }
        if let Some(tcp) = &cli.tcp {
            self.node.tcp_addr = Some(tcp.clone());
            self.node.socket_path = None;
        }
        if let Some(listen) = cli.listen {
            self.api.listen_addr = listen;
        }
    }

    fn node_address(&self) -> anyhow::Result<NodeAddress> {
        match (&self.node.socket_path, &self.node.tcp_addr) {
            (Some(path), None) => Ok(NodeAddress::Unix(path.clone())),
            (None, Some(addr)) => Ok(NodeAddress::Tcp(addr.clone())),
            (Some(_), Some(_)) => {
                bail!("configure either node.socket_path or node.tcp_addr, not both")
            }
            (None, None) => {
                bail!("no node socket configured; set node.socket_path or node.tcp_addr")
            }
        }
    }

    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig::default()
            .with_call_timeout(Duration::from_millis(self.bridge.call_timeout_ms))
            .with_queue_depth(self.bridge.queue_depth)
            .with_reconnect(self.bridge.reconnect)
            .with_backoff(
                Duration::from_millis(self.bridge.initial_backoff_ms),
                Duration::from_millis(self.bridge.max_backoff_ms),
            )
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Entry point
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", &cli.log_level);
    }

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_overrides(&cli);

    let telemetry_config = TelemetryConfig {
        service_name: config.telemetry.service_name.clone(),
        otlp_endpoint: config.telemetry.otlp_endpoint.clone(),
        sampling_ratio: config.telemetry.sampling_ratio,
        resource_attributes: vec![],
    };
    let telemetry_guard =
        init_telemetry(&telemetry_config).context("failed to initialize telemetry")?;

    let address = config.node_address()?;
    info!(node = %address, "connecting to node");
    let bridge = Arc::new(NodeBridge::connect(address, config.bridge_config()));

    let server_config = RpcServerConfig {
        listen_addr: config.api.listen_addr,
    };
    let server = RpcServer::new(server_config, bridge.clone())
        .start()
        .await
        .context("failed to start API server")?;

    wait_for_shutdown_signal().await;
    info!("shutting down");

    server.abort();
    bridge.shutdown();
    telemetry_guard.shutdown().await;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
