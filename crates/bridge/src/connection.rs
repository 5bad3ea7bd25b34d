//! Connection ownership and supervision.
//!
//! One task per bridge owns the socket. It demultiplexes inbound segments
//! into per-protocol queues and serializes outbound frames onto the wire.
//! Protocol workers never touch the socket; they talk to this task through
//! channel handles that are minted fresh for every connection generation, so
//! a worker can never write onto a connection it does not know about.
//!
//! # Task Topology
//!
//! ```text
//! NodeBridge ──calls──▶ SubmissionWorker ─┐
//!            ──calls──▶ MonitorWorker    ─┤ per-generation handles
//!                                         ▼
//!                              ConnectionSupervisor ──io──▶ node socket
//! ```
//!
//! The supervisor redials with exponential backoff after a lost connection
//! (when configured to) and publishes each new generation through a watch
//! channel. Workers claim their protocol's handles from the latest
//! generation lazily, at the next call they dequeue.

use crate::config::BridgeConfig;
use nodegate_wire::{
    encode_segments, Direction, MessageAssembler, ProtocolId, SegmentDecoder,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

// ═══════════════════════════════════════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════════════════════════════════════

/// Byte stream to the node. Unix sockets, TCP sockets, and in-memory test
/// pipes all satisfy it.
pub trait NodeStream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin {}

impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin> NodeStream for T {}

/// Dials the node. Implementations pick the transport.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<io::Result<Box<dyn NodeStream>>>;
}

/// Where the node's local socket lives.
#[derive(Debug, Clone)]
pub enum NodeAddress {
    /// Unix domain socket path.
    Unix(PathBuf),
    /// TCP `host:port`, for nodes fronted by a socket-over-TCP proxy.
    Tcp(String),
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeAddress::Unix(path) => write!(f, "unix:{}", path.display()),
            NodeAddress::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

/// Production connector dialing a [`NodeAddress`].
pub struct SocketConnector {
    address: NodeAddress,
}

impl SocketConnector {
    pub fn new(address: NodeAddress) -> Self {
        Self { address }
    }
}

impl Connector for SocketConnector {
    fn connect(&self) -> BoxFuture<io::Result<Box<dyn NodeStream>>> {
        let address = self.address.clone();
        Box::pin(async move {
            match address {
                NodeAddress::Unix(path) => {
                    let stream = tokio::net::UnixStream::connect(&path).await?;
                    Ok(Box::new(stream) as Box<dyn NodeStream>)
                }
                NodeAddress::Tcp(addr) => {
                    let stream = tokio::net::TcpStream::connect(&addr).await?;
                    stream.set_nodelay(true)?;
                    Ok(Box::new(stream) as Box<dyn NodeStream>)
                }
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Liveness and generations
// ═══════════════════════════════════════════════════════════════════════════

/// Coarse connection state, published through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Dialing, or waiting out a reconnect backoff.
    Connecting,
    /// Connected; calls can flow.
    Ready,
    /// Permanently closed; no further reconnect attempts.
    Closed,
}

/// Outbound message frame tagged with its protocol channel.
pub(crate) struct OutboundFrame {
    pub protocol: ProtocolId,
    pub frame: Vec<u8>,
}

/// Per-connection endpoints handed to one protocol worker.
pub(crate) struct ChannelHandles {
    /// Shared writer queue into the io task.
    pub outbound: mpsc::Sender<OutboundFrame>,
    /// Frame bodies the io task demultiplexed for this protocol.
    pub inbound: mpsc::Receiver<Vec<u8>>,
    /// Escalation path: tear the whole connection down.
    pub fatal: mpsc::Sender<String>,
}

/// One connection generation's worth of channel handles.
///
/// Workers claim their protocol's handles exactly once per generation; a
/// stale worker observing an old generation simply finds its slot empty.
#[derive(Clone)]
pub(crate) struct Generation {
    id: u64,
    slots: Arc<HashMap<ProtocolId, Mutex<Option<ChannelHandles>>>>,
}

impl Generation {
    fn new(id: u64, handles: HashMap<ProtocolId, ChannelHandles>) -> Self {
        let slots = handles
            .into_iter()
            .map(|(protocol, h)| (protocol, Mutex::new(Some(h))))
            .collect();
        Self {
            id,
            slots: Arc::new(slots),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn claim(&self, protocol: ProtocolId) -> Option<ChannelHandles> {
        self.slots.get(&protocol)?.lock().take()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Channel
// ═══════════════════════════════════════════════════════════════════════════

/// Why an exchange on a channel failed.
#[derive(Debug)]
pub(crate) enum ExchangeFailure {
    /// The connection went away under the exchange.
    Lost,
    /// The peer broke protocol; the connection must be torn down.
    Protocol(String),
}

/// A protocol worker's view of one channel on the current connection.
pub(crate) struct Channel {
    protocol: ProtocolId,
    handles: ChannelHandles,
}

impl Channel {
    pub fn new(protocol: ProtocolId, handles: ChannelHandles) -> Self {
        Self { protocol, handles }
    }

    pub async fn send<M: sbor::BasicEncode>(&self, message: &M) -> Result<(), ExchangeFailure> {
        let frame = nodegate_wire::encode_frame(message)
            .map_err(|e| ExchangeFailure::Protocol(format!("encode failed: {e}")))?;
        self.handles
            .outbound
            .send(OutboundFrame {
                protocol: self.protocol,
                frame,
            })
            .await
            .map_err(|_| ExchangeFailure::Lost)
    }

    pub async fn recv<M: sbor::BasicDecode>(&mut self) -> Result<M, ExchangeFailure> {
        let body = self
            .handles
            .inbound
            .recv()
            .await
            .ok_or(ExchangeFailure::Lost)?;
        nodegate_wire::decode_frame(&body)
            .map_err(|e| ExchangeFailure::Protocol(format!("decode failed: {e}")))
    }

    /// Ask the supervisor to tear the connection down.
    pub async fn escalate(&self, reason: impl Into<String>) {
        let _ = self.handles.fatal.send(reason.into()).await;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Supervisor
// ═══════════════════════════════════════════════════════════════════════════

const OUTBOUND_QUEUE_DEPTH: usize = 64;
const INBOUND_QUEUE_DEPTH: usize = 16;
const READ_BUF_LEN: usize = 16 * 1024;

/// Owns the connection lifecycle: dial, serve, tear down, redial.
pub(crate) struct ConnectionSupervisor {
    connector: Box<dyn Connector>,
    config: BridgeConfig,
    liveness: watch::Sender<Liveness>,
    generations: watch::Sender<Option<Generation>>,
}

impl ConnectionSupervisor {
    pub fn new(
        connector: Box<dyn Connector>,
        config: BridgeConfig,
        liveness: watch::Sender<Liveness>,
        generations: watch::Sender<Option<Generation>>,
    ) -> Self {
        Self {
            connector,
            config,
            liveness,
            generations,
        }
    }

    pub async fn run(self) {
        let mut backoff = self.config.initial_backoff;
        let mut generation_id = 0u64;
        loop {
            let _ = self.liveness.send(Liveness::Connecting);
            let stream = match self.connector.connect().await {
                Ok(stream) => stream,
                Err(e) => {
                    if !self.config.reconnect {
                        warn!(error = %e, "failed to reach the node, not retrying");
                        break;
                    }
                    debug!(
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "failed to reach the node, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                    continue;
                }
            };
            backoff = self.config.initial_backoff;
            generation_id += 1;

            // Fresh channels for this generation. Stale handles from earlier
            // generations fail on use; they can never reach this connection.
            let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
            let (fatal_tx, fatal_rx) = mpsc::channel(4);
            let mut inbound_txs = HashMap::new();
            let mut handles = HashMap::new();
            for protocol in ProtocolId::ALL {
                let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
                inbound_txs.insert(protocol, inbound_tx);
                handles.insert(
                    protocol,
                    ChannelHandles {
                        outbound: outbound_tx.clone(),
                        inbound: inbound_rx,
                        fatal: fatal_tx.clone(),
                    },
                );
            }
            drop(outbound_tx);
            drop(fatal_tx);
            if self
                .generations
                .send(Some(Generation::new(generation_id, handles)))
                .is_err()
            {
                // All workers are gone; the bridge is shutting down.
                break;
            }

            let _ = self.liveness.send(Liveness::Ready);
            info!(generation = generation_id, "connected to the node");
            let exit = io_loop(stream, outbound_rx, inbound_txs, fatal_rx).await;
            match &exit {
                IoExit::Shutdown => break,
                IoExit::PeerClosed => info!("node closed the connection"),
                IoExit::Transport(e) => warn!(error = %e, "connection failed"),
                IoExit::Escalated(reason) => warn!(reason = %reason, "connection torn down"),
            }
            if !self.config.reconnect {
                break;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
        let _ = self.liveness.send(Liveness::Closed);
    }
}

/// Reason the io loop ended.
#[derive(Debug)]
enum IoExit {
    /// Node closed the stream cleanly.
    PeerClosed,
    /// Socket error or malformed wire data.
    Transport(String),
    /// A worker demanded teardown.
    Escalated(String),
    /// Every handle holder is gone; the bridge is shutting down.
    Shutdown,
}

async fn io_loop(
    stream: Box<dyn NodeStream>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    inbound: HashMap<ProtocolId, mpsc::Sender<Vec<u8>>>,
    mut fatal: mpsc::Receiver<String>,
) -> IoExit {
    let started = Instant::now();
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut decoder = SegmentDecoder::new(Direction::FromResponder);
    let mut assemblers: HashMap<ProtocolId, MessageAssembler> = ProtocolId::ALL
        .iter()
        .map(|p| (*p, MessageAssembler::new()))
        .collect();
    let mut read_buf = vec![0u8; READ_BUF_LEN];

    loop {
        tokio::select! {
            maybe_frame = outbound.recv() => match maybe_frame {
                Some(OutboundFrame { protocol, frame }) => {
                    let timestamp = started.elapsed().as_micros() as u32;
                    let bytes =
                        encode_segments(protocol, Direction::FromInitiator, timestamp, &frame);
                    if let Err(e) = writer.write_all(&bytes).await {
                        return IoExit::Transport(format!("write failed: {e}"));
                    }
                    if let Err(e) = writer.flush().await {
                        return IoExit::Transport(format!("flush failed: {e}"));
                    }
                }
                None => return IoExit::Shutdown,
            },
            result = reader.read(&mut read_buf) => match result {
                Ok(0) => {
                    if let Err(e) = decoder.finish() {
                        return IoExit::Transport(e.to_string());
                    }
                    return IoExit::PeerClosed;
                }
                Ok(n) => {
                    decoder.feed(&read_buf[..n]);
                    if let Err(exit) = dispatch(&mut decoder, &mut assemblers, &inbound) {
                        return exit;
                    }
                }
                Err(e) => return IoExit::Transport(format!("read failed: {e}")),
            },
            reason = fatal.recv() => match reason {
                Some(reason) => return IoExit::Escalated(reason),
                None => return IoExit::Shutdown,
            },
        }
    }
}

/// Drain complete segments into per-protocol frame queues.
///
/// The protocols never owe more than one reply at a time, so a full inbound
/// queue means the node is flooding unsolicited frames. That is a transport
/// failure; blocking here would wedge the whole io loop behind it.
fn dispatch(
    decoder: &mut SegmentDecoder,
    assemblers: &mut HashMap<ProtocolId, MessageAssembler>,
    inbound: &HashMap<ProtocolId, mpsc::Sender<Vec<u8>>>,
) -> Result<(), IoExit> {
    loop {
        let segment = match decoder.next_segment() {
            Ok(Some(segment)) => segment,
            Ok(None) => return Ok(()),
            Err(e) => return Err(IoExit::Transport(e.to_string())),
        };
        let protocol = segment.header.protocol;
        let assembler = assemblers
            .get_mut(&protocol)
            .expect("assembler exists for every protocol");
        assembler.feed(&segment.payload);
        loop {
            match assembler.next_body() {
                Ok(Some(body)) => match inbound[&protocol].try_send(body) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        return Err(IoExit::Transport(format!(
                            "unsolicited frame flood on {protocol:?}"
                        )));
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        return Err(IoExit::Shutdown);
                    }
                },
                Ok(None) => break,
                Err(e) => return Err(IoExit::Transport(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodegate_wire::{encode_frame, TxSubmissionMessage};

    #[test]
    fn test_unsolicited_frame_flood_is_a_transport_failure() {
        let mut decoder = SegmentDecoder::new(Direction::FromResponder);
        let mut assemblers: HashMap<ProtocolId, MessageAssembler> = ProtocolId::ALL
            .iter()
            .map(|p| (*p, MessageAssembler::new()))
            .collect();
        let (submission_tx, _submission_rx) = mpsc::channel(2);
        let (monitor_tx, _monitor_rx) = mpsc::channel(2);
        let inbound = HashMap::from([
            (ProtocolId::TxSubmission, submission_tx),
            (ProtocolId::TxMonitor, monitor_tx),
        ]);

        // Nobody is draining the queue; replies beyond its depth are frames
        // no pending call asked for.
        let frame = encode_frame(&TxSubmissionMessage::AcceptTx).unwrap();
        for _ in 0..3 {
            decoder.feed(&encode_segments(
                ProtocolId::TxSubmission,
                Direction::FromResponder,
                0,
                &frame,
            ));
        }

        let result = dispatch(&mut decoder, &mut assemblers, &inbound);
        assert!(matches!(result, Err(IoExit::Transport(_))));
    }
}
