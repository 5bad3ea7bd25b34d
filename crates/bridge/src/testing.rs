//! In-memory node double for tests.
//!
//! [`spawn_mock_node`] stands up a scripted node speaking both
//! mini-protocols over an in-memory duplex transport. Tests drive failure
//! scenarios through [`MockNodeHandle`]: force-drop the live connection,
//! stall submissions to trip timeouts, or pre-load rejection verdicts.

use crate::connection::{BoxFuture, Connector, NodeStream};
use nodegate_types::{MempoolSizes, MempoolTx, RejectReason, TxId};
use nodegate_wire::{
    decode_frame, encode_frame, encode_segments, Direction, MessageAssembler, ProtocolId,
    SegmentDecoder, TxMonitorMessage, TxSubmissionMessage,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const PIPE_CAPACITY: usize = 64 * 1024;

// ═══════════════════════════════════════════════════════════════════════════
// In-memory transport
// ═══════════════════════════════════════════════════════════════════════════

/// Connector producing in-memory duplex streams.
///
/// Each dial mints a fresh pipe and hands the server end to the paired
/// [`MemoryListener`], mirroring how reconnects reach a real socket.
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<DuplexStream>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryListener) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (Self { accept_tx }, MemoryListener { accept_rx })
    }
}

impl Connector for MemoryConnector {
    fn connect(&self) -> BoxFuture<io::Result<Box<dyn NodeStream>>> {
        let (client, server) = duplex(PIPE_CAPACITY);
        let accepted = self.accept_tx.send(server).is_ok();
        Box::pin(async move {
            if accepted {
                Ok(Box::new(client) as Box<dyn NodeStream>)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "mock node is gone",
                ))
            }
        })
    }
}

/// Server side of a [`MemoryConnector`].
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<DuplexStream>,
}

impl MemoryListener {
    pub async fn accept(&mut self) -> Option<DuplexStream> {
        self.accept_rx.recv().await
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Mock node
// ═══════════════════════════════════════════════════════════════════════════

/// Initial scripted state for a mock node.
#[derive(Debug, Clone)]
pub struct MockNodeConfig {
    /// Slot reported for every snapshot acquisition.
    pub slot: u64,
    /// Mempool capacity reported by size queries.
    pub capacity_bytes: u64,
    /// Transactions present in the mempool at startup.
    pub initial_mempool: Vec<MempoolTx>,
}

impl Default for MockNodeConfig {
    fn default() -> Self {
        Self {
            slot: 1000,
            capacity_bytes: 4 * 1024 * 1024,
            initial_mempool: Vec::new(),
        }
    }
}

struct MockState {
    slot: u64,
    capacity_bytes: u64,
    mempool: Vec<MempoolTx>,
    rejections: HashMap<TxId, RejectReason>,
    stall_submission: bool,
}

/// Control surface for a running mock node.
pub struct MockNodeHandle {
    state: Arc<Mutex<MockState>>,
    kill_tx: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl MockNodeHandle {
    /// Script a rejection verdict for the given transaction.
    pub fn reject_with(&self, id: TxId, reason: &str) {
        self.state
            .lock()
            .rejections
            .insert(id, RejectReason::new(reason));
    }

    /// When stalled, submissions are read but never answered.
    pub fn set_stall_submission(&self, stall: bool) {
        self.state.lock().stall_submission = stall;
    }

    pub fn set_slot(&self, slot: u64) {
        self.state.lock().slot = slot;
    }

    pub fn mempool_len(&self) -> usize {
        self.state.lock().mempool.len()
    }

    /// Drop the live connection, as a node restart would.
    pub fn drop_connection(&self) {
        let _ = self.kill_tx.send(());
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for MockNodeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start a mock node. Returns the connector to hand to the bridge and the
/// control handle.
pub fn spawn_mock_node(config: MockNodeConfig) -> (MemoryConnector, MockNodeHandle) {
    let (connector, listener) = MemoryConnector::new();
    let state = Arc::new(Mutex::new(MockState {
        slot: config.slot,
        capacity_bytes: config.capacity_bytes,
        mempool: config.initial_mempool,
        rejections: HashMap::new(),
        stall_submission: false,
    }));
    let (kill_tx, kill_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_mock(listener, state.clone(), kill_rx));
    (
        connector,
        MockNodeHandle {
            state,
            kill_tx,
            task,
        },
    )
}

async fn run_mock(
    mut listener: MemoryListener,
    state: Arc<Mutex<MockState>>,
    mut kill_rx: mpsc::UnboundedReceiver<()>,
) {
    while let Some(stream) = listener.accept().await {
        // Stale kill signals from before this connection do not apply.
        while kill_rx.try_recv().is_ok() {}
        serve_connection(stream, &state, &mut kill_rx).await;
    }
}

async fn serve_connection(
    stream: DuplexStream,
    state: &Arc<Mutex<MockState>>,
    kill_rx: &mut mpsc::UnboundedReceiver<()>,
) {
    let started = Instant::now();
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut decoder = SegmentDecoder::new(Direction::FromInitiator);
    let mut assemblers: HashMap<ProtocolId, MessageAssembler> = ProtocolId::ALL
        .iter()
        .map(|p| (*p, MessageAssembler::new()))
        .collect();
    let mut snapshot: Option<MockSnapshot> = None;
    let mut buf = vec![0u8; 16 * 1024];

    loop {
        tokio::select! {
            _ = kill_rx.recv() => return,
            result = reader.read(&mut buf) => {
                let n = match result {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                decoder.feed(&buf[..n]);
                loop {
                    let segment = match decoder.next_segment() {
                        Ok(Some(segment)) => segment,
                        Ok(None) => break,
                        Err(_) => return,
                    };
                    let protocol = segment.header.protocol;
                    let assembler = assemblers.get_mut(&protocol).expect("assembler per protocol");
                    assembler.feed(&segment.payload);
                    loop {
                        let body = match assembler.next_body() {
                            Ok(Some(body)) => body,
                            Ok(None) => break,
                            Err(_) => return,
                        };
                        let reply = match protocol {
                            ProtocolId::TxSubmission => handle_submission(state, &body),
                            ProtocolId::TxMonitor => handle_monitor(state, &mut snapshot, &body),
                        };
                        match reply {
                            Ok(Some(frame)) => {
                                let timestamp = started.elapsed().as_micros() as u32;
                                let bytes = encode_segments(
                                    protocol,
                                    Direction::FromResponder,
                                    timestamp,
                                    &frame,
                                );
                                if writer.write_all(&bytes).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(()) => return,
                        }
                    }
                }
            }
        }
    }
}

fn handle_submission(
    state: &Arc<Mutex<MockState>>,
    body: &[u8],
) -> Result<Option<Vec<u8>>, ()> {
    let message: TxSubmissionMessage = decode_frame(body).map_err(|_| ())?;
    match message {
        TxSubmissionMessage::SubmitTx { tx } => {
            let mut s = state.lock();
            if s.stall_submission {
                return Ok(None);
            }
            let id = tx.id();
            let reply = if let Some(reason) = s.rejections.get(&id).cloned() {
                TxSubmissionMessage::RejectTx { reason }
            } else if s.mempool.iter().any(|entry| entry.id == id) {
                TxSubmissionMessage::RejectTx {
                    reason: RejectReason::new("already-in-mempool"),
                }
            } else {
                s.mempool.push(MempoolTx { id, bytes: tx.bytes });
                TxSubmissionMessage::AcceptTx
            };
            Ok(Some(encode_frame(&reply).map_err(|_| ())?))
        }
        TxSubmissionMessage::Done => Ok(None),
        // The client sent a responder-side message.
        _ => Err(()),
    }
}

struct MockSnapshot {
    txs: Vec<MempoolTx>,
    cursor: usize,
}

fn handle_monitor(
    state: &Arc<Mutex<MockState>>,
    snapshot: &mut Option<MockSnapshot>,
    body: &[u8],
) -> Result<Option<Vec<u8>>, ()> {
    let message: TxMonitorMessage = decode_frame(body).map_err(|_| ())?;
    let reply = match message {
        TxMonitorMessage::Acquire => {
            let s = state.lock();
            *snapshot = Some(MockSnapshot {
                txs: s.mempool.clone(),
                cursor: 0,
            });
            TxMonitorMessage::Acquired { slot: s.slot }
        }
        TxMonitorMessage::HasTx { id } => {
            let snap = snapshot.as_ref().ok_or(())?;
            TxMonitorMessage::ReplyHasTx {
                has: snap.txs.iter().any(|tx| tx.id == id),
            }
        }
        TxMonitorMessage::NextTx => {
            let snap = snapshot.as_mut().ok_or(())?;
            let tx = snap.txs.get(snap.cursor).cloned();
            if tx.is_some() {
                snap.cursor += 1;
            }
            TxMonitorMessage::ReplyNextTx { tx }
        }
        TxMonitorMessage::GetSizes => {
            let snap = snapshot.as_ref().ok_or(())?;
            let s = state.lock();
            TxMonitorMessage::ReplyGetSizes {
                sizes: MempoolSizes {
                    capacity_bytes: s.capacity_bytes,
                    current_size_bytes: snap.txs.iter().map(|tx| tx.bytes.len() as u64).sum(),
                    number_of_txs: snap.txs.len() as u32,
                },
            }
        }
        TxMonitorMessage::Release => {
            *snapshot = None;
            TxMonitorMessage::Released
        }
        TxMonitorMessage::Done => return Ok(None),
        // The client sent a responder-side message.
        _ => return Err(()),
    };
    Ok(Some(encode_frame(&reply).map_err(|_| ())?))
}
