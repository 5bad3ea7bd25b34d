//! The bridge facade.

use crate::config::BridgeConfig;
use crate::connection::{
    ConnectionSupervisor, Connector, Liveness, NodeAddress, SocketConnector,
};
use crate::error::BridgeError;
use crate::serializer::{
    MonitorCall, MonitorWorker, SubmissionWorker, SubmitCall,
};
use crate::txmonitor::{MonitorReply, MonitorRequest, SnapshotToken};
use crate::txsubmission::SubmitOutcome;
use nodegate_types::{MempoolSizes, MempoolTx, RawTx, TxId};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

/// Client handle to a node's local mini-protocol socket.
///
/// Cheap to share: all methods take `&self` and calls from any number of
/// tasks are serialized per protocol channel in issue order. Dropping the
/// bridge tears down the connection and all its tasks.
pub struct NodeBridge {
    submit_calls: mpsc::Sender<SubmitCall>,
    monitor_calls: mpsc::Sender<MonitorCall>,
    liveness: watch::Receiver<Liveness>,
    call_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeBridge {
    /// Connect to a node socket. Returns immediately; the connection is
    /// established in the background and calls queue until it is ready.
    pub fn connect(address: NodeAddress, config: BridgeConfig) -> Self {
        Self::connect_with(SocketConnector::new(address), config)
    }

    /// Connect through a custom [`Connector`]. Tests use this with an
    /// in-memory transport.
    pub fn connect_with(connector: impl Connector, config: BridgeConfig) -> Self {
        let (liveness_tx, liveness_rx) = watch::channel(Liveness::Connecting);
        let (generation_tx, generation_rx) = watch::channel(None);
        let (submit_tx, submit_rx) = mpsc::channel(config.queue_depth);
        let (monitor_tx, monitor_rx) = mpsc::channel(config.queue_depth);

        let supervisor = ConnectionSupervisor::new(
            Box::new(connector),
            config.clone(),
            liveness_tx,
            generation_tx,
        );
        let tasks = vec![
            tokio::spawn(supervisor.run()),
            tokio::spawn(SubmissionWorker::new(submit_rx, generation_rx.clone()).run()),
            tokio::spawn(MonitorWorker::new(monitor_rx, generation_rx).run()),
        ];

        Self {
            submit_calls: submit_tx,
            monitor_calls: monitor_tx,
            liveness: liveness_rx,
            call_timeout: config.call_timeout,
            tasks,
        }
    }

    /// Submit a transaction and wait for the node's verdict.
    pub async fn submit(&self, tx: RawTx) -> Result<SubmitOutcome, BridgeError> {
        self.submit_with_timeout(tx, self.call_timeout).await
    }

    /// Submit with an explicit per-call timeout instead of the configured
    /// default.
    pub async fn submit_with_timeout(
        &self,
        tx: RawTx,
        timeout: Duration,
    ) -> Result<SubmitOutcome, BridgeError> {
        let deadline = Instant::now() + timeout;
        let (reply_tx, reply_rx) = oneshot::channel();
        let send = self.submit_calls.send(SubmitCall {
            tx,
            deadline,
            reply: reply_tx,
        });
        match timeout_at(deadline, send).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(BridgeError::ConnectionLost),
            Err(_) => return Err(BridgeError::Timeout { in_flight: false }),
        }
        await_reply(deadline, reply_rx).await
    }

    /// Acquire a mempool snapshot. Returns its token and the slot the
    /// snapshot was taken at.
    pub async fn acquire(&self) -> Result<(SnapshotToken, u64), BridgeError> {
        match self.monitor_call(MonitorRequest::Acquire).await? {
            MonitorReply::Acquired { token, slot } => Ok((token, slot)),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Is the transaction present in the snapshot?
    pub async fn has_tx(&self, token: SnapshotToken, id: TxId) -> Result<bool, BridgeError> {
        match self
            .monitor_call(MonitorRequest::HasTx { token, id })
            .await?
        {
            MonitorReply::HasTx(has) => Ok(has),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Advance the snapshot cursor by one transaction. `None` past the end.
    pub async fn next_tx(&self, token: SnapshotToken) -> Result<Option<MempoolTx>, BridgeError> {
        match self.monitor_call(MonitorRequest::NextTx { token }).await? {
            MonitorReply::NextTx(tx) => Ok(tx),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Report the snapshot's size measures.
    pub async fn sizes(&self, token: SnapshotToken) -> Result<MempoolSizes, BridgeError> {
        match self.monitor_call(MonitorRequest::Sizes { token }).await? {
            MonitorReply::Sizes(sizes) => Ok(sizes),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Release the snapshot. Its token is dead afterwards.
    pub async fn release(&self, token: SnapshotToken) -> Result<(), BridgeError> {
        match self.monitor_call(MonitorRequest::Release { token }).await? {
            MonitorReply::Released => Ok(()),
            other => Err(unexpected_reply(other)),
        }
    }

    async fn monitor_call(&self, request: MonitorRequest) -> Result<MonitorReply, BridgeError> {
        let deadline = Instant::now() + self.call_timeout;
        let (reply_tx, reply_rx) = oneshot::channel();
        let send = self.monitor_calls.send(MonitorCall {
            request,
            deadline,
            reply: reply_tx,
        });
        match timeout_at(deadline, send).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(BridgeError::ConnectionLost),
            Err(_) => return Err(BridgeError::Timeout { in_flight: false }),
        }
        await_reply(deadline, reply_rx).await
    }

    /// Current connection state.
    pub fn liveness(&self) -> Liveness {
        *self.liveness.borrow()
    }

    /// Whether calls can currently flow without waiting for a connection.
    pub fn is_ready(&self) -> bool {
        self.liveness() == Liveness::Ready
    }

    /// Wait until the liveness state changes from the given one. Returns the
    /// new state, or `Closed` if the bridge shut down meanwhile.
    pub async fn liveness_changed(&self, seen: Liveness) -> Liveness {
        let mut rx = self.liveness.clone();
        loop {
            let current = *rx.borrow();
            if current != seen {
                return current;
            }
            if rx.changed().await.is_err() {
                return Liveness::Closed;
            }
        }
    }

    /// Tear everything down. Also runs on drop.
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for NodeBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn unexpected_reply(reply: MonitorReply) -> BridgeError {
    BridgeError::Transport(format!("monitor reply out of order: {reply:?}"))
}

/// How long an expired caller waits for the worker's own verdict before
/// reporting a queued timeout. A call that was on the wire at its deadline
/// is resolved by the worker within this window; a queued call's worker is
/// busy elsewhere and stays silent.
const VERDICT_GRACE: Duration = Duration::from_millis(25);

/// Await a worker's verdict, resolving at the call's own deadline even while
/// the call is still queued behind others.
///
/// Dropping the receiver marks the call abandoned; the worker skips it at
/// dequeue without any wire effect.
async fn await_reply<T>(
    deadline: Instant,
    mut reply: oneshot::Receiver<Result<T, BridgeError>>,
) -> Result<T, BridgeError> {
    match timeout_at(deadline, &mut reply).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(BridgeError::ConnectionLost),
        Err(_) => match tokio::time::timeout(VERDICT_GRACE, &mut reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => Err(BridgeError::Timeout { in_flight: false }),
        },
    }
}
