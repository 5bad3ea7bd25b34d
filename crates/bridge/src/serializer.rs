//! Per-channel call serialization.
//!
//! One worker task per mini-protocol owns that protocol's client state
//! machine and runs calls strictly one at a time, in issue order. Strict
//! agency alternation falls out of the structure: a worker cannot start a
//! second exchange while one is awaited.
//!
//! Deadlines are enforced at two points. A call found expired at dequeue
//! time resolves as a queued timeout without any wire effect. A call whose
//! deadline passes mid-exchange tears the connection down, because a later
//! reply could no longer be matched to its request.

use crate::connection::{Channel, ExchangeFailure, Generation};
use crate::error::BridgeError;
use crate::txmonitor::{
    monitor_exchange, MonitorReply, MonitorRequest, MonitorState, SnapshotToken,
};
use crate::txsubmission::{submit_exchange, SubmissionState, SubmitOutcome};
use nodegate_types::RawTx;
use nodegate_wire::{ProtocolId, TxMonitorMessage};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{timeout_at, Instant};
use tracing::warn;

// ═══════════════════════════════════════════════════════════════════════════
// Pending calls
// ═══════════════════════════════════════════════════════════════════════════

/// A queued transaction submission.
pub(crate) struct SubmitCall {
    pub tx: RawTx,
    pub deadline: Instant,
    pub reply: oneshot::Sender<Result<SubmitOutcome, BridgeError>>,
}

/// A queued monitor operation.
pub(crate) struct MonitorCall {
    pub request: MonitorRequest,
    pub deadline: Instant,
    pub reply: oneshot::Sender<Result<MonitorReply, BridgeError>>,
}

/// Common surface the queue-drain path needs from any call kind.
pub(crate) trait PendingCall: Send {
    fn deadline(&self) -> Instant;
    fn abandoned(&self) -> bool;
    fn fail(self, error: BridgeError);
}

impl PendingCall for SubmitCall {
    fn deadline(&self) -> Instant {
        self.deadline
    }

    fn abandoned(&self) -> bool {
        self.reply.is_closed()
    }

    fn fail(self, error: BridgeError) {
        let _ = self.reply.send(Err(error));
    }
}

impl PendingCall for MonitorCall {
    fn deadline(&self) -> Instant {
        self.deadline
    }

    fn abandoned(&self) -> bool {
        self.reply.is_closed()
    }

    fn fail(self, error: BridgeError) {
        let _ = self.reply.send(Err(error));
    }
}

/// Fail every currently queued call, in issue order.
///
/// Calls already past their deadline report a queued timeout; the rest get
/// the given error.
fn drain_queue<C: PendingCall>(calls: &mut mpsc::Receiver<C>, error: &BridgeError) {
    while let Ok(call) = calls.try_recv() {
        if Instant::now() >= call.deadline() {
            call.fail(BridgeError::Timeout { in_flight: false });
        } else {
            call.fail(error.clone());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Channel slot
// ═══════════════════════════════════════════════════════════════════════════

/// The bridge is permanently closed; no further connections will come.
struct BridgeClosed;

/// A worker's claim on its protocol channel across connection generations.
struct ChannelSlot {
    protocol: ProtocolId,
    generations: watch::Receiver<Option<Generation>>,
    channel: Option<Channel>,
    generation_id: Option<u64>,
}

impl ChannelSlot {
    fn new(protocol: ProtocolId, generations: watch::Receiver<Option<Generation>>) -> Self {
        Self {
            protocol,
            generations,
            channel: None,
            generation_id: None,
        }
    }

    /// Claim the newest generation's handles if the connection changed.
    fn refresh(&mut self) -> bool {
        let latest: Option<Generation> = self.generations.borrow().clone();
        match latest {
            Some(generation) if self.generation_id != Some(generation.id()) => {
                self.channel = generation
                    .claim(self.protocol)
                    .map(|handles| Channel::new(self.protocol, handles));
                self.generation_id = Some(generation.id());
                true
            }
            _ => false,
        }
    }

    /// Wait until a connection is available.
    ///
    /// Returns whether the connection changed since the last claim, so
    /// callers can reset per-connection session state.
    async fn ensure(&mut self) -> Result<bool, BridgeClosed> {
        let mut changed = self.refresh();
        while self.channel.is_none() {
            if self.generations.changed().await.is_err() {
                return Err(BridgeClosed);
            }
            changed |= self.refresh();
        }
        Ok(changed)
    }

    fn get(&mut self) -> Option<&mut Channel> {
        self.channel.as_mut()
    }

    /// Forget the current channel; the connection under it is gone.
    fn invalidate(&mut self) {
        self.channel = None;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Submission worker
// ═══════════════════════════════════════════════════════════════════════════

pub(crate) struct SubmissionWorker {
    calls: mpsc::Receiver<SubmitCall>,
    slot: ChannelSlot,
    state: SubmissionState,
    closed: bool,
}

impl SubmissionWorker {
    pub fn new(
        calls: mpsc::Receiver<SubmitCall>,
        generations: watch::Receiver<Option<Generation>>,
    ) -> Self {
        Self {
            calls,
            slot: ChannelSlot::new(ProtocolId::TxSubmission, generations),
            state: SubmissionState::Idle,
            closed: false,
        }
    }

    pub async fn run(mut self) {
        while let Some(call) = self.calls.recv().await {
            if call.abandoned() {
                continue;
            }
            if Instant::now() >= call.deadline {
                call.fail(BridgeError::Timeout { in_flight: false });
                continue;
            }
            if self.closed {
                call.fail(BridgeError::ConnectionLost);
                continue;
            }
            match timeout_at(call.deadline, self.slot.ensure()).await {
                Ok(Ok(_changed)) => {}
                Ok(Err(BridgeClosed)) => {
                    self.closed = true;
                    call.fail(BridgeError::ConnectionLost);
                    drain_queue(&mut self.calls, &BridgeError::ConnectionLost);
                    continue;
                }
                Err(_) => {
                    call.fail(BridgeError::Timeout { in_flight: false });
                    continue;
                }
            }

            let SubmitCall { tx, deadline, reply } = call;
            debug_assert_eq!(self.state, SubmissionState::Idle);
            self.state = SubmissionState::Busy;
            let channel = self.slot.get().expect("connection ensured");
            let result = timeout_at(deadline, submit_exchange(channel, tx)).await;
            self.state = SubmissionState::Idle;
            match result {
                Ok(Ok(outcome)) => {
                    let _ = reply.send(Ok(outcome));
                }
                Ok(Err(ExchangeFailure::Lost)) => {
                    self.slot.invalidate();
                    let _ = reply.send(Err(BridgeError::ConnectionLost));
                    drain_queue(&mut self.calls, &BridgeError::ConnectionLost);
                }
                Ok(Err(ExchangeFailure::Protocol(detail))) => {
                    warn!(detail = %detail, "submission channel protocol violation");
                    if let Some(channel) = self.slot.get() {
                        channel.escalate(detail.clone()).await;
                    }
                    self.slot.invalidate();
                    let _ = reply.send(Err(BridgeError::Transport(detail)));
                    drain_queue(&mut self.calls, &BridgeError::ConnectionLost);
                }
                Err(_) => {
                    // The node holds agency and owes a reply that can no
                    // longer be used. The connection cannot be trusted.
                    if let Some(channel) = self.slot.get() {
                        channel
                            .escalate("submit deadline passed while the node held agency")
                            .await;
                    }
                    self.slot.invalidate();
                    let _ = reply.send(Err(BridgeError::Timeout { in_flight: true }));
                    drain_queue(&mut self.calls, &BridgeError::ConnectionLost);
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Monitor worker
// ═══════════════════════════════════════════════════════════════════════════

pub(crate) struct MonitorWorker {
    calls: mpsc::Receiver<MonitorCall>,
    slot: ChannelSlot,
    session: MonitorState,
    token_counter: u64,
    closed: bool,
}

impl MonitorWorker {
    pub fn new(
        calls: mpsc::Receiver<MonitorCall>,
        generations: watch::Receiver<Option<Generation>>,
    ) -> Self {
        Self {
            calls,
            slot: ChannelSlot::new(ProtocolId::TxMonitor, generations),
            session: MonitorState::Idle,
            token_counter: 0,
            closed: false,
        }
    }

    pub async fn run(mut self) {
        while let Some(call) = self.calls.recv().await {
            if call.abandoned() {
                continue;
            }
            if Instant::now() >= call.deadline {
                call.fail(BridgeError::Timeout { in_flight: false });
                continue;
            }
            if self.closed {
                call.fail(BridgeError::ConnectionLost);
                continue;
            }
            match timeout_at(call.deadline, self.slot.ensure()).await {
                Ok(Ok(changed)) => {
                    if changed {
                        // Snapshot handles die with the connection that
                        // minted them.
                        self.session = MonitorState::Idle;
                    }
                }
                Ok(Err(BridgeClosed)) => {
                    self.closed = true;
                    call.fail(BridgeError::ConnectionLost);
                    drain_queue(&mut self.calls, &BridgeError::ConnectionLost);
                    continue;
                }
                Err(_) => {
                    call.fail(BridgeError::Timeout { in_flight: false });
                    continue;
                }
            }

            // Local session checks never touch the wire.
            if let Err(violation) = self.session.validate(&call.request) {
                call.fail(violation);
                continue;
            }

            let MonitorCall {
                request,
                deadline,
                reply,
            } = call;
            let channel = self.slot.get().expect("connection ensured");
            let result = timeout_at(deadline, monitor_exchange(channel, &request)).await;
            match result {
                Ok(Ok(message)) => match self.interpret(&request, message) {
                    Ok(monitor_reply) => {
                        let _ = reply.send(Ok(monitor_reply));
                    }
                    Err(detail) => {
                        warn!(
                            operation = request.as_str(),
                            detail = %detail,
                            "monitor channel protocol violation"
                        );
                        if let Some(channel) = self.slot.get() {
                            channel.escalate(detail.clone()).await;
                        }
                        self.fail_connection();
                        let _ = reply.send(Err(BridgeError::Transport(detail)));
                        drain_queue(&mut self.calls, &BridgeError::ConnectionLost);
                    }
                },
                Ok(Err(ExchangeFailure::Lost)) => {
                    self.fail_connection();
                    let _ = reply.send(Err(BridgeError::ConnectionLost));
                    drain_queue(&mut self.calls, &BridgeError::ConnectionLost);
                }
                Ok(Err(ExchangeFailure::Protocol(detail))) => {
                    warn!(
                        operation = request.as_str(),
                        detail = %detail,
                        "monitor channel protocol violation"
                    );
                    if let Some(channel) = self.slot.get() {
                        channel.escalate(detail.clone()).await;
                    }
                    self.fail_connection();
                    let _ = reply.send(Err(BridgeError::Transport(detail)));
                    drain_queue(&mut self.calls, &BridgeError::ConnectionLost);
                }
                Err(_) => {
                    if let Some(channel) = self.slot.get() {
                        channel
                            .escalate("monitor deadline passed while the node held agency")
                            .await;
                    }
                    self.fail_connection();
                    let _ = reply.send(Err(BridgeError::Timeout { in_flight: true }));
                    drain_queue(&mut self.calls, &BridgeError::ConnectionLost);
                }
            }
        }
    }

    /// Interpret the node's reply in the context of the request, updating
    /// the session. A mismatched variant is a protocol violation.
    fn interpret(
        &mut self,
        request: &MonitorRequest,
        message: TxMonitorMessage,
    ) -> Result<MonitorReply, String> {
        match (request, message) {
            (MonitorRequest::Acquire, TxMonitorMessage::Acquired { slot }) => {
                self.token_counter += 1;
                let token = SnapshotToken::mint(self.token_counter);
                self.session = MonitorState::Acquired {
                    token: token.clone(),
                    slot,
                };
                Ok(MonitorReply::Acquired { token, slot })
            }
            (MonitorRequest::HasTx { .. }, TxMonitorMessage::ReplyHasTx { has }) => {
                Ok(MonitorReply::HasTx(has))
            }
            (MonitorRequest::NextTx { .. }, TxMonitorMessage::ReplyNextTx { tx }) => {
                Ok(MonitorReply::NextTx(tx))
            }
            (MonitorRequest::Sizes { .. }, TxMonitorMessage::ReplyGetSizes { sizes }) => {
                Ok(MonitorReply::Sizes(sizes))
            }
            (MonitorRequest::Release { .. }, TxMonitorMessage::Released) => {
                self.session = MonitorState::Idle;
                Ok(MonitorReply::Released)
            }
            (request, other) => Err(format!(
                "unexpected message while awaiting {} reply: {other:?}",
                request.as_str()
            )),
        }
    }

    /// The connection under the session is gone.
    fn fail_connection(&mut self) {
        self.slot.invalidate();
        self.session = MonitorState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodegate_types::test_utils::test_tx;
    use std::time::Duration;

    fn queued_submit(
        seed: u8,
        deadline: Instant,
    ) -> (
        SubmitCall,
        oneshot::Receiver<Result<SubmitOutcome, BridgeError>>,
    ) {
        let (reply_tx, reply_rx) = oneshot::channel();
        (
            SubmitCall {
                tx: test_tx(seed),
                deadline,
                reply: reply_tx,
            },
            reply_rx,
        )
    }

    #[tokio::test]
    async fn test_drain_fails_queued_calls_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut replies = Vec::new();
        for seed in 0..3 {
            let (call, reply_rx) = queued_submit(seed, deadline);
            tx.send(call).await.unwrap();
            replies.push(reply_rx);
        }

        drain_queue(&mut rx, &BridgeError::ConnectionLost);
        for reply in replies {
            assert_eq!(reply.await.unwrap(), Err(BridgeError::ConnectionLost));
        }
    }

    #[tokio::test]
    async fn test_drain_reports_queued_timeout_for_expired_calls() {
        let (tx, mut rx) = mpsc::channel(8);
        let (expired, expired_rx) = queued_submit(1, Instant::now() - Duration::from_millis(1));
        let (live, live_rx) = queued_submit(2, Instant::now() + Duration::from_secs(5));
        tx.send(expired).await.unwrap();
        tx.send(live).await.unwrap();

        drain_queue(&mut rx, &BridgeError::ConnectionLost);
        assert_eq!(
            expired_rx.await.unwrap(),
            Err(BridgeError::Timeout { in_flight: false })
        );
        assert_eq!(live_rx.await.unwrap(), Err(BridgeError::ConnectionLost));
    }
}
