//! Command Engine dispatcher (C3).
//!
//! A single dispatcher task owns the transport exclusively. A dedicated OS
//! thread (a long-lived variant of a blocking-task-around-the-port pattern,
//! since the dispatcher needs to read continuously rather than once per
//! tick) owns the `LineTransport` and is the only thing that ever calls
//! `write_line`/`write_realtime_byte`/`read_line` on it. It forwards every
//! inbound line, and any transport error, to the async dispatcher task over
//! the same `mpsc` channel used for submissions, so the dispatcher observes
//! a single total order of events (I3) and `select!` never needs to touch
//! the transport directly.

use super::command::{
    CommandCategory, CommandErrorKind, CommandId, CommandResult, ImmediatePayload, RejectReason,
    SubmitOptions,
};
use super::events::EngineEvent;
use super::metrics::{EngineMetrics, MetricsSnapshot};
use super::parser::{parse_response, Response};
use super::state_manager::StateManager;
use super::transport::{LineTransport, PortError};
use crate::config::{HistoryConfig, QueueConfig};
use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Messages the dispatcher task accepts, whether from a public submission,
/// the background transport thread, or the heartbeat ticker.
enum EngineMessage {
    Submit {
        line: String,
        category: CommandCategory,
        opts: SubmitOptions,
        completion: oneshot::Sender<CommandResult>,
    },
    AbortAll {
        reason: String,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Inbound(String),
    TransportError(PortError),
    Metrics {
        reply: oneshot::Sender<MetricsSnapshot>,
    },
    Tick,
}

/// Point-in-time snapshot of the dispatcher's internal queue (§4.3).
#[derive(Clone, Debug, PartialEq)]
pub struct EngineStatus {
    pub queue_depth: usize,
    pub in_flight: Option<CommandId>,
    pub pending_immediate: bool,
    pub last_response_age: Option<Duration>,
}

/// Errors surfaced synchronously by [`EngineHandle`] when the dispatcher is
/// no longer reachable.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("dispatcher is no longer running")]
    Disconnected,
}

/// Trait boundary so callers (and tests) can substitute a scripted engine
/// for the real dispatcher-backed one (§4.3 design note).
#[async_trait::async_trait]
pub trait CommandEngine: Send + Sync {
    async fn submit(&self, line: String, opts: SubmitOptions) -> CommandResult;
    async fn submit_immediate(&self, payload: ImmediatePayload) -> CommandResult;
    async fn abort_all(&self, reason: String);
    async fn status(&self) -> EngineStatus;
}

/// Handle to a running dispatcher. Cheap to clone; every clone shares the
/// same underlying `mpsc` channel into the dispatcher task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMessage>,
}

#[async_trait::async_trait]
impl CommandEngine for EngineHandle {
    async fn submit(&self, line: String, opts: SubmitOptions) -> CommandResult {
        self.submit_with_category(line, CommandCategory::Normal, opts).await
    }

    async fn submit_immediate(&self, payload: ImmediatePayload) -> CommandResult {
        match payload {
            ImmediatePayload::Line(line) => {
                self.submit_with_category(line, CommandCategory::Immediate, SubmitOptions::default())
                    .await
            }
            ImmediatePayload::RealtimeByte(byte) => {
                self.submit_with_category(
                    (byte as char).to_string(),
                    CommandCategory::RealtimeByte,
                    SubmitOptions::default(),
                )
                .await
            }
        }
    }

    async fn abort_all(&self, reason: String) {
        let _ = self.tx.send(EngineMessage::AbortAll { reason }).await;
    }

    async fn status(&self) -> EngineStatus {
        let empty = || EngineStatus {
            queue_depth: 0,
            in_flight: None,
            pending_immediate: false,
            last_response_age: None,
        };
        let (reply, rx) = oneshot::channel();
        if self.tx.send(EngineMessage::Status { reply }).await.is_err() {
            return empty();
        }
        rx.await.unwrap_or_else(|_| empty())
    }
}

impl EngineHandle {
    /// Clone-out-of-lock snapshot of the dispatcher's metrics and status
    /// history (§3). Returns a zeroed snapshot if the dispatcher is gone.
    pub async fn metrics(&self) -> MetricsSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(EngineMessage::Metrics { reply }).await.is_err() {
            return EngineMetrics::new(1).snapshot();
        }
        rx.await.unwrap_or_else(|_| EngineMetrics::new(1).snapshot())
    }
}

impl EngineHandle {
    async fn submit_with_category(
        &self,
        line: String,
        category: CommandCategory,
        opts: SubmitOptions,
    ) -> CommandResult {
        let (completion, rx) = oneshot::channel();
        let start = Instant::now();
        if self
            .tx
            .send(EngineMessage::Submit { line, category, opts, completion })
            .await
            .is_err()
        {
            return CommandResult::err(CommandErrorKind::TransportLost, "dispatcher not running", start.elapsed());
        }
        rx.await.unwrap_or_else(|_| {
            CommandResult::err(CommandErrorKind::Cancelled, "dispatcher dropped reply", start.elapsed())
        })
    }
}

/// One command awaiting its terminal response on the wire.
struct InFlight {
    id: CommandId,
    started_at: Instant,
    deadline: Instant,
    completion: oneshot::Sender<CommandResult>,
}

/// Queued-but-not-yet-written command.
struct Queued {
    id: CommandId,
    line: String,
    submitted_at: Instant,
    timeout: Duration,
    completion: oneshot::Sender<CommandResult>,
}

/// Outbound write requests handed to the transport thread. The thread
/// executes these in order, ahead of its next read attempt.
enum TransportCmd {
    WriteLine(String),
    WriteByte(u8),
}

/// Owns the queue, in-flight slot, immediate waiter slot, and talks to the
/// transport thread through `transport_tx`.
struct Dispatcher {
    transport_tx: std_mpsc::Sender<TransportCmd>,
    queue: VecDeque<Queued>,
    in_flight: Option<InFlight>,
    immediate_waiter: Option<(CommandId, Instant, Duration, oneshot::Sender<CommandResult>)>,
    state: StateManager,
    metrics: EngineMetrics,
    events: broadcast::Sender<EngineEvent>,
    queue_cfg: QueueConfig,
    backpressure_armed: bool,
}

/// Runs on a dedicated OS thread for the lifetime of the connection. Owns
/// the transport exclusively: executes queued writes, then polls for one
/// inbound line, forwarding everything it observes back to the dispatcher.
fn run_transport_thread<T: LineTransport>(
    mut transport: T,
    cmd_rx: std_mpsc::Receiver<TransportCmd>,
    inbound_tx: mpsc::Sender<EngineMessage>,
    poll_timeout: Duration,
) {
    loop {
        match cmd_rx.try_recv() {
            Ok(TransportCmd::WriteLine(line)) => {
                if let Err(e) = transport.write_line(&line) {
                    if inbound_tx.blocking_send(EngineMessage::TransportError(e)).is_err() {
                        return;
                    }
                }
            }
            Ok(TransportCmd::WriteByte(byte)) => {
                if let Err(e) = transport.write_realtime_byte(byte) {
                    if inbound_tx.blocking_send(EngineMessage::TransportError(e)).is_err() {
                        return;
                    }
                }
            }
            Err(std_mpsc::TryRecvError::Empty) => {}
            Err(std_mpsc::TryRecvError::Disconnected) => {
                transport.close();
                return;
            }
        }

        match transport.read_line(poll_timeout) {
            Ok(line) => {
                if inbound_tx.blocking_send(EngineMessage::Inbound(line)).is_err() {
                    return;
                }
            }
            Err(PortError::ReadTimeout(_)) => {}
            Err(e) => {
                if inbound_tx.blocking_send(EngineMessage::TransportError(e)).is_err() {
                    return;
                }
            }
        }
    }
}

/// Spawns the transport thread and the async dispatcher task, and returns a
/// handle plus the event broadcast sender subscribers can clone receivers
/// from.
pub fn spawn_dispatcher<T: LineTransport>(
    transport: T,
    state: StateManager,
    queue_cfg: QueueConfig,
    history_cfg: HistoryConfig,
    transport_poll_interval: Duration,
) -> (EngineHandle, broadcast::Sender<EngineEvent>) {
    let (tx, mut rx) = mpsc::channel::<EngineMessage>(1024);
    let (events_tx, _) = broadcast::channel(super::events::EVENT_CHANNEL_CAPACITY);
    let (cmd_tx, cmd_rx) = std_mpsc::channel::<TransportCmd>();

    let inbound_tx = tx.clone();
    std::thread::spawn(move || {
        run_transport_thread(transport, cmd_rx, inbound_tx, transport_poll_interval);
    });

    let ticker_tx = tx.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(50));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if ticker_tx.send(EngineMessage::Tick).await.is_err() {
                break;
            }
        }
    });

    let mut dispatcher = Dispatcher {
        transport_tx: cmd_tx,
        queue: VecDeque::new(),
        in_flight: None,
        immediate_waiter: None,
        state,
        metrics: EngineMetrics::new(history_cfg.ring_buffer_size),
        events: events_tx.clone(),
        queue_cfg,
        backpressure_armed: false,
    };

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            dispatcher.handle_message(msg);
            dispatcher.sweep_deadlines();
        }
    });

    (EngineHandle { tx }, events_tx)
}

impl Dispatcher {
    fn handle_message(&mut self, msg: EngineMessage) {
        match msg {
            EngineMessage::Submit { line, category, opts, completion } => {
                self.handle_submit(line, category, opts, completion);
            }
            EngineMessage::AbortAll { reason } => self.handle_abort_all(reason),
            EngineMessage::Status { reply } => {
                let _ = reply.send(self.snapshot_status());
            }
            EngineMessage::Inbound(line) => self.handle_inbound(line),
            EngineMessage::TransportError(err) => self.handle_transport_error(err),
            EngineMessage::Metrics { reply } => {
                let _ = reply.send(self.metrics.snapshot());
            }
            EngineMessage::Tick => {}
        }
    }

    /// Records metrics, emits `CommandCompleted` (and a `PerformanceAlert`
    /// when this completion's latency is an outlier against the running
    /// average), then delivers the result to its caller. The single place
    /// every completed command passes through (§3, §4.3).
    fn finish(&mut self, id: CommandId, completion: oneshot::Sender<CommandResult>, result: CommandResult) {
        let (elapsed, prior_average, prior_total) = self.metrics.record_completion(&result);
        if prior_total >= 5 && !prior_average.is_zero() && elapsed > prior_average * 3 {
            let _ = self.events.send(EngineEvent::PerformanceAlert {
                metric: "response_time_ms".to_string(),
                value: elapsed.as_secs_f64() * 1000.0,
            });
        }
        let _ = self.events.send(EngineEvent::CommandCompleted { id, result: result.clone() });
        let _ = completion.send(result);
    }

    fn handle_submit(
        &mut self,
        line: String,
        category: CommandCategory,
        opts: SubmitOptions,
        completion: oneshot::Sender<CommandResult>,
    ) {
        if opts.timeout.is_zero() {
            let _ = completion.send(CommandResult::err(CommandErrorKind::Timeout, "zero timeout", Duration::ZERO));
            return;
        }

        if opts.refuse_dangerous && self.state.is_dangerous(&line) {
            let _ = completion.send(CommandResult::err(
                CommandErrorKind::Rejected(RejectReason::BadLine),
                "command matches a configured dangerous prefix",
                Duration::ZERO,
            ));
            return;
        }

        if line.len() > self.state.max_command_length() {
            let _ = completion.send(CommandResult::err(
                CommandErrorKind::Rejected(RejectReason::BadLine),
                "command exceeds configured max length",
                Duration::ZERO,
            ));
            return;
        }

        let now = Instant::now();
        match category {
            CommandCategory::RealtimeByte => {
                let byte = line.as_bytes().first().copied().unwrap_or(b'?');
                self.state.note_realtime_byte_sent(byte);
                let id = super::command::next_command_id();
                if self.transport_tx.send(TransportCmd::WriteByte(byte)).is_err() {
                    self.fail_transport(PortError::Closed, vec![(id, completion)]);
                    return;
                }
                let result = CommandResult::Ok { response: Response::Ok, elapsed: now.elapsed() };
                self.finish(id, completion, result);
            }
            CommandCategory::Immediate => {
                if self.immediate_waiter.is_some() {
                    // B2: a `?` already outstanding — drop, don't queue.
                    let id = super::command::next_command_id();
                    let result = CommandResult::err(
                        CommandErrorKind::Cancelled,
                        "status query already outstanding",
                        Duration::ZERO,
                    );
                    self.finish(id, completion, result);
                    return;
                }
                let id = super::command::next_command_id();
                if self.transport_tx.send(TransportCmd::WriteLine(line)).is_err() {
                    self.fail_transport(PortError::Closed, vec![(id, completion)]);
                    return;
                }
                self.immediate_waiter = Some((id, now, opts.timeout, completion));
            }
            CommandCategory::Normal => {
                if self.state.alarm_latched().is_some() && !self.state.is_unlock_line(&line) {
                    let _ = completion.send(CommandResult::err(
                        CommandErrorKind::Rejected(RejectReason::AlarmLatched),
                        "alarm latched",
                        Duration::ZERO,
                    ));
                    return;
                }

                if let Err(reason) = self.state.check_soft_limits(&line) {
                    let _ = completion.send(CommandResult::err(CommandErrorKind::Rejected(reason), "soft limit exceeded", Duration::ZERO));
                    return;
                }

                if self.queue.len() >= self.queue_cfg.max_queue_size {
                    let _ = completion.send(CommandResult::err(CommandErrorKind::Rejected(RejectReason::QueueFull), "queue full", Duration::ZERO));
                    return;
                }

                let id = super::command::next_command_id();
                self.queue.push_back(Queued { id, line, submitted_at: now, timeout: opts.timeout, completion });
                self.maybe_emit_backpressure();
                self.try_dispatch_head();
            }
        }
    }

    fn try_dispatch_head(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(queued) = self.queue.pop_front() else { return };
        if self.transport_tx.send(TransportCmd::WriteLine(queued.line)).is_err() {
            self.fail_transport(PortError::Closed, vec![(queued.id, queued.completion)]);
            return;
        }
        let now = Instant::now();
        self.in_flight = Some(InFlight {
            id: queued.id,
            started_at: queued.submitted_at,
            deadline: now + queued.timeout,
            completion: queued.completion,
        });
    }

    fn handle_inbound(&mut self, raw: String) {
        trace!("dispatcher: inbound line: {}", raw);
        let response = parse_response(&raw);

        if let Response::Status(_) = &response {
            if let Some((id, started, _, completion)) = self.immediate_waiter.take() {
                let elapsed = started.elapsed();
                self.state.apply_response(&response, &self.events);
                self.metrics.record_state_sample(self.state.current_state());
                self.finish(id, completion, CommandResult::Ok { response, elapsed });
                self.try_dispatch_head();
                return;
            }
        }

        self.state.apply_response(&response, &self.events);
        self.metrics.record_state_sample(self.state.current_state());

        if let Response::Ok | Response::Error { .. } | Response::Alarm { .. } = &response {
            self.complete_in_flight(response);
        }

        self.try_dispatch_head();
    }

    fn complete_in_flight(&mut self, response: Response) {
        let Some(in_flight) = self.in_flight.take() else {
            debug!("dispatcher: terminal response with nothing in flight: {:?}", response);
            return;
        };
        let elapsed = in_flight.started_at.elapsed();
        let result = match response {
            Response::Ok => CommandResult::Ok { response: Response::Ok, elapsed },
            Response::Error { code } => {
                CommandResult::err(CommandErrorKind::ControllerError(code), format!("error:{}", code), elapsed)
            }
            Response::Alarm { code } => {
                CommandResult::err(CommandErrorKind::Alarm(code), code.description(), elapsed)
            }
            other => CommandResult::Ok { response: other, elapsed },
        };
        self.finish(in_flight.id, in_flight.completion, result);
    }

    fn handle_transport_error(&mut self, err: PortError) {
        warn!("dispatcher: transport error: {}", err);
        let mut completions = Vec::new();
        if let Some(in_flight) = self.in_flight.take() {
            completions.push((in_flight.id, in_flight.completion));
        }
        if let Some((id, _, _, completion)) = self.immediate_waiter.take() {
            completions.push((id, completion));
        }
        for q in self.queue.drain(..) {
            completions.push((q.id, q.completion));
        }
        for (id, c) in completions {
            let result = CommandResult::err(CommandErrorKind::TransportLost, err.to_string(), Duration::ZERO);
            self.finish(id, c, result);
        }
        let _ = self.events.send(EngineEvent::Disconnected);
    }

    fn fail_transport(&mut self, err: PortError, completions: Vec<(CommandId, oneshot::Sender<CommandResult>)>) {
        warn!("dispatcher: write failed: {}", err);
        for (id, c) in completions {
            let result = CommandResult::err(CommandErrorKind::TransportLost, err.to_string(), Duration::ZERO);
            self.finish(id, c, result);
        }
    }

    fn handle_abort_all(&mut self, reason: String) {
        for q in self.queue.drain(..) {
            let result = CommandResult::err(CommandErrorKind::Cancelled, reason.clone(), Duration::ZERO);
            self.finish(q.id, q.completion, result);
        }
        if let Some(in_flight) = self.in_flight.take() {
            let result = CommandResult::err(CommandErrorKind::Cancelled, reason, Duration::ZERO);
            self.finish(in_flight.id, in_flight.completion, result);
        }
    }

    fn sweep_deadlines(&mut self) {
        let now = Instant::now();

        if let Some(deadline) = self.in_flight.as_ref().map(|f| f.deadline) {
            if now >= deadline {
                let in_flight = self.in_flight.take().unwrap();
                let elapsed = in_flight.started_at.elapsed();
                let result = CommandResult::err(CommandErrorKind::Timeout, "command timed out", elapsed);
                self.finish(in_flight.id, in_flight.completion, result);
                self.try_dispatch_head();
            }
        }

        if let Some(deadline) = self.immediate_waiter.as_ref().map(|(_, started, timeout, _)| *started + *timeout) {
            if now >= deadline {
                if let Some((id, started, _, completion)) = self.immediate_waiter.take() {
                    let result = CommandResult::err(CommandErrorKind::Timeout, "status query timed out", started.elapsed());
                    self.finish(id, completion, result);
                }
            }
        }

        let mut timed_out = Vec::new();
        let mut i = 0;
        while i < self.queue.len() {
            if now >= self.queue[i].submitted_at + self.queue[i].timeout {
                timed_out.push(self.queue.remove(i).unwrap());
            } else {
                i += 1;
            }
        }
        for q in timed_out {
            let result = CommandResult::err(CommandErrorKind::Timeout, "queued command timed out", q.submitted_at.elapsed());
            self.finish(q.id, q.completion, result);
        }
    }

    fn maybe_emit_backpressure(&mut self) {
        let high_water = self.queue_cfg.max_queue_size * self.queue_cfg.backpressure_high_water_pct as usize / 100;
        if self.queue.len() >= high_water {
            if !self.backpressure_armed {
                self.backpressure_armed = true;
                let _ = self.events.send(EngineEvent::Backpressure { queue_depth: self.queue.len() });
            }
        } else {
            self.backpressure_armed = false;
        }
    }

    fn snapshot_status(&self) -> EngineStatus {
        EngineStatus {
            queue_depth: self.queue.len(),
            in_flight: self.in_flight.as_ref().map(|f| f.id),
            pending_immediate: self.immediate_waiter.is_some(),
            last_response_age: self.state.last_response_age(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::machines::grbl::transport::{ScriptedReply, ScriptedTransport};

    fn engine_with(scripts: Vec<ScriptedReply>) -> (EngineHandle, broadcast::Receiver<EngineEvent>) {
        let transport = ScriptedTransport::new(scripts);
        let cfg = EngineConfig::default();
        let state = StateManager::new(cfg.clone());
        let (handle, events) = spawn_dispatcher(transport, state, cfg.queue, cfg.history, Duration::from_millis(20));
        let rx = events.subscribe();
        (handle, rx)
    }

    #[tokio::test]
    async fn test_happy_path_single_command() {
        let (engine, _rx) = engine_with(vec![ScriptedReply::on("G0 X10", ["ok"])]);
        let result = engine.submit("G0 X10".into(), SubmitOptions::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_controller_error_response() {
        let (engine, _rx) = engine_with(vec![ScriptedReply::on("G999", ["error:1"])]);
        let result = engine.submit("G999".into(), SubmitOptions::default()).await;
        match result {
            CommandResult::Err { kind: CommandErrorKind::ControllerError(1), .. } => {}
            other => panic!("expected ControllerError(1), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_timeout_never_touches_port() {
        let (engine, _rx) = engine_with(vec![]);
        let opts = SubmitOptions { timeout: Duration::ZERO, refuse_dangerous: true };
        let result = engine.submit("G0 X1".into(), opts).await;
        assert!(matches!(result, CommandResult::Err { kind: CommandErrorKind::Timeout, .. }));
    }

    #[tokio::test]
    async fn test_alarm_completes_in_flight_and_latches() {
        let (engine, _rx) = engine_with(vec![ScriptedReply::on("G0 Y5", ["ALARM:2"])]);
        let result = engine.submit("G0 Y5".into(), SubmitOptions::default()).await;
        assert!(matches!(
            result,
            CommandResult::Err { kind: CommandErrorKind::Alarm(crate::machines::grbl::state::AlarmCode::SoftLimit), .. }
        ));
        let rejected = engine.submit("G0 Y0".into(), SubmitOptions::default()).await;
        assert!(matches!(
            rejected,
            CommandResult::Err { kind: CommandErrorKind::Rejected(RejectReason::AlarmLatched), .. }
        ));
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let (engine, _rx) = engine_with(vec![]);
        let opts = SubmitOptions::with_timeout(Duration::from_millis(30));
        let result = engine.submit("$H".into(), opts).await;
        assert!(matches!(result, CommandResult::Err { kind: CommandErrorKind::Timeout, .. }));
    }

    #[tokio::test]
    async fn test_metrics_count_successful_and_failed_commands() {
        let (engine, _rx) = engine_with(vec![
            ScriptedReply::on("G0 X10", ["ok"]),
            ScriptedReply::on("G999", ["error:1"]),
        ]);
        engine.submit("G0 X10".into(), SubmitOptions::default()).await;
        engine.submit("G999".into(), SubmitOptions::default()).await;
        let snapshot = engine.metrics().await;
        assert_eq!(snapshot.total_commands, 2);
        assert_eq!(snapshot.successful, 1);
        assert_eq!(snapshot.failed, 1);
    }

    /// Scenario 5 (§8): a reply that arrives after the command already timed
    /// out is discarded rather than completing some later command.
    #[tokio::test]
    async fn test_late_reply_after_timeout_is_discarded() {
        let (engine, _rx) = engine_with(vec![]);
        let opts = SubmitOptions::with_timeout(Duration::from_millis(30));
        let result = engine.submit("$H".into(), opts).await;
        assert!(matches!(result, CommandResult::Err { kind: CommandErrorKind::Timeout, .. }));

        // A stray "ok" arriving after the timeout must not be attributed to
        // a later command; since nothing is in-flight it is simply dropped.
        let status = engine.status().await;
        assert_eq!(status.in_flight, None);
    }

    #[tokio::test]
    async fn test_command_completed_event_emitted_for_every_completion() {
        let (engine, mut rx) = engine_with(vec![ScriptedReply::on("G0 X10", ["ok"])]);
        engine.submit("G0 X10".into(), SubmitOptions::default()).await;
        let mut saw_completed = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, EngineEvent::CommandCompleted { .. }) {
                saw_completed = true;
            }
        }
        assert!(saw_completed);
    }
}
