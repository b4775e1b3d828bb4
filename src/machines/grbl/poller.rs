//! Status poller (C4).
//!
//! Runs a `tokio::time::interval` with `MissedTickBehavior::Skip`, and
//! instead of locking the port directly and writing the parsed status
//! straight into shared state, submits `?` through
//! [`CommandEngine::submit_immediate`] and adapts its own interval from the
//! machine state carried on each reply.

use super::command::ImmediatePayload;
use super::engine::CommandEngine;
use super::events::{EngineEvent, PollErrorKind};
use super::parser::Response;
use super::state::MachineState;
use crate::config::PollerConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Errors from the poller loop.
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("task join: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Handle used to stop a running poller task.
#[derive(Clone)]
pub struct PollerHandle {
    stop: Arc<AtomicBool>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Spawns the adaptive-interval poller task against `engine`. Coalesces
/// outstanding queries (B2) since `submit_immediate` itself drops a second
/// concurrent `?` rather than queuing it; the poller additionally skips a
/// tick outright while its own previous query is still in flight so it
/// never issues overlapping submissions.
pub fn spawn_poller<E>(engine: Arc<E>, cfg: PollerConfig, events: broadcast::Sender<EngineEvent>) -> PollerHandle
where
    E: CommandEngine + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let handle = PollerHandle { stop: stop.clone() };
    let in_flight = Arc::new(AtomicBool::new(false));
    let mut consecutive_failures: u32 = 0;
    let mut current_interval = cfg.slow_interval;
    let mut events_rx = events.subscribe();
    let mut paused = false;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(current_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if stop.load(Ordering::Relaxed) {
                break;
            }

            if paused {
                // Drain buffered events looking for a reconnect signal rather
                // than submitting against a transport we already know is gone.
                let mut reconnected = false;
                while let Ok(ev) = events_rx.try_recv() {
                    if matches!(ev, EngineEvent::Connected) {
                        reconnected = true;
                    }
                }
                if reconnected {
                    debug!("poller: transport reconnected, resuming polling");
                    paused = false;
                    consecutive_failures = 0;
                } else {
                    continue;
                }
            }

            if in_flight.swap(true, Ordering::AcqRel) {
                debug!("poller: previous query still outstanding, skipping tick");
                continue;
            }

            let result = engine
                .submit_immediate(ImmediatePayload::Line("?".to_string()))
                .await;
            in_flight.store(false, Ordering::Release);

            match result {
                super::command::CommandResult::Ok { response: Response::Status(status), .. } => {
                    consecutive_failures = 0;
                    let next_interval = if status.state.is_active() {
                        cfg.fast_interval
                    } else {
                        cfg.slow_interval
                    };
                    if next_interval != current_interval {
                        current_interval = next_interval;
                        ticker = tokio::time::interval(current_interval);
                        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    }
                    let _ = status;
                }
                super::command::CommandResult::Err { kind: super::command::CommandErrorKind::TransportLost, .. } => {
                    warn!("poller: transport lost, pausing polling until reconnect");
                    paused = true;
                    let _ = events.send(EngineEvent::PollError { kind: PollErrorKind::Transport });
                }
                super::command::CommandResult::Err { kind, .. } => {
                    consecutive_failures += 1;
                    let poll_kind = match kind {
                        super::command::CommandErrorKind::Timeout => PollErrorKind::Timeout,
                        _ => PollErrorKind::Transport,
                    };
                    warn!("poller: query failed: {:?}", poll_kind);
                    let _ = events.send(EngineEvent::PollError { kind: poll_kind });
                    if consecutive_failures >= cfg.max_missed_polls {
                        let _ = events.send(EngineEvent::MaxMissedPollsExceeded);
                        consecutive_failures = 0;
                    }
                }
                _ => {}
            }
        }
    });

    handle
}

/// Threshold helper used by the state manager and exposed here so callers
/// can reason about when a `position_changed` event will fire without
/// duplicating the constant.
pub fn exceeds_position_threshold(delta: f64, cfg: &PollerConfig) -> bool {
    delta.abs() >= cfg.position_change_threshold_mm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::machines::grbl::command::{CommandErrorKind, CommandResult, SubmitOptions};
    use crate::machines::grbl::engine::{spawn_dispatcher, EngineStatus};
    use crate::machines::grbl::state::MachineStatus;
    use crate::machines::grbl::state_manager::StateManager;
    use crate::machines::grbl::transport::{ScriptedReply, ScriptedTransport};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_exceeds_position_threshold() {
        let cfg = PollerConfig::default();
        assert!(exceeds_position_threshold(0.01, &cfg));
        assert!(!exceeds_position_threshold(0.0001, &cfg));
    }

    /// Engine double whose first `submit_immediate` call reports a lost
    /// transport; every call after that succeeds, modelling a reconnect.
    struct FlakyEngine {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CommandEngine for FlakyEngine {
        async fn submit(&self, _line: String, _opts: SubmitOptions) -> CommandResult {
            unimplemented!("not exercised by the poller")
        }

        async fn submit_immediate(&self, _payload: ImmediatePayload) -> CommandResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                CommandResult::err(CommandErrorKind::TransportLost, "simulated transport loss", Duration::ZERO)
            } else {
                CommandResult::Ok { response: Response::Status(MachineStatus::idle()), elapsed: Duration::ZERO }
            }
        }

        async fn abort_all(&self, _reason: String) {}

        async fn status(&self) -> EngineStatus {
            EngineStatus { queue_depth: 0, in_flight: None, pending_immediate: false, last_response_age: None }
        }
    }

    #[tokio::test]
    async fn test_poller_pauses_on_transport_lost_and_resumes_on_reconnect() {
        let engine = Arc::new(FlakyEngine { calls: AtomicUsize::new(0) });
        let (events, mut rx) = broadcast::channel(16);
        let mut cfg = PollerConfig::default();
        cfg.slow_interval = Duration::from_millis(10);
        let handle = spawn_poller(engine.clone(), cfg, events.clone());

        // First tick reports TransportLost; wait for the PollError it raises.
        let mut saw_transport_error = false;
        while let Ok(ev) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            if matches!(ev, Ok(EngineEvent::PollError { kind: PollErrorKind::Transport })) {
                saw_transport_error = true;
                break;
            }
        }
        assert!(saw_transport_error);

        // While paused, no further submissions happen even across several ticks.
        tokio::time::sleep(Duration::from_millis(40)).await;
        let paused_calls = engine.calls.load(Ordering::SeqCst);
        assert_eq!(paused_calls, 1);

        // Signal a reconnect; the poller should resume submitting.
        let _ = events.send(EngineEvent::Connected);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(engine.calls.load(Ordering::SeqCst) > paused_calls);

        handle.stop();
    }

    #[tokio::test]
    async fn test_poller_drives_status_through_engine() {
        let cfg = EngineConfig::default();
        let transport = ScriptedTransport::new(vec![ScriptedReply::on(
            "?",
            ["<Idle|MPos:0,0,0|WPos:0,0,0|FS:0,0>"],
        )]);
        let state = StateManager::new(cfg.clone());
        let (engine, events) = spawn_dispatcher(transport, state, cfg.queue, cfg.history, Duration::from_millis(10));
        let mut poller_cfg = cfg.poller;
        poller_cfg.slow_interval = Duration::from_millis(20);
        let handle = spawn_poller(Arc::new(engine), poller_cfg, events);
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop();
    }
}
