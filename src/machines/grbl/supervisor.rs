//! Supervisor (C6): connection lifecycle and the public command surface.
//!
//! Exposes connect/disconnect/jog/home/send_file/recover_from_alarm in a
//! lifecycle-driven shape: nothing outside this module ever touches a
//! transport or a dispatcher directly.

use super::command::{CommandErrorKind, CommandResult, ImmediatePayload, RejectReason, SubmitOptions};
use super::commands::{GrblCommand, RealtimeCommand};
use super::engine::{spawn_dispatcher, CommandEngine, EngineHandle};
use super::events::EngineEvent;
use super::poller::{spawn_poller, PollerHandle};
use super::state_manager::StateManager;
use super::state::{AlarmCode, MachineState};
use super::transport::LineTransport;
use crate::config::EngineConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[cfg(feature = "serial")]
use super::transport::Port;

/// Lifecycle state (§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Disconnected,
    Opening,
    Connected,
    Draining,
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("init command {line:?} failed: {message}")]
    InitCommandFailed { line: String, message: String },
}

#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("not connected")]
    NotConnected,
    #[error("unlock rejected: {0}")]
    UnlockRejected(String),
    #[error("controller alarmed during recovery: {description}")]
    AlarmDuringRecovery { code: AlarmCode, description: &'static str },
}

/// How `send_file` reacts to a controller error mid-file (§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileRunPolicy {
    HaltOnError,
    ContinueOnError,
}

impl Default for FileRunPolicy {
    fn default() -> Self {
        FileRunPolicy::HaltOnError
    }
}

/// Outcome of a `send_file` run (scenario 6, §8).
#[derive(Clone, Debug, Default)]
pub struct FileRun {
    pub lines_sent: u32,
    pub lines_ok: u32,
    pub first_error: Option<CommandResult>,
    pub halted: bool,
}

/// Owns the connection lifecycle and exposes the public command surface.
pub struct Supervisor {
    cfg: EngineConfig,
    lifecycle: Lifecycle,
    engine: Option<EngineHandle>,
    events: Option<broadcast::Sender<EngineEvent>>,
    poller: Option<PollerHandle>,
}

impl Supervisor {
    pub fn new(cfg: EngineConfig) -> Self {
        Self { cfg, lifecycle: Lifecycle::Disconnected, engine: None, events: None, poller: None }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn events(&self) -> Option<broadcast::Receiver<EngineEvent>> {
        self.events.as_ref().map(|tx| tx.subscribe())
    }

    /// Opens the real serial port named `port` and connects to it.
    #[cfg(feature = "serial")]
    pub async fn connect(&mut self, port: &str) -> Result<(), SupervisorError> {
        let transport = Port::open_with_settings(port, self.cfg.serial.clone())
            .map_err(|e| SupervisorError::ConnectFailed(e.to_string()))?;
        self.connect_with_transport(transport).await
    }

    /// Connects using a caller-supplied transport (used directly by tests,
    /// and internally by [`Supervisor::connect`]).
    pub async fn connect_with_transport<T: LineTransport>(&mut self, transport: T) -> Result<(), SupervisorError> {
        if self.lifecycle != Lifecycle::Disconnected {
            return Err(SupervisorError::AlreadyConnected);
        }
        self.lifecycle = Lifecycle::Opening;

        let state = StateManager::new(self.cfg.clone());
        let (engine, events) = spawn_dispatcher(
            transport,
            state,
            self.cfg.queue,
            self.cfg.history,
            self.cfg.poller.fast_interval.min(self.cfg.poller.slow_interval),
        );

        for line in &self.cfg.init_commands {
            let result = engine
                .submit(line.clone(), SubmitOptions::with_timeout(self.cfg.timeouts.initialization))
                .await;
            if !result.is_ok() {
                self.lifecycle = Lifecycle::Disconnected;
                return Err(SupervisorError::InitCommandFailed {
                    line: line.clone(),
                    message: describe_result(&result),
                });
            }
        }

        let poller = spawn_poller(Arc::new(engine.clone()), self.cfg.poller, events.clone());
        self.poller = Some(poller);
        self.engine = Some(engine);
        self.events = Some(events.clone());
        self.lifecycle = Lifecycle::Connected;
        let _ = events.send(EngineEvent::Connected);
        info!("supervisor: connected");
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<(), SupervisorError> {
        let Some(engine) = self.engine.take() else {
            return Err(SupervisorError::NotConnected);
        };
        self.lifecycle = Lifecycle::Draining;
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        engine.abort_all("disconnect".to_string()).await;
        if let Some(events) = &self.events {
            let _ = events.send(EngineEvent::Disconnected);
        }
        self.lifecycle = Lifecycle::Disconnected;
        self.events = None;
        info!("supervisor: disconnected");
        Ok(())
    }

    fn engine(&self) -> Result<&EngineHandle, SupervisorError> {
        self.engine.as_ref().ok_or(SupervisorError::NotConnected)
    }

    pub async fn send_command(&self, line: String, opts: SubmitOptions) -> Result<CommandResult, SupervisorError> {
        Ok(self.engine()?.submit(line, opts).await)
    }

    pub async fn jog(&self, axis: char, direction: i8, distance: Option<f64>, feed: f64) -> Result<CommandResult, SupervisorError> {
        let engine = self.engine()?;
        let sign = if direction < 0 { "-" } else { "" };
        let gcode = match distance {
            Some(d) => format!("G21G91{}{}{} F{}", axis.to_ascii_uppercase(), sign, d, feed),
            None => format!("G21G91{}{}1000 F{}", axis.to_ascii_uppercase(), sign, feed),
        };
        Ok(engine.submit(GrblCommand::Jog(gcode).to_string(), SubmitOptions::default()).await)
    }

    pub async fn jog_cancel(&self) -> Result<(), SupervisorError> {
        let engine = self.engine()?;
        let _ = engine
            .submit_immediate(ImmediatePayload::RealtimeByte(RealtimeCommand::JogCancel.as_byte()))
            .await;
        Ok(())
    }

    pub async fn home(&self) -> Result<CommandResult, SupervisorError> {
        let engine = self.engine()?;
        Ok(engine
            .submit(GrblCommand::Home.to_string(), SubmitOptions::with_timeout(self.cfg.timeouts.emergency))
            .await)
    }

    /// Fire-and-forget; emits `EmergencyStop` regardless of transport state
    /// (§4.6, §7).
    pub async fn emergency_stop(&self) {
        let line = self.cfg.emergency_stop_command.clone();
        if let Some(engine) = &self.engine {
            let is_byte_literal = line.strip_prefix("0x").or_else(|| line.strip_prefix("0X")).is_some();
            if is_byte_literal {
                if let Some(byte) = line
                    .strip_prefix("0x")
                    .or_else(|| line.strip_prefix("0X"))
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    let _ = engine.submit_immediate(ImmediatePayload::RealtimeByte(byte)).await;
                }
            } else {
                let _ = engine
                    .submit(line, SubmitOptions::with_timeout(self.cfg.timeouts.emergency))
                    .await;
            }
        } else {
            warn!("supervisor: emergency_stop called while disconnected");
        }
        if let Some(events) = &self.events {
            let _ = events.send(EngineEvent::EmergencyStop);
        }
    }

    /// Alarm recovery protocol (§4.5).
    pub async fn recover_from_alarm(&self) -> Result<(), AlarmError> {
        let engine = self.engine.as_ref().ok_or(AlarmError::NotConnected)?;

        let status = engine
            .submit_immediate(ImmediatePayload::Line(self.cfg.status_command.clone()))
            .await;
        let is_idle = matches!(
            status,
            CommandResult::Ok { response: super::parser::Response::Status(ref s), .. }
                if matches!(s.state, MachineState::Idle)
        );
        if is_idle {
            return Ok(());
        }

        let unlock = engine
            .submit(self.cfg.unlock_command.clone(), SubmitOptions::with_timeout(self.cfg.timeouts.command))
            .await;
        match unlock {
            CommandResult::Ok { .. } => Ok(()),
            CommandResult::Err { kind: CommandErrorKind::Alarm(code), .. } => {
                Err(AlarmError::AlarmDuringRecovery { code, description: code.description() })
            }
            CommandResult::Err { message, .. } => Err(AlarmError::UnlockRejected(message)),
        }
    }

    /// Streams `lines` with the given halt/continue policy, submitting each
    /// one in turn through the dispatcher's queue and stopping early on the
    /// first error unless `policy` says to continue.
    pub async fn send_file(
        &self,
        lines: impl IntoIterator<Item = String>,
        policy: FileRunPolicy,
        timeout: Duration,
    ) -> Result<FileRun, SupervisorError> {
        let engine = self.engine()?;
        let mut run = FileRun::default();
        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') {
                continue;
            }
            let result = engine.submit(trimmed.to_string(), SubmitOptions::with_timeout(timeout)).await;
            run.lines_sent += 1;
            match &result {
                CommandResult::Ok { .. } => run.lines_ok += 1,
                CommandResult::Err { .. } => {
                    if run.first_error.is_none() {
                        run.first_error = Some(result.clone());
                    }
                    if policy == FileRunPolicy::HaltOnError {
                        run.halted = true;
                        return Ok(run);
                    }
                }
            }
        }
        Ok(run)
    }

    pub async fn status(&self) -> Result<super::engine::EngineStatus, SupervisorError> {
        Ok(self.engine()?.status().await)
    }

    /// Status history and command metrics accumulated by the dispatcher (§3).
    pub async fn metrics(&self) -> Result<super::metrics::MetricsSnapshot, SupervisorError> {
        Ok(self.engine()?.metrics().await)
    }
}

fn describe_result(result: &CommandResult) -> String {
    match result {
        CommandResult::Ok { .. } => "ok".to_string(),
        CommandResult::Err { kind, message, .. } => format!("{}: {}", kind, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machines::grbl::transport::{ScriptedReply, ScriptedTransport};

    fn cfg() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.validation.enforce_soft_limits = false;
        cfg
    }

    #[tokio::test]
    async fn test_connect_runs_init_commands_then_accepts_submissions() {
        let mut sup = Supervisor::new(cfg());
        let transport = ScriptedTransport::new(vec![ScriptedReply::on("G0 X1", ["ok"])]);
        sup.connect_with_transport(transport).await.unwrap();
        assert_eq!(sup.lifecycle(), Lifecycle::Connected);
        let result = sup.send_command("G0 X1".to_string(), SubmitOptions::default()).await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_double_connect_rejected() {
        let mut sup = Supervisor::new(cfg());
        let transport = ScriptedTransport::new(vec![]);
        sup.connect_with_transport(transport).await.unwrap();
        let transport2 = ScriptedTransport::new(vec![]);
        let err = sup.connect_with_transport(transport2).await.unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyConnected));
    }

    #[tokio::test]
    async fn test_disconnect_then_send_command_fails() {
        let mut sup = Supervisor::new(cfg());
        let transport = ScriptedTransport::new(vec![]);
        sup.connect_with_transport(transport).await.unwrap();
        sup.disconnect().await.unwrap();
        let err = sup.send_command("?".to_string(), SubmitOptions::default()).await.unwrap_err();
        assert!(matches!(err, SupervisorError::NotConnected));
    }

    #[tokio::test]
    async fn test_send_file_halts_on_error_by_default() {
        let mut sup = Supervisor::new(cfg());
        let transport = ScriptedTransport::new(vec![
            ScriptedReply::on("G0 X1", ["ok"]),
            ScriptedReply::on("G999", ["error:1"]),
        ]);
        sup.connect_with_transport(transport).await.unwrap();
        let lines = vec!["G0 X1".to_string(), "G999".to_string(), "G0 X0".to_string()];
        let run = sup
            .send_file(lines, FileRunPolicy::HaltOnError, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(run.lines_sent, 2);
        assert_eq!(run.lines_ok, 1);
        assert!(run.halted);
        assert!(run.first_error.is_some());
    }

    #[tokio::test]
    async fn test_recover_from_alarm_noop_when_idle() {
        let mut sup = Supervisor::new(cfg());
        let transport = ScriptedTransport::new(vec![ScriptedReply::on(
            "?",
            ["<Idle|MPos:0,0,0|WPos:0,0,0|FS:0,0>"],
        )]);
        sup.connect_with_transport(transport).await.unwrap();
        sup.recover_from_alarm().await.unwrap();
    }

    /// Scenario 3 (§8): alarm latch rejects subsequent `Normal` submissions
    /// until `recover_from_alarm` unlocks the controller.
    #[tokio::test]
    async fn test_alarm_latch_then_recovery_unblocks_submissions() {
        let mut sup = Supervisor::new(cfg());
        let transport = ScriptedTransport::new(vec![
            ScriptedReply::on("G0 Y5", ["ALARM:2"]),
            ScriptedReply::on("?", ["<Alarm|MPos:0,0,0|WPos:0,0,0|FS:0,0>"]),
            ScriptedReply::on("$X", ["ok"]),
        ]);
        sup.connect_with_transport(transport).await.unwrap();

        let result = sup.send_command("G0 Y5".to_string(), SubmitOptions::default()).await.unwrap();
        assert!(matches!(
            result,
            CommandResult::Err { kind: CommandErrorKind::Alarm(AlarmCode::SoftLimit), .. }
        ));

        let rejected = sup.send_command("G0 Y0".to_string(), SubmitOptions::default()).await.unwrap();
        assert!(matches!(
            rejected,
            CommandResult::Err { kind: CommandErrorKind::Rejected(RejectReason::AlarmLatched), .. }
        ));

        sup.recover_from_alarm().await.unwrap();
    }
}
