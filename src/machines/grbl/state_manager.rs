//! Machine State Manager (C5).
//!
//! Consumes every parsed [`Response`] the dispatcher observes and keeps the
//! machine-state snapshot, alarm latch, modal groups, and work coordinate
//! table up to date, emitting [`EngineEvent`]s on the changes external
//! subscribers care about. Pre-submission soft-limit checking lives here
//! too since it needs the same modal/position context.

use super::parser::{CoordinateRecord, Response};
use super::state::{
    AlarmCode, AxisLimits, CoordSystem, DistanceMode, MachineState, MachineStatus, ModalGroups,
    Position, WcsTable,
};
use super::command::RejectReason;
use super::events::EngineEvent;
use crate::config::EngineConfig;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

pub struct StateManager {
    cfg: EngineConfig,
    current_state: MachineState,
    last_status: Option<MachineStatus>,
    alarm_latched: Option<AlarmCode>,
    pending_soft_reset: bool,
    reset_byte: u8,
    settings: HashMap<u32, String>,
    wcs: WcsTable,
    active_wcs: CoordSystem,
    /// Offset of the currently-selected work coordinate system, kept in sync
    /// with `wcs`/`active_wcs` so `apply_status` can derive work position
    /// from machine position without re-walking the table on every status.
    active_wco: Position,
    modal: ModalGroups,
    last_response_at: Option<Instant>,
}

impl StateManager {
    pub fn new(cfg: EngineConfig) -> Self {
        let reset_byte = cfg.reset_byte();
        Self {
            cfg,
            current_state: MachineState::Idle,
            last_status: None,
            alarm_latched: None,
            pending_soft_reset: false,
            reset_byte,
            settings: HashMap::new(),
            wcs: WcsTable::default(),
            active_wcs: CoordSystem::G54,
            active_wco: Position::ZERO,
            modal: ModalGroups::default(),
            last_response_at: None,
        }
    }

    pub fn alarm_latched(&self) -> Option<AlarmCode> {
        self.alarm_latched
    }

    pub fn current_state(&self) -> MachineState {
        self.current_state.clone()
    }

    pub fn is_unlock_line(&self, line: &str) -> bool {
        line.trim() == self.cfg.unlock_command
    }

    pub fn is_dangerous(&self, line: &str) -> bool {
        let trimmed = line.trim();
        self.cfg
            .safety
            .dangerous_commands
            .iter()
            .any(|prefix| trimmed.starts_with(prefix.as_str()))
    }

    pub fn max_command_length(&self) -> usize {
        self.cfg.validation.max_command_length
    }

    pub fn last_response_age(&self) -> Option<Duration> {
        self.last_response_at.map(|t| t.elapsed())
    }

    /// Called when a real-time byte is about to be written. Arms the
    /// "clear alarm latch on next Welcome" flag when it's the configured
    /// soft-reset byte, so an externally-triggered reset can't silently
    /// clear a fault this session didn't cause.
    pub fn note_realtime_byte_sent(&mut self, byte: u8) {
        if byte == self.reset_byte {
            self.pending_soft_reset = true;
        }
    }

    /// Pre-submission soft-limit check (§4.5). Only inspects `G0`/`G1` lines
    /// with axis letters; anything else passes through untouched.
    pub fn check_soft_limits(&self, line: &str) -> Result<(), RejectReason> {
        if !self.cfg.validation.enforce_soft_limits {
            return Ok(());
        }
        let trimmed = line.trim();
        if !is_rapid_or_linear(trimmed) {
            return Ok(());
        }
        let current = self.last_status.as_ref().map(|s| s.machine_pos).unwrap_or(Position::ZERO);
        let limits = self.cfg.machine_limits;
        for (axis, range) in [('X', limits.x), ('Y', limits.y), ('Z', limits.z)] {
            let Some(value) = axis_value(trimmed, axis) else { continue };
            let target = match self.modal.distance {
                DistanceMode::Absolute => value,
                DistanceMode::Relative => current_axis(&current, axis) + value,
            };
            if !range.contains(target) {
                return Err(RejectReason::SoftLimit);
            }
        }
        Ok(())
    }

    /// Applies one parsed response, updating internal state and emitting
    /// the relevant events. Called by the dispatcher for every inbound line,
    /// including ones it also routes to a command completion.
    pub fn apply_response(&mut self, response: &Response, events: &broadcast::Sender<EngineEvent>) {
        self.last_response_at = Some(Instant::now());
        match response {
            Response::Status(status) => self.apply_status(status.clone(), events),
            Response::Alarm { code } => self.apply_alarm(*code, events),
            Response::Welcome { .. } => self.apply_welcome(),
            Response::Setting { index, value } => {
                self.settings.insert(*index, value.clone());
            }
            Response::Coordinates { system, offset } => self.apply_coordinates(*system, *offset),
            Response::Ok | Response::Error { .. } | Response::Unknown { .. } => {}
        }
    }

    fn apply_status(&mut self, mut status: MachineStatus, events: &broadcast::Sender<EngineEvent>) {
        let prev_state = self.current_state.clone();
        let prev_pos = self.last_status.as_ref().map(|s| s.machine_pos);

        if let MachineState::Alarm(code) = &status.state {
            self.alarm_latched = Some(*code);
        }
        self.current_state = status.state.clone();

        if prev_state != self.current_state {
            let _ = events.send(EngineEvent::StateChanged { prev: prev_state, next: self.current_state.clone() });
        }

        if let Some(prev_pos) = prev_pos {
            let threshold = self.cfg.poller.position_change_threshold_mm;
            let delta = status.machine_pos.sub(&prev_pos);
            if delta.x.abs() >= threshold || delta.y.abs() >= threshold || delta.z.abs() >= threshold {
                let _ = events.send(EngineEvent::PositionChanged { dx: delta.x, dy: delta.y, dz: delta.z });
            }
        }

        // Work position is always derived from the WCS table, not the
        // wire's own `WPos:` field (§4.5): `WPos:` reflects whatever system
        // was active in firmware when the line was generated, which can be
        // stale relative to our own `active_wco` tracking.
        status.work_pos = status.machine_pos.sub(&self.active_wco);

        self.last_status = Some(status);
    }

    fn apply_alarm(&mut self, code: AlarmCode, events: &broadcast::Sender<EngineEvent>) {
        self.alarm_latched = Some(code);
        let prev_state = self.current_state.clone();
        self.current_state = MachineState::Alarm(code);
        if prev_state != self.current_state {
            let _ = events.send(EngineEvent::StateChanged { prev: prev_state, next: self.current_state.clone() });
        }
        let _ = events.send(EngineEvent::Alarm { code, description: code.description() });
    }

    fn apply_welcome(&mut self) {
        self.modal = ModalGroups::default();
        if self.pending_soft_reset {
            self.alarm_latched = None;
            self.pending_soft_reset = false;
        } else {
            debug!("state_manager: welcome without a pending soft reset from this session, alarm latch left untouched");
        }
    }

    fn apply_coordinates(&mut self, system: CoordinateRecord, offset: Position) {
        match system {
            CoordinateRecord::Wcs(n) => {
                self.wcs.systems.insert(n, offset);
                if n == self.active_wcs.0 {
                    self.active_wco = offset;
                }
            }
            CoordinateRecord::G28 => self.wcs.g28 = Some(offset),
            CoordinateRecord::G30 => self.wcs.g30 = Some(offset),
            CoordinateRecord::G92 => self.wcs.g92 = Some(offset),
            CoordinateRecord::ToolLengthOffset => self.wcs.tool_length_offset = Some(offset.z),
            CoordinateRecord::Probe => self.wcs.last_probe = Some(offset),
        }
    }

    pub fn machine_limits(&self) -> AxisLimits {
        self.cfg.machine_limits
    }
}

fn current_axis(pos: &Position, axis: char) -> f64 {
    match axis {
        'X' => pos.x,
        'Y' => pos.y,
        'Z' => pos.z,
        _ => 0.0,
    }
}

/// True if the line is a rapid (G0) or linear (G1) move.
fn is_rapid_or_linear(line: &str) -> bool {
    let upper = line.to_ascii_uppercase();
    upper.contains("G0") || upper.contains("G1")
}

/// Extracts a numeric value after a given axis letter, e.g. `'X' -> 10.5`
/// from `"G1 X10.5 F300"`.
fn axis_value(line: &str, axis: char) -> Option<f64> {
    let upper = axis.to_ascii_uppercase();
    let lower = axis.to_ascii_lowercase();
    for (i, c) in line.chars().enumerate() {
        if c == upper || c == lower {
            let rest = line.get(i + 1..)?;
            let end = rest
                .find(|c: char| !c.is_ascii_digit() && c != '.' && c != '-')
                .unwrap_or(rest.len());
            return rest.get(..end)?.trim().parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_at(state: MachineState, x: f64, y: f64, z: f64) -> MachineStatus {
        MachineStatus {
            state,
            machine_pos: Position { x, y, z, a: None },
            work_pos: Position { x, y, z, a: None },
            feed_rate: 0.0,
            spindle_speed: 0.0,
            input_pins: Default::default(),
            wco: None,
            overrides: None,
            buffer: None,
            last_updated: Instant::now(),
        }
    }

    #[test]
    fn test_alarm_latches_and_rejects_unlock_allowed() {
        let mut mgr = StateManager::new(EngineConfig::default());
        let (tx, _rx) = broadcast::channel(16);
        mgr.apply_response(&Response::Alarm { code: AlarmCode::SoftLimit }, &tx);
        assert_eq!(mgr.alarm_latched(), Some(AlarmCode::SoftLimit));
        assert!(mgr.is_unlock_line("$X"));
    }

    #[test]
    fn test_welcome_without_pending_reset_keeps_latch() {
        let mut mgr = StateManager::new(EngineConfig::default());
        let (tx, _rx) = broadcast::channel(16);
        mgr.apply_response(&Response::Alarm { code: AlarmCode::HardLimit }, &tx);
        mgr.apply_response(&Response::Welcome { firmware: "Grbl 1.1h".into() }, &tx);
        assert_eq!(mgr.alarm_latched(), Some(AlarmCode::HardLimit));
    }

    #[test]
    fn test_welcome_after_soft_reset_clears_latch() {
        let mut mgr = StateManager::new(EngineConfig::default());
        let (tx, _rx) = broadcast::channel(16);
        mgr.apply_response(&Response::Alarm { code: AlarmCode::HardLimit }, &tx);
        mgr.note_realtime_byte_sent(0x18);
        mgr.apply_response(&Response::Welcome { firmware: "Grbl 1.1h".into() }, &tx);
        assert_eq!(mgr.alarm_latched(), None);
    }

    #[test]
    fn test_state_changed_event_fires_on_transition() {
        let mut mgr = StateManager::new(EngineConfig::default());
        let (tx, mut rx) = broadcast::channel(16);
        mgr.apply_response(&Response::Status(status_at(MachineState::Idle, 0.0, 0.0, 0.0)), &tx);
        mgr.apply_response(&Response::Status(status_at(MachineState::Run, 0.0, 0.0, 0.0)), &tx);
        let mut saw_transition = false;
        while let Ok(ev) = rx.try_recv() {
            if let EngineEvent::StateChanged { prev: MachineState::Idle, next: MachineState::Run } = ev {
                saw_transition = true;
            }
        }
        assert!(saw_transition);
    }

    #[test]
    fn test_position_changed_event_fires_above_threshold() {
        let mut mgr = StateManager::new(EngineConfig::default());
        let (tx, mut rx) = broadcast::channel(16);
        mgr.apply_response(&Response::Status(status_at(MachineState::Idle, 0.0, 0.0, 0.0)), &tx);
        mgr.apply_response(&Response::Status(status_at(MachineState::Idle, 1.0, 0.0, 0.0)), &tx);
        let mut saw = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, EngineEvent::PositionChanged { .. }) {
                saw = true;
            }
        }
        assert!(saw);
    }

    #[test]
    fn test_soft_limit_rejects_out_of_range_absolute_move() {
        let mut cfg = EngineConfig::default();
        cfg.validation.enforce_soft_limits = true;
        let mgr = StateManager::new(cfg);
        assert_eq!(mgr.check_soft_limits("G0 X9999"), Err(RejectReason::SoftLimit));
    }

    #[test]
    fn test_soft_limit_allows_in_range_move() {
        let mut cfg = EngineConfig::default();
        cfg.validation.enforce_soft_limits = true;
        let mgr = StateManager::new(cfg);
        assert_eq!(mgr.check_soft_limits("G0 X10 Y10"), Ok(()));
    }

    #[test]
    fn test_apply_status_derives_work_pos_from_active_wco() {
        let mut mgr = StateManager::new(EngineConfig::default());
        let (tx, _rx) = broadcast::channel(16);
        mgr.apply_response(
            &Response::Coordinates { system: CoordinateRecord::Wcs(1), offset: Position { x: 1.0, y: 2.0, z: 3.0, a: None } },
            &tx,
        );
        mgr.apply_response(&Response::Status(status_at(MachineState::Idle, 10.0, 20.0, 30.0)), &tx);
        let work_pos = mgr.last_status.as_ref().unwrap().work_pos;
        assert_eq!(work_pos, Position { x: 9.0, y: 18.0, z: 27.0, a: None });
    }

    #[test]
    fn test_coordinates_for_inactive_system_does_not_change_active_wco() {
        let mut mgr = StateManager::new(EngineConfig::default());
        let (tx, _rx) = broadcast::channel(16);
        mgr.apply_response(
            &Response::Coordinates { system: CoordinateRecord::Wcs(2), offset: Position { x: 5.0, y: 5.0, z: 5.0, a: None } },
            &tx,
        );
        assert_eq!(mgr.active_wco, Position::ZERO);
    }

    #[test]
    fn test_coordinates_update_wcs_table() {
        let mut mgr = StateManager::new(EngineConfig::default());
        let (tx, _rx) = broadcast::channel(16);
        mgr.apply_response(
            &Response::Coordinates { system: CoordinateRecord::Wcs(1), offset: Position { x: 1.0, y: 2.0, z: 3.0, a: None } },
            &tx,
        );
        assert_eq!(mgr.wcs.offset_for(CoordSystem::G54), Position { x: 1.0, y: 2.0, z: 3.0, a: None });
    }
}
