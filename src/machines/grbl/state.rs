//! Machine state types for GRBL-HAL.
//!
//! Types only — no logic. Used by the parser, the state manager, and the
//! dispatcher/poller that hold or broadcast machine status.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Position in machine or work coordinates.
/// Supports optional A (rotary) axis for GRBL-HAL.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Rotary axis, if present.
    pub a: Option<f64>,
}

impl Position {
    pub const ZERO: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        a: None,
    };

    /// Component-wise subtraction; used to derive work position from machine
    /// position and the active work coordinate system offset.
    pub fn sub(&self, other: &Position) -> Position {
        Position {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
            a: match (self.a, other.a) {
                (Some(a), Some(b)) => Some(a - b),
                (Some(a), None) => Some(a),
                _ => None,
            },
        }
    }

    /// Largest absolute per-axis delta between this position and another.
    pub fn max_abs_delta(&self, other: &Position) -> f64 {
        let d = self.sub(other);
        [d.x, d.y, d.z, d.a.unwrap_or(0.0)]
            .into_iter()
            .map(f64::abs)
            .fold(0.0, f64::max)
    }
}

/// Reason for Hold state (e.g. feed hold, safety door).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldReason {
    FeedHold,
    SafetyDoor,
    /// GRBL-HAL may report other hold reasons; capture as string.
    Other(String),
}

/// Alarm code from GRBL-HAL. Matches alarms.h (codes 1–21). Unknown codes
/// map to `Unknown(n)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlarmCode {
    HardLimit,                      // 1
    SoftLimit,                      // 2
    AbortCycle,                     // 3
    ProbeFailInitial,               // 4
    ProbeFailContact,               // 5
    HomingFailReset,                // 6
    HomingFailDoor,                 // 7
    FailPulloff,                    // 8
    HomingFailApproach,             // 9
    EStop,                          // 10
    HomingRequired,                 // 11
    LimitsEngaged,                  // 12
    ProbeProtect,                   // 13
    Spindle,                        // 14
    HomingFailAutoSquaringApproach, // 15
    SelftestFailed,                 // 16
    MotorFault,                     // 17
    HomingFail,                     // 18
    ModbusException,                // 19
    ExpanderException,              // 20
    NvsFailed,                      // 21
    /// Unknown or extended GRBL-HAL alarm code (e.g. 22–255).
    Unknown(u8),
}

impl From<u8> for AlarmCode {
    fn from(n: u8) -> Self {
        match n {
            1 => AlarmCode::HardLimit,
            2 => AlarmCode::SoftLimit,
            3 => AlarmCode::AbortCycle,
            4 => AlarmCode::ProbeFailInitial,
            5 => AlarmCode::ProbeFailContact,
            6 => AlarmCode::HomingFailReset,
            7 => AlarmCode::HomingFailDoor,
            8 => AlarmCode::FailPulloff,
            9 => AlarmCode::HomingFailApproach,
            10 => AlarmCode::EStop,
            11 => AlarmCode::HomingRequired,
            12 => AlarmCode::LimitsEngaged,
            13 => AlarmCode::ProbeProtect,
            14 => AlarmCode::Spindle,
            15 => AlarmCode::HomingFailAutoSquaringApproach,
            16 => AlarmCode::SelftestFailed,
            17 => AlarmCode::MotorFault,
            18 => AlarmCode::HomingFail,
            19 => AlarmCode::ModbusException,
            20 => AlarmCode::ExpanderException,
            21 => AlarmCode::NvsFailed,
            _ => AlarmCode::Unknown(n),
        }
    }
}

impl AlarmCode {
    /// Human-readable description, used when surfacing `alarm` events.
    pub fn description(&self) -> &'static str {
        match self {
            AlarmCode::HardLimit => "hard limit triggered",
            AlarmCode::SoftLimit => "soft limit exceeded",
            AlarmCode::AbortCycle => "reset while in motion",
            AlarmCode::ProbeFailInitial => "probe fail (initial)",
            AlarmCode::ProbeFailContact => "probe fail (contact)",
            AlarmCode::HomingFailReset => "homing fail (reset)",
            AlarmCode::HomingFailDoor => "homing fail (door)",
            AlarmCode::FailPulloff => "homing fail (pulloff)",
            AlarmCode::HomingFailApproach => "homing fail (approach)",
            AlarmCode::EStop => "emergency stop",
            AlarmCode::HomingRequired => "homing required",
            AlarmCode::LimitsEngaged => "limits engaged",
            AlarmCode::ProbeProtect => "probe protect",
            AlarmCode::Spindle => "spindle fault",
            AlarmCode::HomingFailAutoSquaringApproach => "homing fail (auto-squaring approach)",
            AlarmCode::SelftestFailed => "self-test failed",
            AlarmCode::MotorFault => "motor fault",
            AlarmCode::HomingFail => "homing fail",
            AlarmCode::ModbusException => "modbus exception",
            AlarmCode::ExpanderException => "expander exception",
            AlarmCode::NvsFailed => "non-volatile storage failed",
            AlarmCode::Unknown(_) => "unknown alarm",
        }
    }
}

/// Input pin state (limit switches, probe). GRBL-HAL reports these
/// in status when configured; we use booleans for the common layout
/// (X, Y, Z limits + probe + door + hold).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinState {
    pub limit_x: bool,
    pub limit_y: bool,
    pub limit_z: bool,
    pub probe: bool,
    pub door: bool,
    pub hold: bool,
}

/// High-level machine state from status string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MachineState {
    Idle,
    Run,
    Hold(HoldReason),
    Jog,
    Alarm(AlarmCode),
    /// GRBL-HAL uses "Door" for safety door.
    Door,
    Check,
    Home,
    Sleep,
    Unknown(String),
}

impl MachineState {
    /// True for states the poller treats as "active" (fast polling interval).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MachineState::Run | MachineState::Jog | MachineState::Home | MachineState::Hold(_)
        )
    }
}

/// Active work coordinate system selector: 1..=9 maps to G54..G59.3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordSystem(pub u8);

impl CoordSystem {
    pub const G54: CoordSystem = CoordSystem(1);
}

/// Table of work coordinate system offsets, keyed by `CoordSystem.0` (1..=9),
/// plus the non-WCS coordinate records GRBL reports (`G28`, `G30`, `G92`, tool
/// length offset `TLO`, and the last probe result `PRB`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WcsTable {
    pub systems: std::collections::HashMap<u8, Position>,
    pub g28: Option<Position>,
    pub g30: Option<Position>,
    pub g92: Option<Position>,
    pub tool_length_offset: Option<f64>,
    pub last_probe: Option<Position>,
}

impl WcsTable {
    pub fn offset_for(&self, system: CoordSystem) -> Position {
        self.systems.get(&system.0).copied().unwrap_or(Position::ZERO)
    }
}

/// Motion modal group (G0/G1/G2/G3/G38.x/...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionMode {
    Rapid,
    Linear,
    ArcCw,
    ArcCcw,
    Probe,
}

/// Distance modal group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMode {
    Absolute,
    Relative,
}

/// Units modal group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitsMode {
    Millimeters,
    Inches,
}

/// Coolant modal group (GRBL allows mist and flood simultaneously).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoolantMode {
    pub mist: bool,
    pub flood: bool,
}

/// Spindle modal group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpindleMode {
    Off,
    Clockwise,
    CounterClockwise,
}

/// Plane selection modal group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaneMode {
    Xy,
    Zx,
    Yz,
}

/// Snapshot of the modal groups tracked by the state manager. Reset to these
/// firmware defaults on a `Welcome` response that follows a soft reset (§4.5).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModalGroups {
    pub motion: MotionMode,
    pub plane: PlaneMode,
    pub units: UnitsMode,
    pub distance: DistanceMode,
    pub feed_rate: f64,
    pub coolant: CoolantMode,
    pub spindle: SpindleMode,
}

impl Default for ModalGroups {
    fn default() -> Self {
        Self {
            motion: MotionMode::Rapid,
            plane: PlaneMode::Xy,
            units: UnitsMode::Millimeters,
            distance: DistanceMode::Absolute,
            feed_rate: 0.0,
            coolant: CoolantMode::default(),
            spindle: SpindleMode::Off,
        }
    }
}

/// Active tool, if the controller reports tool-change state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolState {
    pub number: Option<u32>,
    pub length: Option<f64>,
    pub diameter: Option<f64>,
}

/// Inclusive travel range for one axis, in millimeters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
    /// Configured total travel distance for the axis; independent of
    /// `max - min` since some controllers report a travel figure that
    /// doesn't match the soft-limit span exactly.
    pub total_travel: f64,
}

impl Range {
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

/// Configured soft-travel limits, one range per linear axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    pub x: Range,
    pub y: Range,
    pub z: Range,
}

/// Override percentages carried by a status line's `Ov:` field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    pub feed_pct: u16,
    pub rapid_pct: u16,
    pub spindle_pct: u16,
}

/// Planner/serial buffer occupancy carried by a status line's `Bf:` field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BufferState {
    pub planner_blocks: u32,
    pub rx_bytes: u32,
}

/// Full machine status parsed from a single `?` status response.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MachineStatus {
    pub state: MachineState,
    pub machine_pos: Position,
    pub work_pos: Position,
    pub feed_rate: f64,
    pub spindle_speed: f64,
    pub input_pins: PinState,
    /// Work coordinate offset (`WCO:`), present only on status lines GRBL-HAL
    /// chooses to include it on; when absent the state manager's own
    /// `active_wco` (from `Coordinates` responses) is authoritative instead.
    pub wco: Option<Position>,
    pub overrides: Option<Overrides>,
    pub buffer: Option<BufferState>,
    /// Set by the caller (e.g. the dispatcher) when the status was received;
    /// not serialized (Instant has no meaningful serialization).
    #[serde(skip_serializing)]
    pub last_updated: Instant,
}

impl MachineStatus {
    /// Initial status before any poll (e.g. for shared state when starting the dispatcher).
    pub fn idle() -> Self {
        Self {
            state: MachineState::Idle,
            machine_pos: Position::ZERO,
            work_pos: Position::ZERO,
            feed_rate: 0.0,
            spindle_speed: 0.0,
            input_pins: PinState::default(),
            wco: None,
            overrides: None,
            buffer: None,
            last_updated: Instant::now(),
        }
    }
}

impl<'de> Deserialize<'de> for MachineStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        /// Helper to deserialize all fields except `last_updated`, then set it to `Instant::now()`.
        #[derive(Deserialize)]
        struct MachineStatusDto {
            state: MachineState,
            machine_pos: Position,
            work_pos: Position,
            feed_rate: f64,
            spindle_speed: f64,
            input_pins: PinState,
            #[serde(default)]
            wco: Option<Position>,
            #[serde(default)]
            overrides: Option<Overrides>,
            #[serde(default)]
            buffer: Option<BufferState>,
        }
        let dto = MachineStatusDto::deserialize(deserializer)?;
        Ok(MachineStatus {
            state: dto.state,
            machine_pos: dto.machine_pos,
            work_pos: dto.work_pos,
            feed_rate: dto.feed_rate,
            spindle_speed: dto.spindle_speed,
            input_pins: dto.input_pins,
            wco: dto.wco,
            overrides: dto.overrides,
            buffer: dto.buffer,
            last_updated: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_sub_and_delta() {
        let a = Position { x: 10.0, y: 5.0, z: 0.0, a: None };
        let b = Position { x: 1.0, y: 1.0, z: 0.0, a: None };
        let d = a.sub(&b);
        assert_eq!(d.x, 9.0);
        assert_eq!(d.y, 4.0);
        assert_eq!(a.max_abs_delta(&b), 9.0);
    }

    #[test]
    fn test_wcs_table_default_offset() {
        let table = WcsTable::default();
        assert_eq!(table.offset_for(CoordSystem::G54), Position::ZERO);
    }

    #[test]
    fn test_range_contains() {
        let r = Range { min: -100.0, max: 100.0, total_travel: 200.0 };
        assert!(r.contains(0.0));
        assert!(!r.contains(150.0));
    }

    #[test]
    fn test_machine_state_is_active() {
        assert!(MachineState::Run.is_active());
        assert!(MachineState::Hold(HoldReason::FeedHold).is_active());
        assert!(!MachineState::Idle.is_active());
        assert!(!MachineState::Alarm(AlarmCode::HardLimit).is_active());
    }

    #[test]
    fn test_alarm_code_from_u8() {
        assert_eq!(AlarmCode::from(1), AlarmCode::HardLimit);
        assert_eq!(AlarmCode::from(2), AlarmCode::SoftLimit);
        assert!(matches!(AlarmCode::from(99), AlarmCode::Unknown(99)));
    }
}
