//! Engine configuration (§6). Deserializable with `serde`, plain structs
//! with `Default` impls rather than a builder pattern.

use crate::machines::grbl::state::{AxisLimits, Range};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for a single connection.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_port: Option<String>,
    pub serial: crate::machines::grbl::transport::PortSettings,
    pub timeouts: Timeouts,
    pub line_ending: String,
    pub init_commands: Vec<String>,
    pub status_command: String,
    pub settings_command: String,
    pub unlock_command: String,
    pub home_command: String,
    /// Soft-reset byte, represented as a string so it can be configured
    /// from JSON/TOML (e.g. `"0x18"`); parsed with [`EngineConfig::reset_byte`].
    pub reset_command: String,
    /// Honored verbatim: if it parses as `0x..` it is sent as a single
    /// real-time byte, otherwise as a line command (see DESIGN.md).
    pub emergency_stop_command: String,
    pub machine_limits: AxisLimits,
    pub presets: Vec<Preset>,
    pub validation: ValidationConfig,
    pub safety: SafetyConfig,
    pub poller: PollerConfig,
    pub queue: QueueConfig,
    pub history: HistoryConfig,
}

impl EngineConfig {
    /// Parses [`EngineConfig::reset_command`] into the literal byte to write.
    /// Defaults to `0x18` (Ctrl-X) if the string doesn't parse as a `0x..` literal.
    pub fn reset_byte(&self) -> u8 {
        self.reset_command
            .strip_prefix("0x")
            .or_else(|| self.reset_command.strip_prefix("0X"))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .unwrap_or(0x18)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_port: None,
            serial: crate::machines::grbl::transport::PortSettings::default(),
            timeouts: Timeouts::default(),
            line_ending: "\r\n".to_string(),
            init_commands: Vec::new(),
            status_command: "?".to_string(),
            settings_command: "$$".to_string(),
            unlock_command: "$X".to_string(),
            home_command: "$H".to_string(),
            reset_command: "0x18".to_string(),
            emergency_stop_command: "M112".to_string(),
            machine_limits: AxisLimits {
                x: Range { min: 0.0, max: 300.0, total_travel: 300.0 },
                y: Range { min: 0.0, max: 300.0, total_travel: 300.0 },
                z: Range { min: -100.0, max: 0.0, total_travel: 100.0 },
            },
            presets: Vec::new(),
            validation: ValidationConfig::default(),
            safety: SafetyConfig::default(),
            poller: PollerConfig::default(),
            queue: QueueConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

/// Deadlines for the various operation kinds (§4.3).
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    #[serde(with = "duration_millis")]
    pub connection: Duration,
    #[serde(with = "duration_millis")]
    pub command: Duration,
    #[serde(with = "duration_millis")]
    pub emergency: Duration,
    #[serde(with = "duration_millis")]
    pub initialization: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connection: Duration::from_secs(5),
            command: Duration::from_secs(10),
            emergency: Duration::from_secs(15),
            initialization: Duration::from_secs(2),
        }
    }
}

/// A named command/file/sequence a caller-facing layer can run; the core
/// only needs to deserialize and hand these back out (§6).
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preset {
    Command(String),
    File(PathBuf),
    Sequence(Vec<String>),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub gcode_command_regex: String,
    pub max_command_length: usize,
    pub gcode_file_extensions: Vec<String>,
    pub enforce_soft_limits: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            gcode_command_regex: r"^[A-Za-z0-9\.\-\s\$\?\=\,\[\]%]+$".to_string(),
            max_command_length: 256,
            gcode_file_extensions: vec!["nc".to_string(), "gcode".to_string(), "tap".to_string()],
            enforce_soft_limits: true,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub dangerous_commands: Vec<String>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    #[serde(with = "duration_millis")]
    pub fast_interval: Duration,
    #[serde(with = "duration_millis")]
    pub slow_interval: Duration,
    pub position_change_threshold_mm: f64,
    pub max_missed_polls: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_millis(100),
            slow_interval: Duration::from_millis(500),
            position_change_threshold_mm: 0.001,
            max_missed_polls: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_queue_size: usize,
    pub backpressure_high_water_pct: u8,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 256,
            backpressure_high_water_pct: 80,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub ring_buffer_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { ring_buffer_size: 512 }
    }
}

/// Millisecond-integer (de)serialization for `Duration` fields, kept
/// dependency-light rather than pulling in `humantime_serde`.
mod duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts_match_spec() {
        let t = Timeouts::default();
        assert_eq!(t.connection, Duration::from_secs(5));
        assert_eq!(t.command, Duration::from_secs(10));
        assert_eq!(t.emergency, Duration::from_secs(15));
        assert_eq!(t.initialization, Duration::from_secs(2));
    }

    #[test]
    fn test_reset_byte_parses_hex_literal() {
        let mut cfg = EngineConfig::default();
        cfg.reset_command = "0x18".to_string();
        assert_eq!(cfg.reset_byte(), 0x18);
    }

    #[test]
    fn test_reset_byte_falls_back_on_non_hex() {
        let mut cfg = EngineConfig::default();
        cfg.reset_command = "garbage".to_string();
        assert_eq!(cfg.reset_byte(), 0x18);
    }

    #[test]
    fn test_queue_config_defaults() {
        let q = QueueConfig::default();
        assert_eq!(q.max_queue_size, 256);
        assert_eq!(q.backpressure_high_water_pct, 80);
    }
}
