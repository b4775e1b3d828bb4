//! Serial transport (C1).
//!
//! [`LineTransport`] is the boundary the dispatcher drives: blocking reads
//! and writes against whatever sits at the other end of the serial link.
//! The real implementation ([`Port`], behind the `serial` feature) wraps
//! `serialport`; [`mock::ScriptedTransport`] is a deterministic stand-in used
//! by the engine's own tests and available to integration tests without the
//! `serial` feature or real hardware.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "serial")]
mod port;
mod mock;

#[cfg(feature = "serial")]
pub use port::{list_ports, Port, PortInfo};
pub use mock::ScriptedTransport;

/// Errors from the byte-level transport. Shared by every `LineTransport`
/// implementation so the dispatcher can handle them uniformly.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("port open failed: {0}")]
    Open(String),
    #[error("port write failed: {0}")]
    Write(String),
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),
    #[error("port closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configurable serial framing/port settings (§4.1). Defaults match GRBL's
/// usual configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub flow_control: bool,
    pub rtscts: bool,
    pub auto_open: bool,
    /// Line ending appended to outbound line commands. Real-time bytes
    /// ignore this entirely.
    pub line_ending: String,
    /// How long to wait after `open()` before the first write, so the
    /// controller's welcome banner has time to arrive.
    #[serde(with = "connection_init_delay_millis")]
    pub connection_init_delay: Duration,
}

mod connection_init_delay_millis {
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

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            flow_control: false,
            rtscts: false,
            auto_open: false,
            line_ending: "\r\n".to_string(),
            connection_init_delay: Duration::from_millis(100),
        }
    }
}

/// The blocking line-transport boundary. Implementations are driven from a
/// dedicated OS thread owned by the dispatcher (see `engine::run_transport_thread`);
/// nothing else touches them, preserving single-writer discipline over the
/// underlying device.
pub trait LineTransport: Send + 'static {
    /// Writes a line command, appending the configured line ending.
    fn write_line(&mut self, line: &str) -> Result<(), PortError>;

    /// Writes a single unterminated byte (real-time command).
    fn write_realtime_byte(&mut self, byte: u8) -> Result<(), PortError>;

    /// Blocks until one complete inbound line (sans its terminator) is
    /// available, or `timeout` elapses.
    fn read_line(&mut self, timeout: Duration) -> Result<String, PortError>;

    /// Releases the underlying device. Idempotent.
    fn close(&mut self);
}
