//! Real serial port backed by `serialport` (feature = "serial").

use super::{LineTransport, Parity, PortError, PortSettings};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// An open serial connection to a GRBL-compatible controller.
///
/// Mirrors the shape the rest of the crate has always used
/// (`Port::open`, `send_line`, `read_line`) while implementing
/// [`LineTransport`] so the dispatcher can drive it through the same
/// trait object as [`super::ScriptedTransport`].
pub struct Port {
    inner: Box<dyn serialport::SerialPort>,
    settings: PortSettings,
    read_buf: Vec<u8>,
}

impl Port {
    /// Opens `path` at `baud_rate` using default framing (8N1, no flow
    /// control). Blocks for `settings.connection_init_delay` after opening
    /// so the controller's welcome banner has time to land on the wire.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, PortError> {
        let mut settings = PortSettings::default();
        settings.baud_rate = baud_rate;
        Self::open_with_settings(path, settings)
    }

    pub fn open_with_settings(path: &str, settings: PortSettings) -> Result<Self, PortError> {
        let parity = match settings.parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        };
        let stop_bits = match settings.stop_bits {
            2 => serialport::StopBits::Two,
            _ => serialport::StopBits::One,
        };
        let data_bits = match settings.data_bits {
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        };
        let flow_control = if settings.rtscts {
            serialport::FlowControl::Hardware
        } else {
            serialport::FlowControl::None
        };

        let inner = serialport::new(path, settings.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(flow_control)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| PortError::Open(e.to_string()))?;

        std::thread::sleep(settings.connection_init_delay);

        Ok(Self {
            inner,
            settings,
            read_buf: Vec::new(),
        })
    }

    /// Identical to [`LineTransport::write_line`].
    pub fn send_line(&mut self, line: &str) -> Result<(), PortError> {
        self.write_line(line)
    }

    pub fn send_realtime_byte(&mut self, byte: u8) -> Result<(), PortError> {
        self.write_realtime_byte(byte)
    }

    fn read_byte(&mut self, deadline: Instant) -> Result<Option<u8>, PortError> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    continue;
                }
                Err(e) => return Err(PortError::Io(e)),
            }
        }
    }
}

impl LineTransport for Port {
    fn write_line(&mut self, line: &str) -> Result<(), PortError> {
        let mut out = line.to_string();
        out.push_str(&self.settings.line_ending);
        self.inner
            .write_all(out.as_bytes())
            .map_err(|e| PortError::Write(e.to_string()))
    }

    fn write_realtime_byte(&mut self, byte: u8) -> Result<(), PortError> {
        self.inner
            .write_all(&[byte])
            .map_err(|e| PortError::Write(e.to_string()))
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String, PortError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pos) = self.read_buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.read_buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                return Ok(line.trim_end_matches(['\r', '\n']).to_string());
            }
            match self.read_byte(deadline)? {
                Some(b) => self.read_buf.push(b),
                None => return Err(PortError::ReadTimeout(timeout)),
            }
        }
    }

    fn close(&mut self) {
        // serialport has no explicit close; dropping the handle releases the fd/handle.
    }
}

/// Metadata about a discoverable serial port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: Option<String>,
}

/// Lists serial ports currently visible to the OS.
pub fn list_ports() -> Result<Vec<PortInfo>, PortError> {
    let ports = serialport::available_ports().map_err(|e| PortError::Open(e.to_string()))?;
    Ok(ports
        .into_iter()
        .map(|p| PortInfo {
            name: p.port_name,
            description: match p.port_type {
                serialport::SerialPortType::UsbPort(info) => info.product,
                _ => None,
            },
        })
        .collect())
}
