//! Scripted in-memory transport for tests (no `serial` feature required).

use super::{LineTransport, PortError};
use std::collections::VecDeque;
use std::time::Duration;

/// A canned exchange: reply lines to emit, optionally gated on the
/// outbound line matching `trigger` (substring match). When `trigger` is
/// `None` the lines are emitted unconditionally the next time a read is
/// requested (used for unsolicited alarms/status pushed by the tests).
#[derive(Clone, Debug)]
pub struct ScriptedReply {
    pub trigger: Option<String>,
    pub lines: Vec<String>,
}

impl ScriptedReply {
    pub fn on(trigger: impl Into<String>, lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            trigger: Some(trigger.into()),
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            trigger: None,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

/// A deterministic [`LineTransport`] driven by a script of canned replies.
///
/// `write_line`/`write_realtime_byte` record what was sent and, for
/// triggered replies, queue the scripted response lines for subsequent
/// `read_line` calls. Replies with no trigger are queued eagerly at
/// construction/`push_unsolicited` time, modelling events the controller
/// emits on its own (e.g. an alarm mid-job).
pub struct ScriptedTransport {
    scripts: Vec<ScriptedReply>,
    pending: VecDeque<String>,
    pub sent_lines: Vec<String>,
    pub sent_bytes: Vec<u8>,
    closed: bool,
    /// If set, every `read_line` fails with this error instead of draining `pending`.
    pub fail_reads_with: Option<String>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<ScriptedReply>) -> Self {
        let mut pending = VecDeque::new();
        for s in &scripts {
            if s.trigger.is_none() {
                pending.extend(s.lines.iter().cloned());
            }
        }
        Self {
            scripts,
            pending,
            sent_lines: Vec::new(),
            sent_bytes: Vec::new(),
            closed: false,
            fail_reads_with: None,
        }
    }

    /// Queues lines as if the controller pushed them unprompted.
    pub fn push_unsolicited(&mut self, lines: impl IntoIterator<Item = impl Into<String>>) {
        self.pending.extend(lines.into_iter().map(Into::into));
    }

    fn fire_triggers(&mut self, line: &str) {
        for s in &self.scripts {
            if let Some(trigger) = &s.trigger {
                if line.contains(trigger.as_str()) {
                    self.pending.extend(s.lines.iter().cloned());
                }
            }
        }
    }
}

impl LineTransport for ScriptedTransport {
    fn write_line(&mut self, line: &str) -> Result<(), PortError> {
        if self.closed {
            return Err(PortError::Closed);
        }
        self.sent_lines.push(line.to_string());
        self.fire_triggers(line);
        Ok(())
    }

    fn write_realtime_byte(&mut self, byte: u8) -> Result<(), PortError> {
        if self.closed {
            return Err(PortError::Closed);
        }
        self.sent_bytes.push(byte);
        self.fire_triggers(&(byte as char).to_string());
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String, PortError> {
        if self.closed {
            return Err(PortError::Closed);
        }
        if let Some(msg) = &self.fail_reads_with {
            return Err(PortError::Write(msg.clone()));
        }
        match self.pending.pop_front() {
            Some(line) => Ok(line),
            None => {
                // Mirror a real port blocking for the timeout instead of
                // busy-spinning the transport thread.
                std::thread::sleep(timeout);
                Err(PortError::ReadTimeout(timeout))
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triggered_reply_queues_on_matching_write() {
        let mut t = ScriptedTransport::new(vec![ScriptedReply::on("G0", ["ok"])]);
        t.write_line("G0 X1\r\n").unwrap();
        assert_eq!(t.read_line(Duration::from_millis(1)).unwrap(), "ok");
    }

    #[test]
    fn test_read_without_pending_times_out() {
        let mut t = ScriptedTransport::new(vec![]);
        let err = t.read_line(Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, PortError::ReadTimeout(_)));
    }

    #[test]
    fn test_unsolicited_reply_available_immediately() {
        let mut t = ScriptedTransport::new(vec![ScriptedReply::push(["ALARM:1"])]);
        assert_eq!(t.read_line(Duration::from_millis(1)).unwrap(), "ALARM:1");
    }

    #[test]
    fn test_closed_transport_rejects_writes() {
        let mut t = ScriptedTransport::new(vec![]);
        t.close();
        assert!(matches!(t.write_line("?"), Err(PortError::Closed)));
    }
}
