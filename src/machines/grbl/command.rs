//! Command/response data model (C3).
//!
//! Types only — the dispatcher in [`super::engine`] gives them behavior.

use super::parser::Response;
use super::state::AlarmCode;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic command id source, shared by every dispatcher in the process.
static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the next monotonic [`CommandId`].
pub fn next_command_id() -> CommandId {
    CommandId(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

/// How a command is scheduled relative to the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandCategory {
    /// Goes through the FIFO queue; at most one `Normal` command is in
    /// flight at a time (I1).
    Normal,
    /// Bypasses the queue, written ahead of (not instead of) the in-flight
    /// command; still expects a line response (used for `?`).
    Immediate,
    /// A single unterminated byte; fire-and-forget, no response expected.
    RealtimeByte,
}

/// Caller-supplied options for [`submit`](super::engine::CommandEngine::submit).
#[derive(Clone, Debug)]
pub struct SubmitOptions {
    pub timeout: Duration,
    /// When true, a line matching `safety.dangerous_commands` is rejected
    /// with `Rejected(BadLine)` instead of being queued.
    pub refuse_dangerous: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            refuse_dangerous: true,
        }
    }
}

impl SubmitOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout, ..Default::default() }
    }
}

/// Payload for the immediate (non-queued) submission path.
#[derive(Clone, Debug)]
pub enum ImmediatePayload {
    /// A short line expecting a correlated response (e.g. `?` expects `Status`).
    Line(String),
    /// A single unterminated control byte; fire-and-forget.
    RealtimeByte(u8),
}

/// Why a command was rejected before ever reaching the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    QueueFull,
    SoftLimit,
    AlarmLatched,
    BadLine,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::QueueFull => "queue full",
            RejectReason::SoftLimit => "soft limit exceeded",
            RejectReason::AlarmLatched => "alarm latched",
            RejectReason::BadLine => "command line rejected",
        };
        write!(f, "{}", s)
    }
}

/// Terminal failure kind for a [`CommandResult`].
#[derive(Clone, Debug, PartialEq)]
pub enum CommandErrorKind {
    Timeout,
    ControllerError(u8),
    Alarm(AlarmCode),
    Cancelled,
    TransportLost,
    Rejected(RejectReason),
}

impl fmt::Display for CommandErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandErrorKind::Timeout => write!(f, "timed out"),
            CommandErrorKind::ControllerError(code) => write!(f, "controller error {}", code),
            CommandErrorKind::Alarm(code) => write!(f, "alarm: {}", code.description()),
            CommandErrorKind::Cancelled => write!(f, "cancelled"),
            CommandErrorKind::TransportLost => write!(f, "transport lost"),
            CommandErrorKind::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

/// The tagged outcome of a submitted command.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandResult {
    Ok { response: Response, elapsed: Duration },
    Err { kind: CommandErrorKind, message: String, elapsed: Duration },
}

impl CommandResult {
    pub fn err(kind: CommandErrorKind, message: impl Into<String>, elapsed: Duration) -> Self {
        CommandResult::Err { kind, message: message.into(), elapsed }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CommandResult::Ok { .. })
    }
}
