//! GRBL/GRBL-HAL command/response engine.
//!
//! **Public API:** [`Supervisor`] — connect, disconnect, send_command,
//! send_file, jog, home, emergency_stop, recover_from_alarm. Subscribe to
//! [`EngineEvent`]s via `Supervisor::events`. Use [`list_ports`] (with the
//! `serial` feature) to discover ports.
//!
//! Lower-level building blocks (the parser, the dispatcher, the state
//! manager) are exported for callers assembling their own pipeline, e.g. to
//! drive the engine against a [`transport::ScriptedTransport`] in tests.

pub mod command;
pub mod commands;
pub mod engine;
pub mod events;
pub mod metrics;
pub mod parser;
pub mod poller;
pub mod state;
pub mod state_manager;
pub mod supervisor;
pub mod transport;

pub use command::{
    CommandCategory, CommandErrorKind, CommandId, CommandResult, ImmediatePayload, RejectReason,
    SubmitOptions,
};
pub use commands::{GrblCommand, RealtimeCommand};
pub use engine::{CommandEngine, EngineError, EngineHandle, EngineStatus};
pub use events::EngineEvent;
pub use metrics::MetricsSnapshot;
pub use parser::*;
pub use state::*;
pub use supervisor::{AlarmError, FileRun, FileRunPolicy, Lifecycle, Supervisor, SupervisorError};

#[cfg(feature = "serial")]
pub use transport::{list_ports, Port, PortInfo};
