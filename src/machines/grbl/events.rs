//! Engine events (§6) — fanned out to external subscribers over a
//! `tokio::sync::broadcast` channel, the full event set the engine produces.

use super::command::{CommandId, CommandResult};
use super::state::MachineState;

/// Default capacity for the engine's event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Connected,
    Disconnected,
    StateChanged {
        prev: MachineState,
        next: MachineState,
    },
    PositionChanged {
        dx: f64,
        dy: f64,
        dz: f64,
    },
    Alarm {
        code: super::state::AlarmCode,
        description: &'static str,
    },
    CommandCompleted {
        id: CommandId,
        result: CommandResult,
    },
    PerformanceAlert {
        metric: String,
        value: f64,
    },
    Backpressure {
        queue_depth: usize,
    },
    PollError {
        kind: PollErrorKind,
    },
    MaxMissedPollsExceeded,
    EmergencyStop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollErrorKind {
    Timeout,
    Transport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_changed_event_equality() {
        let a = EngineEvent::StateChanged {
            prev: MachineState::Idle,
            next: MachineState::Run,
        };
        let b = EngineEvent::StateChanged {
            prev: MachineState::Idle,
            next: MachineState::Run,
        };
        assert_eq!(a, b);
    }
}
