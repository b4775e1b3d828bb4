//! Status history and command metrics (§3, §4.3).
//!
//! Owned exclusively by the dispatcher, same as the queue and in-flight
//! slot; readers only ever see a cloned [`MetricsSnapshot`], the same
//! clone-out-of-the-lock pattern used for shared state reads elsewhere.

use super::command::{CommandErrorKind, CommandResult};
use super::state::{AlarmCode, MachineState};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const THROUGHPUT_WINDOW: Duration = Duration::from_secs(10);
const ERROR_RATE_WINDOW: usize = 20;

/// One state-history sample (§3).
#[derive(Clone, Debug)]
pub struct StateSample {
    pub timestamp: Instant,
    pub state: MachineState,
}

/// Running counters plus the bounded status-history ring buffer. Updated
/// only by the dispatcher on the hot path; never cloned directly.
pub struct EngineMetrics {
    ring_buffer_size: usize,
    history: VecDeque<StateSample>,
    total_commands: u64,
    successful: u64,
    failed: u64,
    /// Reserved for a future auto-retry policy; this dispatcher never
    /// retries a command on its own, so this always reads zero today.
    retried: u64,
    timeouts: u64,
    alarm_counts: HashMap<AlarmCode, u64>,
    total_response_time: Duration,
    min_response_time: Option<Duration>,
    max_response_time: Option<Duration>,
    completion_times: VecDeque<Instant>,
    peak_throughput_per_sec: f64,
    recent_outcomes: VecDeque<bool>,
}

impl EngineMetrics {
    pub fn new(ring_buffer_size: usize) -> Self {
        Self {
            ring_buffer_size: ring_buffer_size.max(1),
            history: VecDeque::new(),
            total_commands: 0,
            successful: 0,
            failed: 0,
            retried: 0,
            timeouts: 0,
            alarm_counts: HashMap::new(),
            total_response_time: Duration::ZERO,
            min_response_time: None,
            max_response_time: None,
            completion_times: VecDeque::new(),
            peak_throughput_per_sec: 0.0,
            recent_outcomes: VecDeque::new(),
        }
    }

    pub fn record_state_sample(&mut self, state: MachineState) {
        if self.history.len() >= self.ring_buffer_size {
            self.history.pop_front();
        }
        self.history.push_back(StateSample { timestamp: Instant::now(), state });
    }

    /// Records one terminal command outcome. Returns the just-recorded
    /// elapsed time and the running average *before* this sample, so the
    /// dispatcher can decide whether to raise a `PerformanceAlert`.
    pub fn record_completion(&mut self, result: &CommandResult) -> (Duration, Duration, u64) {
        let prior_average = self.average_response_time();
        let prior_total = self.total_commands;

        self.total_commands += 1;
        let elapsed = match result {
            CommandResult::Ok { elapsed, .. } => {
                self.successful += 1;
                *elapsed
            }
            CommandResult::Err { kind, elapsed, .. } => {
                self.failed += 1;
                match kind {
                    CommandErrorKind::Timeout => self.timeouts += 1,
                    CommandErrorKind::Alarm(code) => {
                        *self.alarm_counts.entry(*code).or_insert(0) += 1;
                    }
                    _ => {}
                }
                *elapsed
            }
        };

        self.total_response_time += elapsed;
        self.min_response_time = Some(self.min_response_time.map_or(elapsed, |m| m.min(elapsed)));
        self.max_response_time = Some(self.max_response_time.map_or(elapsed, |m| m.max(elapsed)));

        let now = Instant::now();
        self.completion_times.push_back(now);
        while let Some(front) = self.completion_times.front() {
            if now.duration_since(*front) > THROUGHPUT_WINDOW {
                self.completion_times.pop_front();
            } else {
                break;
            }
        }
        let throughput = self.completion_times.len() as f64 / THROUGHPUT_WINDOW.as_secs_f64();
        if throughput > self.peak_throughput_per_sec {
            self.peak_throughput_per_sec = throughput;
        }

        self.recent_outcomes.push_back(result.is_ok());
        if self.recent_outcomes.len() > ERROR_RATE_WINDOW {
            self.recent_outcomes.pop_front();
        }

        (elapsed, prior_average, prior_total)
    }

    pub fn average_response_time(&self) -> Duration {
        if self.total_commands == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.total_commands as u32
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.recent_outcomes.is_empty() {
            0.0
        } else {
            let errors = self.recent_outcomes.iter().filter(|ok| !**ok).count();
            errors as f64 / self.recent_outcomes.len() as f64
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_commands: self.total_commands,
            successful: self.successful,
            failed: self.failed,
            retried: self.retried,
            timeouts: self.timeouts,
            alarm_counts: self.alarm_counts.clone(),
            average_response_time: self.average_response_time(),
            min_response_time: self.min_response_time,
            max_response_time: self.max_response_time,
            peak_throughput_per_sec: self.peak_throughput_per_sec,
            error_rate: self.error_rate(),
            recent_states: self.history.iter().cloned().collect(),
        }
    }
}

/// Clone-out-of-lock snapshot of [`EngineMetrics`], handed to callers of
/// `EngineHandle::metrics()`.
#[derive(Clone, Debug)]
pub struct MetricsSnapshot {
    pub total_commands: u64,
    pub successful: u64,
    pub failed: u64,
    pub retried: u64,
    pub timeouts: u64,
    pub alarm_counts: HashMap<AlarmCode, u64>,
    pub average_response_time: Duration,
    pub min_response_time: Option<Duration>,
    pub max_response_time: Option<Duration>,
    pub peak_throughput_per_sec: f64,
    pub error_rate: f64,
    pub recent_states: Vec<StateSample>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machines::grbl::command::CommandErrorKind;
    use crate::machines::grbl::parser::Response;

    #[test]
    fn test_record_completion_updates_counters() {
        let mut m = EngineMetrics::new(4);
        m.record_completion(&CommandResult::Ok { response: Response::Ok, elapsed: Duration::from_millis(10) });
        m.record_completion(&CommandResult::err(CommandErrorKind::Timeout, "timed out", Duration::from_millis(20)));
        let snap = m.snapshot();
        assert_eq!(snap.total_commands, 2);
        assert_eq!(snap.successful, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.timeouts, 1);
    }

    #[test]
    fn test_alarm_counts_tracked_per_code() {
        let mut m = EngineMetrics::new(4);
        m.record_completion(&CommandResult::err(CommandErrorKind::Alarm(AlarmCode::SoftLimit), "alarm", Duration::from_millis(5)));
        m.record_completion(&CommandResult::err(CommandErrorKind::Alarm(AlarmCode::SoftLimit), "alarm", Duration::from_millis(5)));
        let snap = m.snapshot();
        assert_eq!(snap.alarm_counts.get(&AlarmCode::SoftLimit), Some(&2));
    }

    #[test]
    fn test_history_ring_buffer_is_bounded() {
        let mut m = EngineMetrics::new(2);
        m.record_state_sample(MachineState::Idle);
        m.record_state_sample(MachineState::Run);
        m.record_state_sample(MachineState::Idle);
        assert_eq!(m.snapshot().recent_states.len(), 2);
    }

    #[test]
    fn test_error_rate_reflects_recent_outcomes() {
        let mut m = EngineMetrics::new(4);
        m.record_completion(&CommandResult::Ok { response: Response::Ok, elapsed: Duration::from_millis(1) });
        m.record_completion(&CommandResult::err(CommandErrorKind::Timeout, "t", Duration::from_millis(1)));
        assert_eq!(m.error_rate(), 0.5);
    }
}
