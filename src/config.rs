//! Construction-time tunables.
//!
//! There is no live, hot-reloadable configuration registry in scope here --
//! that belongs to a module-registry layer this crate does not own. What the
//! scheduler needs is a plain value carrying the handful of durations that
//! shape pacing and promotion, handed to [`crate::Scheduler::new`] once.

use std::time::Duration;

/// Tunable durations governing pacing, promotion, and dispatch ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Ceiling on how long dispatch waits for a timeslot rendezvous before
    /// proceeding anyway.
    pub max_timeslot_wait: Duration,
    /// Floor clamp applied to every `repeat` interval.
    pub min_repeat_duration: Duration,
    /// Ceiling on how long the inflight dispatch ticket is held before being
    /// released regardless of whether the task body has finished.
    pub max_execution_wait: Duration,
    /// Default `maxDelay` applied to a task that has not called `max_delay`.
    pub default_max_delay: Duration,
}

impl SchedulerConfig {
    pub const fn new() -> Self {
        Self {
            max_timeslot_wait: Duration::from_secs(30),
            min_repeat_duration: Duration::from_secs(60),
            max_execution_wait: Duration::from_secs(60),
            default_max_delay: Duration::from_secs(60),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
