//! The scheduler: owns the queues, the schedule, and the two driver tasks,
//! and is the entry point for creating the modules that own tasks.
//!
//! Encapsulated in a value created explicitly by [`Scheduler::new`] rather
//! than a static singleton, so tests can run many independent schedulers
//! concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::driver;
use crate::error::{Result, SchedulerError};
use crate::module::Module;
use crate::queue::Queues;
use crate::schedule::Schedule;
use crate::waitgroup::WaitGroup;

pub(crate) struct SchedulerInner {
    pub(crate) queues: Queues,
    pub(crate) schedule: Schedule,
    pub(crate) config: SchedulerConfig,

    pub(crate) queue_filled: Notify,
    pub(crate) recalculate: Notify,
    pub(crate) timeslot: Notify,
    pub(crate) queue_inflight: WaitGroup,
    pub(crate) shutdown: CancellationToken,
    closed: AtomicBool,

    queue_driver_started: AtomicBool,
    schedule_driver_started: AtomicBool,
    handles: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl SchedulerInner {
    pub(crate) fn notify_queue_filled(&self) {
        tracing::trace!("queue filled notification sent");
        self.queue_filled.notify_one();
    }

    pub(crate) fn notify_recalculate(&self) {
        tracing::trace!("schedule recalculate notification sent");
        self.recalculate.notify_one();
    }

    /// Closed to new submissions via [`Scheduler::close`]. Checked by every
    /// task builder method before it inserts into a queue or the schedule.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Coordinates queued execution, time-based scheduling, and lifecycle-gated
/// dispatch for a set of [`Module`]s.
///
/// Cheaply cloneable; every clone shares the same queues, schedule, and
/// driver state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a new scheduler with default tunables. Call [`Scheduler::start`]
    /// to launch the queue and schedule drivers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a new scheduler with custom tunables.
    #[must_use]
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                queues: Queues::new(),
                schedule: Schedule::new(),
                config,
                queue_filled: Notify::new(),
                recalculate: Notify::new(),
                timeslot: Notify::new(),
                queue_inflight: WaitGroup::new(),
                shutdown: CancellationToken::new(),
                closed: AtomicBool::new(false),
                queue_driver_started: AtomicBool::new(false),
                schedule_driver_started: AtomicBool::new(false),
                handles: Mutex::new(None),
            }),
        }
    }

    /// Create a new module bound to this scheduler. The module starts in the
    /// `Starting` state -- `online_soon` is true immediately, `online` only
    /// after [`Module::mark_online`].
    #[must_use]
    pub fn module(&self, name: impl Into<String>) -> Module {
        Module::new(name, Arc::downgrade(&self.inner))
    }

    /// Launch the queue and schedule drivers. Idempotent: a second call is a
    /// no-op.
    pub fn start(&self) {
        if self
            .inner
            .queue_driver_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let inner = Arc::clone(&self.inner);
            let queue_handle = tokio::spawn(driver::queue_driver(inner));

            if self
                .inner
                .schedule_driver_started
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let inner = Arc::clone(&self.inner);
                let schedule_handle = tokio::spawn(driver::schedule_driver(inner));
                *self.inner.handles.lock().unwrap() = Some((queue_handle, schedule_handle));
            }
        }
    }

    /// Hand control to the task driver for one pacing slot. Called by an
    /// external pacing source; dispatch waits for this (or a ceiling
    /// timeout) before running a task body.
    pub fn signal_timeslot(&self) {
        self.inner.timeslot.notify_one();
    }

    /// Reject further submissions against this handle: every task builder
    /// method (`queue`, `prioritize`, `start_asap`, `schedule`, `repeat`)
    /// becomes a no-op from this point on. Does not itself stop the drivers
    /// -- pair with [`Scheduler::shutdown`] to also tear them down. Returns
    /// an error if this handle was already closed.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::Shutdown);
        }
        tracing::info!("scheduler closed to new submissions");
        Ok(())
    }

    /// Signal both drivers to stop and wait for them to exit. After this
    /// returns, no task function is executing and no dispatch is pending.
    pub async fn shutdown(&self) {
        tracing::info!("scheduler shutdown requested");
        self.inner.shutdown.cancel();
        // Wake both drivers in case they are parked on a notify rather than
        // the shutdown token directly.
        self.inner.queue_filled.notify_waiters();
        self.inner.recalculate.notify_waiters();

        let handles = self.inner.handles.lock().unwrap().take();
        if let Some((queue_handle, schedule_handle)) = handles {
            let _ = queue_handle.await;
            let _ = schedule_handle.await;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
