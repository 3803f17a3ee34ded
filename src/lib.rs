//! Module task scheduler.
//!
//! Coordinates work within a set of long-lived [`Module`]s: queued execution
//! with two priority classes and bounded concurrency, time-based scheduling
//! of deferred and periodically repeating tasks, and lifecycle gating --
//! tasks are admitted, delayed, or cancelled based on the state of the
//! owning module.
//!
//! - **[`task`]** -- the task object: state, parameters, and the builder
//!   methods (`queue`, `prioritize`, `start_asap`, `schedule`, `repeat`,
//!   `cancel`) that place a task into the queues and schedule.
//! - **[`queue`]** -- the normal FIFO and prioritized double-ended queues,
//!   guarded by a single mutex.
//! - **[`schedule`]** -- the time-ordered schedule of tasks awaiting their
//!   trigger instant.
//! - **[`driver`]** -- the queue driver and schedule driver: the two
//!   long-running workers that turn the data structures above into actual
//!   execution.
//! - **[`module`]** -- the lifecycle shell a task is bound to: online/stop
//!   predicates, a cancellation scope, a panic-reporting sink, and the
//!   counters the scheduler watches.
//! - **[`scheduler`]** -- owns the queues, schedule, and driver tasks; the
//!   entry point for creating modules and starting/stopping the scheduler.
//! - **[`error`]** -- the error taxonomy: misuse, task failures, and panics.
//! - **[`config`]** -- construction-time tunables (pacing ceilings, minimum
//!   repeat interval, default max delay).
//!
//! A full module *registry* -- dependency resolution between modules,
//! configuration loading, automatic restart -- is out of scope; this crate
//! takes for granted that each [`Module`] exposes the lifecycle contract
//! above and nothing more. See each module's docs for the concurrency and
//! lock-ordering rules that keep the queues, schedule, and per-task state
//! consistent under concurrent producer/consumer access.

pub mod config;
pub mod error;
pub mod module;
pub mod scheduler;
pub mod task;

mod driver;
mod queue;
mod schedule;
mod waitgroup;

pub use config::SchedulerConfig;
pub use error::{PanicError, Result, SchedulerError, TaskDenialReason, TaskFailure};
pub use module::Module;
pub use scheduler::Scheduler;
pub use task::{Task, TaskFn, TaskId};
pub use waitgroup::WaitGroup;
