//! Error taxonomy for the scheduler.
//!
//! Mirrors the rest of this codebase's convention of one [`thiserror`] enum
//! per crate rather than ad hoc string errors. Most scheduling failures never
//! reach this type at all -- misuse at task creation yields a pre-cancelled
//! stub [`crate::task::Task`] instead of an `Err`, and task-function errors
//! or panics are reported through the owning module rather than propagated.
//! [`SchedulerError`] is reserved for the handful of operations where a
//! direct caller is owed a real `Result`.

use std::fmt;

/// Errors surfaced directly to callers of the scheduler API.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The scheduler has already been shut down and will not accept new work.
    #[error("scheduler is shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Why [`crate::Module::new_task`] returned a pre-cancelled stub instead of a
/// live task. Logged at creation time and retrievable from the stub task for
/// callers that want to know why their task never runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDenialReason {
    /// The module exists but is not online and not about to come online.
    ModuleNotActive,
}

impl fmt::Display for TaskDenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModuleNotActive => {
                write!(f, "tasks should only be created when the module is online or starting")
            }
        }
    }
}

/// The outcome of a single task-function invocation that does not flow back
/// to the caller -- reported through the owning module instead.
#[derive(Debug, Clone)]
pub enum TaskFailure {
    /// The task function returned an error.
    Error(String),
    /// The task function panicked. Scheduling-wise this is treated the same
    /// as [`TaskFailure::Error`]; the difference is surfaced only in the
    /// structured report and the stack trace attached to it.
    Panic(PanicError),
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(msg) => write!(f, "{msg}"),
            Self::Panic(panic) => write!(f, "panicked: {}", panic.payload),
        }
    }
}

/// A captured task panic, ready to be reported through the owning module.
#[derive(Debug, Clone)]
pub struct PanicError {
    pub task_name: String,
    pub kind: &'static str,
    pub payload: String,
    pub stack_trace: String,
}

impl PanicError {
    pub fn new(task_name: impl Into<String>, kind: &'static str, payload: String) -> Self {
        Self {
            task_name: task_name.into(),
            kind,
            payload,
            stack_trace: std::backtrace::Backtrace::force_capture().to_string(),
        }
    }

    /// Log the panic at error severity with its stack trace attached.
    pub fn report(&self) {
        tracing::error!(
            task_name = %self.task_name,
            kind = %self.kind,
            payload = %self.payload,
            stack_trace = %self.stack_trace,
            "task panicked"
        );
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} panicked: {}", self.kind, self.task_name, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_failure_display_distinguishes_error_from_panic() {
        let error = TaskFailure::Error("boom".to_string());
        let panic = TaskFailure::Panic(PanicError::new("t", "panic", "oops".to_string()));
        assert_eq!(error.to_string(), "boom");
        assert!(panic.to_string().contains("panicked: oops"));
        assert_ne!(error.to_string(), panic.to_string());
    }

    #[test]
    fn module_not_active_display_is_stable() {
        assert_eq!(
            TaskDenialReason::ModuleNotActive.to_string(),
            "tasks should only be created when the module is online or starting"
        );
    }
}
