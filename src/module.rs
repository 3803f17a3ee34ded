//! Module lifecycle shell.
//!
//! A full module registry -- the thing that would resolve dependencies
//! between modules, load their configuration, and restart them on failure --
//! is out of scope for this crate (see the crate-level docs). What tasks
//! actually need from "their module" is narrower: a lifecycle state to gate
//! admission, a cancellation scope to cascade shutdown, a panic-reporting
//! sink, and a couple of counters. [`Module`] provides exactly that, and
//! nothing more.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::error::PanicError;
use crate::scheduler::SchedulerInner;
use crate::task::{Task, TaskFn};
use crate::waitgroup::WaitGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Offline = 0,
    Starting = 1,
    Online = 2,
    Stopping = 3,
    Stopped = 4,
}

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Offline,
            1 => Self::Starting,
            2 => Self::Online,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// A lifecycle-managed subsystem that owns tasks.
///
/// Cheaply cloneable; every clone refers to the same underlying lifecycle
/// state.
#[derive(Clone)]
pub struct Module {
    pub(crate) inner: Arc<ModuleInner>,
}

pub(crate) struct ModuleInner {
    pub(crate) name: String,
    state: AtomicU8,
    pub(crate) ctx: CancellationToken,
    start_tx: watch::Sender<bool>,
    start_rx: watch::Receiver<bool>,
    task_count: AtomicI64,
    pub(crate) wait_group: WaitGroup,
    panics: broadcast::Sender<Arc<PanicError>>,
    pub(crate) scheduler: Weak<SchedulerInner>,
}

impl Module {
    pub(crate) fn new(name: impl Into<String>, scheduler: Weak<SchedulerInner>) -> Self {
        let (start_tx, start_rx) = watch::channel(false);
        let (panics, _) = broadcast::channel(32);
        let name = name.into();
        tracing::debug!(module = %name, "module created");
        Self {
            inner: Arc::new(ModuleInner {
                name,
                state: AtomicU8::new(State::Starting as u8),
                ctx: CancellationToken::new(),
                start_tx,
                start_rx,
                task_count: AtomicI64::new(0),
                wait_group: WaitGroup::new(),
                panics,
                scheduler,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn state(&self) -> State {
        State::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// The module has started, or is in the process of starting.
    pub fn online_soon(&self) -> bool {
        matches!(self.state(), State::Starting | State::Online)
    }

    /// The module has fully completed startup.
    pub fn online(&self) -> bool {
        self.state() == State::Online
    }

    /// The module's cancellation scope. Cancelled on [`Module::stop`]; every
    /// task scope is a child of this token.
    pub fn ctx(&self) -> CancellationToken {
        self.inner.ctx.clone()
    }

    /// Resolves once startup has completed. If startup already completed
    /// before this call, resolves immediately.
    pub async fn start_completed(&self) {
        let mut rx = self.inner.start_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Mark the module as fully started. Wakes every pending
    /// [`Module::start_completed`] waiter.
    pub fn mark_online(&self) {
        self.inner
            .state
            .store(State::Online as u8, Ordering::Release);
        let _ = self.inner.start_tx.send(true);
        tracing::info!(module = %self.inner.name, "module online");
    }

    /// Cascade-cancel every task scope derived from this module and wait for
    /// outstanding task bodies to finish.
    pub async fn stop(&self) {
        self.inner
            .state
            .store(State::Stopping as u8, Ordering::Release);
        self.inner.ctx.cancel();
        tracing::info!(module = %self.inner.name, "module stopping");
        self.inner.wait_group.wait().await;
        self.inner
            .state
            .store(State::Stopped as u8, Ordering::Release);
        tracing::info!(module = %self.inner.name, "module stopped");
    }

    /// Number of task bodies currently executing for this module.
    pub fn task_count(&self) -> i64 {
        self.inner.task_count.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn force_online_for_test(&self) {
        self.inner
            .state
            .store(State::Online as u8, Ordering::Release);
        let _ = self.inner.start_tx.send(true);
    }

    pub(crate) fn task_started(&self) {
        self.inner.task_count.fetch_add(1, Ordering::AcqRel);
        self.inner.wait_group.add(1);
    }

    pub(crate) fn task_finished(&self) {
        self.inner.task_count.fetch_add(-1, Ordering::AcqRel);
        self.inner.wait_group.done();
    }

    /// Build a structured panic record for `task_name`. Does not publish it;
    /// call [`Module::report_panic`] to log and broadcast it.
    pub fn new_panic_error(&self, task_name: impl Into<String>, payload: String) -> PanicError {
        PanicError::new(task_name, "task", payload)
    }

    /// Log a panic at error severity and broadcast it to any subscriber
    /// watching this module's error channel.
    pub fn report_panic(&self, panic: PanicError) {
        panic.report();
        let _ = self.inner.panics.send(Arc::new(panic));
    }

    /// Subscribe to this module's panic-report channel.
    pub fn subscribe_panics(&self) -> broadcast::Receiver<Arc<PanicError>> {
        self.inner.panics.subscribe()
    }

    /// Create a new task bound to this module. You must call one of `queue`,
    /// `prioritize`, `start_asap`, `schedule`, or `repeat` to have it
    /// executed.
    ///
    /// If this module is not online or about to come online, the returned
    /// task is a pre-cancelled stub: the condition is logged and the task
    /// carries a [`crate::error::TaskDenialReason`], but no error is
    /// returned to the caller.
    pub fn new_task(&self, name: impl Into<String>, work: TaskFn) -> Task {
        let name = name.into();

        if !self.online_soon() {
            tracing::error!(
                module = %self.inner.name,
                task_name = %name,
                "tasks should only be created when the module is online or starting"
            );
            return Task::denied(
                name,
                self.clone(),
                crate::error::TaskDenialReason::ModuleNotActive,
            );
        }

        Task::new(name, self.clone(), work)
    }
}
