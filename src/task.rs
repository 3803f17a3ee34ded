//! The task object: state and parameters for one unit of work, plus the
//! builder methods that place it into the queues and schedule.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::TaskDenialReason;
use crate::module::Module;
use crate::scheduler::SchedulerInner;

/// Process-unique, opaque task identifier.
pub type TaskId = Uuid;

/// The async work a task performs. Called once per dispatch -- repeatedly,
/// if the task repeats -- with the task's cancellation scope and a handle
/// back to itself.
pub type TaskFn = Arc<
    dyn Fn(CancellationToken, Task) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>>
        + Send
        + Sync,
>;

struct TaskState {
    queued: bool,
    canceled: bool,
    executing: bool,
    execute_at: Option<Instant>,
    repeat: Option<Duration>,
    max_delay: Duration,
    denial: Option<TaskDenialReason>,
    /// A fresh token minted for each dispatch, cancelled by
    /// `finish_execution` once that one execution ends. Kept separate from
    /// `TaskInner::scope` -- the task's long-lived cancellation scope --
    /// because `scope` must survive across a repeating task's re-arms,
    /// while a dispatch's own "this run is done" signal must not.
    execution_done: Option<CancellationToken>,
}

pub(crate) struct TaskInner {
    id: TaskId,
    name: String,
    module: Module,
    scheduler: Weak<SchedulerInner>,
    work: Option<TaskFn>,
    scope: CancellationToken,
    state: Mutex<TaskState>,
}

/// A unit of work bound to a [`Module`].
///
/// Cheaply cloneable; every clone refers to the same underlying task.
#[derive(Clone)]
pub struct Task {
    pub(crate) inner: Arc<TaskInner>,
}

impl Task {
    pub(crate) fn new(name: impl Into<String>, module: Module, work: TaskFn) -> Task {
        let scheduler = module.inner.scheduler.clone();
        let default_max_delay = scheduler
            .upgrade()
            .map(|s| s.config.default_max_delay)
            .unwrap_or_else(|| Duration::from_secs(60));
        let scope = module.inner.ctx.child_token();

        let task = Task {
            inner: Arc::new(TaskInner {
                id: Uuid::now_v7(),
                name: name.into(),
                module,
                scheduler,
                work: Some(work),
                scope,
                state: Mutex::new(TaskState {
                    queued: false,
                    canceled: false,
                    executing: false,
                    execute_at: None,
                    repeat: None,
                    max_delay: default_max_delay,
                    denial: None,
                    execution_done: None,
                }),
            }),
        };
        tracing::debug!(task_id = %task.id(), task_name = %task.name(), module = %task.inner.module.name(), "task created");
        task
    }

    /// A pre-cancelled stub returned when task creation is misuse (absent or
    /// non-active module). Carries the reason so callers can inspect it.
    pub(crate) fn denied(name: impl Into<String>, module: Module, reason: TaskDenialReason) -> Task {
        let scope = CancellationToken::new();
        scope.cancel();
        Task {
            inner: Arc::new(TaskInner {
                id: Uuid::now_v7(),
                name: name.into(),
                scheduler: module.inner.scheduler.clone(),
                module,
                work: None,
                scope,
                state: Mutex::new(TaskState {
                    queued: false,
                    canceled: true,
                    executing: false,
                    execute_at: None,
                    repeat: None,
                    max_delay: Duration::ZERO,
                    denial: Some(reason),
                    execution_done: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn module(&self) -> &Module {
        &self.inner.module
    }

    /// The cancellation scope passed to the task function. A child of the
    /// owning module's scope: cancelled on task cancel, module stop, or
    /// natural completion.
    pub fn scope(&self) -> CancellationToken {
        self.inner.scope.clone()
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.state.lock().unwrap().canceled
    }

    pub fn is_executing(&self) -> bool {
        self.inner.state.lock().unwrap().executing
    }

    pub fn is_queued(&self) -> bool {
        self.inner.state.lock().unwrap().queued
    }

    /// Why this task is a pre-cancelled stub, if it is one.
    pub fn denial_reason(&self) -> Option<TaskDenialReason> {
        self.inner.state.lock().unwrap().denial
    }

    fn scheduler(&self) -> Option<Arc<SchedulerInner>> {
        self.inner.scheduler.upgrade()
    }

    /// Not cancelled, the owning module reports `online_soon`, and the
    /// scheduler is not closed to new submissions.
    fn is_active(&self) -> bool {
        let canceled = self.inner.state.lock().unwrap().canceled;
        if canceled || !self.inner.module.online_soon() {
            return false;
        }
        !self
            .scheduler()
            .map(|s| s.is_closed())
            .unwrap_or(false)
    }

    /// Set the maximum delay a queued task may wait before being promoted to
    /// the prioritized queue. Default is the scheduler's
    /// `default_max_delay`.
    pub fn max_delay(&self, max_delay: Duration) -> Task {
        self.inner.state.lock().unwrap().max_delay = max_delay;
        self.clone()
    }

    /// Queue the task for execution in the normal FIFO.
    pub fn queue(&self) -> Task {
        if !self.prep_for_queueing() {
            return self.clone();
        }
        tracing::debug!(task_id = %self.id(), task_name = %self.name(), module = %self.inner.module.name(), "task queued");
        if let Some(sched) = self.scheduler() {
            if sched.queues.push_normal(self.clone()) {
                sched.notify_queue_filled();
            }
        }
        self.clone()
    }

    /// Queue the task in the prioritized lane, which is always drained
    /// before the normal FIFO.
    pub fn prioritize(&self) -> Task {
        if !self.prep_for_queueing() {
            return self.clone();
        }
        tracing::debug!(task_id = %self.id(), task_name = %self.name(), module = %self.inner.module.name(), "task prioritized");
        if let Some(sched) = self.scheduler() {
            if sched.queues.push_prioritized(self.clone()) {
                sched.notify_queue_filled();
            }
        }
        self.clone()
    }

    /// Move the task to the front of the prioritized lane, ahead of
    /// everything already waiting there.
    pub fn start_asap(&self) -> Task {
        if !self.prep_for_queueing() {
            return self.clone();
        }
        tracing::debug!(task_id = %self.id(), task_name = %self.name(), module = %self.inner.module.name(), "task marked start_asap");
        if let Some(sched) = self.scheduler() {
            sched.queues.push_asap(self.clone());
            sched.notify_queue_filled();
        }
        self.clone()
    }

    /// Schedule the task for execution at `at`, without queueing it now.
    pub fn schedule(&self, at: DateTime<Utc>) -> Task {
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let deadline = Instant::now() + delay;
        self.insert_into_schedule(deadline);
        tracing::debug!(task_id = %self.id(), task_name = %self.name(), module = %self.inner.module.name(), "task scheduled");
        self.clone()
    }

    /// Re-arm the task to run repeatedly, first execution after `interval`
    /// (clamped to the scheduler's `min_repeat_duration`).
    pub fn repeat(&self, interval: Duration) -> Task {
        let min = self
            .scheduler()
            .map(|s| s.config.min_repeat_duration)
            .unwrap_or_else(|| Duration::from_secs(60));
        let interval = interval.max(min);

        self.inner.state.lock().unwrap().repeat = Some(interval);
        let deadline = Instant::now() + interval;
        self.insert_into_schedule(deadline);
        tracing::debug!(task_id = %self.id(), task_name = %self.name(), module = %self.inner.module.name(), interval = ?interval, "task set to repeat");
        self.clone()
    }

    /// Cancel the current and any future execution of this task. Not
    /// reversible.
    pub fn cancel(&self) {
        {
            let mut st = self.inner.state.lock().unwrap();
            st.canceled = true;
        }
        self.inner.scope.cancel();
        tracing::info!(task_id = %self.id(), task_name = %self.name(), "task cancelled");
        // Eagerly clear container membership rather than waiting for a
        // driver to observe the cancellation on its next pass.
        self.remove_from_containers();
    }

    fn remove_from_containers(&self) {
        if let Some(sched) = self.scheduler() {
            sched.queues.remove(self.id());
            sched.schedule.remove(self.id());
        }
    }

    fn prep_for_queueing(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        let (max_delay, need_schedule) = {
            let mut st = self.inner.state.lock().unwrap();
            st.queued = true;
            (st.max_delay, st.max_delay > Duration::ZERO)
        };
        if need_schedule {
            self.insert_into_schedule(Instant::now() + max_delay);
        }
        true
    }

    fn insert_into_schedule(&self, at: Instant) {
        if !self.is_active() {
            return;
        }
        self.inner.state.lock().unwrap().execute_at = Some(at);
        if let Some(sched) = self.scheduler() {
            sched.schedule.insert(self.clone(), at);
            sched.notify_recalculate();
        }
    }

    // -- Driver-internal hooks, not part of the public builder surface -----

    pub(crate) fn repeat_interval(&self) -> Option<Duration> {
        self.inner.state.lock().unwrap().repeat
    }

    pub(crate) fn work(&self) -> Option<TaskFn> {
        self.inner.work.clone()
    }

    /// Attempt to transition into the executing state. Returns `false` (and
    /// eagerly cleans up containers) if the task is already executing, is no
    /// longer active, or its scope is already cancelled -- the caller must
    /// not proceed to dispatch in that case.
    pub(crate) fn try_begin_executing(&self) -> bool {
        let mut st = self.inner.state.lock().unwrap();
        if st.executing {
            return false;
        }
        if st.canceled || !self.inner.module.online_soon() || self.inner.scope.is_cancelled() {
            drop(st);
            self.remove_from_containers();
            return false;
        }
        st.executing = true;
        st.execution_done = Some(CancellationToken::new());
        true
    }

    /// The token for the dispatch currently in flight, watched by the
    /// companion waiter to learn when this one execution has ended. Distinct
    /// from `scope` -- the task's long-lived cancellation scope passed to the
    /// task function -- so that signalling "this run is over" never
    /// permanently cancels a repeating task's ability to run again.
    pub(crate) fn execution_done(&self) -> CancellationToken {
        self.inner
            .state
            .lock()
            .unwrap()
            .execution_done
            .clone()
            .unwrap_or_else(CancellationToken::new)
    }

    /// Called once the task body (success, error, or panic) has finished.
    /// Clears `executing`/`queued` and re-arms into the schedule if the task
    /// repeats and is still active, then signals the dispatch's completion
    /// token -- never the task's own long-lived `scope`, which must survive
    /// across repeats and is only ever cancelled by `Task::cancel` or the
    /// owning module's shutdown cascade.
    pub(crate) fn finish_execution(&self) {
        let (repeat, still_active, done) = {
            let mut st = self.inner.state.lock().unwrap();
            st.executing = false;
            st.queued = false;
            (st.repeat, !st.canceled, st.execution_done.take())
        };

        if still_active && self.inner.module.online_soon() {
            if let Some(interval) = repeat {
                self.insert_into_schedule(Instant::now() + interval);
            }
        }

        if let Some(done) = done {
            done.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn noop_work() -> TaskFn {
        Arc::new(|_, _| Box::pin(async { Ok(()) }))
    }

    fn active_module() -> Module {
        let module = Module::new("test", Weak::new());
        module.force_online_for_test();
        module
    }

    #[test]
    fn cancel_is_monotonic_and_eager() {
        let task = Task::new("t", active_module(), noop_work());
        assert!(!task.is_canceled());
        task.cancel();
        assert!(task.is_canceled());
        assert!(task.scope().is_cancelled());
    }

    #[tokio::test]
    async fn denied_stub_is_precancelled_with_reason() {
        // A freshly created module is `Starting`, which is `online_soon` --
        // the only way to get a module that denies new tasks is to run it
        // through its lifecycle to `Stopped`.
        let module = Module::new("stopped", Weak::new());
        module.stop().await;
        let task = module.new_task("x", noop_work());
        assert!(task.is_canceled());
        assert_eq!(
            task.denial_reason(),
            Some(TaskDenialReason::ModuleNotActive)
        );
    }

    #[test]
    fn redundant_dispatch_on_executing_task_is_a_noop() {
        let task = Task::new("t", active_module(), noop_work());
        assert!(task.try_begin_executing());
        assert!(!task.try_begin_executing());
    }

    #[tokio::test]
    async fn finish_execution_signals_completion_without_cancelling_the_persistent_scope() {
        let task = Task::new("t", active_module(), noop_work());
        task.try_begin_executing();
        let completion = task.execution_done();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let waiter = completion.clone();
        tokio::spawn(async move {
            waiter.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });

        task.finish_execution();
        tokio::task::yield_now().await;
        assert!(done.load(Ordering::SeqCst));
        assert!(!task.is_executing());
        assert!(!task.is_queued());
        assert!(
            !task.scope().is_cancelled(),
            "the persistent scope must survive so a repeat can dispatch again"
        );

        // This is exactly the bug this test guards against: a scope that got
        // permanently cancelled on the first completion would make every
        // later dispatch attempt bail out here.
        assert!(task.try_begin_executing());
    }
}
