//! The two long-running drivers: the queue driver that dequeues and
//! executes tasks, and the schedule driver that watches the clock and
//! promotes ready tasks into the prioritized queue.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::time::Instant;

use crate::error::TaskFailure;
use crate::scheduler::SchedulerInner;
use crate::task::Task;

/// Queue driver: wakes on `queueIsFilled`, drains both lanes (prioritized
/// before normal), dispatching one task at a time while letting dispatched
/// tasks keep running in the background.
pub(crate) async fn queue_driver(inner: Arc<SchedulerInner>) {
    tracing::info!("queue driver started");
    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            _ = inner.queue_filled.notified() => {}
        }

        loop {
            inner.queue_inflight.wait().await;

            if inner.shutdown.is_cancelled() {
                tracing::info!("queue driver stopped");
                return;
            }

            let Some(task) = inner.queues.pop_next() else {
                break;
            };

            dispatch(Arc::clone(&inner), task).await;
        }
    }
    tracing::info!("queue driver stopped");
}

/// Schedule driver: wakes on the earliest deadline, `recalculate`, or
/// shutdown. Promotes the front task into the prioritized queue (or runs it
/// directly if `maxDelay` already queued it).
pub(crate) async fn schedule_driver(inner: Arc<SchedulerInner>) {
    tracing::info!("schedule driver started");
    loop {
        let wait = match inner.schedule.next_deadline() {
            Some(deadline) => tokio::time::sleep_until(deadline).left_future(),
            None => std::future::pending::<()>().right_future(),
        };

        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            _ = inner.recalculate.notified() => continue,
            _ = wait => {}
        }

        let Some(task) = inner.schedule.front() else {
            continue;
        };
        // Re-check the deadline: a concurrent insert may have changed the
        // front entry out from under the timer that just fired.
        if let Some(deadline) = inner.schedule.next_deadline() {
            if deadline > Instant::now() {
                continue;
            }
        }
        inner.schedule.pop_front();

        if task.is_queued() {
            // maxDelay already placed it in a queue; run it directly.
            dispatch(Arc::clone(&inner), task).await;
        } else {
            task.start_asap();
        }
    }
    tracing::info!("schedule driver stopped");
}

/// Dispatch a task popped from a queue or promoted directly by the schedule
/// driver: pace it against the timeslot rendezvous, wait for the module to
/// finish starting if needed, then launch the task body and its companion
/// inflight-ticket waiter.
async fn dispatch(inner: Arc<SchedulerInner>, task: Task) {
    if !task.try_begin_executing() {
        return;
    }
    tracing::info!(task_id = %task.id(), task_name = %task.name(), module = %task.module().name(), "dispatch started");

    tokio::select! {
        biased;
        _ = inner.timeslot.notified() => {}
        _ = tokio::time::sleep(inner.config.max_timeslot_wait) => {
            tracing::warn!(task_id = %task.id(), "timeslot wait ceiling reached");
        }
    }

    let module = task.module().clone();
    if !module.online() {
        if module.online_soon() {
            module.start_completed().await;
        } else {
            task.finish_execution();
            return;
        }
    }

    inner.queue_inflight.add(1);

    let body_task = task.clone();
    tokio::spawn(async move {
        execute_task_body(body_task).await;
    });

    // A fresh per-dispatch token, not the task's long-lived `scope` --
    // `scope` must outlive this one execution so a repeating task can
    // dispatch again.
    let completion = task.execution_done();
    let max_execution_wait = inner.config.max_execution_wait;
    let ticket = inner.queue_inflight.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = completion.cancelled() => {}
            _ = tokio::time::sleep(max_execution_wait) => {
                tracing::warn!(task_id = %task.id(), "max execution wait reached, releasing inflight ticket early");
            }
        }
        ticket.done();
    });
}

/// Run the task body with panic protection, module accounting, and the
/// completion cleanup described in the task state machine.
async fn execute_task_body(task: Task) {
    let module = task.module().clone();
    module.task_started();

    let Some(work) = task.work() else {
        module.task_finished();
        task.finish_execution();
        return;
    };

    let fut = work(task.scope(), task.clone());
    let result = AssertUnwindSafe(fut).catch_unwind().await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            let failure = TaskFailure::Error(err);
            tracing::error!(
                module = %module.name(),
                task_name = %task.name(),
                error = %failure,
                "task failed"
            );
        }
        Err(panic_payload) => {
            let message = panic_message(&panic_payload);
            let panic = module.new_panic_error(task.name(), message);
            let failure = TaskFailure::Panic(panic.clone());
            tracing::error!(
                module = %module.name(),
                task_name = %task.name(),
                error = %failure,
                "task panicked"
            );
            module.report_panic(panic);
        }
    }

    module.task_finished();
    task.finish_execution();
    tracing::info!(task_id = %task.id(), task_name = %task.name(), "dispatch finished");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
