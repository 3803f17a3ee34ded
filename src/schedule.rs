//! The time-ordered schedule of tasks awaiting their trigger instant.
//!
//! Ordered by ascending `executeAt`, ties broken by insertion sequence
//! (first-in serves first). Unlike the queues, membership here is resolved
//! entirely by task identity rather than by deque position: a reverse index
//! from [`TaskId`] to its current `(deadline, sequence)` key lets
//! insert/reinsert/remove operate in `O(log n)` on the ordered map without
//! ever scanning the schedule to find a task's current position.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use tokio::time::Instant;

use crate::task::{Task, TaskId};

type Key = (Instant, u64);

pub(crate) struct Schedule {
    inner: Mutex<Inner>,
}

struct Inner {
    by_time: BTreeMap<Key, Task>,
    by_task: HashMap<TaskId, Key>,
    next_seq: u64,
}

impl Schedule {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                by_time: BTreeMap::new(),
                by_task: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Insert a task at `at`, or move it there if it is already scheduled.
    pub(crate) fn insert(&self, task: Task, at: Instant) {
        let mut g = self.inner.lock().unwrap();
        if let Some(old_key) = g.by_task.remove(&task.id()) {
            g.by_time.remove(&old_key);
        }
        g.next_seq += 1;
        let key = (at, g.next_seq);
        g.by_task.insert(task.id(), key);
        g.by_time.insert(key, task);
    }

    /// Remove a task from the schedule if present. Used for eager cleanup on
    /// cancel and on dispatch of a task found to be inactive.
    pub(crate) fn remove(&self, id: TaskId) {
        let mut g = self.inner.lock().unwrap();
        if let Some(key) = g.by_task.remove(&id) {
            g.by_time.remove(&key);
        }
    }

    /// Peek the earliest-deadline task without removing it.
    pub(crate) fn front(&self) -> Option<Task> {
        self.inner.lock().unwrap().by_time.values().next().cloned()
    }

    /// Remove and return the earliest-deadline task.
    pub(crate) fn pop_front(&self) -> Option<Task> {
        let mut g = self.inner.lock().unwrap();
        let key = *g.by_time.keys().next()?;
        let task = g.by_time.remove(&key).expect("key just read from map");
        g.by_task.remove(&task.id());
        Some(task)
    }

    /// Deadline of the earliest-scheduled task, if any.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.inner
            .lock()
            .unwrap()
            .by_time
            .keys()
            .next()
            .map(|(at, _)| *at)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().by_time.is_empty()
    }
}
