//! The normal FIFO and prioritized double-ended queues.
//!
//! Both are guarded by a single mutex, matching the spec's requirement that
//! queue draining order (prioritized before normal, FIFO within each) is
//! decided under one consistent view. Membership is tracked by a
//! generation-stamped map keyed by task identity rather than an intrusive
//! list pointer: inserting bumps a per-task generation and pushes a
//! `(generation, Task)` entry; removing (including the "move to front" used
//! by `start_asap`) is a pure map update, and a popped entry whose stored
//! generation no longer matches the current one is a stale tombstone that
//! gets silently discarded rather than executed. This keeps cancellation --
//! the hot path -- at O(1) instead of a scan over queue contents.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::task::{Task, TaskId};

struct Lane {
    entries: VecDeque<(u64, Task)>,
    generation: HashMap<TaskId, u64>,
    next_gen: u64,
}

impl Lane {
    fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            generation: HashMap::new(),
            next_gen: 0,
        }
    }

    fn contains(&self, id: TaskId) -> bool {
        self.generation.contains_key(&id)
    }

    fn push_back_if_absent(&mut self, task: Task) -> bool {
        if self.contains(task.id()) {
            return false;
        }
        self.next_gen += 1;
        let gen_ = self.next_gen;
        self.generation.insert(task.id(), gen_);
        self.entries.push_back((gen_, task));
        true
    }

    /// Push to front. If already present, the existing entry is invalidated
    /// (it will be skipped as a stale tombstone when it is eventually
    /// popped) and a fresh entry is placed at the front.
    fn push_front(&mut self, task: Task) {
        self.next_gen += 1;
        let gen_ = self.next_gen;
        self.generation.insert(task.id(), gen_);
        self.entries.push_front((gen_, task));
    }

    fn pop_front(&mut self) -> Option<Task> {
        while let Some((gen_, task)) = self.entries.pop_front() {
            if self.generation.get(&task.id()) == Some(&gen_) {
                self.generation.remove(&task.id());
                return Some(task);
            }
            // Stale tombstone from a prior push/move -- drop and keep looking.
        }
        None
    }

    fn remove(&mut self, id: TaskId) {
        self.generation.remove(&id);
    }

    fn is_empty(&self) -> bool {
        self.generation.is_empty()
    }
}

pub(crate) struct Queues {
    inner: Mutex<QueuesInner>,
}

struct QueuesInner {
    normal: Lane,
    prioritized: Lane,
}

impl Queues {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(QueuesInner {
                normal: Lane::new(),
                prioritized: Lane::new(),
            }),
        }
    }

    /// Push to the back of the normal FIFO. No-op if already queued there.
    pub(crate) fn push_normal(&self, task: Task) -> bool {
        self.inner.lock().unwrap().normal.push_back_if_absent(task)
    }

    /// Push to the back of the prioritized queue. No-op if already there.
    pub(crate) fn push_prioritized(&self, task: Task) -> bool {
        self.inner
            .lock()
            .unwrap()
            .prioritized
            .push_back_if_absent(task)
    }

    /// Push to the front of the prioritized queue, moving an existing entry
    /// if the task is already present.
    pub(crate) fn push_asap(&self, task: Task) {
        self.inner.lock().unwrap().prioritized.push_front(task);
    }

    /// Pop the next task to run: prioritized queue wins, then normal FIFO.
    pub(crate) fn pop_next(&self) -> Option<Task> {
        let mut g = self.inner.lock().unwrap();
        g.prioritized.pop_front().or_else(|| g.normal.pop_front())
    }

    /// Eagerly drop a task's membership from both lanes (used on cancel and
    /// on dispatch of an inactive task). Any already-stored deque entries
    /// become stale tombstones that are discarded on their next pop.
    pub(crate) fn remove(&self, id: TaskId) {
        let mut g = self.inner.lock().unwrap();
        g.normal.remove(id);
        g.prioritized.remove(id);
    }

    pub(crate) fn is_empty(&self) -> bool {
        let g = self.inner.lock().unwrap();
        g.normal.is_empty() && g.prioritized.is_empty()
    }
}
