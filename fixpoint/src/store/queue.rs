use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::{AnalysisFn, Continuation, Entity, EpKey, PropertyKind};

/// A unit of work drained by the scheduler.
pub(crate) enum Task {
    /// An initial analysis invocation (eager scheduling or an incremental
    /// follow-on).
    Analysis { analysis: AnalysisFn, entity: Entity },
    /// A lazy computation, scheduled on the first query of its cell.
    Lazy {
        analysis: AnalysisFn,
        entity: Entity,
        kind: PropertyKind,
    },
    /// A triggered computation, fired on the first observed property of its
    /// kind for the entity.
    Triggered {
        analysis: AnalysisFn,
        entity: Entity,
        kind: PropertyKind,
    },
    /// An on-update continuation. The continuation was taken from the
    /// depender's cell when the notification was dispatched; the dependee's
    /// state is re-read when the task runs.
    Continuation {
        depender: EpKey,
        dependee: EpKey,
        continuation: Continuation,
    },
}

#[derive(Default)]
struct QueueInner {
    /// The main queue. Drained LIFO: `push` appends and `next_task` pops from
    /// the back, `push_last` prepends.
    ready: VecDeque<Task>,
    /// Final-update notifications parked until the main queue drains.
    delayed_final: VecDeque<Task>,
    /// Non-final-update notifications parked until the main queue drains.
    delayed_non_final: VecDeque<Task>,
    /// Batched depender notifications, released as a block once the main
    /// queue drains.
    deferred: Vec<Task>,
    /// Tasks currently executing on workers (parallel mode only).
    in_flight: usize,
    suspended: bool,
    aborted: bool,
}

impl QueueInner {
    fn next_task(&mut self) -> Option<Task> {
        loop {
            if let Some(task) = self.ready.pop_back() {
                return Some(task);
            }
            if !self.deferred.is_empty() {
                self.ready.extend(self.deferred.drain(..));
                continue;
            }
            // Non-final notifications first: they may still tighten bounds
            // before the final wave lands.
            if let Some(task) = self.delayed_non_final.pop_front() {
                return Some(task);
            }
            if let Some(task) = self.delayed_final.pop_front() {
                return Some(task);
            }
            return None;
        }
    }

    fn has_work(&self) -> bool {
        !(self.ready.is_empty()
            && self.deferred.is_empty()
            && self.delayed_final.is_empty()
            && self.delayed_non_final.is_empty())
    }
}

/// The scheduler's work queue: a LIFO main lane with parking lanes for the
/// configured notification delays, plus the quiescence latch used by the
/// parallel drain.
#[derive(Default)]
pub(crate) struct TaskQueue {
    inner: Mutex<QueueInner>,
    cond: Condvar,
}

impl TaskQueue {
    /// Enqueue at the head of the LIFO lane.
    pub fn push(&self, task: Task) {
        let mut inner = self.inner.lock();
        inner.ready.push_back(task);
        self.cond.notify_one();
    }

    /// Enqueue behind all currently queued work.
    pub fn push_last(&self, task: Task) {
        let mut inner = self.inner.lock();
        inner.ready.push_front(task);
        self.cond.notify_one();
    }

    pub fn push_delayed_final(&self, task: Task) {
        self.inner.lock().delayed_final.push_back(task);
    }

    pub fn push_delayed_non_final(&self, task: Task) {
        self.inner.lock().delayed_non_final.push_back(task);
    }

    pub fn push_deferred(&self, task: Task) {
        self.inner.lock().deferred.push(task);
    }

    /// Non-blocking pop for the sequential drain.
    pub fn pop(&self) -> Option<Task> {
        let mut inner = self.inner.lock();
        if inner.suspended || inner.aborted {
            return None;
        }
        inner.next_task()
    }

    /// Blocking pop for parallel workers.
    ///
    /// Returns `None` once the store is quiescent (no queued work and no task
    /// in flight anywhere), suspended, or aborted. Each returned task must be
    /// paired with a [Self::completion_guard].
    pub fn pop_blocking(&self) -> Option<Task> {
        let mut inner = self.inner.lock();
        loop {
            if inner.suspended || inner.aborted {
                return None;
            }
            if let Some(task) = inner.next_task() {
                inner.in_flight += 1;
                return Some(task);
            }
            if inner.in_flight == 0 {
                // Quiescent; wake every other waiting worker so they can exit.
                self.cond.notify_all();
                return None;
            }
            self.cond.wait(&mut inner);
        }
    }

    fn task_done(&self) {
        let mut inner = self.inner.lock();
        inner.in_flight -= 1;
        if inner.in_flight == 0 && !inner.has_work() {
            self.cond.notify_all();
        }
    }

    /// Pair each [Self::pop_blocking] task with one of these; the in-flight
    /// count is released on drop, so a panicking task cannot wedge the
    /// quiescence latch.
    pub fn completion_guard(&self) -> TaskCompletion<'_> {
        TaskCompletion(self)
    }

    pub fn set_suspended(&self, yes: bool) {
        let mut inner = self.inner.lock();
        inner.suspended = yes;
        if yes {
            self.cond.notify_all();
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.lock().suspended
    }

    /// Stop draining after a fatal error; queued work is preserved for
    /// inspection but never run.
    pub fn abort(&self) {
        let mut inner = self.inner.lock();
        inner.aborted = true;
        self.cond.notify_all();
    }

    /// Re-arm the queue at the start of a completion wait.
    pub fn clear_abort(&self) {
        self.inner.lock().aborted = false;
    }

    pub fn is_empty(&self) -> bool {
        !self.inner.lock().has_work()
    }
}

pub(crate) struct TaskCompletion<'a>(&'a TaskQueue);

impl Drop for TaskCompletion<'_> {
    fn drop(&mut self) {
        self.0.task_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_fn;

    fn task(tag: u32) -> Task {
        Task::Analysis {
            analysis: analysis_fn(|_, _| Ok(crate::ComputationResult::NoResult)),
            entity: Entity::new(tag),
        }
    }

    fn tag_of(task: &Task) -> u32 {
        match task {
            Task::Analysis { entity, .. } => *entity.downcast_ref::<u32>().unwrap(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn main_lane_is_lifo() {
        let queue = TaskQueue::default();
        queue.push(task(1));
        queue.push(task(2));
        queue.push_last(task(0));
        assert_eq!(tag_of(&queue.pop().unwrap()), 2);
        assert_eq!(tag_of(&queue.pop().unwrap()), 1);
        assert_eq!(tag_of(&queue.pop().unwrap()), 0);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn delayed_lanes_drain_after_main() {
        let queue = TaskQueue::default();
        queue.push_delayed_final(task(10));
        queue.push_delayed_non_final(task(20));
        queue.push(task(1));
        assert_eq!(tag_of(&queue.pop().unwrap()), 1);
        // Non-final notifications are released before final ones.
        assert_eq!(tag_of(&queue.pop().unwrap()), 20);
        assert_eq!(tag_of(&queue.pop().unwrap()), 10);
    }

    #[test]
    fn suspension_parks_queued_work() {
        let queue = TaskQueue::default();
        queue.push(task(1));
        queue.set_suspended(true);
        assert!(queue.pop().is_none());
        assert!(!queue.is_empty());
        queue.set_suspended(false);
        assert_eq!(tag_of(&queue.pop().unwrap()), 1);
    }
}
