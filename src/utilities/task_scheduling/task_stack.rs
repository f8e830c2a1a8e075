//! Shared stack of pending tasks with an outstanding-task counter.

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::pop_task_result::PopTaskResult;
use crate::utilities::local_spin_wait::LocalSpinWait;

/// Manages a stack of tasks for parallel execution.
///
/// A task counts as outstanding from the moment it is pushed until the worker that popped it calls
/// [`complete`](TaskStack::complete). Tasks spawned while processing another task must be pushed before the
/// parent is completed, so the outstanding count can only reach zero once every task in the build is done.
pub struct TaskStack<T> {
    tasks: Mutex<Vec<T>>,
    /// Pending plus in-flight tasks.
    active: CachePadded<AtomicUsize>,
    /// Set when workers should leave regardless of remaining work.
    stop: CachePadded<AtomicBool>,
}

impl<T> TaskStack<T> {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            active: CachePadded::new(AtomicUsize::new(0)),
            stop: CachePadded::new(AtomicBool::new(false)),
        }
    }

    /// Creates a stack that already holds `tasks`, all of them outstanding.
    pub fn with_tasks(tasks: Vec<T>) -> Self {
        let count = tasks.len();
        Self {
            tasks: Mutex::new(tasks),
            active: CachePadded::new(AtomicUsize::new(count)),
            stop: CachePadded::new(AtomicBool::new(false)),
        }
    }

    /// Gets the number of tasks that are pending or being processed.
    #[inline(always)]
    pub fn active_task_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Pushes a group of tasks under a single lock acquisition.
    pub fn push_many<I: IntoIterator<Item = T>>(&self, new_tasks: I) {
        let mut tasks = self.tasks.lock();
        for task in new_tasks {
            tasks.push(task);
            self.active.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Attempts to pop a task from the stack.
    pub fn try_pop(&self) -> PopTaskResult<T> {
        if self.stop.load(Ordering::Acquire) {
            return PopTaskResult::Stop;
        }
        if let Some(task) = self.tasks.lock().pop() {
            return PopTaskResult::Success(task);
        }
        if self.active.load(Ordering::Acquire) == 0 {
            PopTaskResult::Stop
        } else {
            PopTaskResult::Empty
        }
    }

    /// Marks a previously popped task as finished.
    #[inline(always)]
    pub fn complete(&self) {
        let previous = self.active.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "Completed more tasks than were pushed.");
    }

    /// Tells every polling worker to leave. Pending tasks are left in the stack.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Pops and runs tasks until no task is outstanding or a stop is requested.
    ///
    /// Each popped task is completed after `body` returns, so anything `body` pushes keeps the loop alive.
    pub fn run_worker<F: FnMut(T)>(&self, mut body: F) {
        let mut spin = LocalSpinWait::new();
        loop {
            match self.try_pop() {
                PopTaskResult::Success(task) => {
                    body(task);
                    self.complete();
                    spin.reset();
                }
                PopTaskResult::Empty => spin.spin_once(),
                PopTaskResult::Stop => break,
            }
        }
    }
}
