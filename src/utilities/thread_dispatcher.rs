use crossbeam_utils::thread;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;

/// Function to be invoked on a worker thread. Receives the index of the worker executing it.
pub type ThreadDispatcherWorker<'a> = &'a (dyn Fn(usize) + Sync);

/// Provides multithreading dispatch primitives and a thread count for the builder to use.
///
/// The builder does not require a load balancing parallel for loop. All it needs is a way to jumpstart
/// some threads; the build does its own domain specific load balancing through its task stack.
/// This keeps wrapping some other thread pool cheap: implement `dispatch_workers` on top of it and the
/// builder will run on it.
pub trait ThreadDispatcher: Send + Sync {
    /// Gets the number of workers available in the thread dispatcher.
    ///
    /// The build's worker phase polls a shared stack until all outstanding tasks complete, so these must be
    /// truly independent threads capable of progress while another one is spinning.
    fn thread_count(&self) -> usize;

    /// Runs `worker_body` on up to `maximum_worker_count` workers and returns once all of them returned.
    ///
    /// Worker indices passed to the body are unique and lie in `[0, min(thread_count, maximum_worker_count))`.
    /// Returns `Err` with the panic payload if any worker panicked.
    fn dispatch_workers(
        &self,
        worker_body: ThreadDispatcherWorker<'_>,
        maximum_worker_count: usize,
    ) -> std::thread::Result<()>;
}

/// Dispatcher that spawns scoped threads for every dispatch. The calling thread acts as worker 0.
#[derive(Clone, Copy, Debug)]
pub struct ScopedThreadDispatcher {
    thread_count: usize,
}

impl ScopedThreadDispatcher {
    /// Creates a dispatcher with the given number of workers. Zero selects the available parallelism.
    pub fn new(thread_count: usize) -> Self {
        let thread_count = if thread_count == 0 {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        } else {
            thread_count
        };
        Self { thread_count }
    }
}

impl Default for ScopedThreadDispatcher {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ThreadDispatcher for ScopedThreadDispatcher {
    fn thread_count(&self) -> usize {
        self.thread_count
    }

    fn dispatch_workers(
        &self,
        worker_body: ThreadDispatcherWorker<'_>,
        maximum_worker_count: usize,
    ) -> std::thread::Result<()> {
        let worker_count = self.thread_count.min(maximum_worker_count).max(1);
        if worker_count == 1 {
            return std::panic::catch_unwind(AssertUnwindSafe(|| worker_body(0)));
        }
        thread::scope(|scope| {
            for worker_index in 1..worker_count {
                scope
                    .builder()
                    .name(format!("bvh-build-{worker_index}"))
                    .spawn(move |_| worker_body(worker_index))
                    .map(|_| ())
                    .unwrap_or_else(|_| worker_body(worker_index));
            }
            worker_body(0);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_worker_index_runs_once() {
        let dispatcher = ScopedThreadDispatcher::new(4);
        let seen = AtomicUsize::new(0);
        dispatcher
            .dispatch_workers(
                &|worker_index| {
                    seen.fetch_or(1 << worker_index, Ordering::Relaxed);
                },
                usize::MAX,
            )
            .unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 0b1111);
    }

    #[test]
    fn maximum_worker_count_limits_dispatch() {
        let dispatcher = ScopedThreadDispatcher::new(8);
        let calls = AtomicUsize::new(0);
        dispatcher
            .dispatch_workers(
                &|_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                },
                2,
            )
            .unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn zero_threads_selects_available_parallelism() {
        assert!(ScopedThreadDispatcher::new(0).thread_count() >= 1);
    }
}
