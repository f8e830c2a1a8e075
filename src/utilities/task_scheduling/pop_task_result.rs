//! Result of a pop attempt from the [`TaskStack`](super::TaskStack).

/// Describes the outcome of a pop attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopTaskResult<T> {
    /// A task was popped and now belongs to the caller.
    Success(T),
    /// The stack was empty, but other workers still hold tasks that may push more.
    Empty,
    /// No task is outstanding anywhere, or the stack was stopped. Workers seeking work should return.
    Stop,
}

impl<T> PopTaskResult<T> {
    /// Whether a worker polling the stack should give up.
    #[inline(always)]
    pub fn is_stop(&self) -> bool {
        matches!(self, PopTaskResult::Stop)
    }
}
