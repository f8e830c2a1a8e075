//! Task scheduling for the parallel builder.
//!
//! Coordination is deliberately coarse: one mutex-protected stack of pending tasks plus an atomic count of
//! tasks that are pending or currently being processed. Workers poll the stack until that count drops to zero.

mod pop_task_result;
mod task_stack;

pub use pop_task_result::PopTaskResult;
pub use task_stack::TaskStack;
