//! Generic infrastructure shared by the builder: bounding boxes, arenas, task scheduling and thread dispatch.

pub mod bounding_box;
pub mod containment_type;
pub mod memory;
pub mod task_scheduling;
pub mod thread_dispatcher;

pub(crate) mod local_spin_wait;

pub use self::bounding_box::BoundingBox;
pub use self::containment_type::ContainmentType;
pub use self::thread_dispatcher::{ScopedThreadDispatcher, ThreadDispatcher};
