//! Parallel 8-wide BVH construction.
//!
//! [`Tree::build`] indexes a [`PrimitiveSource`](crate::primitives::PrimitiveSource) with a binned SAH builder that
//! can also split primitives spatially. Small inputs are built on the calling thread; large ones are expanded breadth
//! first until every worker has a task, then finished by the workers from a shared task stack.

pub mod build_context;
pub mod build_options;
pub mod build_record;
pub mod error;
pub mod fallback_split;
pub mod node;
pub mod object_partition;
pub mod prim_ref;
pub mod prim_ref_list;
pub mod prim_ref_list_gen;
pub mod spatial_split;
pub mod split;
pub mod tree;
pub mod tree_builder;
pub mod tree_diagnostics;
pub mod tree_layout;
pub mod tree_parallel_builder;
pub mod tree_traversal;

#[cfg(test)]
mod tree_build_tests;

pub use build_options::BuildOptions;
pub use error::{BuildError, Result};
pub use node::{Node, NodeChild, NodeRef, BRANCHING_FACTOR};
pub use tree::{BuildStatistics, Tree};
pub use tree_diagnostics::TreeStatistics;
pub use tree_traversal::TreeVisitor;
