use std::time::Duration;

use super::node::{Node, NodeRef};
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::memory::Arena;

/// Chunk capacity of the node arena.
pub const NODE_CHUNK_CAPACITY: usize = 256;
/// Chunk capacity of the leaf payload arena. Leaves larger than this get a chunk of their own.
pub const LEAF_CHUNK_CAPACITY: usize = 4096;

/// Counters describing how the last build went.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BuildStatistics {
    /// Wall time of the whole build, including primitive generation and layout.
    pub elapsed: Duration,
    /// Duplicate references created by spatial splits.
    pub replications: usize,
    /// Tasks handed to the worker phase by the top-level phase.
    pub top_level_tasks: usize,
    /// Whether the build ran on the calling thread only.
    pub single_threaded: bool,
}

/// 8-wide bounding volume hierarchy over the primitives of a [`PrimitiveSource`](crate::primitives::PrimitiveSource).
///
/// Inner nodes live in `nodes`, leaf payloads in `leaves`; a leaf reference addresses a contiguous run of payloads.
/// The struct is defined here and extended with `impl Tree` blocks in sibling modules. Once built, a tree is immutable
/// and can be shared across threads for read-only traversal.
pub struct Tree<P> {
    pub nodes: Arena<Node>,
    pub leaves: Arena<P>,
    pub root: NodeRef,
    /// Primitive references stored in the leaves: the primitive count plus spatial split duplicates.
    pub num_primitives: usize,
    /// Bounds of everything in the tree.
    pub bounds: BoundingBox,
    pub build_statistics: BuildStatistics,
}

impl<P> Default for Tree<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Tree<P> {
    /// Creates a tree with an empty root.
    pub fn new() -> Self {
        Self {
            nodes: Arena::new(NODE_CHUNK_CAPACITY),
            leaves: Arena::new(LEAF_CHUNK_CAPACITY),
            root: NodeRef::EMPTY,
            num_primitives: 0,
            bounds: BoundingBox::EMPTY,
            build_statistics: BuildStatistics::default(),
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Payload records of a leaf reference; empty for inner references.
    #[inline(always)]
    pub fn leaf(&self, node_ref: NodeRef) -> &[P] {
        match node_ref {
            NodeRef::Leaf { start, records, .. } => self.leaves.slice(start, records as usize),
            _ => &[],
        }
    }

    /// Bytes reserved by the node and leaf arenas.
    pub fn allocated_byte_count(&self) -> usize {
        self.nodes.allocated_byte_count() + self.leaves.allocated_byte_count()
    }
}
