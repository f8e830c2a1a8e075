use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::memory::ArenaIndex;

/// Number of children of an inner node.
pub const BRANCHING_FACTOR: usize = 8;

/// Tagged reference to a subtree.
///
/// `Barrier` only exists while a tree is being built: it marks an inner subtree that an independent task finished and
/// that the top-level layout pass must leave alone. A finished tree holds only `Inner` and `Leaf` references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// Inner node stored in the node arena.
    Inner(ArenaIndex),
    /// Run of `records` payload records starting at `start` in the leaf arena, holding `primitives` primitive
    /// references. A source that packs several primitives into one record stores fewer records than references.
    Leaf {
        start: ArenaIndex,
        records: u32,
        primitives: u32,
    },
    /// Inner node whose subtree was completed by another task.
    Barrier(ArenaIndex),
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl NodeRef {
    /// Leaf without payload. Marks unused child slots and the root of a tree built over nothing.
    pub const EMPTY: Self = NodeRef::Leaf {
        start: ArenaIndex::INVALID,
        records: 0,
        primitives: 0,
    };

    #[inline(always)]
    pub fn leaf(start: ArenaIndex, records: u32, primitives: u32) -> Self {
        if records == 0 || primitives == 0 {
            Self::EMPTY
        } else {
            NodeRef::Leaf {
                start,
                records,
                primitives,
            }
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Leaf { records: 0, .. })
    }

    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeRef::Leaf { .. })
    }

    #[inline(always)]
    pub fn is_barrier(&self) -> bool {
        matches!(self, NodeRef::Barrier(_))
    }

    /// Marks an inner reference as a task boundary. Leaves need no layout and are returned unchanged.
    #[inline(always)]
    pub fn with_barrier(self) -> Self {
        match self {
            NodeRef::Inner(index) => NodeRef::Barrier(index),
            other => other,
        }
    }

    #[inline(always)]
    pub fn without_barrier(self) -> Self {
        match self {
            NodeRef::Barrier(index) => NodeRef::Inner(index),
            other => other,
        }
    }

    /// Node index of an inner or barrier reference.
    #[inline(always)]
    pub fn node_index(&self) -> Option<ArenaIndex> {
        match *self {
            NodeRef::Inner(index) | NodeRef::Barrier(index) => Some(index),
            NodeRef::Leaf { .. } => None,
        }
    }
}

/// One child slot of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeChild {
    pub bounds: BoundingBox,
    pub node_ref: NodeRef,
}

impl NodeChild {
    pub const EMPTY: Self = Self {
        bounds: BoundingBox::EMPTY,
        node_ref: NodeRef::EMPTY,
    };

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.node_ref.is_empty()
    }
}

impl Default for NodeChild {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// 8-wide tree node.
///
/// Occupied children are packed at the front; the first empty slot ends the child list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Node {
    pub children: [NodeChild; BRANCHING_FACTOR],
}

impl Default for Node {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Node {
    pub const EMPTY: Self = Self {
        children: [NodeChild::EMPTY; BRANCHING_FACTOR],
    };

    #[inline(always)]
    pub fn set(&mut self, index: usize, bounds: BoundingBox, node_ref: NodeRef) {
        self.children[index] = NodeChild { bounds, node_ref };
    }

    #[inline(always)]
    pub fn set_bounds(&mut self, index: usize, bounds: BoundingBox) {
        self.children[index].bounds = bounds;
    }

    #[inline(always)]
    pub fn child(&self, index: usize) -> NodeRef {
        self.children[index].node_ref
    }

    /// Number of leading occupied slots.
    #[inline]
    pub fn child_count(&self) -> usize {
        self.children
            .iter()
            .position(NodeChild::is_empty)
            .unwrap_or(BRANCHING_FACTOR)
    }

    /// Occupied children, in slot order.
    #[inline]
    pub fn occupied(&self) -> &[NodeChild] {
        &self.children[..self.child_count()]
    }

    /// Moves empty slots to the end, keeping the relative order of occupied ones.
    pub fn compact(&mut self) {
        let mut write = 0;
        for read in 0..BRANCHING_FACTOR {
            if !self.children[read].is_empty() {
                self.children.swap(write, read);
                write += 1;
            }
        }
        for child in &mut self.children[write..] {
            *child = NodeChild::EMPTY;
        }
    }

    /// Whether no occupied slot follows an empty one.
    pub fn is_compact(&self) -> bool {
        let count = self.child_count();
        self.children[count..].iter().all(NodeChild::is_empty)
    }

    /// Union of the occupied children's boxes.
    pub fn bounds(&self) -> BoundingBox {
        self.occupied()
            .iter()
            .fold(BoundingBox::EMPTY, |bounds, child| bounds.merged(&child.bounds))
    }
}
