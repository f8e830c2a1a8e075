//! Recursive node construction.
//!
//! A [`SubtreeBuilder`] turns build records into nodes and leaves using the allocators of the worker running it.
//! It either finishes a record completely (`finish_build`) or expands it by a single node (`expand_one_level`) so the
//! children can be scheduled elsewhere.

use super::build_context::{BuildContext, ThreadAllocators};
use super::build_record::{BuildRecord, Destination};
use super::error::{BuildError, Result};
use super::fallback_split;
use super::node::{Node, NodeRef, BRANCHING_FACTOR};
use super::split::Split;

/// Number of groups the large-leaf fallback splits a set into per node.
const LARGE_LEAF_FANOUT: usize = 4;

/// What `create_node` decided for a record.
pub enum NodeExpansion {
    /// The record has to become a leaf (possibly a large one).
    Leaf(BuildRecord),
    /// The record's references were distributed over two to eight child records.
    Children(Vec<BuildRecord>),
}

pub struct SubtreeBuilder<'s, 'c, 'a, P> {
    pub context: &'c BuildContext<'a, P>,
    pub allocators: &'s mut ThreadAllocators<'c, P>,
    /// Bin across all workers while searching splits. Only the top-level phase sets this.
    pub parallel: bool,
}

impl<'s, 'c, 'a, P: Send> SubtreeBuilder<'s, 'c, 'a, P> {
    pub fn new(context: &'c BuildContext<'a, P>, allocators: &'s mut ThreadAllocators<'c, P>) -> Self {
        Self {
            context,
            allocators,
            parallel: false,
        }
    }

    /// Finds the split a freshly created record starts out with.
    #[inline]
    pub fn find_split(&self, record: &BuildRecord) -> Split {
        Split::find(
            self.context,
            &record.prims,
            &record.info,
            self.context.spatial_splits_available(),
            self.parallel,
        )
    }

    /// SAH delta of splitting `record` instead of making it a leaf. Negative when splitting pays off.
    #[inline]
    fn split_gain(&self, record: &BuildRecord) -> f32 {
        let options = &self.context.options;
        record.split_sah(options.traversal_cost, options.intersection_cost)
            - record.leaf_sah(options.intersection_cost, options.log_sah_block_size)
    }

    /// Decides whether `record` becomes a leaf or an inner node, and in the latter case greedily splits it into up
    /// to eight children.
    ///
    /// The child whose split gains the most is split next. Children at or below the minimum leaf size, or without a
    /// usable split, are never chosen; children above the maximum leaf size are always worth splitting.
    pub fn create_node(&mut self, record: BuildRecord) -> NodeExpansion {
        let options = &self.context.options;
        let min_leaf_size = options.min_leaf_size;
        let max_leaf_size = self.context.max_leaf_size;
        let leaf_sah = record.leaf_sah(options.intersection_cost, options.log_sah_block_size);
        let split_sah = record.split_sah(options.traversal_cost, options.intersection_cost);
        if record.size() <= min_leaf_size
            || record.depth > options.max_build_depth
            || (record.size() <= max_leaf_size && leaf_sah <= split_sah)
        {
            return NodeExpansion::Leaf(record);
        }

        let mut children: Vec<BuildRecord> = Vec::with_capacity(BRANCHING_FACTOR);
        children.push(record);
        while children.len() < BRANCHING_FACTOR {
            let mut best_child = None;
            let mut best_gain = 0.0;
            for (index, child) in children.iter().enumerate() {
                if child.size() <= min_leaf_size || child.split.is_none() {
                    continue;
                }
                let mut gain = self.split_gain(child);
                if child.size() > max_leaf_size {
                    gain = gain.min(0.0);
                }
                if gain <= best_gain {
                    best_gain = gain;
                    best_child = Some(index);
                }
            }
            let Some(index) = best_child else {
                break;
            };

            let child = children.remove(index);
            let depth = child.depth + 1;
            let partitioned = child
                .split
                .apply(self.context, &mut self.allocators.blocks, child.prims, &child.info);
            if partitioned.is_degenerate() {
                // Retry the whole set without spatial splitting.
                let (prims, info) = if partitioned.left_info.count > 0 {
                    (partitioned.left, partitioned.left_info)
                } else {
                    (partitioned.right, partitioned.right_info)
                };
                let split = Split::find(self.context, &prims, &info, false, self.parallel);
                children.insert(index, BuildRecord::new(child.depth, prims, info, split, child.dst));
                continue;
            }

            let mut left = BuildRecord::new(
                depth,
                partitioned.left,
                partitioned.left_info,
                Split::NONE,
                Destination::Root,
            );
            let mut right = BuildRecord::new(
                depth,
                partitioned.right,
                partitioned.right_info,
                Split::NONE,
                Destination::Root,
            );
            left.split = self.find_split(&left);
            right.split = self.find_split(&right);
            children.insert(index, left);
            children.push(right);
        }

        if children.len() == 1 {
            return NodeExpansion::Leaf(children.remove(0));
        }
        NodeExpansion::Children(children)
    }

    /// Writes the references of `record` into a leaf.
    ///
    /// The references are merged into one block and sorted by primitive id before the source fills the payloads, so
    /// leaf contents do not depend on how the build was scheduled.
    pub fn create_leaf(&mut self, record: BuildRecord) -> NodeRef {
        let mut prims = record.prims;
        let allocators = &mut *self.allocators;
        let sorted = prims.merge_sorted(&mut allocators.blocks);
        allocators.leaf_ids.clear();
        allocators.leaf_ids.extend(sorted.iter().map(|prim| prim.id));
        prims.clear(&mut allocators.blocks);

        allocators.leaf_payload.clear();
        self.context
            .source
            .fill_leaf(&allocators.leaf_ids, &mut allocators.leaf_payload);
        let primitives = allocators.leaf_ids.len();
        let records = allocators.leaf_payload.len();
        debug_assert!(
            (1..=primitives).contains(&records),
            "The source wrote {records} records for {primitives} primitives."
        );
        self.context.add_leaf_references(primitives);
        let start = allocators.leaves.alloc_from_vec(&mut allocators.leaf_payload);
        NodeRef::leaf(start, records as u32, primitives as u32)
    }

    /// Builds a record that exceeds the maximum leaf size but could not be split by cost.
    ///
    /// Halves the set by count until every group fits a leaf, four groups per node. Reaching the leaf depth limit means
    /// references are not being distributed and aborts the build.
    pub fn create_large_leaf(&mut self, record: BuildRecord) -> Result<NodeRef> {
        if record.size() <= self.context.max_leaf_size {
            return Ok(self.create_leaf(record));
        }
        if record.depth >= self.context.options.max_build_depth_leaf {
            return Err(BuildError::DepthExceeded {
                depth: record.depth,
                count: record.size(),
            });
        }
        log::trace!(
            "Large leaf fallback for {} references at depth {}.",
            record.size(),
            record.depth
        );

        let depth = record.depth + 1;
        let mut children: Vec<BuildRecord> = Vec::with_capacity(LARGE_LEAF_FANOUT);
        children.push(record);
        while children.len() < LARGE_LEAF_FANOUT {
            let largest = children
                .iter()
                .enumerate()
                .filter(|(_, child)| child.size() > self.context.max_leaf_size)
                .max_by_key(|(_, child)| child.size())
                .map(|(index, _)| index);
            let Some(index) = largest else {
                break;
            };
            let child = children.swap_remove(index);
            let expected = child.size();
            let partitioned = fallback_split::split(child.prims, &mut self.allocators.blocks);
            let found = partitioned.left_info.count + partitioned.right_info.count;
            if found != expected {
                return Err(BuildError::PrimitivesLost { expected, found });
            }
            children.push(BuildRecord::new(
                depth,
                partitioned.left,
                partitioned.left_info,
                Split::NONE,
                Destination::Root,
            ));
            children.push(BuildRecord::new(
                depth,
                partitioned.right,
                partitioned.right_info,
                Split::NONE,
                Destination::Root,
            ));
        }

        let mut node = Node::EMPTY;
        for (slot, child) in children.into_iter().enumerate() {
            let bounds = child.info.geom_bounds;
            let child_ref = self.create_large_leaf(child)?;
            node.set(slot, bounds, child_ref);
        }
        node.compact();
        Ok(NodeRef::Inner(self.allocators.nodes.alloc(node)))
    }

    /// Leaf for a record `create_node` refused to split.
    #[inline]
    fn create_any_leaf(&mut self, record: BuildRecord) -> Result<NodeRef> {
        if record.size() > self.context.max_leaf_size {
            self.create_large_leaf(record)
        } else {
            Ok(self.create_leaf(record))
        }
    }

    /// Builds the whole subtree of `record` on the current thread.
    pub fn finish_build(&mut self, record: BuildRecord) -> Result<NodeRef> {
        match self.create_node(record) {
            NodeExpansion::Leaf(record) => self.create_any_leaf(record),
            NodeExpansion::Children(children) => {
                let mut node = Node::EMPTY;
                for (slot, child) in children.into_iter().enumerate() {
                    let bounds = child.info.geom_bounds;
                    let child_ref = self.finish_build(child)?;
                    node.set(slot, bounds, child_ref);
                }
                debug_assert!(node.is_compact(), "Every child of a split record holds references.");
                Ok(NodeRef::Inner(self.allocators.nodes.alloc(node)))
            }
        }
    }

    /// Creates the node for `record` but leaves its children to be built later.
    ///
    /// The node gets the children's bounds and empty placeholder references; each returned child record points at
    /// the slot its finished subtree belongs in.
    pub fn expand_one_level(&mut self, record: BuildRecord) -> Result<(NodeRef, Vec<BuildRecord>)> {
        match self.create_node(record) {
            NodeExpansion::Leaf(record) => Ok((self.create_any_leaf(record)?, Vec::new())),
            NodeExpansion::Children(mut children) => {
                let mut node = Node::EMPTY;
                for (slot, child) in children.iter().enumerate() {
                    node.set_bounds(slot, child.info.geom_bounds);
                }
                let index = self.allocators.nodes.alloc(node);
                for (slot, child) in children.iter_mut().enumerate() {
                    child.dst = Destination::Child {
                        node: index,
                        slot: slot as u8,
                    };
                }
                Ok((NodeRef::Inner(index), children))
            }
        }
    }
}
