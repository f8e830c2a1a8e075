use std::cmp::Ordering;

use super::prim_ref::PrimInfo;
use super::prim_ref_list::PrimRefList;
use super::split::Split;
use crate::utilities::memory::ArenaIndex;

/// Where the reference to a finished subtree has to be written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    Root,
    /// Child slot `slot` of the node at `node`.
    Child { node: ArenaIndex, slot: u8 },
}

/// Unit of build work: a reference set that still has to be turned into a subtree.
///
/// A record owns its references exclusively; applying its split moves them into the records of its children.
pub struct BuildRecord {
    pub depth: usize,
    pub prims: PrimRefList,
    pub info: PrimInfo,
    pub split: Split,
    pub dst: Destination,
}

impl BuildRecord {
    pub fn new(depth: usize, prims: PrimRefList, info: PrimInfo, split: Split, dst: Destination) -> Self {
        Self {
            depth,
            prims,
            info,
            split,
            dst,
        }
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.info.count
    }

    /// SAH cost of turning the whole record into one leaf.
    #[inline(always)]
    pub fn leaf_sah(&self, intersection_cost: f32, log_block_size: u32) -> f32 {
        intersection_cost * self.info.leaf_sah(log_block_size)
    }

    /// SAH cost of applying the record's split, including the traversal step into the new node.
    #[inline(always)]
    pub fn split_sah(&self, traversal_cost: f32, intersection_cost: f32) -> f32 {
        traversal_cost * self.info.geom_bounds.safe_half_area() + intersection_cost * self.split.sah
    }
}

/// Orders records by reference count so a `BinaryHeap` pops the largest first.
pub struct LargestFirst(pub BuildRecord);

impl PartialEq for LargestFirst {
    fn eq(&self, other: &Self) -> bool {
        self.0.size() == other.0.size()
    }
}

impl Eq for LargestFirst {}

impl PartialOrd for LargestFirst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LargestFirst {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.size().cmp(&other.0.size())
    }
}
