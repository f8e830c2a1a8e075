//! Split selection and application.
//!
//! [`Split::find`] runs the partition strategies over a reference set and keeps the cheapest proposal;
//! [`Split::apply`] consumes the set and distributes its references over two new lists.

use super::build_context::BuildContext;
use super::object_partition::{self, ObjectSplit};
use super::prim_ref::{PrimInfo, PrimRef};
use super::prim_ref_list::{PrimRefBlockAllocator, PrimRefList};
use super::spatial_split::{self, SpatialSplit};

/// Spatial splits are only evaluated when the object partition's children overlap by at least this share of the
/// parent's area.
const SPATIAL_OVERLAP_THRESHOLD: f32 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SplitKind {
    /// No split reduces the cost; the set has to become a leaf.
    None,
    Object(ObjectSplit),
    Spatial(SpatialSplit),
}

/// Proposed binary split of a reference set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Split {
    pub kind: SplitKind,
    /// Area weighted block count of both sides. Infinite for [`SplitKind::None`].
    pub sah: f32,
}

/// The two halves produced by applying a split.
#[derive(Default)]
pub struct Partitioned {
    pub left: PrimRefList,
    pub left_info: PrimInfo,
    pub right: PrimRefList,
    pub right_info: PrimInfo,
}

impl Partitioned {
    /// Whether one side received every reference.
    pub fn is_degenerate(&self) -> bool {
        self.left_info.count == 0 || self.right_info.count == 0
    }
}

impl Split {
    pub const NONE: Self = Self {
        kind: SplitKind::None,
        sah: f32::INFINITY,
    };

    #[inline(always)]
    pub fn is_none(&self) -> bool {
        matches!(self.kind, SplitKind::None)
    }

    fn object(split: ObjectSplit) -> Self {
        if split.is_valid() {
            Self {
                sah: split.sah,
                kind: SplitKind::Object(split),
            }
        } else {
            Self::NONE
        }
    }

    /// Finds the cheapest split of `prims`.
    ///
    /// Spatial splits are considered only when `spatial` is set and the remaining replication budget can pay for the
    /// candidate. `parallel` bins across all workers of the context.
    pub fn find<P: Send>(
        context: &BuildContext<'_, P>,
        prims: &PrimRefList,
        info: &PrimInfo,
        spatial: bool,
        parallel: bool,
    ) -> Split {
        if info.count <= 1 {
            return Self::NONE;
        }
        let object = object_partition::find(context, prims, info, parallel);
        if !spatial {
            return Self::object(object);
        }
        let parent_area = info.geom_bounds.safe_half_area();
        if object.is_valid() && object.overlap_half_area() < SPATIAL_OVERLAP_THRESHOLD * parent_area {
            return Self::object(object);
        }
        let spatial = spatial_split::find(context, prims, info, parallel);
        let affordable = spatial.replication_count(info.count) <= context.remaining_replications();
        if spatial.is_valid() && affordable && spatial.sah < object.sah {
            Self {
                sah: spatial.sah,
                kind: SplitKind::Spatial(spatial),
            }
        } else {
            Self::object(object)
        }
    }

    /// Distributes the references of `prims` over two new lists, giving the consumed blocks back to `alloc`.
    ///
    /// A spatial split first reserves its duplicates from the replication budget. If the budget cannot cover them
    /// anymore the set is partitioned by objects instead, and if that is impossible too, everything ends up on the
    /// left; callers treat a one-sided result as a degenerate split.
    pub fn apply<P: Send>(
        &self,
        context: &BuildContext<'_, P>,
        alloc: &mut PrimRefBlockAllocator,
        prims: PrimRefList,
        info: &PrimInfo,
    ) -> Partitioned {
        let partitioned = match &self.kind {
            SplitKind::None => apply_with(alloc, prims, |prim, out| out.push_left(*prim)),
            SplitKind::Object(split) => apply_with(alloc, prims, |prim, out| {
                if split.goes_left(prim) {
                    out.push_left(*prim)
                } else {
                    out.push_right(*prim)
                }
            }),
            SplitKind::Spatial(split) => {
                let reserved = split.replication_count(info.count);
                if !context.try_reserve_replications(reserved) {
                    log::debug!(
                        "Replication budget cannot cover {reserved} duplicates; partitioning {} references by objects.",
                        info.count
                    );
                    let fallback = Split::find(context, &prims, info, false, false);
                    return fallback.apply(context, alloc, prims, info);
                }
                let mut used = 0;
                let source = context.source;
                let plane = split.plane_position();
                let partitioned = apply_with(alloc, prims, |prim, out| match split.sides(prim) {
                    (true, false) => out.push_left(*prim),
                    (false, _) => out.push_right(*prim),
                    (true, true) => {
                        let (below, above) = source.split_bounds(prim.id, &prim.bounds, split.axis, plane);
                        let below = below.intersection(&prim.bounds);
                        let above = above.intersection(&prim.bounds);
                        match (below.is_empty(), above.is_empty()) {
                            (false, false) => {
                                used += 1;
                                out.push_left(PrimRef::new(below, prim.id));
                                out.push_right(PrimRef::new(above, prim.id));
                            }
                            (false, true) => out.push_left(PrimRef::new(below, prim.id)),
                            (true, false) => out.push_right(PrimRef::new(above, prim.id)),
                            (true, true) => out.push_right(*prim),
                        }
                    }
                });
                context.settle_replications(reserved, used);
                partitioned
            }
        };
        debug_assert_eq!(
            partitioned.left_info,
            PrimInfo::from_refs(partitioned.left.iter()),
            "Left summary should match its references."
        );
        debug_assert_eq!(
            partitioned.right_info,
            PrimInfo::from_refs(partitioned.right.iter()),
            "Right summary should match its references."
        );
        partitioned
    }
}

/// Sink that appends references to either side while keeping both summaries current.
struct PartitionWriter<'p, 'a> {
    out: &'p mut Partitioned,
    alloc: &'p mut PrimRefBlockAllocator<'a>,
}

impl PartitionWriter<'_, '_> {
    #[inline(always)]
    fn push_left(&mut self, prim: PrimRef) {
        self.out.left_info.add(&prim.bounds);
        self.out.left.push(prim, self.alloc);
    }

    #[inline(always)]
    fn push_right(&mut self, prim: PrimRef) {
        self.out.right_info.add(&prim.bounds);
        self.out.right.push(prim, self.alloc);
    }
}

/// Drains `prims` block by block through `classify`, freeing every consumed block.
fn apply_with<F>(alloc: &mut PrimRefBlockAllocator, mut prims: PrimRefList, mut classify: F) -> Partitioned
where
    F: FnMut(&PrimRef, &mut PartitionWriter<'_, '_>),
{
    let mut out = Partitioned::default();
    while let Some(block) = prims.take() {
        {
            let mut writer = PartitionWriter {
                out: &mut out,
                alloc: &mut *alloc,
            };
            for prim in block.items() {
                classify(prim, &mut writer);
            }
        }
        alloc.free(block);
    }
    out
}
