//! Spatial splits: binning of clipped reference boxes along fixed planes.
//!
//! A reference straddling the chosen plane is clipped against it and referenced from both sides. Counting is done
//! with enter/exit counters per bin, so the number of duplicates a split creates is known before it is applied.

use glam::Vec3;

use super::build_context::BuildContext;
use super::prim_ref::{block_count, PrimInfo, PrimRef};
use super::prim_ref_list::PrimRefList;
use crate::primitives::PrimitiveSource;
use crate::utilities::bounding_box::BoundingBox;

/// Maps coordinates to spatial bins spanning the geometry bounds of a set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialBinMapping {
    pub bin_count: usize,
    origin: Vec3,
    bin_width: Vec3,
    offset_to_bin_index: Vec3,
}

impl SpatialBinMapping {
    pub fn new(info: &PrimInfo, bin_count: usize) -> Self {
        let span = info.geom_bounds.size();
        let usable = span.cmpgt(Vec3::ZERO);
        Self {
            bin_count,
            origin: info.geom_bounds.min,
            bin_width: span / bin_count as f32,
            offset_to_bin_index: Vec3::select(usable, Vec3::splat(bin_count as f32) / span, Vec3::ZERO),
        }
    }

    #[inline(always)]
    pub fn is_axis_usable(&self, axis: usize) -> bool {
        self.offset_to_bin_index[axis] > 0.0
    }

    /// Bin containing coordinate `value` on `axis`.
    #[inline(always)]
    pub fn bin_index(&self, value: f32, axis: usize) -> usize {
        let continuous = (value - self.origin[axis]) * self.offset_to_bin_index[axis];
        continuous.clamp(0.0, (self.bin_count - 1) as f32) as usize
    }

    /// Coordinate of the plane between bins `bin - 1` and `bin`.
    #[inline(always)]
    pub fn plane_position(&self, bin: usize, axis: usize) -> f32 {
        self.origin[axis] + bin as f32 * self.bin_width[axis]
    }

    /// First and last bin touched by a box.
    #[inline(always)]
    pub fn bin_range(&self, bounds: &BoundingBox, axis: usize) -> (usize, usize) {
        (
            self.bin_index(bounds.min[axis], axis),
            self.bin_index(bounds.max[axis], axis),
        )
    }
}

/// Candidate spatial split at the plane in front of bin `position` on `axis`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialSplit {
    pub axis: usize,
    pub position: usize,
    pub mapping: SpatialBinMapping,
    /// `area(left) * blocks(left) + area(right) * blocks(right)`, without cost factors. Infinite when invalid.
    pub sah: f32,
    pub left_count: usize,
    pub right_count: usize,
}

impl SpatialSplit {
    pub const INVALID: Self = Self {
        axis: 0,
        position: 0,
        mapping: SpatialBinMapping {
            bin_count: 0,
            origin: Vec3::ZERO,
            bin_width: Vec3::ZERO,
            offset_to_bin_index: Vec3::ZERO,
        },
        sah: f32::INFINITY,
        left_count: 0,
        right_count: 0,
    };

    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.sah.is_finite()
    }

    /// Number of references that end up on both sides.
    #[inline(always)]
    pub fn replication_count(&self, total: usize) -> usize {
        (self.left_count + self.right_count).saturating_sub(total)
    }

    #[inline(always)]
    pub fn plane_position(&self) -> f32 {
        self.mapping.plane_position(self.position, self.axis)
    }

    /// Which side(s) a reference lands on: `(left, right)`.
    #[inline(always)]
    pub fn sides(&self, prim: &PrimRef) -> (bool, bool) {
        let (first, last) = self.mapping.bin_range(&prim.bounds, self.axis);
        (first < self.position, last >= self.position)
    }
}

/// Per-bin clipped bounds and enter/exit counts for all three axes.
#[derive(Clone, Debug)]
pub struct SpatialBinner {
    bounds: Vec<[BoundingBox; 3]>,
    enter: Vec<[usize; 3]>,
    exit: Vec<[usize; 3]>,
}

impl SpatialBinner {
    pub fn new(bin_count: usize) -> Self {
        Self {
            bounds: vec![[BoundingBox::EMPTY; 3]; bin_count],
            enter: vec![[0; 3]; bin_count],
            exit: vec![[0; 3]; bin_count],
        }
    }

    /// Adds references, clipping each one into every bin it spans.
    pub fn bin<S: PrimitiveSource + ?Sized>(&mut self, source: &S, mapping: &SpatialBinMapping, refs: &[PrimRef]) {
        for prim in refs {
            for axis in 0..3 {
                if !mapping.is_axis_usable(axis) {
                    continue;
                }
                let (first, last) = mapping.bin_range(&prim.bounds, axis);
                self.enter[first][axis] += 1;
                self.exit[last][axis] += 1;
                if first == last {
                    self.bounds[first][axis].merge(&prim.bounds);
                    continue;
                }
                let mut rest = prim.bounds;
                for bin in first..last {
                    let position = mapping.plane_position(bin + 1, axis);
                    let (below, above) = source.split_bounds(prim.id, &rest, axis, position);
                    self.bounds[bin][axis].merge(&below);
                    rest = above;
                }
                self.bounds[last][axis].merge(&rest);
            }
        }
    }

    pub fn merge(&mut self, other: &SpatialBinner) {
        for bin in 0..self.bounds.len() {
            for axis in 0..3 {
                self.bounds[bin][axis].merge(&other.bounds[bin][axis]);
                self.enter[bin][axis] += other.enter[bin][axis];
                self.exit[bin][axis] += other.exit[bin][axis];
            }
        }
    }

    pub fn best(&self, mapping: &SpatialBinMapping, log_block_size: u32) -> SpatialSplit {
        let bin_count = self.bounds.len();
        let mut best = SpatialSplit {
            mapping: *mapping,
            ..SpatialSplit::INVALID
        };
        let mut right_areas = vec![0.0f32; bin_count];
        let mut right_counts = vec![0usize; bin_count];
        for axis in 0..3 {
            if !mapping.is_axis_usable(axis) {
                continue;
            }
            let mut accumulated = BoundingBox::EMPTY;
            let mut count = 0;
            for bin in (1..bin_count).rev() {
                accumulated.merge(&self.bounds[bin][axis]);
                count += self.exit[bin][axis];
                right_areas[bin] = accumulated.safe_half_area();
                right_counts[bin] = count;
            }
            let mut left = BoundingBox::EMPTY;
            let mut left_count = 0;
            for position in 1..bin_count {
                left.merge(&self.bounds[position - 1][axis]);
                left_count += self.enter[position - 1][axis];
                let right_count = right_counts[position];
                if left_count == 0 || right_count == 0 {
                    continue;
                }
                let sah = left.safe_half_area() * block_count(left_count, log_block_size) as f32
                    + right_areas[position] * block_count(right_count, log_block_size) as f32;
                if sah < best.sah {
                    best.axis = axis;
                    best.position = position;
                    best.sah = sah;
                    best.left_count = left_count;
                    best.right_count = right_count;
                }
            }
        }
        best
    }
}

/// Finds the best spatial split of `prims`.
pub fn find<P: Send>(
    context: &BuildContext<'_, P>,
    prims: &PrimRefList,
    info: &PrimInfo,
    parallel: bool,
) -> SpatialSplit {
    let bin_count = context.options.spatial_bin_count;
    let mapping = SpatialBinMapping::new(info, bin_count);
    let log_block_size = context.options.log_sah_block_size;
    let source = context.source;
    if parallel && context.thread_count() > 1 {
        let partials = context.fold_blocks_parallel(
            prims,
            || SpatialBinner::new(bin_count),
            |binner, refs| binner.bin(source, &mapping, refs),
        );
        let mut binner = SpatialBinner::new(bin_count);
        for partial in &partials {
            binner.merge(partial);
        }
        binner.best(&mapping, log_block_size)
    } else {
        let mut binner = SpatialBinner::new(bin_count);
        for block in prims.blocks() {
            binner.bin(source, &mapping, block.items());
        }
        binner.best(&mapping, log_block_size)
    }
}
