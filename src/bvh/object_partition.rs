//! Binned surface area heuristic partitioning of reference centroids.

use glam::Vec3;

use super::build_context::BuildContext;
use super::prim_ref::{block_count, PrimInfo, PrimRef};
use super::prim_ref_list::PrimRefList;
use crate::utilities::bounding_box::BoundingBox;

// ── Bin mapping ────────────────────────────────────────────────────────────

/// Maps doubled reference centers to bin indices on all three axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectBinMapping {
    pub bin_count: usize,
    centroid_min: Vec3,
    offset_to_bin_index: Vec3,
    maximum_bin_index: Vec3,
}

impl ObjectBinMapping {
    pub fn new(info: &PrimInfo, bin_count: usize) -> Self {
        let span = info.centroid_bounds.size();
        // Slightly less than `bin_count` so the far edge maps into the last bin rather than one past it.
        let scale = bin_count as f32 * 0.99;
        let offset_to_bin_index = Vec3::select(span.cmpgt(Vec3::ZERO), Vec3::splat(scale) / span, Vec3::ZERO);
        Self {
            bin_count,
            centroid_min: info.centroid_bounds.min,
            offset_to_bin_index,
            maximum_bin_index: Vec3::splat((bin_count - 1) as f32),
        }
    }

    /// Whether references can be told apart along `axis` at all.
    #[inline(always)]
    pub fn is_axis_usable(&self, axis: usize) -> bool {
        self.offset_to_bin_index[axis] > 0.0
    }

    /// Bin index of a reference on every axis.
    #[inline(always)]
    pub fn bin_indices(&self, bounds: &BoundingBox) -> [usize; 3] {
        let continuous = ((bounds.center2() - self.centroid_min) * self.offset_to_bin_index)
            .clamp(Vec3::ZERO, self.maximum_bin_index);
        [
            continuous.x as usize,
            continuous.y as usize,
            continuous.z as usize,
        ]
    }

    /// Bin index of a reference on one axis.
    #[inline(always)]
    pub fn bin_index(&self, bounds: &BoundingBox, axis: usize) -> usize {
        let continuous = (bounds.center2()[axis] - self.centroid_min[axis]) * self.offset_to_bin_index[axis];
        continuous.clamp(0.0, self.maximum_bin_index[axis]) as usize
    }
}

// ── Bins ───────────────────────────────────────────────────────────────────

/// Candidate object partition: references whose bin on `axis` is below `position` go left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectSplit {
    pub axis: usize,
    pub position: usize,
    pub mapping: ObjectBinMapping,
    /// `area(left) * blocks(left) + area(right) * blocks(right)`, without cost factors. Infinite when invalid.
    pub sah: f32,
    pub left_bounds: BoundingBox,
    pub right_bounds: BoundingBox,
    pub left_count: usize,
    pub right_count: usize,
}

impl ObjectSplit {
    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.sah.is_finite()
    }

    /// Half area of the region covered by both sides.
    pub fn overlap_half_area(&self) -> f32 {
        self.left_bounds
            .intersection(&self.right_bounds)
            .safe_half_area()
    }

    /// Whether a reference belongs to the left side.
    #[inline(always)]
    pub fn goes_left(&self, prim: &PrimRef) -> bool {
        self.mapping.bin_index(&prim.bounds, self.axis) < self.position
    }
}

/// Per-bin geometry bounds and counts for all three axes.
#[derive(Clone, Debug)]
pub struct ObjectBinner {
    bounds: Vec<[BoundingBox; 3]>,
    counts: Vec<[usize; 3]>,
}

impl ObjectBinner {
    pub fn new(bin_count: usize) -> Self {
        Self {
            bounds: vec![[BoundingBox::EMPTY; 3]; bin_count],
            counts: vec![[0; 3]; bin_count],
        }
    }

    pub fn bin(&mut self, mapping: &ObjectBinMapping, refs: &[PrimRef]) {
        for prim in refs {
            let indices = mapping.bin_indices(&prim.bounds);
            for axis in 0..3 {
                let bin = indices[axis];
                self.bounds[bin][axis].merge(&prim.bounds);
                self.counts[bin][axis] += 1;
            }
        }
    }

    /// Combines the bins of another binner over the same mapping. Exact, so merge order does not matter.
    pub fn merge(&mut self, other: &ObjectBinner) {
        for (bin, (bounds, counts)) in other.bounds.iter().zip(&other.counts).enumerate() {
            for axis in 0..3 {
                self.bounds[bin][axis].merge(&bounds[axis]);
                self.counts[bin][axis] += counts[axis];
            }
        }
    }

    /// Sweeps every bin boundary of every usable axis and returns the cheapest one.
    pub fn best(&self, mapping: &ObjectBinMapping, log_block_size: u32) -> ObjectSplit {
        let bin_count = self.bounds.len();
        let mut best = ObjectSplit {
            axis: 0,
            position: 0,
            mapping: *mapping,
            sah: f32::INFINITY,
            left_bounds: BoundingBox::EMPTY,
            right_bounds: BoundingBox::EMPTY,
            left_count: 0,
            right_count: 0,
        };
        let mut right_areas = vec![0.0f32; bin_count];
        let mut right_counts = vec![0usize; bin_count];
        for axis in 0..3 {
            if !mapping.is_axis_usable(axis) {
                continue;
            }
            // Suffix sweep: right_*[i] describes bins [i, bin_count).
            let mut accumulated = BoundingBox::EMPTY;
            let mut count = 0;
            for bin in (1..bin_count).rev() {
                accumulated.merge(&self.bounds[bin][axis]);
                count += self.counts[bin][axis];
                right_areas[bin] = accumulated.safe_half_area();
                right_counts[bin] = count;
            }
            let mut left = BoundingBox::EMPTY;
            let mut left_count = 0;
            for position in 1..bin_count {
                left.merge(&self.bounds[position - 1][axis]);
                left_count += self.counts[position - 1][axis];
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
        if best.is_valid() {
            let (mut left, mut right) = (BoundingBox::EMPTY, BoundingBox::EMPTY);
            for bin in 0..bin_count {
                if bin < best.position {
                    left.merge(&self.bounds[bin][best.axis]);
                } else {
                    right.merge(&self.bounds[bin][best.axis]);
                }
            }
            best.left_bounds = left;
            best.right_bounds = right;
        }
        best
    }
}

// ── Search ─────────────────────────────────────────────────────────────────

/// Finds the best object partition of `prims`. Bins in parallel across the context's workers when `parallel` is set.
pub fn find<P: Send>(
    context: &BuildContext<'_, P>,
    prims: &PrimRefList,
    info: &PrimInfo,
    parallel: bool,
) -> ObjectSplit {
    let bin_count = context.options.bin_count;
    let mapping = ObjectBinMapping::new(info, bin_count);
    let log_block_size = context.options.log_sah_block_size;
    if parallel && context.thread_count() > 1 {
        let partials = context.fold_blocks_parallel(
            prims,
            || ObjectBinner::new(bin_count),
            |binner, refs| binner.bin(&mapping, refs),
        );
        let mut binner = ObjectBinner::new(bin_count);
        for partial in &partials {
            binner.merge(partial);
        }
        binner.best(&mapping, log_block_size)
    } else {
        let mut binner = ObjectBinner::new(bin_count);
        for block in prims.blocks() {
            binner.bin(&mapping, block.items());
        }
        binner.best(&mapping, log_block_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::PrimitiveId;

    fn refs_along_x(count: u32) -> Vec<PrimRef> {
        (0..count)
            .map(|i| {
                let min = Vec3::new(i as f32 * 2.0, 0.0, 0.0);
                PrimRef::new(BoundingBox::new(min, min + Vec3::ONE), PrimitiveId(i))
            })
            .collect()
    }

    fn best_of(refs: &[PrimRef]) -> ObjectSplit {
        let info = PrimInfo::from_refs(refs);
        let mapping = ObjectBinMapping::new(&info, 32);
        let mut binner = ObjectBinner::new(32);
        binner.bin(&mapping, refs);
        binner.best(&mapping, 2)
    }

    #[test]
    fn separated_boxes_split_without_overlap() {
        let refs = refs_along_x(64);
        let split = best_of(&refs);
        assert!(split.is_valid());
        assert_eq!(split.axis, 0);
        assert_eq!(split.left_count + split.right_count, 64);
        assert_eq!(split.overlap_half_area(), 0.0);
        let left = refs.iter().filter(|prim| split.goes_left(prim)).count();
        assert_eq!(left, split.left_count);
    }

    #[test]
    fn identical_centroids_cannot_be_partitioned() {
        let refs: Vec<_> = (0..10)
            .map(|i| PrimRef::new(BoundingBox::new(Vec3::ZERO, Vec3::ONE), PrimitiveId(i)))
            .collect();
        assert!(!best_of(&refs).is_valid());
    }

    #[test]
    fn merged_binners_match_a_single_pass() {
        let refs = refs_along_x(100);
        let info = PrimInfo::from_refs(&refs);
        let mapping = ObjectBinMapping::new(&info, 16);
        let mut whole = ObjectBinner::new(16);
        whole.bin(&mapping, &refs);
        let mut first = ObjectBinner::new(16);
        first.bin(&mapping, &refs[..37]);
        let mut second = ObjectBinner::new(16);
        second.bin(&mapping, &refs[37..]);
        second.merge(&first);
        assert_eq!(whole.best(&mapping, 2), second.best(&mapping, 2));
    }
}
