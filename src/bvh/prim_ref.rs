use crate::primitives::PrimitiveId;
use crate::utilities::bounding_box::BoundingBox;

/// Reference to a primitive together with the box the builder uses for it.
///
/// The box starts out as the primitive's bounds and may be replaced by a tighter one when a spatial split clips the
/// primitive; clipping produces new references and never edits one that is shared.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimRef {
    pub bounds: BoundingBox,
    pub id: PrimitiveId,
}

impl PrimRef {
    #[inline(always)]
    pub fn new(bounds: BoundingBox, id: PrimitiveId) -> Self {
        Self { bounds, id }
    }
}

/// Number of `1 << log_block_size` sized blocks needed to hold `count` primitives.
#[inline(always)]
pub fn block_count(count: usize, log_block_size: u32) -> usize {
    (count + (1 << log_block_size) - 1) >> log_block_size
}

/// Aggregate summary of a set of primitive references.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimInfo {
    pub count: usize,
    /// Union of the reference boxes.
    pub geom_bounds: BoundingBox,
    /// Bounds of the reference box centers, stored doubled (see [`BoundingBox::center2`]).
    pub centroid_bounds: BoundingBox,
}

impl Default for PrimInfo {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl PrimInfo {
    pub const EMPTY: Self = Self {
        count: 0,
        geom_bounds: BoundingBox::EMPTY,
        centroid_bounds: BoundingBox::EMPTY,
    };

    #[inline(always)]
    pub fn add(&mut self, bounds: &BoundingBox) {
        self.count += 1;
        self.geom_bounds.merge(bounds);
        self.centroid_bounds.merge_point(bounds.center2());
    }

    #[inline(always)]
    pub fn merge(&mut self, other: &PrimInfo) {
        self.count += other.count;
        self.geom_bounds.merge(&other.geom_bounds);
        self.centroid_bounds.merge(&other.centroid_bounds);
    }

    /// Summarizes a sequence of references.
    pub fn from_refs<'a, I: IntoIterator<Item = &'a PrimRef>>(refs: I) -> Self {
        let mut info = Self::EMPTY;
        for prim in refs {
            info.add(&prim.bounds);
        }
        info
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.count
    }

    /// SAH cost of keeping every reference in a single leaf, before the intersection cost factor is applied.
    #[inline(always)]
    pub fn leaf_sah(&self, log_block_size: u32) -> f32 {
        self.geom_bounds.safe_half_area() * block_count(self.count, log_block_size) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn block_count_rounds_up() {
        assert_eq!(block_count(0, 2), 0);
        assert_eq!(block_count(1, 2), 1);
        assert_eq!(block_count(4, 2), 1);
        assert_eq!(block_count(5, 2), 2);
    }

    #[test]
    fn info_tracks_doubled_centroids() {
        let refs = [
            PrimRef::new(BoundingBox::new(Vec3::ZERO, Vec3::ONE), PrimitiveId(0)),
            PrimRef::new(
                BoundingBox::new(Vec3::splat(2.0), Vec3::splat(4.0)),
                PrimitiveId(1),
            ),
        ];
        let info = PrimInfo::from_refs(&refs);
        assert_eq!(info.count, 2);
        assert_eq!(info.geom_bounds, BoundingBox::new(Vec3::ZERO, Vec3::splat(4.0)));
        assert_eq!(info.centroid_bounds.min, Vec3::ONE);
        assert_eq!(info.centroid_bounds.max, Vec3::splat(6.0));
    }

    #[test]
    fn merge_equals_combined_scan() {
        let a = PrimRef::new(BoundingBox::new(Vec3::ZERO, Vec3::ONE), PrimitiveId(0));
        let b = PrimRef::new(BoundingBox::new(-Vec3::ONE, Vec3::ZERO), PrimitiveId(1));
        let mut merged = PrimInfo::from_refs([&a]);
        merged.merge(&PrimInfo::from_refs([&b]));
        assert_eq!(merged, PrimInfo::from_refs([&a, &b]));
    }

    #[test]
    fn leaf_sah_scales_with_blocks() {
        let refs: Vec<_> = (0..5)
            .map(|i| PrimRef::new(BoundingBox::new(Vec3::ZERO, Vec3::ONE), PrimitiveId(i)))
            .collect();
        let info = PrimInfo::from_refs(&refs);
        assert_eq!(info.leaf_sah(2), 3.0 * 2.0);
    }
}
