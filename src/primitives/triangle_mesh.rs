use glam::Vec3;

use super::{PrimitiveId, PrimitiveSource};
use crate::utilities::bounding_box::BoundingBox;

/// Triangle record stored in leaves.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub prim_id: PrimitiveId,
}

/// Indexed triangle mesh.
#[derive(Clone, Debug, Default)]
pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Self {
        Self { vertices, indices }
    }

    #[inline]
    pub fn triangle_vertices(&self, id: PrimitiveId) -> [Vec3; 3] {
        let [a, b, c] = self.indices[id.index()];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }
}

impl PrimitiveSource for TriangleMesh {
    type Payload = Triangle;

    #[inline]
    fn count(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    fn bounds_of(&self, id: PrimitiveId) -> BoundingBox {
        BoundingBox::from_points(&self.triangle_vertices(id))
    }

    fn fill_leaf(&self, ids: &[PrimitiveId], sink: &mut Vec<Triangle>) {
        sink.extend(ids.iter().map(|&id| {
            let [v0, v1, v2] = self.triangle_vertices(id);
            Triangle {
                v0,
                v1,
                v2,
                prim_id: id,
            }
        }));
    }

    /// Clips the triangle's edges against the plane, so each side only covers the part of the triangle that is
    /// actually there. Both results are restricted to `bounds`, which may already have been clipped by earlier splits.
    fn split_bounds(
        &self,
        id: PrimitiveId,
        bounds: &BoundingBox,
        axis: usize,
        position: f32,
    ) -> (BoundingBox, BoundingBox) {
        let vertices = self.triangle_vertices(id);
        let mut left = BoundingBox::EMPTY;
        let mut right = BoundingBox::EMPTY;
        for i in 0..3 {
            let v0 = vertices[i];
            let v1 = vertices[(i + 1) % 3];
            let p0 = v0[axis];
            let p1 = v1[axis];
            if p0 <= position {
                left.merge_point(v0);
            }
            if p0 >= position {
                right.merge_point(v0);
            }
            if (p0 < position && position < p1) || (p1 < position && position < p0) {
                let t = (position - p0) / (p1 - p0);
                let mut crossing = v0.lerp(v1, t);
                crossing[axis] = position;
                left.merge_point(crossing);
                right.merge_point(crossing);
            }
        }
        (left.intersection(bounds), right.intersection(bounds))
    }
}
