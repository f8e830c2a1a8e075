//! Primitive sources: the geometry the builder indexes.
//!
//! The builder never looks at geometry directly. It asks a [`PrimitiveSource`] for the number of primitives, the
//! bounding box of each one, and, once per finished leaf, for the payload records the leaf should store.

mod bounds_list;
mod triangle_mesh;

pub use bounds_list::BoundsList;
pub use triangle_mesh::{Triangle, TriangleMesh};

use crate::utilities::bounding_box::BoundingBox;
use std::fmt;

/// Identifier of a primitive within its source. Ids are dense in `[0, count)`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct PrimitiveId(pub u32);

impl PrimitiveId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PrimitiveId<{}>", self.0)
    }
}

/// Geometry the builder can construct a tree over.
///
/// Implementations are shared by every build worker, hence `Sync`.
pub trait PrimitiveSource: Sync {
    /// Record type stored in leaves.
    type Payload: Send;

    /// Number of primitives in the source.
    fn count(&self) -> usize;

    /// Bounding box of a primitive.
    fn bounds_of(&self, id: PrimitiveId) -> BoundingBox;

    /// Appends the payload records of one leaf to `sink`.
    ///
    /// A record may pack several ids, e.g. blocks of `1 << log_block_size` triangles; it must write at least one record
    /// for a non-empty `ids` and never more records than ids. Invoked exactly once per leaf, with `ids` sorted ascending. A primitive replicated by spatial splits shows up in
    /// several leaves and is filled once in each of them.
    fn fill_leaf(&self, ids: &[PrimitiveId], sink: &mut Vec<Self::Payload>);

    /// Splits the part of primitive `id` lying inside `bounds` by the plane `axis = position`.
    ///
    /// Returns the boxes of the part below and above the plane. Either may be empty if the primitive does not reach
    /// that side. The default clips the box itself; sources with real geometry can return tighter boxes.
    fn split_bounds(
        &self,
        id: PrimitiveId,
        bounds: &BoundingBox,
        axis: usize,
        position: f32,
    ) -> (BoundingBox, BoundingBox) {
        let _ = id;
        (
            bounds.clipped_max(axis, position),
            bounds.clipped_min(axis, position),
        )
    }
}
