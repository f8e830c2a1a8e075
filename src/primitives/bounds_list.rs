use super::{PrimitiveId, PrimitiveSource};
use crate::utilities::bounding_box::BoundingBox;

/// Primitive source made of bare bounding boxes. Leaves store the ids of the boxes they contain.
#[derive(Clone, Debug, Default)]
pub struct BoundsList {
    pub bounds: Vec<BoundingBox>,
}

impl BoundsList {
    pub fn new(bounds: Vec<BoundingBox>) -> Self {
        Self { bounds }
    }
}

impl From<Vec<BoundingBox>> for BoundsList {
    fn from(bounds: Vec<BoundingBox>) -> Self {
        Self::new(bounds)
    }
}

impl PrimitiveSource for BoundsList {
    type Payload = PrimitiveId;

    #[inline]
    fn count(&self) -> usize {
        self.bounds.len()
    }

    #[inline]
    fn bounds_of(&self, id: PrimitiveId) -> BoundingBox {
        self.bounds[id.index()]
    }

    fn fill_leaf(&self, ids: &[PrimitiveId], sink: &mut Vec<PrimitiveId>) {
        sink.extend_from_slice(ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn default_split_clips_the_box() {
        let list = BoundsList::new(vec![BoundingBox::new(Vec3::ZERO, Vec3::splat(2.0))]);
        let (left, right) = list.split_bounds(PrimitiveId(0), &list.bounds[0], 0, 0.5);
        assert_eq!(left.max.x, 0.5);
        assert_eq!(right.min.x, 0.5);
        assert_eq!(left.max.y, 2.0);
    }

    #[test]
    fn leaves_receive_ids_verbatim() {
        let list = BoundsList::default();
        let mut sink = Vec::new();
        list.fill_leaf(&[PrimitiveId(3), PrimitiveId(7)], &mut sink);
        assert_eq!(sink, vec![PrimitiveId(3), PrimitiveId(7)]);
    }
}
