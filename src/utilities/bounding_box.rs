use glam::Vec3;
use std::fmt;

use super::containment_type::ContainmentType;

/// Provides simple axis-aligned bounding box functionality.
///
/// An empty box is represented with `min` at `f32::MAX` and `max` at `-f32::MAX` so that merging any
/// box or point into it yields that box or point.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Location with the lowest X, Y, and Z coordinates in the axis-aligned bounding box.
    pub min: Vec3,
    /// Location with the highest X, Y, and Z coordinates in the axis-aligned bounding box.
    pub max: Vec3,
}

impl Default for BoundingBox {
    #[inline]
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    /// Box that contains nothing. Merging into it returns the merged operand.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(-f32::MAX),
    };

    /// Constructs a bounding box from the specified minimum and maximum.
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Creates a bounding box containing a single point.
    #[inline]
    pub fn from_point(point: Vec3) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Creates the smallest possible bounding box that contains a list of points.
    pub fn from_points(points: &[Vec3]) -> Self {
        points
            .iter()
            .fold(Self::EMPTY, |bounds, point| bounds.merged_point(*point))
    }

    /// Whether the box contains no volume and no point, i.e. `min > max` on any axis.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    /// Computes a bounding box which contains both boxes.
    #[inline]
    pub fn merged(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grows this box to contain `other`.
    #[inline]
    pub fn merge(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Computes a bounding box which contains this box and a point.
    #[inline]
    pub fn merged_point(&self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    /// Grows this box to contain `point`.
    #[inline]
    pub fn merge_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Computes the overlapping region of two boxes. The result may be empty.
    #[inline]
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// Determines if a bounding box intersects another bounding box. Touching boxes intersect.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        let no_intersection_on_axes = self.max.cmplt(other.min) | other.max.cmplt(self.min);
        !no_intersection_on_axes.any()
    }

    /// Classifies how `other` relates to this box.
    #[inline]
    pub fn contains(&self, other: &BoundingBox) -> ContainmentType {
        if !self.intersects(other) {
            ContainmentType::Disjoint
        } else if self.min.cmple(other.min).all() && self.max.cmpge(other.max).all() {
            ContainmentType::Contains
        } else {
            ContainmentType::Intersects
        }
    }

    /// Computes the extent of the box along each axis.
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Twice the center of the box. Used as the binning centroid so that no multiply is needed.
    #[inline]
    pub fn center2(&self) -> Vec3 {
        self.min + self.max
    }

    /// Half of the surface area. This is the metric used throughout the SAH computations.
    #[inline]
    pub fn half_area(&self) -> f32 {
        let offset = self.max - self.min;
        offset.x * offset.y + offset.y * offset.z + offset.z * offset.x
    }

    /// Half area that treats empty boxes as having no area instead of a negative or huge one.
    #[inline]
    pub fn safe_half_area(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            self.half_area()
        }
    }

    /// Returns the box with its maximum on `axis` lowered to `position`.
    #[inline]
    pub fn clipped_max(&self, axis: usize, position: f32) -> Self {
        let mut result = *self;
        result.max[axis] = result.max[axis].min(position);
        result
    }

    /// Returns the box with its minimum on `axis` raised to `position`.
    #[inline]
    pub fn clipped_min(&self, axis: usize, position: f32) -> Self {
        let mut result = *self;
        result.min[axis] = result.min[axis].max(position);
        result
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.min, self.max)
    }
}
