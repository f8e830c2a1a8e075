//! Parallel builder for 8-wide bounding volume hierarchies.
//!
//! ```
//! use glam::Vec3;
//! use rust_bvh8::bvh::{BuildOptions, Tree};
//! use rust_bvh8::primitives::BoundsList;
//! use rust_bvh8::utilities::BoundingBox;
//!
//! let boxes = (0..100)
//!     .map(|i| BoundingBox::new(Vec3::splat(i as f32), Vec3::splat(i as f32 + 1.0)))
//!     .collect();
//! let tree = Tree::build(&BoundsList::new(boxes), &BuildOptions::default()).unwrap();
//! assert_eq!(tree.num_primitives, 100);
//! ```

pub mod bvh;
pub mod primitives;
pub mod utilities;
