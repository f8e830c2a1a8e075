//! End to end builds over generated scenes.

use std::collections::HashMap;

use glam::Vec3;

use super::build_options::BuildOptions;
use super::error::BuildError;
use super::node::NodeRef;
use super::tree::Tree;
use super::tree_traversal::TreeVisitor;
use crate::primitives::{BoundsList, PrimitiveId, PrimitiveSource, TriangleMesh};
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::containment_type::ContainmentType;
use crate::utilities::thread_dispatcher::ScopedThreadDispatcher;

struct XorShift(u64);

impl XorShift {
    fn next_u32(&mut self) -> u32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 32) as u32
    }

    fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    fn next_vec3(&mut self, scale: f32) -> Vec3 {
        Vec3::new(self.next_f32(), self.next_f32(), self.next_f32()) * scale
    }
}

fn random_boxes(count: usize, domain: f32, max_extent: f32, seed: u64) -> Vec<BoundingBox> {
    let mut random = XorShift(seed);
    (0..count)
        .map(|_| {
            let min = random.next_vec3(domain);
            BoundingBox::new(min, min + Vec3::splat(0.01) + random.next_vec3(max_extent))
        })
        .collect()
}

fn unit_cubes(count: usize, domain: f32, seed: u64) -> Vec<BoundingBox> {
    let mut random = XorShift(seed);
    (0..count)
        .map(|_| {
            let min = random.next_vec3(domain);
            BoundingBox::new(min, min + Vec3::ONE)
        })
        .collect()
}

/// Grid of `size` x `size` quads in the xz plane with a bumpy height, two triangles per quad.
fn terrain(size: u32) -> TriangleMesh {
    let mut vertices = Vec::new();
    for z in 0..=size {
        for x in 0..=size {
            let height = ((x as f32) * 0.3).sin() * ((z as f32) * 0.2).cos() * 4.0;
            vertices.push(Vec3::new(x as f32, height, z as f32));
        }
    }
    let row = size + 1;
    let mut indices = Vec::new();
    for z in 0..size {
        for x in 0..size {
            let corner = z * row + x;
            indices.push([corner, corner + 1, corner + row]);
            indices.push([corner + 1, corner + row + 1, corner + row]);
        }
    }
    TriangleMesh::new(vertices, indices)
}

/// Number of times each id shows up across all leaves.
fn id_occurrences(tree: &Tree<PrimitiveId>) -> HashMap<PrimitiveId, usize> {
    let mut occurrences = HashMap::new();
    for leaf in tree.leaf_payloads() {
        for id in leaf {
            *occurrences.entry(*id).or_insert(0) += 1;
        }
    }
    occurrences
}

fn sorted_leaves(tree: &Tree<PrimitiveId>) -> Vec<Vec<PrimitiveId>> {
    let mut leaves: Vec<Vec<PrimitiveId>> = tree.leaf_payloads().into_iter().map(|leaf| leaf.to_vec()).collect();
    leaves.sort();
    leaves
}

struct LeafBoundsUnion(BoundingBox);

impl<P> TreeVisitor<P> for LeafBoundsUnion {
    fn visit_leaf(&mut self, bounds: &BoundingBox, _payload: &[P]) {
        self.0.merge(bounds);
    }
}

fn leaf_bounds_union<P>(tree: &Tree<P>) -> BoundingBox {
    let mut union = LeafBoundsUnion(BoundingBox::EMPTY);
    tree.traverse_read_only(&mut union);
    union.0
}

fn parallel_options(thread_count: usize) -> BuildOptions {
    BuildOptions {
        thread_count,
        single_threaded_threshold: 1000,
        task_size_threshold: 256,
        ..BuildOptions::default()
    }
}

/// Source that stores leaves as blocks of four ids, padding the last block of a leaf with `UNUSED_LANE`.
struct PackedBoxes(BoundsList);

const UNUSED_LANE: u32 = u32::MAX;

impl PrimitiveSource for PackedBoxes {
    type Payload = [u32; 4];

    fn count(&self) -> usize {
        self.0.count()
    }

    fn bounds_of(&self, id: PrimitiveId) -> BoundingBox {
        self.0.bounds_of(id)
    }

    fn fill_leaf(&self, ids: &[PrimitiveId], sink: &mut Vec<[u32; 4]>) {
        for block in ids.chunks(4) {
            let mut record = [UNUSED_LANE; 4];
            for (lane, id) in record.iter_mut().zip(block) {
                *lane = id.0;
            }
            sink.push(record);
        }
    }
}

fn options_max_leaf() -> usize {
    BuildOptions::default().effective_max_leaf_size()
}

#[test_log::test]
fn three_primitives_fit_in_a_single_leaf() {
    let source = BoundsList::new(random_boxes(3, 10.0, 1.0, 7));
    let tree = Tree::build(&source, &BuildOptions::default()).unwrap();
    assert!(tree.root.is_leaf());
    assert!(matches!(tree.root, NodeRef::Leaf { primitives: 3, .. }));
    assert_eq!(tree.num_primitives, 3);
    assert_eq!(sorted_leaves(&tree), vec![vec![PrimitiveId(0), PrimitiveId(1), PrimitiveId(2)]]);
    tree.validate();
}

#[test_log::test]
fn empty_source_builds_an_empty_tree() {
    let source = BoundsList::new(Vec::new());
    let tree = Tree::build(&source, &BuildOptions::high_quality(1.5)).unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.num_primitives, 0);
    assert!(tree.leaf_payloads().is_empty());
    tree.validate();
}

#[test_log::test]
fn unit_cubes_with_spatial_splits_stay_within_the_replication_bound() {
    let cubes = unit_cubes(200_000, 1000.0, 0x5eed);
    let source = BoundsList::new(cubes.clone());
    let options = BuildOptions {
        thread_count: 4,
        ..BuildOptions::high_quality(1.2)
    };
    let tree = Tree::build(&source, &options).unwrap();
    assert!(tree.num_primitives >= 200_000);
    assert!(tree.num_primitives <= 240_000, "{} references", tree.num_primitives);
    assert_eq!(tree.num_primitives - 200_000, tree.build_statistics.replications);
    assert!(!tree.build_statistics.single_threaded);
    tree.validate();

    assert!(cubes.iter().all(|cube| tree.bounds.contains(cube) == ContainmentType::Contains));
    assert_eq!(leaf_bounds_union(&tree), tree.bounds);
    let occurrences = id_occurrences(&tree);
    assert_eq!(occurrences.len(), 200_000);
    assert_eq!(occurrences.values().sum::<usize>(), tree.num_primitives);
}

#[test_log::test]
fn identical_degenerate_boxes_terminate() {
    let point = BoundingBox::from_point(Vec3::new(1.0, 2.0, 3.0));
    let source = BoundsList::new(vec![point; 5000]);
    let tree = Tree::build(&source, &BuildOptions::high_quality(1.5)).unwrap();
    assert_eq!(tree.num_primitives, 5000);
    assert_eq!(tree.build_statistics.replications, 0);
    tree.validate();
    let statistics = tree.statistics();
    assert!(statistics.leaf_count >= 5000 / options_max_leaf());
    assert!(id_occurrences(&tree).values().all(|&count| count == 1));
}

#[test_log::test]
fn identical_boxes_terminate_in_the_parallel_path() {
    let unit = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
    let source = BoundsList::new(vec![unit; 10_000]);
    let tree = Tree::build(&source, &parallel_options(4)).unwrap();
    assert_eq!(tree.num_primitives, 10_000);
    tree.validate();
}

#[test_log::test]
fn every_id_appears_exactly_once_without_spatial_splits() {
    let source = BoundsList::new(random_boxes(30_000, 100.0, 2.0, 11));
    let tree = Tree::build(&source, &parallel_options(4)).unwrap();
    assert_eq!(tree.num_primitives, 30_000);
    let occurrences = id_occurrences(&tree);
    assert_eq!(occurrences.len(), 30_000);
    assert!(occurrences.values().all(|&count| count == 1));
    assert_eq!(leaf_bounds_union(&tree), tree.bounds);
    tree.validate();
}

#[test_log::test]
fn leaf_sets_do_not_depend_on_the_thread_count() {
    let source = BoundsList::new(random_boxes(20_000, 50.0, 1.5, 42));
    let serial = Tree::build(
        &source,
        &BuildOptions {
            thread_count: 1,
            ..BuildOptions::default()
        },
    )
    .unwrap();
    assert!(serial.build_statistics.single_threaded);
    let expected = sorted_leaves(&serial);
    for thread_count in [1, 2, 4] {
        let dispatcher = ScopedThreadDispatcher::new(thread_count);
        let tree = Tree::build_with_dispatcher(&source, &parallel_options(thread_count), &dispatcher).unwrap();
        assert!(!tree.build_statistics.single_threaded);
        assert!(tree.build_statistics.top_level_tasks > 0);
        assert_eq!(sorted_leaves(&tree), expected, "{thread_count} threads");
        assert_eq!(tree.bounds, serial.bounds);
    }
}

#[test_log::test]
fn top_level_phase_stops_at_the_task_target() {
    let source = BoundsList::new(random_boxes(40_000, 200.0, 1.0, 3));
    let options = BuildOptions {
        top_level_task_target: Some(16),
        ..parallel_options(2)
    };
    let tree = Tree::build(&source, &options).unwrap();
    let tasks = tree.build_statistics.top_level_tasks;
    // One expansion can overshoot the target by up to seven tasks.
    assert!((16..16 + 8).contains(&tasks), "{tasks} top-level tasks");
    tree.validate();
}

#[test_log::test]
fn triangle_mesh_builds_with_spatial_splits() {
    let mesh = terrain(100);
    let triangle_count = mesh.count();
    let options = BuildOptions {
        thread_count: 4,
        single_threaded_threshold: 5000,
        task_size_threshold: 1000,
        ..BuildOptions::high_quality(1.3)
    };
    let tree = Tree::build(&mesh, &options).unwrap();
    assert!(tree.num_primitives >= triangle_count);
    assert!(tree.num_primitives as f32 <= 1.3 * triangle_count as f32);
    tree.validate();

    let mut seen = vec![false; triangle_count];
    for leaf in tree.leaf_payloads() {
        for triangle in leaf {
            let [v0, v1, v2] = mesh.triangle_vertices(triangle.prim_id);
            assert_eq!((triangle.v0, triangle.v1, triangle.v2), (v0, v1, v2));
            seen[triangle.prim_id.index()] = true;
        }
    }
    assert!(seen.iter().all(|&seen| seen));
}

#[test_log::test]
fn volume_query_reports_every_overlapping_box() {
    let boxes = random_boxes(5000, 100.0, 3.0, 99);
    let source = BoundsList::new(boxes.clone());
    let tree = Tree::build(&source, &BuildOptions::default()).unwrap();
    let query = BoundingBox::new(Vec3::splat(40.0), Vec3::splat(55.0));
    let mut found = Vec::new();
    tree.volume_query(&query, |id| found.push(*id));
    found.sort_unstable();
    for (index, bounds) in boxes.iter().enumerate() {
        if bounds.intersects(&query) {
            assert!(found.binary_search(&PrimitiveId(index as u32)).is_ok(), "missed box {index}");
        }
    }
}

#[test_log::test]
fn max_objects_to_consider_truncates_the_source() {
    let source = BoundsList::new(random_boxes(1000, 10.0, 1.0, 5));
    let options = BuildOptions {
        max_objects_to_consider: Some(10),
        ..BuildOptions::default()
    };
    let tree = Tree::build(&source, &options).unwrap();
    assert_eq!(tree.num_primitives, 10);
    assert!(id_occurrences(&tree).keys().all(|id| id.0 < 10));
}

#[test_log::test]
fn invalid_options_are_rejected() {
    let source = BoundsList::new(random_boxes(10, 10.0, 1.0, 1));
    let options = BuildOptions::high_quality(0.5);
    assert!(matches!(
        Tree::build(&source, &options),
        Err(BuildError::InvalidOptions(_))
    ));
}

#[test_log::test]
fn depth_limit_aborts_the_parallel_build() {
    let unit = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
    let source = BoundsList::new(vec![unit; 5000]);
    let options = BuildOptions {
        max_leaf_size: 4,
        max_build_depth: 0,
        max_build_depth_leaf: 1,
        ..parallel_options(2)
    };
    assert!(matches!(
        Tree::build(&source, &options),
        Err(BuildError::DepthExceeded { .. })
    ));
}

/// Box source whose leaves cannot be filled.
struct UnfillableBoxes(BoundsList);

impl PrimitiveSource for UnfillableBoxes {
    type Payload = PrimitiveId;

    fn count(&self) -> usize {
        self.0.count()
    }

    fn bounds_of(&self, id: PrimitiveId) -> BoundingBox {
        self.0.bounds_of(id)
    }

    fn fill_leaf(&self, _ids: &[PrimitiveId], _sink: &mut Vec<PrimitiveId>) {
        panic!("leaf storage unavailable");
    }
}

#[test_log::test]
fn panicking_workers_fail_the_build() {
    let source = UnfillableBoxes(BoundsList::new(random_boxes(4000, 100.0, 1.0, 8)));
    let options = BuildOptions {
        single_threaded_threshold: 500,
        task_size_threshold: 4000,
        top_level_task_target: Some(2),
        ..parallel_options(2)
    };
    assert!(matches!(
        Tree::build(&source, &options),
        Err(BuildError::WorkerPanicked)
    ));
}

#[test_log::test]
fn statistics_describe_the_built_tree() {
    let source = BoundsList::new(random_boxes(2000, 30.0, 1.0, 17));
    let options = BuildOptions {
        verbose: 2,
        benchmark: true,
        ..BuildOptions::default()
    };
    let tree = Tree::build(&source, &options).unwrap();
    let statistics = tree.statistics();
    assert_eq!(statistics.primitive_references, 2000);
    assert_eq!(statistics.payload_records, 2000);
    assert!(statistics.node_count > 0);
    assert!(statistics.leaf_count >= 2000 / options_max_leaf());
    assert!(statistics.maximum_depth >= 2);
    assert!(statistics.allocated_bytes > 0);
    assert!(statistics.cost_metric > 1.0);
    assert_eq!(statistics.maximum_depth, tree.compute_maximum_depth());
}

#[test_log::test]
fn packed_leaf_records_account_for_every_primitive() {
    let source = PackedBoxes(BoundsList::new(random_boxes(1000, 20.0, 1.0, 23)));
    let tree = Tree::build(&source, &BuildOptions::default()).unwrap();
    tree.validate();
    assert_eq!(tree.num_primitives, 1000);

    let statistics = tree.statistics();
    assert_eq!(statistics.primitive_references, 1000);
    assert!(statistics.payload_records < 1000);
    assert!(statistics.payload_records >= 1000 / 4);

    let mut ids: Vec<u32> = tree
        .leaf_payloads()
        .into_iter()
        .flatten()
        .flat_map(|record| record.iter().copied())
        .filter(|&lane| lane != UNUSED_LANE)
        .collect();
    assert_eq!(ids.len(), 1000);
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 1000);
}
