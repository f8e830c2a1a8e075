use super::build_options::BuildOptions;
use super::node::NodeRef;
use super::tree::Tree;
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::containment_type::ContainmentType;

/// Shape and quality summary of a tree.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TreeStatistics {
    pub node_count: usize,
    pub leaf_count: usize,
    /// Primitive references across all leaves.
    pub primitive_references: usize,
    /// Payload records across all leaves. Smaller than `primitive_references` when the source packs primitives.
    pub payload_records: usize,
    /// Depth of the deepest leaf; the root sits at depth 0.
    pub maximum_depth: usize,
    pub allocated_bytes: usize,
    /// See [`Tree::measure_cost_metric`].
    pub cost_metric: f32,
}

impl<P> Tree<P> {
    /// Measures the SAH cost metric of the tree. Lower is better.
    ///
    /// Every inner node contributes its half area, every leaf its half area times its primitive count; the sum is
    /// normalized by the half area of the tree bounds.
    pub fn measure_cost_metric(&self) -> f32 {
        let root_metric = self.bounds.safe_half_area();
        if root_metric <= 0.0 {
            return 0.0;
        }
        let mut total_cost = 0.0f32;
        let mut stack = vec![(self.root, self.bounds)];
        while let Some((node_ref, bounds)) = stack.pop() {
            match node_ref {
                NodeRef::Leaf { primitives, .. } => total_cost += bounds.safe_half_area() * primitives as f32,
                NodeRef::Inner(index) | NodeRef::Barrier(index) => {
                    total_cost += bounds.safe_half_area();
                    let node = self.nodes.get(index);
                    stack.extend(node.occupied().iter().map(|child| (child.node_ref, child.bounds)));
                }
            }
        }
        total_cost / root_metric
    }

    /// Computes the maximum depth of the tree.
    pub fn compute_maximum_depth(&self) -> usize {
        let mut maximum = 0;
        let mut stack = vec![(self.root, 0usize)];
        while let Some((node_ref, depth)) = stack.pop() {
            maximum = maximum.max(depth);
            if let Some(index) = node_ref.node_index() {
                let node = self.nodes.get(index);
                stack.extend(node.occupied().iter().map(|child| (child.node_ref, depth + 1)));
            }
        }
        maximum
    }

    pub fn statistics(&self) -> TreeStatistics {
        let mut statistics = TreeStatistics {
            allocated_bytes: self.allocated_byte_count(),
            maximum_depth: self.compute_maximum_depth(),
            cost_metric: self.measure_cost_metric(),
            ..TreeStatistics::default()
        };
        let mut stack = vec![self.root];
        while let Some(node_ref) = stack.pop() {
            match node_ref {
                NodeRef::Leaf { records: 0, .. } => {}
                NodeRef::Leaf {
                    records, primitives, ..
                } => {
                    statistics.leaf_count += 1;
                    statistics.primitive_references += primitives as usize;
                    statistics.payload_records += records as usize;
                }
                NodeRef::Inner(index) | NodeRef::Barrier(index) => {
                    statistics.node_count += 1;
                    stack.extend(self.nodes.get(index).occupied().iter().map(|child| child.node_ref));
                }
            }
        }
        statistics
    }

    fn validate_node(&self, node_ref: NodeRef, expected_bounds: &BoundingBox) -> usize {
        match node_ref {
            NodeRef::Barrier(index) => panic!("Barrier reference to node {index} left in a finished tree."),
            NodeRef::Leaf { primitives, .. } => primitives as usize,
            NodeRef::Inner(index) => {
                let node = self.nodes.get(index);
                assert!(node.is_compact(), "Node {index} has occupied slots after an empty one.");
                assert!(node.child_count() > 0, "Node {index} has no children.");
                let mut found = 0;
                for (slot, child) in node.occupied().iter().enumerate() {
                    assert!(
                        expected_bounds.contains(&child.bounds) == ContainmentType::Contains,
                        "Child {slot} of node {index} with bounds {} escapes its parent's bounds {expected_bounds}.",
                        child.bounds
                    );
                    found += self.validate_node(child.node_ref, &child.bounds);
                }
                found
            }
        }
    }

    /// Validates the tree structure, panicking on any inconsistency.
    pub fn validate(&self) {
        if self.root.is_empty() {
            assert_eq!(self.num_primitives, 0, "Empty tree claims {} primitives.", self.num_primitives);
            return;
        }
        let found = self.validate_node(self.root, &self.bounds);
        assert_eq!(
            found, self.num_primitives,
            "{found} references found in leaves, expected {}.",
            self.num_primitives
        );
    }

    /// Reports a finished build through the log, as far as `options` asks for it.
    pub(crate) fn log_build_summary(&self, options: &BuildOptions) {
        if options.verbose < 2 && !options.benchmark {
            return;
        }
        let statistics = self.statistics();
        let seconds = self.build_statistics.elapsed.as_secs_f64();
        if options.verbose >= 2 {
            log::info!(
                "BVH8 built in {:.3} ms: {} nodes, {} leaves, {} references ({} replications), depth {}, {} bytes, \
                 cost {:.3}, {} top-level tasks.",
                seconds * 1000.0,
                statistics.node_count,
                statistics.leaf_count,
                statistics.primitive_references,
                self.build_statistics.replications,
                statistics.maximum_depth,
                statistics.allocated_bytes,
                statistics.cost_metric,
                self.build_statistics.top_level_tasks
            );
        }
        if options.benchmark {
            let primitives_per_second = if seconds > 0.0 {
                self.num_primitives as f64 / seconds
            } else {
                0.0
            };
            log::info!(
                "BENCHMARK_BUILD {seconds} {primitives_per_second} {} {}",
                statistics.cost_metric,
                statistics.allocated_bytes
            );
        }
    }
}
