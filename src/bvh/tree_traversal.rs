use super::node::NodeRef;
use super::tree::Tree;
use crate::utilities::bounding_box::BoundingBox;

/// Receives the nodes and leaves of a read-only traversal.
pub trait TreeVisitor<P> {
    /// Called before descending into an inner node, with the bounds its parent stores for it. Returning `false`
    /// skips the node's subtree.
    fn enter_node(&mut self, bounds: &BoundingBox, depth: usize) -> bool {
        let _ = (bounds, depth);
        true
    }

    /// Called once per non-empty leaf with its bounds and payload records.
    fn visit_leaf(&mut self, bounds: &BoundingBox, payload: &[P]);
}

impl<P> Tree<P> {
    /// Depth first traversal starting at the root. Children are visited in slot order.
    pub fn traverse_read_only<V: TreeVisitor<P>>(&self, visitor: &mut V) {
        let mut stack = vec![(self.root, self.bounds, 0usize)];
        while let Some((node_ref, bounds, depth)) = stack.pop() {
            match node_ref {
                NodeRef::Leaf { records: 0, .. } => {}
                NodeRef::Leaf { .. } => visitor.visit_leaf(&bounds, self.leaf(node_ref)),
                NodeRef::Inner(index) | NodeRef::Barrier(index) => {
                    debug_assert!(!node_ref.is_barrier(), "Finished trees hold no barriers.");
                    if !visitor.enter_node(&bounds, depth) {
                        continue;
                    }
                    let node = self.nodes.get(index);
                    for child in node.occupied().iter().rev() {
                        stack.push((child.node_ref, child.bounds, depth + 1));
                    }
                }
            }
        }
    }

    /// Invokes `on_payload` for every payload record in a leaf whose bounds overlap `bounds`.
    pub fn volume_query<F: FnMut(&P)>(&self, bounds: &BoundingBox, on_payload: F) {
        struct Overlaps<'b, F> {
            bounds: &'b BoundingBox,
            on_payload: F,
        }

        impl<P, F: FnMut(&P)> TreeVisitor<P> for Overlaps<'_, F> {
            fn enter_node(&mut self, bounds: &BoundingBox, _depth: usize) -> bool {
                bounds.intersects(self.bounds)
            }

            fn visit_leaf(&mut self, bounds: &BoundingBox, payload: &[P]) {
                if bounds.intersects(self.bounds) {
                    payload.iter().for_each(&mut self.on_payload);
                }
            }
        }

        self.traverse_read_only(&mut Overlaps { bounds, on_payload });
    }

    /// Payload records of every leaf, in traversal order.
    pub fn leaf_payloads(&self) -> Vec<&[P]> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.root];
        while let Some(node_ref) = stack.pop() {
            match node_ref {
                NodeRef::Leaf { records: 0, .. } => {}
                NodeRef::Leaf { .. } => leaves.push(self.leaf(node_ref)),
                NodeRef::Inner(index) | NodeRef::Barrier(index) => {
                    let node = self.nodes.get(index);
                    stack.extend(node.occupied().iter().rev().map(|child| child.node_ref));
                }
            }
        }
        leaves
    }
}
