use super::node::{Node, NodeRef};
use super::tree::Tree;

impl<P> Tree<P> {
    /// Finalizes the node layout after the build phases joined.
    ///
    /// Walks down from the root through the nodes created by one-level expansion. Every such node is copied into a
    /// freshly allocated slot, parents before children, with its empty slots compacted away. Barrier references mark
    /// subtrees finished by a single task; they are turned back into plain inner references and their nodes stay
    /// where the task put them.
    pub(crate) fn layout_top_nodes(&mut self) {
        self.root = self.layout_top_node(self.root);
        debug_assert!(!self.root.is_barrier());
    }

    fn layout_top_node(&mut self, node_ref: NodeRef) -> NodeRef {
        match node_ref {
            NodeRef::Barrier(_) => node_ref.without_barrier(),
            NodeRef::Inner(index) => {
                let target = self.nodes.alloc(Node::EMPTY);
                let mut node = *self.nodes.get(index);
                for child in node.children.iter_mut() {
                    child.node_ref = self.layout_top_node(child.node_ref);
                }
                node.compact();
                *self.nodes.get_mut(target) = node;
                NodeRef::Inner(target)
            }
            leaf => leaf,
        }
    }
}
