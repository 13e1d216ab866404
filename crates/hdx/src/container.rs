//! Canonical container

use hdx_dom::{DomTree, NodeId, SharedTree};

use crate::{ResourceType, ResourceTypeRegistry};

/// A canonical HDX tree and its container root
#[derive(Debug)]
pub struct Container {
    tree: DomTree,
    root: NodeId,
    /// Foreign document the tree shadows, when the container owns it
    source: Option<SharedTree>,
}

impl Container {
    pub(crate) fn new(tree: DomTree, root: NodeId) -> Self {
        Self {
            tree,
            root,
            source: None,
        }
    }

    /// Keep the shadowed foreign document alive as long as the container
    pub(crate) fn keep_source(mut self, source: SharedTree) -> Self {
        self.source = Some(source);
        self
    }

    /// Foreign document owned by this container, if any
    pub fn source(&self) -> Option<&SharedTree> {
        self.source.as_ref()
    }

    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut DomTree {
        &mut self.tree
    }

    /// The container element
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn into_tree(self) -> DomTree {
        self.tree
    }

    /// Share the tree, e.g. to normalize it again
    ///
    /// An owned foreign document is released, after which shadowed values
    /// read as absent.
    pub fn into_shared(self) -> (SharedTree, NodeId) {
        (self.tree.shared(), self.root)
    }

    /// First child of the container with type `ty`
    pub fn find(&mut self, registry: &ResourceTypeRegistry, ty: ResourceType) -> Option<NodeId> {
        self.find_all(registry, ty).into_iter().next()
    }

    /// Children of the container with type `ty`, in document order
    ///
    /// Unrecognized children are skipped.
    pub fn find_all(&mut self, registry: &ResourceTypeRegistry, ty: ResourceType) -> Vec<NodeId> {
        let mut found = Vec::new();
        for child in self.tree.child_elements(self.root) {
            let child_type = registry.element_type(&self.tree, child);
            if child_type.is_none() {
                tracing::debug!(
                    "skipping unrecognized <{}> in container",
                    self.tree.node_name(child).unwrap_or_default()
                );
            } else if child_type == ty {
                found.push(child);
            }
        }
        found
    }

    /// Value of the container's title, if it has one
    pub fn title(&mut self, registry: &ResourceTypeRegistry) -> Option<String> {
        let title = registry.match_name("title");
        let element = self.find(registry, title)?;
        let attribute = registry.hoist_attribute(title)?.to_string();
        self.tree.attribute(element, &attribute)
    }

    /// Does the container pass its validator?
    pub fn is_valid(&mut self, registry: &ResourceTypeRegistry) -> bool {
        registry.is_valid(&mut self.tree, self.root)
    }
}
