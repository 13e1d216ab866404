//! DOM Node Operations
//!
//! Core node manipulation: insertBefore, appendChild, replaceChild,
//! removeChild, cloneNode, importNode, attribute and character data edits.
//! Mutations on a facade-bound element are first offered to its facade.

use crate::{DomTree, NodeData, NodeId, QualName};
use crate::tree::check_name;

/// Result type for DOM operations
pub type DomResult<T> = Result<T, DomError>;

/// DOM operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("node not found")]
    NotFound,

    #[error("hierarchy request error: {0}")]
    HierarchyRequest(&'static str),

    #[error("node belongs to another document")]
    WrongDocument,

    #[error("modification of <{0}> refused")]
    NoModificationAllowed(String),

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("offset {offset} outside data of length {length}")]
    IndexSize { offset: usize, length: usize },

    #[error("invalid node type")]
    InvalidNodeType,

    #[error("namespace error: {0}")]
    Namespace(String),

    #[error("invalid character in name {0:?}")]
    InvalidCharacter(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

/// Options for [`DomTree::clone_node_with`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneOptions {
    /// Copy descendants too
    pub deep: bool,
    /// Give the copy the import base in effect for the original
    pub inherit_context: bool,
}

impl DomTree {
    /// Append a child node
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<NodeId> {
        self.insert_before(parent, child, None)
    }

    /// Insert `new_child` before `ref_child`, or append when it is `None`
    ///
    /// A document fragment has its children spliced in order and is left
    /// empty. A node that already has a parent is detached first.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        ref_child: Option<NodeId>,
    ) -> DomResult<NodeId> {
        self.check_insert(parent, new_child, None)?;
        if let Some(r) = ref_child {
            if self.node(r)?.parent != Some(parent) || !self.is_linked(r) {
                return Err(DomError::NotFound);
            }
        }
        self.facade_permits(parent, |facade, tree| {
            facade.add_child_before(tree, parent, new_child, ref_child)
        })?;

        let incoming: Vec<NodeId> = if self.is_fragment(new_child) {
            self.child_iter(new_child).collect()
        } else {
            vec![new_child]
        };
        // Inserting a node before itself keeps its position
        let mut anchor = ref_child;
        if anchor.is_some_and(|r| incoming.contains(&r)) {
            anchor = self.next_sibling(new_child);
        }
        for child in incoming {
            self.detach(child);
            self.link_before(parent, child, anchor);
        }
        Ok(new_child)
    }

    /// Replace `old_child` with `new_child`, returning `old_child`
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        old_child: NodeId,
    ) -> DomResult<NodeId> {
        self.check_insert(parent, new_child, Some(old_child))?;
        if self.node(old_child)?.parent != Some(parent) || !self.is_linked(old_child) {
            return Err(DomError::NotFound);
        }
        self.facade_permits(parent, |facade, tree| {
            facade.replace_child(tree, parent, old_child, Some(new_child))
        })?;
        if new_child == old_child {
            return Ok(old_child);
        }

        let incoming: Vec<NodeId> = if self.is_fragment(new_child) {
            self.child_iter(new_child).collect()
        } else {
            vec![new_child]
        };
        let mut anchor = self.next_sibling(old_child);
        if anchor == Some(new_child) {
            anchor = self.next_sibling(new_child);
        }
        self.detach(old_child);
        if self.sync_depth > 0 {
            self.sync_removed.push(old_child);
        }
        for child in incoming {
            self.detach(child);
            self.link_before(parent, child, anchor);
        }
        Ok(old_child)
    }

    /// Remove a child node
    ///
    /// The removed node stays allocated so it can be inserted again; call
    /// [`release`](Self::release) once it is no longer needed. Inside a
    /// facade's `synchronize` this happens automatically for nodes still
    /// detached when it returns.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<NodeId> {
        self.node(parent)?;
        // A view clone points at its parent without being one of its children
        if self.node(child)?.parent != Some(parent) || !self.is_linked(child) {
            return Err(DomError::NotFound);
        }
        self.facade_permits(parent, |facade, tree| {
            facade.replace_child(tree, parent, child, None)
        })?;
        self.detach(child);
        if self.sync_depth > 0 {
            self.sync_removed.push(child);
        }
        Ok(child)
    }

    /// Remove and release every child of `parent`
    ///
    /// Ids of the removed subtrees go stale. This is the usual way for a
    /// facade to clear content it is about to rebuild.
    pub fn remove_all_children(&mut self, parent: NodeId) -> DomResult<()> {
        while let Some(child) = self.first_child(parent) {
            self.remove_child(parent, child)?;
            self.release(child)?;
        }
        Ok(())
    }

    fn is_fragment(&self, id: NodeId) -> bool {
        matches!(self.get(id).map(|n| &n.data), Some(NodeData::DocumentFragment))
    }

    /// Hierarchy checks; `replacing` is the child about to be removed
    fn check_insert(&self, parent: NodeId, child: NodeId, replacing: Option<NodeId>) -> DomResult<()> {
        let parent_node = self.node(parent)?;
        let child_node = self.node(child)?;
        if !parent_node.accepts_children() {
            return Err(DomError::HierarchyRequest("parent cannot have children"));
        }
        match child_node.data {
            NodeData::Document => return Err(DomError::HierarchyRequest("document cannot be a child")),
            NodeData::Attribute { .. } => {
                return Err(DomError::HierarchyRequest("attribute cannot be a child"));
            }
            _ => {}
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest("node would become its own descendant"));
        }
        if matches!(parent_node.data, NodeData::Document) {
            let adding = if self.is_fragment(child) {
                self.child_iter(child)
                    .filter(|&c| self.get(c).is_some_and(|n| n.is_element()))
                    .count()
            } else {
                usize::from(child_node.is_element())
            };
            let existing = self
                .document_element()
                .filter(|&e| e != child && Some(e) != replacing)
                .map_or(0, |_| 1);
            if adding + existing > 1 {
                return Err(DomError::HierarchyRequest("document already has an element"));
            }
            if self.is_fragment(child) {
                if self.child_iter(child).any(|c| self.is_text_like(c)) {
                    return Err(DomError::HierarchyRequest("text under the document node"));
                }
            } else if self.is_text_like(child) {
                return Err(DomError::HierarchyRequest("text under the document node"));
            }
        }
        Ok(())
    }

    fn is_text_like(&self, id: NodeId) -> bool {
        matches!(
            self.get(id).map(|n| &n.data),
            Some(NodeData::Text(_) | NodeData::CDataSection(_))
        )
    }

    /// Unlink a node from its parent and siblings
    pub(crate) fn detach(&mut self, id: NodeId) {
        let Some(node) = self.get(id) else {
            return;
        };
        let (parent, prev, next) = (node.parent, node.prev_sibling, node.next_sibling);
        let Some(parent) = parent else {
            return;
        };
        match prev {
            Some(p) => {
                if let Some(n) = self.get_mut(p) {
                    n.next_sibling = next;
                }
            }
            None => {
                if let Some(n) = self.get_mut(parent) {
                    if n.first_child == Some(id) {
                        n.first_child = next;
                    }
                }
            }
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.get_mut(nx) {
                    n.prev_sibling = prev;
                }
            }
            None => {
                if let Some(n) = self.get_mut(parent) {
                    if n.last_child == Some(id) {
                        n.last_child = prev;
                    }
                }
            }
        }
        if let Some(n) = self.get_mut(id) {
            n.parent = None;
            n.prev_sibling = None;
            n.next_sibling = None;
        }
    }

    /// Link a detached node into `parent` before `anchor` (append on `None`)
    pub(crate) fn link_before(&mut self, parent: NodeId, child: NodeId, anchor: Option<NodeId>) {
        let prev = match anchor {
            Some(a) => self.previous_sibling(a),
            None => self.last_child(parent),
        };
        if let Some(n) = self.get_mut(child) {
            n.parent = Some(parent);
            n.prev_sibling = prev;
            n.next_sibling = anchor;
        }
        match prev {
            Some(p) => {
                if let Some(n) = self.get_mut(p) {
                    n.next_sibling = Some(child);
                }
            }
            None => {
                if let Some(n) = self.get_mut(parent) {
                    n.first_child = Some(child);
                }
            }
        }
        match anchor {
            Some(a) => {
                if let Some(n) = self.get_mut(a) {
                    n.prev_sibling = Some(child);
                }
            }
            None => {
                if let Some(n) = self.get_mut(parent) {
                    n.last_child = Some(child);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Cloning and import
    // ------------------------------------------------------------------

    /// Clone a node; the copy has no parent and no facade binding
    pub fn clone_node(&mut self, id: NodeId, deep: bool) -> DomResult<NodeId> {
        self.clone_node_with(
            id,
            CloneOptions {
                deep,
                inherit_context: false,
            },
        )
    }

    pub fn clone_node_with(&mut self, id: NodeId, options: CloneOptions) -> DomResult<NodeId> {
        self.node(id)?;
        if options.deep {
            self.synchronize_subtree(id);
        } else {
            self.synchronize(id);
        }
        let copy = self.copy_from(None, id, options.deep)?;
        if options.inherit_context {
            if let Some(base) = self.import_base_in_effect(id).cloned() {
                self.import_bases.insert(copy, base);
            }
        }
        Ok(copy)
    }

    /// Clone a facade-bound element as an independent live view
    ///
    /// The copy keeps a parent link to the original's parent without being
    /// one of its children, and owns a clone of the facade and its memento.
    pub fn clone_view(&mut self, id: NodeId) -> DomResult<NodeId> {
        let node = self.node(id)?;
        let element = node.as_element().ok_or(DomError::InvalidNodeType)?;
        let parent = node.parent;
        let binding = match element.facade() {
            Some(binding) => Some(
                binding
                    .duplicate()
                    .ok_or(DomError::InvalidState("facade is busy"))?,
            ),
            None => None,
        };
        let copy = self.copy_from(None, id, true)?;
        let node = self.node_mut(copy)?;
        node.parent = parent;
        if let Some(e) = node.as_element_mut() {
            e.facade = binding;
        }
        Ok(copy)
    }

    /// Copy a node of `source` into this document
    ///
    /// Attribute values are copied, shadows resolved, facades dropped.
    pub fn import_node(&mut self, source: &DomTree, id: NodeId, deep: bool) -> DomResult<NodeId> {
        self.copy_from(Some(source), id, deep)
    }

    /// Copy `id` from `source` (or from this document when `None`)
    fn copy_from(&mut self, source: Option<&DomTree>, id: NodeId, deep: bool) -> DomResult<NodeId> {
        let (data, kids) = {
            let src = source.unwrap_or(&*self);
            let data = src
                .node(id)?
                .data
                .snapshot()
                .ok_or(DomError::NotSupported("cloning the document node"))?;
            let kids: Vec<NodeId> = if deep { src.child_iter(id).collect() } else { Vec::new() };
            (data, kids)
        };
        let copy = self.alloc(data);
        for kid in kids {
            let kid_copy = self.copy_from(source, kid, true)?;
            self.link_before(copy, kid_copy, None);
        }
        Ok(copy)
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Set an attribute by qualified name
    ///
    /// On an element with a backing foreign element, a new attribute is
    /// created there too when the element's shadow policy allows.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> DomResult<()> {
        check_name(name)?;
        self.permit_attribute(id, name, Some(value))?;
        self.element_attrs(id)?.set(name, value)
    }

    /// Set an attribute that is never created on a backing element
    pub fn set_attribute_local(&mut self, id: NodeId, name: &str, value: &str) -> DomResult<()> {
        check_name(name)?;
        self.permit_attribute(id, name, Some(value))?;
        self.element_attrs(id)?.set_local(name, value)
    }

    /// Set a namespaced attribute
    pub fn set_attribute_ns(
        &mut self,
        id: NodeId,
        namespace: Option<&str>,
        qualified: &str,
        value: &str,
    ) -> DomResult<()> {
        let name = crate::tree::checked_qualname(namespace, qualified)?;
        self.set_attribute_qualified(id, name, value)
    }

    pub fn set_attribute_qualified(&mut self, id: NodeId, name: QualName, value: &str) -> DomResult<()> {
        let qualified = name.qualified();
        self.permit_attribute(id, &qualified, Some(value))?;
        self.element_attrs(id)?.set_qualified(name, value)
    }

    /// Copy an attribute node onto an element; the node records its owner
    pub fn set_attribute_node(&mut self, id: NodeId, attr: NodeId) -> DomResult<()> {
        let (name, value) = match &self.node(attr)?.data {
            NodeData::Attribute { name, value } => (name.clone(), value.clone()),
            _ => return Err(DomError::InvalidNodeType),
        };
        if self.owner_element(attr).is_some_and(|owner| owner != id) {
            return Err(DomError::InvalidState("attribute is in use by another element"));
        }
        self.set_attribute_qualified(id, name, &value)?;
        self.node_mut(attr)?.parent = Some(id);
        Ok(())
    }

    /// Remove an attribute, and its shadowed foreign twin
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> DomResult<()> {
        self.permit_attribute(id, name, None)?;
        self.element_attrs(id)?.remove(name)?;
        Ok(())
    }

    /// Enable or disable shadowing of attributes created from now on
    pub fn set_shadow_policy(&mut self, id: NodeId, enabled: bool) -> DomResult<()> {
        self.element_attrs(id)?.set_shadow_policy(enabled);
        Ok(())
    }

    fn element_attrs(&mut self, id: NodeId) -> DomResult<&mut crate::AttributeMap> {
        self.node_mut(id)?
            .as_element_mut()
            .map(|e| &mut e.attrs)
            .ok_or(DomError::InvalidNodeType)
    }

    fn permit_attribute(&mut self, id: NodeId, name: &str, value: Option<&str>) -> DomResult<()> {
        if !self.node(id)?.is_element() {
            return Err(DomError::InvalidNodeType);
        }
        self.facade_permits(id, |facade, tree| facade.set_attribute(tree, id, name, value))
    }

    // ------------------------------------------------------------------
    // Character data
    // ------------------------------------------------------------------

    fn character_data(&mut self, id: NodeId) -> DomResult<&mut crate::CharacterData> {
        self.node_mut(id)?
            .as_character_data_mut()
            .ok_or(DomError::InvalidNodeType)
    }

    pub fn set_data(&mut self, id: NodeId, data: &str) -> DomResult<()> {
        if let NodeData::ProcessingInstruction { data: d, .. } = &mut self.node_mut(id)?.data {
            *d = data.to_string();
            return Ok(());
        }
        self.character_data(id)?.set(data);
        Ok(())
    }

    pub fn append_data(&mut self, id: NodeId, data: &str) -> DomResult<()> {
        self.character_data(id)?.append(data);
        Ok(())
    }

    pub fn insert_data(&mut self, id: NodeId, offset: usize, data: &str) -> DomResult<()> {
        self.character_data(id)?.insert(offset, data)
    }

    pub fn delete_data(&mut self, id: NodeId, offset: usize, count: usize) -> DomResult<()> {
        self.character_data(id)?.delete(offset, count)
    }

    pub fn replace_data(&mut self, id: NodeId, offset: usize, count: usize, data: &str) -> DomResult<()> {
        self.character_data(id)?.replace(offset, count, data)
    }

    pub fn substring_data(&self, id: NodeId, offset: usize, count: usize) -> DomResult<String> {
        self.node(id)?
            .as_character_data()
            .ok_or(DomError::InvalidNodeType)?
            .substring(offset, count)
    }
}
