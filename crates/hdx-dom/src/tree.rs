//! DOM Tree (arena-based allocation)
//!
//! One arena per document. Slot 0 always holds the document node. Reads come
//! in two flavours: `&self` accessors return the stored state as is, while
//! the `&mut self` accessors (`children`, `attribute`, ...) first let a bound
//! facade synchronize the element they read from.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use url::Url;

use crate::{
    AttributeMap, CharacterData, DomError, DomResult, ElementData, Facade, FacadeBinding, Node,
    NodeData, NodeId, NodeType, QualName, TreeId,
};

/// Document shared with attribute maps that shadow it
pub type SharedTree = Rc<RefCell<DomTree>>;

/// One arena slot; `node` is `None` while the slot sits on the free list
#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-based document
#[derive(Debug)]
pub struct DomTree {
    id: TreeId,
    slots: Vec<Slot>,
    /// Released slots, reused before the arena grows
    free: Vec<u32>,
    /// Default base of subtrees imported from an external location
    pub(crate) import_bases: HashMap<NodeId, Url>,
    /// Facade synchronizations in progress
    pub(crate) sync_depth: u32,
    /// Nodes removed while a facade synchronizes
    pub(crate) sync_removed: Vec<NodeId>,
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DomTree {
    /// Create a document holding only its document node
    pub fn new() -> Self {
        Self {
            id: TreeId::next(),
            slots: vec![Slot {
                generation: 0,
                node: Some(Node::new(NodeData::Document)),
            }],
            free: Vec::new(),
            import_bases: HashMap::new(),
            sync_depth: 0,
            sync_removed: Vec::new(),
        }
    }

    /// Wrap for use as the foreign side of shadow attributes
    pub fn shared(self) -> SharedTree {
        Rc::new(RefCell::new(self))
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    /// The document node
    pub fn document(&self) -> NodeId {
        NodeId {
            tree: self.id,
            index: 0,
            generation: 0,
        }
    }

    /// Does `id` name a live node of this document?
    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.tree != self.id {
            return None;
        }
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    /// Get a mutable node by ID
    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.tree != self.id {
            return None;
        }
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Like [`get`](Self::get) but distinguishing foreign ids from missing
    /// or released ones
    pub fn node(&self, id: NodeId) -> DomResult<&Node> {
        if id.tree != self.id {
            return Err(DomError::WrongDocument);
        }
        self.get(id).ok_or(DomError::NotFound)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        if id.tree != self.id {
            return Err(DomError::WrongDocument);
        }
        self.get_mut(id).ok_or(DomError::NotFound)
    }

    /// Number of live nodes, the document node included
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// True while only the document node exists
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    pub(crate) fn alloc(&mut self, data: NodeData) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(Node::new(data));
            return NodeId {
                tree: self.id,
                index,
                generation: slot.generation,
            };
        }
        let id = NodeId {
            tree: self.id,
            index: self.slots.len() as u32,
            generation: 0,
        };
        self.slots.push(Slot {
            generation: 0,
            node: Some(Node::new(data)),
        });
        id
    }

    /// Free a detached node and its whole subtree
    ///
    /// Every id in the subtree goes stale: lookups through it fail with
    /// [`DomError::NotFound`] even after the slot is reused. The node must
    /// not be in a parent's child list, and the document node cannot be
    /// released.
    pub fn release(&mut self, id: NodeId) -> DomResult<()> {
        if id == self.document() {
            return Err(DomError::HierarchyRequest("document node cannot be released"));
        }
        self.node(id)?;
        if self.is_linked(id) {
            return Err(DomError::InvalidState("node is still attached"));
        }
        let mut pending = vec![id];
        let mut released = 0usize;
        while let Some(current) = pending.pop() {
            pending.extend(self.child_iter(current));
            self.import_bases.remove(&current);
            let slot = &mut self.slots[current.index as usize];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(current.index);
            released += 1;
        }
        tracing::trace!("released {} nodes from slot {}", released, id);
        Ok(())
    }

    /// Is `id` one of its parent's children (not merely pointing at it)?
    pub(crate) fn is_linked(&self, id: NodeId) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        let Some(parent) = node.parent else {
            return false;
        };
        if matches!(node.data, NodeData::Attribute { .. }) {
            return false;
        }
        match node.prev_sibling {
            Some(prev) => self.next_sibling(prev) == Some(id),
            None => self.first_child(parent) == Some(id),
        }
    }

    // ------------------------------------------------------------------
    // Factory surface
    // ------------------------------------------------------------------

    /// Create an element in no namespace
    pub fn create_element(&mut self, name: &str) -> DomResult<NodeId> {
        check_name(name)?;
        Ok(self.alloc(NodeData::Element(ElementData::new(QualName::new(name)))))
    }

    /// Create an element from a namespace URI and a qualified name
    pub fn create_element_ns(&mut self, namespace: Option<&str>, qualified: &str) -> DomResult<NodeId> {
        let name = checked_qualname(namespace, qualified)?;
        Ok(self.alloc(NodeData::Element(ElementData::new(name))))
    }

    /// Create an element whose content is supplied by `facade`
    pub fn create_facade_element(&mut self, name: QualName, facade: Box<dyn Facade>) -> DomResult<NodeId> {
        check_name(&name.local)?;
        let mut data = ElementData::new(name);
        data.facade = Some(FacadeBinding::new(facade));
        Ok(self.alloc(NodeData::Element(data)))
    }

    pub fn create_text_node(&mut self, data: &str) -> NodeId {
        self.alloc(NodeData::Text(CharacterData::new(data)))
    }

    pub fn create_comment(&mut self, data: &str) -> NodeId {
        self.alloc(NodeData::Comment(CharacterData::new(data)))
    }

    pub fn create_cdata_section(&mut self, data: &str) -> NodeId {
        self.alloc(NodeData::CDataSection(CharacterData::new(data)))
    }

    pub fn create_processing_instruction(&mut self, target: &str, data: &str) -> DomResult<NodeId> {
        check_name(target)?;
        Ok(self.alloc(NodeData::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        }))
    }

    pub fn create_document_fragment(&mut self) -> NodeId {
        self.alloc(NodeData::DocumentFragment)
    }

    /// Create a standalone attribute node with an empty value
    pub fn create_attribute(&mut self, name: &str) -> DomResult<NodeId> {
        check_name(name)?;
        Ok(self.alloc(NodeData::Attribute {
            name: QualName::with_namespace(None, name),
            value: String::new(),
        }))
    }

    // ------------------------------------------------------------------
    // Stored-state accessors
    // ------------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        match self.get(id)?.data {
            NodeData::Attribute { .. } => None,
            _ => self.get(id)?.parent,
        }
    }

    /// Owner element of an attribute node
    pub fn owner_element(&self, id: NodeId) -> Option<NodeId> {
        let node = self.get(id)?;
        match node.data {
            NodeData::Attribute { .. } => node.parent,
            _ => None,
        }
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.first_child
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.last_child
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.next_sibling
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.prev_sibling
    }

    pub fn node_type(&self, id: NodeId) -> Option<NodeType> {
        self.get(id).map(Node::node_type)
    }

    pub fn node_name(&self, id: NodeId) -> Option<String> {
        self.get(id).map(|n| n.data.node_name())
    }

    pub fn node_value(&self, id: NodeId) -> Option<String> {
        self.get(id)?.data.node_value()
    }

    pub fn element_name(&self, id: NodeId) -> Option<&QualName> {
        self.get(id)?.as_element().map(|e| &e.name)
    }

    /// Stored attributes of an element, without synchronizing its facade
    pub fn attributes(&self, id: NodeId) -> Option<&AttributeMap> {
        self.get(id)?.as_element().map(|e| &e.attrs)
    }

    /// Mutable attribute storage, bypassing any facade
    pub fn attributes_mut(&mut self, id: NodeId) -> Option<&mut AttributeMap> {
        self.get_mut(id)?.as_element_mut().map(|e| &mut e.attrs)
    }

    /// Is `id` an element with a facade binding?
    pub fn is_facade_bound(&self, id: NodeId) -> bool {
        self.get(id)
            .and_then(Node::as_element)
            .is_some_and(ElementData::is_facade_bound)
    }

    /// The single element child of the document node
    pub fn document_element(&self) -> Option<NodeId> {
        self.child_iter(self.document())
            .find(|&c| self.get(c).is_some_and(Node::is_element))
    }

    /// Stored children, in order
    pub fn child_iter(&self, id: NodeId) -> ChildIter<'_> {
        ChildIter {
            tree: self,
            next: self.first_child(id),
        }
    }

    /// Parent chain starting at `id` itself
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.get(id).map(|_| id),
        }
    }

    /// Is `ancestor` equal to `id` or above it?
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    // ------------------------------------------------------------------
    // Synchronizing accessors
    // ------------------------------------------------------------------

    /// Children of `id`, after its facade (if any) synchronized
    pub fn children(&mut self, id: NodeId) -> Vec<NodeId> {
        self.synchronize(id);
        self.child_iter(id).collect()
    }

    /// Element children of `id`
    pub fn child_elements(&mut self, id: NodeId) -> Vec<NodeId> {
        self.synchronize(id);
        self.child_iter(id)
            .filter(|&c| self.get(c).is_some_and(Node::is_element))
            .collect()
    }

    pub fn has_child_nodes(&mut self, id: NodeId) -> bool {
        self.synchronize(id);
        self.first_child(id).is_some()
    }

    /// Attribute value by qualified name
    pub fn attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.synchronize(id);
        self.attributes(id)?.get(name)
    }

    pub fn attribute_ns(&mut self, id: NodeId, namespace: Option<&str>, local: &str) -> Option<String> {
        self.synchronize(id);
        self.attributes(id)?.get_ns(namespace, local)
    }

    pub fn has_attribute(&mut self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    pub fn attribute_names(&mut self, id: NodeId) -> Vec<String> {
        self.synchronize(id);
        self.attributes(id).map(AttributeMap::names).unwrap_or_default()
    }

    /// Snapshot attribute node owned by `id`
    ///
    /// The node records its owner element; later changes to either side
    /// are not reflected in the other.
    pub fn attribute_node(&mut self, id: NodeId, name: &str) -> Option<NodeId> {
        let value = self.attribute(id, name)?;
        let attr = self.alloc(NodeData::Attribute {
            name: QualName::with_namespace(None, name),
            value,
        });
        if let Some(node) = self.get_mut(attr) {
            node.parent = Some(id);
        }
        Some(attr)
    }

    /// Concatenated text of all descendant text and CDATA nodes
    pub fn text_content(&mut self, id: NodeId) -> String {
        self.synchronize_subtree(id);
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for child in self.child_iter(id) {
            match self.get(child).map(|n| &n.data) {
                Some(NodeData::Text(c) | NodeData::CDataSection(c)) => out.push_str(c.data()),
                Some(NodeData::Element(_)) => self.collect_text(child, out),
                _ => {}
            }
        }
    }

    /// Descendant elements of `root` in document order whose qualified name
    /// is `name`; `"*"` matches every element
    pub fn elements_by_tag_name(&mut self, root: NodeId, name: &str) -> Vec<NodeId> {
        self.synchronize_subtree(root);
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.child_iter(root).collect();
        stack.reverse();
        while let Some(id) = stack.pop() {
            let Some(element) = self.get(id).and_then(Node::as_element) else {
                continue;
            };
            if name == "*" || element.name.qualified() == name {
                found.push(id);
            }
            let mut kids: Vec<NodeId> = self.child_iter(id).collect();
            kids.reverse();
            stack.extend(kids);
        }
        found
    }

    // ------------------------------------------------------------------
    // Equality
    // ------------------------------------------------------------------

    /// Structural equality of two nodes of this document
    pub fn is_equal_node(&mut self, a: NodeId, b: NodeId) -> bool {
        self.synchronize_subtree(a);
        self.synchronize_subtree(b);
        self.is_equal_to(a, self, b)
    }

    /// Structural equality against a node of another document
    ///
    /// Compares stored state; synchronize facade-bound subtrees first.
    /// Elements compare tag name, attributes and children in order. Other
    /// nodes compare only their kind, name and value.
    pub fn is_equal_to(&self, a: NodeId, other: &DomTree, b: NodeId) -> bool {
        let (Some(x), Some(y)) = (self.get(a), other.get(b)) else {
            return false;
        };
        match (&x.data, &y.data) {
            (NodeData::Element(ex), NodeData::Element(ey)) => {
                ex.name == ey.name
                    && ex.attrs == ey.attrs
                    && {
                        let mut left = self.child_iter(a);
                        let mut right = other.child_iter(b);
                        loop {
                            match (left.next(), right.next()) {
                                (None, None) => break true,
                                (Some(l), Some(r)) if self.is_equal_to(l, other, r) => {}
                                _ => break false,
                            }
                        }
                    }
            }
            (dx, dy) => {
                dx.node_type() == dy.node_type()
                    && dx.node_name() == dy.node_name()
                    && dx.node_value() == dy.node_value()
            }
        }
    }
}

/// Iterator over stored children
pub struct ChildIter<'a> {
    tree: &'a DomTree,
    next: Option<NodeId>,
}

impl Iterator for ChildIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.next_sibling(current);
        Some(current)
    }
}

/// Iterator up the parent chain; attribute nodes continue to their owner
pub struct Ancestors<'a> {
    tree: &'a DomTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.get(current).and_then(Node::parent);
        Some(current)
    }
}

fn is_name_char(c: char, first: bool) -> bool {
    c == '_' || c == ':' || c.is_alphabetic() || (!first && (c == '-' || c == '.' || c.is_numeric()))
}

/// Reject empty names and characters that cannot appear in an XML name
pub(crate) fn check_name(name: &str) -> DomResult<()> {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_name_char(c, true) && chars.all(|c| is_name_char(c, false)) => Ok(()),
        _ => Err(DomError::InvalidCharacter(name.to_string())),
    }
}

pub(crate) fn checked_qualname(namespace: Option<&str>, qualified: &str) -> DomResult<QualName> {
    check_name(qualified)?;
    let name = QualName::with_namespace(namespace.filter(|ns| !ns.is_empty()), qualified);
    if name.local.is_empty() || name.local.contains(':') {
        return Err(DomError::Namespace(format!("malformed qualified name {qualified:?}")));
    }
    if name.prefix.is_some() && name.namespace.is_none() {
        return Err(DomError::Namespace(format!("prefix of {qualified:?} has no namespace")));
    }
    Ok(name)
}
