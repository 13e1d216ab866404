//! DOM Node
//!
//! Arena node with sibling links and the closed set of node kinds.

use std::fmt;

use crate::{AttributeMap, CharacterData, FacadeBinding, NodeId};

/// Node kind, numbered as in the DOM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Attribute = 2,
    Text = 3,
    CDataSection = 4,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentFragment = 11,
}

/// Qualified name: optional namespace URI, optional prefix, local part
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualName {
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub local: String,
}

impl QualName {
    /// Name in no namespace
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            prefix: None,
            local: local.into(),
        }
    }

    /// Split `prefix:local` and attach a namespace
    pub fn with_namespace(namespace: Option<&str>, qualified: &str) -> Self {
        let (prefix, local) = match qualified.split_once(':') {
            Some((p, l)) => (Some(p.to_string()), l.to_string()),
            None => (None, qualified.to_string()),
        };
        Self {
            namespace: namespace.map(str::to_string),
            prefix,
            local,
        }
    }

    /// `prefix:local`, or just `local`
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }

    /// Is this name in `namespace`?
    #[inline]
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace.as_deref() == Some(namespace)
    }
}

impl fmt::Display for QualName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{}:{}", p, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// DOM Node - links plus kind-specific data
#[derive(Debug)]
pub struct Node {
    /// Parent node. Attribute nodes use this for their owner element.
    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    /// Last child (for O(1) append)
    pub(crate) last_child: Option<NodeId>,
    pub(crate) prev_sibling: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
    /// Node-specific data
    pub data: NodeData,
}

impl Node {
    pub(crate) fn new(data: NodeData) -> Self {
        Self {
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            data,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    pub fn last_child(&self) -> Option<NodeId> {
        self.last_child
    }

    pub fn prev_sibling(&self) -> Option<NodeId> {
        self.prev_sibling
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next_sibling
    }

    #[inline]
    pub fn node_type(&self) -> NodeType {
        self.data.node_type()
    }

    /// Check if this is an element
    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    /// Get element data if this is an element
    #[inline]
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Get mutable element data
    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Character data of a text, comment or CDATA node
    #[inline]
    pub fn as_character_data(&self) -> Option<&CharacterData> {
        match &self.data {
            NodeData::Text(c) | NodeData::Comment(c) | NodeData::CDataSection(c) => Some(c),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn as_character_data_mut(&mut self) -> Option<&mut CharacterData> {
        match &mut self.data {
            NodeData::Text(c) | NodeData::Comment(c) | NodeData::CDataSection(c) => Some(c),
            _ => None,
        }
    }

    /// May this kind of node have children?
    #[inline]
    pub fn accepts_children(&self) -> bool {
        matches!(
            self.data,
            NodeData::Document | NodeData::DocumentFragment | NodeData::Element(_)
        )
    }
}

/// Node-specific data
#[derive(Debug)]
pub enum NodeData {
    /// Document root
    Document,
    /// Lightweight container whose children are spliced on insertion
    DocumentFragment,
    /// Element
    Element(ElementData),
    /// Standalone attribute; the parent link names its owner element
    Attribute { name: QualName, value: String },
    /// Text content
    Text(CharacterData),
    /// CDATA section
    CDataSection(CharacterData),
    /// Comment
    Comment(CharacterData),
    /// Processing instruction
    ProcessingInstruction { target: String, data: String },
}

impl NodeData {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Document => NodeType::Document,
            Self::DocumentFragment => NodeType::DocumentFragment,
            Self::Element(_) => NodeType::Element,
            Self::Attribute { .. } => NodeType::Attribute,
            Self::Text(_) => NodeType::Text,
            Self::CDataSection(_) => NodeType::CDataSection,
            Self::Comment(_) => NodeType::Comment,
            Self::ProcessingInstruction { .. } => NodeType::ProcessingInstruction,
        }
    }

    /// DOM `nodeName`
    pub fn node_name(&self) -> String {
        match self {
            Self::Document => "#document".into(),
            Self::DocumentFragment => "#document-fragment".into(),
            Self::Element(e) => e.name.qualified(),
            Self::Attribute { name, .. } => name.qualified(),
            Self::Text(_) => "#text".into(),
            Self::CDataSection(_) => "#cdata-section".into(),
            Self::Comment(_) => "#comment".into(),
            Self::ProcessingInstruction { target, .. } => target.clone(),
        }
    }

    /// DOM `nodeValue`
    pub fn node_value(&self) -> Option<String> {
        match self {
            Self::Attribute { value, .. } => Some(value.clone()),
            Self::Text(c) | Self::CDataSection(c) | Self::Comment(c) => Some(c.data().to_string()),
            Self::ProcessingInstruction { data, .. } => Some(data.clone()),
            _ => None,
        }
    }

    /// Copy of this data with no facade binding and owned attribute values
    ///
    /// Fails for the document node, which cannot be duplicated.
    pub(crate) fn snapshot(&self) -> Option<NodeData> {
        Some(match self {
            Self::Document => return None,
            Self::DocumentFragment => Self::DocumentFragment,
            Self::Element(e) => Self::Element(ElementData {
                name: e.name.clone(),
                attrs: e.attrs.clone(),
                facade: None,
            }),
            Self::Attribute { name, value } => Self::Attribute {
                name: name.clone(),
                value: value.clone(),
            },
            Self::Text(c) => Self::Text(c.clone()),
            Self::CDataSection(c) => Self::CDataSection(c.clone()),
            Self::Comment(c) => Self::Comment(c.clone()),
            Self::ProcessingInstruction { target, data } => Self::ProcessingInstruction {
                target: target.clone(),
                data: data.clone(),
            },
        })
    }
}

/// Element-specific data
#[derive(Debug)]
pub struct ElementData {
    /// Tag name (qualified)
    pub name: QualName,
    /// Attributes, possibly shadowing a foreign element
    pub attrs: AttributeMap,
    /// Backing object that materializes this element's content
    pub(crate) facade: Option<FacadeBinding>,
}

impl ElementData {
    pub fn new(name: QualName) -> Self {
        Self {
            name,
            attrs: AttributeMap::new(),
            facade: None,
        }
    }

    /// Is this element's content supplied by a facade?
    #[inline]
    pub fn is_facade_bound(&self) -> bool {
        self.facade.is_some()
    }

    pub fn facade(&self) -> Option<&FacadeBinding> {
        self.facade.as_ref()
    }
}
