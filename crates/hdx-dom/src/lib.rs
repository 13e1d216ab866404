//! HDX DOM - node tree for heterogeneous data
//!
//! Arena-based node tree with DOM-like mutation semantics, attributes that can
//! shadow an attribute of a separate foreign tree, and elements whose content
//! is materialized on demand by an object [`Facade`].

mod attributes;
mod base;
mod character_data;
mod facade;
mod node;
mod operations;
mod tree;

pub use attributes::{AttrValue, AttributeMap, Backing};
pub use base::{ResolveError, Resolver, XML_NAMESPACE};
pub use character_data::CharacterData;
pub use facade::{BoxError, Facade, FacadeBinding, Memento, PluginError};
pub use node::{ElementData, Node, NodeData, NodeType, QualName};
pub use operations::{CloneOptions, DomError, DomResult};
pub use tree::{DomTree, SharedTree};

use std::sync::atomic::{AtomicU32, Ordering};

/// Identifier of one document arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u32);

impl TreeId {
    /// Allocate a process-unique tree id
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        TreeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Node identifier (owning document + arena slot + slot generation)
///
/// A released slot may be reused, but with a new generation, so an id that
/// outlived its node never names the newcomer. Ids are stable keys for side
/// tables such as import contexts for as long as the node lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) tree: TreeId,
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    /// Document this node belongs to
    #[inline]
    pub fn tree(self) -> TreeId {
        self.tree
    }

    /// Arena slot
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// How many times the slot was released before this node took it
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}.{}", self.tree.0, self.index, self.generation)
    }
}
