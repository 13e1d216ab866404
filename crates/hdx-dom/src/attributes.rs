//! Element Attributes
//!
//! Attribute map whose entries either own their value or shadow an attribute
//! of an element in a separate foreign tree. Writes to a shadow entry land on
//! the foreign element, so both views always agree.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::{DomError, DomResult, DomTree, NodeId, QualName, XML_NAMESPACE};

/// Value storage of one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Value held by this map
    Owned(String),
    /// Value lives on the backing element under this name
    Shadow(QualName),
}

/// Non-owning link to the foreign element an attribute map shadows
///
/// The foreign document owns shadowed values. Once it has been dropped a
/// shadow entry reads as absent, and the next write to it stores the value
/// locally. While the foreign document is mutably borrowed a shadow entry
/// reads as absent and writes through it fail with `InvalidState`.
#[derive(Debug, Clone)]
pub struct Backing {
    tree: Weak<RefCell<DomTree>>,
    element: NodeId,
}

impl Backing {
    pub fn new(tree: &Rc<RefCell<DomTree>>, element: NodeId) -> Self {
        Self {
            tree: Rc::downgrade(tree),
            element,
        }
    }

    /// Foreign element
    pub fn element(&self) -> NodeId {
        self.element
    }

    /// Foreign document, if it is still alive
    pub fn tree(&self) -> Option<Rc<RefCell<DomTree>>> {
        self.tree.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.tree.strong_count() > 0
    }

    fn read(&self, name: &QualName) -> Option<String> {
        let tree = self.tree.upgrade()?;
        let tree = tree.try_borrow().ok()?;
        let value = tree
            .attributes(self.element)
            .and_then(|attrs| attrs.get(&name.qualified()));
        value
    }

    /// Returns false when the foreign document is gone
    fn write(&self, name: &QualName, value: &str) -> DomResult<bool> {
        let Some(tree) = self.tree.upgrade() else {
            return Ok(false);
        };
        let mut tree = tree
            .try_borrow_mut()
            .map_err(|_| DomError::InvalidState("backing document is borrowed"))?;
        tree.set_attribute_qualified(self.element, name.clone(), value)?;
        Ok(true)
    }

    fn remove(&self, name: &QualName) -> DomResult<()> {
        let Some(tree) = self.tree.upgrade() else {
            return Ok(());
        };
        let mut tree = tree
            .try_borrow_mut()
            .map_err(|_| DomError::InvalidState("backing document is borrowed"))?;
        tree.remove_attribute(self.element, &name.qualified())
    }

    /// Name a new attribute takes on the foreign element
    ///
    /// Unqualified names are prefixed into the namespace of a prefixed
    /// foreign element.
    fn foreign_name(&self, name: &QualName) -> DomResult<Option<QualName>> {
        let Some(tree) = self.tree.upgrade() else {
            return Ok(None);
        };
        let tree = tree
            .try_borrow()
            .map_err(|_| DomError::InvalidState("backing document is borrowed"))?;
        let Some(element) = tree.element_name(self.element) else {
            return Ok(None);
        };
        if name.prefix.is_some() || name.namespace.is_some() {
            return Ok(Some(name.clone()));
        }
        let foreign = match (&element.namespace, &element.prefix) {
            (Some(ns), Some(prefix)) => QualName {
                namespace: Some(ns.clone()),
                prefix: Some(prefix.clone()),
                local: name.local.clone(),
            },
            _ => name.clone(),
        };
        Ok(Some(foreign))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    name: QualName,
    value: AttrValue,
}

/// Attribute map, ordered by qualified name
#[derive(Debug)]
pub struct AttributeMap {
    entries: BTreeMap<String, Entry>,
    backing: Option<Backing>,
    /// Mirror newly created attributes onto the backing element
    shadow_new: bool,
}

impl Default for AttributeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeMap {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            backing: None,
            shadow_new: true,
        }
    }

    pub fn with_backing(backing: Backing) -> Self {
        Self {
            backing: Some(backing),
            ..Self::new()
        }
    }

    pub fn backing(&self) -> Option<&Backing> {
        self.backing.as_ref()
    }

    pub fn set_backing(&mut self, backing: Option<Backing>) {
        self.backing = backing;
    }

    pub fn shadow_policy(&self) -> bool {
        self.shadow_new
    }

    /// Whether attributes created from now on are also created on the
    /// backing element. Existing entries are unaffected.
    pub fn set_shadow_policy(&mut self, enabled: bool) {
        self.shadow_new = enabled;
    }

    /// Number of readable attributes
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attribute value by qualified name
    pub fn get(&self, name: &str) -> Option<String> {
        self.entries.get(name).and_then(|e| self.resolve(e))
    }

    /// Attribute value by namespace and local name
    pub fn get_ns(&self, namespace: Option<&str>, local: &str) -> Option<String> {
        self.entries
            .values()
            .find(|e| e.name.local == local && e.name.namespace.as_deref() == namespace)
            .and_then(|e| self.resolve(e))
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Raw storage of an entry
    pub fn value(&self, name: &str) -> Option<&AttrValue> {
        self.entries.get(name).map(|e| &e.value)
    }

    pub fn is_shadow(&self, name: &str) -> bool {
        matches!(self.value(name), Some(AttrValue::Shadow(_)))
    }

    /// Set by qualified name, shadowing new entries when the policy allows
    pub fn set(&mut self, name: &str, value: &str) -> DomResult<()> {
        self.store(parse_name(name), value, true)
    }

    /// Set without ever creating the attribute on the backing element
    ///
    /// An existing shadow entry is still written through.
    pub fn set_local(&mut self, name: &str, value: &str) -> DomResult<()> {
        self.store(parse_name(name), value, false)
    }

    pub fn set_qualified(&mut self, name: QualName, value: &str) -> DomResult<()> {
        self.store(name, value, true)
    }

    fn store(&mut self, name: QualName, value: &str, shadow: bool) -> DomResult<()> {
        let key = name.qualified();
        if let Some(entry) = self.entries.get_mut(&key) {
            if let AttrValue::Shadow(foreign) = &entry.value {
                let written = match &self.backing {
                    Some(backing) => backing.write(foreign, value)?,
                    None => false,
                };
                if written {
                    return Ok(());
                }
                tracing::warn!("backing of attribute {} is gone, keeping value locally", key);
            }
            entry.value = AttrValue::Owned(value.to_string());
            return Ok(());
        }

        let mut slot = AttrValue::Owned(value.to_string());
        if shadow && self.shadow_new {
            if let Some(backing) = &self.backing {
                if let Some(foreign) = backing.foreign_name(&name)? {
                    if backing.write(&foreign, value)? {
                        tracing::trace!("created shadowed attribute {} as {}", key, foreign);
                        slot = AttrValue::Shadow(foreign);
                    }
                }
            }
        }
        self.entries.insert(key, Entry { name, value: slot });
        Ok(())
    }

    /// Add an entry that reads through the backing attribute `foreign`
    pub fn bind_shadow(&mut self, name: QualName, foreign: QualName) {
        self.entries.insert(
            name.qualified(),
            Entry {
                name,
                value: AttrValue::Shadow(foreign),
            },
        );
    }

    /// Remove an attribute, removing the shadowed foreign attribute too
    pub fn remove(&mut self, name: &str) -> DomResult<Option<String>> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(None);
        };
        let old = self.resolve(entry);
        if let (AttrValue::Shadow(foreign), Some(backing)) = (&entry.value, &self.backing) {
            backing.remove(foreign)?;
        }
        self.entries.remove(name);
        Ok(old)
    }

    /// Readable attributes with their resolved values
    pub fn iter(&self) -> impl Iterator<Item = (&QualName, String)> + '_ {
        self.entries
            .values()
            .filter_map(|e| self.resolve(e).map(|v| (&e.name, v)))
    }

    /// Qualified names of readable attributes
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|(name, _)| name.qualified()).collect()
    }

    fn resolve(&self, entry: &Entry) -> Option<String> {
        match &entry.value {
            AttrValue::Owned(v) => Some(v.clone()),
            AttrValue::Shadow(foreign) => self.backing.as_ref()?.read(foreign),
        }
    }
}

/// Deep copy: every entry becomes an owned value and the backing is dropped
impl Clone for AttributeMap {
    fn clone(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .filter_map(|(key, e)| {
                self.resolve(e).map(|v| {
                    let entry = Entry {
                        name: e.name.clone(),
                        value: AttrValue::Owned(v),
                    };
                    (key.clone(), entry)
                })
            })
            .collect();
        Self {
            entries,
            backing: None,
            shadow_new: true,
        }
    }
}

impl PartialEq for AttributeMap {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for AttributeMap {}

impl Hash for AttributeMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (name, value) in self.iter() {
            name.hash(state);
            value.hash(state);
        }
    }
}

fn parse_name(name: &str) -> QualName {
    let mut q = QualName::with_namespace(None, name);
    if q.prefix.as_deref() == Some("xml") {
        q.namespace = Some(XML_NAMESPACE.to_string());
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(map: &AttributeMap) -> u64 {
        let mut h = DefaultHasher::new();
        map.hash(&mut h);
        h.finish()
    }

    fn foreign_with(attrs: &[(&str, &str)]) -> (Rc<RefCell<DomTree>>, NodeId) {
        let mut tree = DomTree::new();
        let el = tree.create_element("data").unwrap();
        let doc = tree.document();
        tree.append_child(doc, el).unwrap();
        for (k, v) in attrs {
            tree.set_attribute(el, k, v).unwrap();
        }
        (tree.shared(), el)
    }

    #[test]
    fn test_owned_set_get_remove() {
        let mut map = AttributeMap::new();
        map.set("uri", "file.sdf").unwrap();
        assert_eq!(map.get("uri").as_deref(), Some("file.sdf"));
        assert!(!map.is_shadow("uri"));
        assert_eq!(map.remove("uri").unwrap().as_deref(), Some("file.sdf"));
        assert!(map.get("uri").is_none());
        assert_eq!(map.remove("uri").unwrap(), None);
    }

    #[test]
    fn test_absent_and_empty_are_distinct() {
        let mut a = AttributeMap::new();
        let b = AttributeMap::new();
        a.set("value", "").unwrap();
        assert!(a.contains_key("value"));
        assert_ne!(a, b);
        assert_ne!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_shadow_reads_foreign_value() {
        let (foreign, el) = foreign_with(&[("uri", "a.sdf")]);
        let mut map = AttributeMap::with_backing(Backing::new(&foreign, el));
        map.bind_shadow(QualName::new("uri"), QualName::new("uri"));
        assert_eq!(map.get("uri").as_deref(), Some("a.sdf"));

        foreign.borrow_mut().set_attribute(el, "uri", "b.sdf").unwrap();
        assert_eq!(map.get("uri").as_deref(), Some("b.sdf"));
    }

    #[test]
    fn test_shadow_write_through() {
        let (foreign, el) = foreign_with(&[("uri", "a.sdf")]);
        let mut map = AttributeMap::with_backing(Backing::new(&foreign, el));
        map.bind_shadow(QualName::new("uri"), QualName::new("uri"));
        map.set("uri", "c.sdf").unwrap();
        assert_eq!(
            foreign.borrow().attributes(el).unwrap().get("uri").as_deref(),
            Some("c.sdf")
        );
    }

    #[test]
    fn test_new_attribute_materialized_on_backing() {
        let (foreign, el) = foreign_with(&[]);
        let mut map = AttributeMap::with_backing(Backing::new(&foreign, el));
        map.set("title", "M31").unwrap();
        assert!(map.is_shadow("title"));
        assert_eq!(
            foreign.borrow().attributes(el).unwrap().get("title").as_deref(),
            Some("M31")
        );
    }

    #[test]
    fn test_local_set_not_shadowed() {
        let (foreign, el) = foreign_with(&[]);
        let mut map = AttributeMap::with_backing(Backing::new(&foreign, el));
        map.set_local("url", "file:///x").unwrap();
        assert!(!map.is_shadow("url"));
        assert!(foreign.borrow().attributes(el).unwrap().get("url").is_none());

        // A later regular set never shadows the existing entry
        map.set("url", "file:///y").unwrap();
        assert!(!map.is_shadow("url"));
        assert!(foreign.borrow().attributes(el).unwrap().get("url").is_none());
    }

    #[test]
    fn test_policy_disabled() {
        let (foreign, el) = foreign_with(&[]);
        let mut map = AttributeMap::with_backing(Backing::new(&foreign, el));
        map.set_shadow_policy(false);
        map.set("label", "x").unwrap();
        assert!(!map.is_shadow("label"));
        assert!(foreign.borrow().attributes(el).unwrap().is_empty());
    }

    #[test]
    fn test_remove_shadow_removes_foreign() {
        let (foreign, el) = foreign_with(&[("uri", "a.sdf")]);
        let mut map = AttributeMap::with_backing(Backing::new(&foreign, el));
        map.bind_shadow(QualName::new("uri"), QualName::new("uri"));
        assert_eq!(map.remove("uri").unwrap().as_deref(), Some("a.sdf"));
        assert!(foreign.borrow().attributes(el).unwrap().get("uri").is_none());
    }

    #[test]
    fn test_clone_is_owned_copy() {
        let (foreign, el) = foreign_with(&[("uri", "a.sdf")]);
        let mut map = AttributeMap::with_backing(Backing::new(&foreign, el));
        map.bind_shadow(QualName::new("uri"), QualName::new("uri"));
        let copy = map.clone();
        assert!(copy.backing().is_none());
        assert!(!copy.is_shadow("uri"));
        assert_eq!(copy, map);

        foreign.borrow_mut().set_attribute(el, "uri", "changed").unwrap();
        assert_eq!(copy.get("uri").as_deref(), Some("a.sdf"));
        assert_ne!(copy, map);
    }

    #[test]
    fn test_dangling_backing() {
        let (foreign, el) = foreign_with(&[("uri", "a.sdf")]);
        let mut map = AttributeMap::with_backing(Backing::new(&foreign, el));
        map.bind_shadow(QualName::new("uri"), QualName::new("uri"));
        drop(foreign);
        assert!(map.get("uri").is_none());
        map.set("uri", "b.sdf").unwrap();
        assert_eq!(map.get("uri").as_deref(), Some("b.sdf"));
        assert!(!map.is_shadow("uri"));
    }

    #[test]
    fn test_busy_backing() {
        let (foreign, el) = foreign_with(&[("uri", "a.sdf")]);
        let mut map = AttributeMap::with_backing(Backing::new(&foreign, el));
        map.bind_shadow(QualName::new("uri"), QualName::new("uri"));

        let guard = foreign.borrow_mut();
        assert!(map.get("uri").is_none());
        assert_eq!(map.len(), 0);
        assert!(matches!(map.set("title", "M31"), Err(DomError::InvalidState(_))));
        assert!(!map.contains_key("title"));
        drop(guard);

        assert_eq!(map.get("uri").as_deref(), Some("a.sdf"));
    }

    #[test]
    fn test_xml_prefix_namespace() {
        let mut map = AttributeMap::new();
        map.set("xml:base", "http://example.org/").unwrap();
        assert_eq!(
            map.get_ns(Some(XML_NAMESPACE), "base").as_deref(),
            Some("http://example.org/")
        );
    }

    #[test]
    fn test_iteration_is_ordered() {
        let mut map = AttributeMap::new();
        map.set("zeta", "1").unwrap();
        map.set("alpha", "2").unwrap();
        assert_eq!(map.names(), vec!["alpha".to_string(), "zeta".to_string()]);
        assert_eq!(map.len(), 2);
    }
}
