//! Resource types
//!
//! The registry is the closed vocabulary of element types a canonical tree
//! may contain. Every type may carry a validator, a hoist attribute, the
//! declared type of the object it constructs and a list of object factories.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use hdx_dom::{BoxError, DomTree, NodeData, NodeId};
use url::Url;

use crate::{HdxError, HdxResult};

/// Identifier of a registered type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceType(u16);

impl ResourceType {
    /// Sentinel for unrecognized names
    pub const NONE: ResourceType = ResourceType(0);

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Checks that an element is a well-formed instance of its type
pub type Validator = fn(&DomTree, NodeId, &ResourceTypeRegistry) -> bool;

/// Produces the domain object for an element of a given type
pub trait ResourceFactory: fmt::Debug {
    /// The object for `element`, or `Ok(None)` to let the next factory try
    fn get_object(&self, tree: &DomTree, element: NodeId) -> Result<Option<Rc<dyn Any>>, BoxError>;
}

/// Declared type of constructed objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstructedType {
    pub id: TypeId,
    pub name: &'static str,
}

impl ConstructedType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Is `object` an instance of this type?
    pub fn matches(&self, object: &dyn Any) -> bool {
        object.type_id() == self.id
    }
}

/// Definition of one resource type
#[derive(Debug)]
pub struct ResourceTypeDef {
    name: String,
    container: bool,
    opaque: bool,
    hoist: Option<String>,
    validator: Option<Validator>,
    constructed: Option<ConstructedType>,
    /// Newest first
    factories: Vec<Box<dyn ResourceFactory>>,
}

impl ResourceTypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container: false,
            opaque: false,
            hoist: None,
            validator: None,
            constructed: None,
            factories: Vec::new(),
        }
    }

    /// Attribute filled from the element's text when it is unset
    pub fn hoist(mut self, attribute: impl Into<String>) -> Self {
        self.hoist = Some(attribute.into());
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Content is copied verbatim instead of being normalized
    pub fn opaque(mut self) -> Self {
        self.opaque = true;
        self
    }

    /// Objects built for this type must be a `T`
    pub fn constructs<T: Any>(mut self) -> Self {
        self.constructed = Some(ConstructedType::of::<T>());
        self
    }

    /// Add a factory; later factories are consulted first
    pub fn factory(mut self, factory: impl ResourceFactory + 'static) -> Self {
        self.factories.insert(0, Box::new(factory));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_container(&self) -> bool {
        self.container
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    pub fn hoist_attribute(&self) -> Option<&str> {
        self.hoist.as_deref()
    }

    pub fn constructed(&self) -> Option<ConstructedType> {
        self.constructed
    }

    pub fn factories(&self) -> &[Box<dyn ResourceFactory>] {
        &self.factories
    }
}

/// Closed set of resource types
#[derive(Debug)]
pub struct ResourceTypeRegistry {
    /// Slot 0 is the sentinel
    types: Vec<ResourceTypeDef>,
    by_name: HashMap<String, ResourceType>,
    container: ResourceType,
}

impl ResourceTypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The standard NDX vocabulary
    pub fn standard() -> Self {
        Self::standard_builder().assemble()
    }

    /// Builder pre-loaded with the standard vocabulary, for adding factories
    /// or extra types
    pub fn standard_builder() -> RegistryBuilder {
        let mut builder = Self::builder().container(
            ResourceTypeDef::new("ndx").hoist("uri").validator(valid_container),
        );
        for array in ["image", "data", "variance", "quality"] {
            builder = builder.register(ResourceTypeDef::new(array).hoist("uri").validator(valid_array));
        }
        for text in ["title", "label", "units"] {
            builder = builder.register(ResourceTypeDef::new(text).hoist("value").validator(valid_value));
        }
        builder
            .register(ResourceTypeDef::new("badbits").hoist("value").validator(valid_badbits))
            .register(ResourceTypeDef::new("wcs").opaque().validator(valid_wcs))
            .register(ResourceTypeDef::new("etc").opaque())
    }

    /// Type registered under `name`, or [`ResourceType::NONE`]
    pub fn match_name(&self, name: &str) -> ResourceType {
        self.by_name.get(name).copied().unwrap_or(ResourceType::NONE)
    }

    pub fn get(&self, ty: ResourceType) -> Option<&ResourceTypeDef> {
        if ty.is_none() {
            return None;
        }
        self.types.get(ty.0 as usize)
    }

    /// Registered name, `"none"` for the sentinel
    pub fn name(&self, ty: ResourceType) -> &str {
        self.get(ty).map_or("none", ResourceTypeDef::name)
    }

    pub fn container(&self) -> ResourceType {
        self.container
    }

    pub fn is_container(&self, ty: ResourceType) -> bool {
        !ty.is_none() && ty == self.container
    }

    pub fn is_opaque(&self, ty: ResourceType) -> bool {
        self.get(ty).is_some_and(ResourceTypeDef::is_opaque)
    }

    pub fn hoist_attribute(&self, ty: ResourceType) -> Option<&str> {
        self.get(ty)?.hoist_attribute()
    }

    pub fn constructed(&self, ty: ResourceType) -> Option<ConstructedType> {
        self.get(ty)?.constructed()
    }

    pub fn factories(&self, ty: ResourceType) -> &[Box<dyn ResourceFactory>] {
        self.get(ty).map(ResourceTypeDef::factories).unwrap_or_default()
    }

    /// All registered types
    pub fn types(&self) -> impl Iterator<Item = ResourceType> + '_ {
        (1..self.types.len()).map(|i| ResourceType(i as u16))
    }

    /// Type of a canonical element (no namespace, tag name = type name)
    pub fn element_type(&self, tree: &DomTree, element: NodeId) -> ResourceType {
        match tree.element_name(element) {
            Some(name) if name.namespace.is_none() && name.prefix.is_none() => {
                self.match_name(&name.local)
            }
            _ => ResourceType::NONE,
        }
    }

    /// Run the validator of `element`'s type on its stored state
    ///
    /// Unrecognized elements are invalid; types without a validator accept
    /// everything.
    pub fn validate(&self, tree: &DomTree, element: NodeId) -> bool {
        let ty = self.element_type(tree, element);
        match self.get(ty) {
            None => false,
            Some(def) => def.validator.is_none_or(|v| v(tree, element, self)),
        }
    }

    /// Validate after bringing facade-bound content up to date
    pub fn is_valid(&self, tree: &mut DomTree, element: NodeId) -> bool {
        tree.synchronize_subtree(element);
        self.validate(tree, element)
    }
}

/// Builder for [`ResourceTypeRegistry`]
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    defs: Vec<ResourceTypeDef>,
}

impl RegistryBuilder {
    /// Register the container type
    pub fn container(mut self, mut def: ResourceTypeDef) -> Self {
        def.container = true;
        self.defs.push(def);
        self
    }

    pub fn register(mut self, def: ResourceTypeDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Attach a factory to an already registered type
    pub fn factory(mut self, name: &str, factory: impl ResourceFactory + 'static) -> Self {
        if let Some(def) = self.defs.iter_mut().find(|d| d.name == name) {
            def.factories.insert(0, Box::new(factory));
        } else {
            tracing::warn!("factory for unregistered type {} ignored", name);
        }
        self
    }

    /// Declare the constructed type of an already registered type
    pub fn constructs<T: Any>(mut self, name: &str) -> Self {
        if let Some(def) = self.defs.iter_mut().find(|d| d.name == name) {
            def.constructed = Some(ConstructedType::of::<T>());
        }
        self
    }

    /// Close the registry
    ///
    /// Fails on duplicate or empty names, and unless exactly one container
    /// type was registered.
    pub fn build(self) -> HdxResult<ResourceTypeRegistry> {
        let mut seen = std::collections::HashSet::new();
        for def in &self.defs {
            if def.name.is_empty() || def.name == "none" {
                return Err(HdxError::Registry(format!("invalid type name {:?}", def.name)));
            }
            if !seen.insert(def.name.as_str()) {
                return Err(HdxError::Registry(format!("type {} registered twice", def.name)));
            }
        }
        match self.defs.iter().filter(|d| d.container).count() {
            1 => Ok(self.assemble()),
            n => Err(HdxError::Registry(format!("{n} container types registered, expected 1"))),
        }
    }

    fn assemble(self) -> ResourceTypeRegistry {
        let mut types = vec![ResourceTypeDef::new("none")];
        let mut by_name = HashMap::new();
        let mut container = ResourceType::NONE;
        for def in self.defs {
            let ty = ResourceType(types.len() as u16);
            if def.container {
                container = ty;
            }
            by_name.insert(def.name.clone(), ty);
            types.push(def);
        }
        tracing::debug!("resource registry closed with {} types", types.len() - 1);
        ResourceTypeRegistry {
            types,
            by_name,
            container,
        }
    }
}

// ----------------------------------------------------------------------
// Standard validators
// ----------------------------------------------------------------------

fn is_uri_reference(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty()
        && Url::parse("http://validation.invalid/")
            .ok()
            .and_then(|base| base.join(value).ok())
            .is_some()
}

/// Every child is a valid recognized element and at least one holds data
fn valid_container(tree: &DomTree, element: NodeId, registry: &ResourceTypeRegistry) -> bool {
    let arrays = [registry.match_name("image"), registry.match_name("data")];
    let mut has_array = false;
    for child in tree.child_iter(element) {
        match tree.get(child).map(|n| &n.data) {
            Some(NodeData::Element(_)) => {}
            Some(NodeData::Comment(_) | NodeData::ProcessingInstruction { .. }) => continue,
            Some(NodeData::Text(t)) if t.data().trim().is_empty() => continue,
            _ => return false,
        }
        let ty = registry.element_type(tree, child);
        if ty.is_none() || !registry.validate(tree, child) {
            return false;
        }
        has_array |= arrays.contains(&ty);
    }
    has_array
}

fn valid_array(tree: &DomTree, element: NodeId, _: &ResourceTypeRegistry) -> bool {
    tree.attributes(element)
        .and_then(|a| a.get("uri"))
        .is_some_and(|uri| is_uri_reference(&uri))
}

fn valid_value(tree: &DomTree, element: NodeId, _: &ResourceTypeRegistry) -> bool {
    tree.attributes(element).is_some_and(|a| a.contains_key("value"))
}

fn valid_badbits(tree: &DomTree, element: NodeId, _: &ResourceTypeRegistry) -> bool {
    let Some(value) = tree.attributes(element).and_then(|a| a.get("value")) else {
        return false;
    };
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).is_ok(),
        None => value.parse::<i64>().is_ok(),
    }
}

/// Inline coordinate content or a reference to it
fn valid_wcs(tree: &DomTree, element: NodeId, registry: &ResourceTypeRegistry) -> bool {
    let has_content = tree
        .child_iter(element)
        .any(|c| tree.get(c).is_some_and(|n| n.is_element()));
    has_content || valid_array(tree, element, registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tree: &mut DomTree, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let el = tree.create_element(name).unwrap();
        for (k, v) in attrs {
            tree.set_attribute(el, k, v).unwrap();
        }
        el
    }

    #[test]
    fn test_match_name() {
        let registry = ResourceTypeRegistry::standard();
        let data = registry.match_name("data");
        assert!(!data.is_none());
        assert_eq!(registry.name(data), "data");
        assert_eq!(registry.match_name("spectrum"), ResourceType::NONE);
        assert_eq!(registry.name(ResourceType::NONE), "none");
        assert!(registry.is_container(registry.match_name("ndx")));
        assert_eq!(registry.hoist_attribute(data), Some("uri"));
        assert!(registry.is_opaque(registry.match_name("wcs")));
    }

    #[test]
    fn test_builder_requires_one_container() {
        let none = ResourceTypeRegistry::builder()
            .register(ResourceTypeDef::new("data"))
            .build();
        assert!(matches!(none, Err(HdxError::Registry(_))));

        let two = ResourceTypeRegistry::builder()
            .container(ResourceTypeDef::new("a"))
            .container(ResourceTypeDef::new("b"))
            .build();
        assert!(matches!(two, Err(HdxError::Registry(_))));
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let dup = ResourceTypeRegistry::builder()
            .container(ResourceTypeDef::new("ndx"))
            .register(ResourceTypeDef::new("data"))
            .register(ResourceTypeDef::new("data"))
            .build();
        assert!(matches!(dup, Err(HdxError::Registry(_))));
    }

    #[test]
    fn test_array_validator() {
        let registry = ResourceTypeRegistry::standard();
        let mut tree = DomTree::new();
        let good = element(&mut tree, "data", &[("uri", "file:a.sdf")]);
        let missing = element(&mut tree, "variance", &[]);
        let empty = element(&mut tree, "quality", &[("uri", "  ")]);
        assert!(registry.validate(&tree, good));
        assert!(!registry.validate(&tree, missing));
        assert!(!registry.validate(&tree, empty));
    }

    #[test]
    fn test_value_validators() {
        let registry = ResourceTypeRegistry::standard();
        let mut tree = DomTree::new();
        let title = element(&mut tree, "title", &[("value", "")]);
        let untitled = element(&mut tree, "title", &[]);
        let bits = element(&mut tree, "badbits", &[("value", "0xff")]);
        let bad_bits = element(&mut tree, "badbits", &[("value", "lots")]);
        assert!(registry.validate(&tree, title));
        assert!(!registry.validate(&tree, untitled));
        assert!(registry.validate(&tree, bits));
        assert!(!registry.validate(&tree, bad_bits));
    }

    #[test]
    fn test_container_validator() {
        let registry = ResourceTypeRegistry::standard();
        let mut tree = DomTree::new();
        let ndx = element(&mut tree, "ndx", &[]);
        assert!(!registry.validate(&tree, ndx));

        let data = element(&mut tree, "data", &[("uri", "a.sdf")]);
        tree.append_child(ndx, data).unwrap();
        assert!(registry.validate(&tree, ndx));

        let bogus = element(&mut tree, "spectrum", &[]);
        tree.append_child(ndx, bogus).unwrap();
        assert!(!registry.validate(&tree, ndx));
    }

    #[test]
    fn test_unrecognized_is_invalid() {
        let registry = ResourceTypeRegistry::standard();
        let mut tree = DomTree::new();
        let el = element(&mut tree, "spectrum", &[]);
        assert!(!registry.validate(&tree, el));
        let ns = tree.create_element_ns(Some("urn:x"), "x:data").unwrap();
        assert_eq!(registry.element_type(&tree, ns), ResourceType::NONE);
    }

    #[test]
    fn test_factories_newest_first() {
        #[derive(Debug)]
        struct Tagged(u8);
        impl ResourceFactory for Tagged {
            fn get_object(&self, _: &DomTree, _: NodeId) -> Result<Option<Rc<dyn Any>>, BoxError> {
                Ok(Some(Rc::new(self.0)))
            }
        }
        let registry = ResourceTypeRegistry::standard_builder()
            .factory("data", Tagged(1))
            .factory("data", Tagged(2))
            .build()
            .unwrap();
        let data = registry.match_name("data");
        let mut tree = DomTree::new();
        let el = tree.create_element("data").unwrap();
        let first = registry.factories(data)[0].get_object(&tree, el).unwrap().unwrap();
        assert_eq!(first.downcast_ref::<u8>(), Some(&2));
    }

    #[test]
    fn test_constructed_type() {
        let ct = ConstructedType::of::<String>();
        let s: Rc<dyn Any> = Rc::new(String::from("x"));
        let n: Rc<dyn Any> = Rc::new(1u8);
        assert!(ct.matches(s.as_ref()));
        assert!(!ct.matches(n.as_ref()));
    }
}
