//! Normalization of foreign trees
//!
//! The normalizer reduces an arbitrary element tree to a canonical HDX tree:
//! every element that names a registered type becomes a canonical element in
//! no namespace, with attribute entries shadowing its foreign twin, and
//! everything else is either looked through or rejected.
//!
//! Elements are named in one of two modes, chosen once from the top element:
//!
//! - namespace mode: the explicit-type attribute in the HDX namespace, then
//!   the local name of an element in the HDX namespace;
//! - plain mode: the tag name of an element in no namespace.
//!
//! Plain mode is used only when the top element is recognized by its plain
//! tag name, so an already canonical tree normalizes to an equal tree.

use hdx_dom::{
    AttributeMap, Backing, DomError, DomTree, Node, NodeData, NodeId, PluginError, QualName,
    ResolveError, Resolver, SharedTree, XML_NAMESPACE,
};

use crate::{
    CompiledTransform, Container, ContainerPolicy, ResourceType, ResourceTypeRegistry,
    UnrecognizedPolicy, HDX_NAMESPACE, TYPE_ATTRIBUTE,
};

/// Why a tree could not be normalized
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("no recognized elements")]
    Empty,

    #[error("<{0}> does not name a registered type")]
    Unrecognized(String),

    #[error("ambiguous structure: {0}")]
    Ambiguous(String),

    #[error("top-level elements need a container and synthesizing one is disabled")]
    WrapDisabled,

    #[error("normalization input is not an element")]
    NotAnElement,

    #[error("source document is borrowed")]
    Busy,

    #[error(transparent)]
    Dom(#[from] DomError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Namespaced,
    Plain,
    Either,
}

/// Result of classifying one foreign element
#[derive(Debug)]
enum Class {
    /// No name in the active mode; descendants are still visited
    Transparent,
    /// Removed together with its subtree
    Dropped,
    Named {
        name: String,
        ty: ResourceType,
        via_namespace: bool,
    },
}

/// One pending foreign element
struct Visit {
    foreign: NodeId,
    parent: NodeId,
    /// A transparent ancestor declared a base the canonical tree cannot see
    rebase: bool,
}

/// State of one normalization
struct Run<'s> {
    shared: &'s SharedTree,
    source: &'s DomTree,
    out: DomTree,
    mode: Mode,
    /// Copy non-element content too
    verbatim: bool,
    stack: Vec<Visit>,
}

fn declares_base(tree: &DomTree, element: NodeId) -> bool {
    tree.attributes(element)
        .is_some_and(|a| a.contains_key("xml:base"))
}

/// Builds canonical trees from foreign ones
#[derive(Debug, Clone)]
pub struct Normalizer<'a> {
    registry: &'a ResourceTypeRegistry,
    namespace: String,
    type_attribute: String,
    unrecognized: UnrecognizedPolicy,
    container: ContainerPolicy,
    transform: Option<&'a CompiledTransform>,
    resolver: Resolver,
}

impl<'a> Normalizer<'a> {
    pub fn new(registry: &'a ResourceTypeRegistry) -> Self {
        Self {
            registry,
            namespace: HDX_NAMESPACE.to_string(),
            type_attribute: TYPE_ATTRIBUTE.to_string(),
            unrecognized: UnrecognizedPolicy::default(),
            container: ContainerPolicy::default(),
            transform: None,
            resolver: Resolver::new(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn type_attribute(mut self, name: impl Into<String>) -> Self {
        self.type_attribute = name.into();
        self
    }

    pub fn unrecognized(mut self, policy: UnrecognizedPolicy) -> Self {
        self.unrecognized = policy;
        self
    }

    pub fn container(mut self, policy: ContainerPolicy) -> Self {
        self.container = policy;
        self
    }

    pub fn transform(mut self, transform: Option<&'a CompiledTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Resolver used to carry bases declared outside the canonical view
    pub fn resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn registry(&self) -> &'a ResourceTypeRegistry {
        self.registry
    }

    /// Normalize the subtree rooted at `element`
    ///
    /// Facade-bound elements in the source are synchronized first. The
    /// canonical elements of the result shadow their foreign twins, so the
    /// source must outlive any attribute writes made through the result.
    pub fn normalize(&self, source: &SharedTree, element: NodeId) -> Result<Container, NormalizeError> {
        {
            let mut tree = source.try_borrow_mut().map_err(|_| NormalizeError::Busy)?;
            if !tree.node(element)?.is_element() {
                return Err(NormalizeError::NotAnElement);
            }
            tree.try_synchronize_subtree(element)?;
        }
        let tree = source.try_borrow().map_err(|_| NormalizeError::Busy)?;

        let (use_namespace, top) = match self.classify(&tree, element, Mode::Either) {
            Class::Named { via_namespace, ty, .. } => (via_namespace || ty.is_none(), ty),
            _ => (true, ResourceType::NONE),
        };
        let mode = if use_namespace { Mode::Namespaced } else { Mode::Plain };
        // A valid canonical container is carried over with all its content
        let verbatim = mode == Mode::Plain
            && self.registry.is_container(top)
            && self.registry.validate(&tree, element);
        tracing::debug!(
            "normalizing <{}> in {} mode{}",
            tree.node_name(element).unwrap_or_default(),
            if use_namespace { "namespace" } else { "plain" },
            if verbatim { ", verbatim" } else { "" }
        );

        let mut out = DomTree::new();
        let holder = out.create_document_fragment();
        let mut run = Run {
            shared: source,
            source: &tree,
            out,
            mode,
            verbatim,
            stack: vec![Visit {
                foreign: element,
                parent: holder,
                rebase: true,
            }],
        };
        while let Some(visit) = run.stack.pop() {
            self.visit(&mut run, visit)?;
        }

        let mut out = run.out;
        let root = self.assemble(&mut out, holder)?;
        Ok(Container::new(out, root))
    }

    /// Classify one foreign node and queue its children
    fn visit(&self, run: &mut Run<'_>, visit: Visit) -> Result<(), NormalizeError> {
        let Visit { foreign, parent, rebase } = visit;
        let source = run.source;
        if !source.get(foreign).is_some_and(|n| n.is_element()) {
            if run.verbatim {
                let copy = run.out.import_node(source, foreign, true)?;
                run.out.append_child(parent, copy)?;
            }
            return Ok(());
        }

        let (target, rebase_children, descend) = match self.classify(source, foreign, run.mode) {
            Class::Dropped => {
                tracing::debug!("dropping <{}>", source.node_name(foreign).unwrap_or_default());
                return Ok(());
            }
            Class::Transparent => (parent, rebase || declares_base(source, foreign), true),
            Class::Named { name, ty, .. } if ty.is_none() => match self.unrecognized {
                UnrecognizedPolicy::Keep => return Err(NormalizeError::Unrecognized(name)),
                UnrecognizedPolicy::Skip => {
                    tracing::debug!("skipping unrecognized <{}>", name);
                    (parent, rebase || declares_base(source, foreign), true)
                }
            },
            Class::Named { ty, .. } => {
                let canonical = self.build(run, foreign, ty, rebase)?;
                run.out.append_child(parent, canonical)?;
                (canonical, false, !self.registry.is_opaque(ty))
            }
        };
        if descend {
            let kids: Vec<NodeId> = source
                .child_iter(foreign)
                .filter(|&c| run.verbatim || source.get(c).is_some_and(|n| n.is_element()))
                .collect();
            run.stack.extend(kids.into_iter().rev().map(|kid| Visit {
                foreign: kid,
                parent: target,
                rebase: rebase_children,
            }));
        }
        Ok(())
    }

    /// Canonical twin of a recognized foreign element
    fn build(
        &self,
        run: &mut Run<'_>,
        foreign: NodeId,
        ty: ResourceType,
        rebase: bool,
    ) -> Result<NodeId, NormalizeError> {
        let source = run.source;
        let out = &mut run.out;
        let canonical = out.create_element(self.registry.name(ty))?;

        let mut attrs = AttributeMap::with_backing(Backing::new(run.shared, foreign));
        if let Some(foreign_attrs) = source.attributes(foreign) {
            let element_in_ns = source
                .element_name(foreign)
                .is_some_and(|n| n.in_namespace(&self.namespace));
            for (name, _) in foreign_attrs.iter() {
                if let Some(local) = self.attribute_name(name, run.mode, element_in_ns) {
                    attrs.bind_shadow(local, name.clone());
                }
            }
        }
        if let Some(slot) = out.attributes_mut(canonical) {
            *slot = attrs;
        }

        if let Some(hoist) = self.registry.hoist_attribute(ty).filter(|_| !run.verbatim) {
            self.hoist(source, out, foreign, canonical, hoist)?;
        }

        if self.registry.is_opaque(ty) {
            let kids: Vec<NodeId> = source.child_iter(foreign).collect();
            for kid in kids {
                let copy = out.import_node(source, kid, true)?;
                out.append_child(canonical, copy)?;
            }
        }

        let base = match source.import_base(foreign) {
            Some(base) => Some(base.clone()),
            None if rebase => match source.parent(foreign) {
                Some(up) => self.resolver.declared_base(source, up)?,
                None => None,
            },
            None => None,
        };
        if let Some(base) = base {
            tracing::trace!("<{}> keeps base {}", self.registry.name(ty), base);
            out.set_import_base(canonical, base)?;
        }
        Ok(canonical)
    }

    /// Canonical name of a foreign attribute, or `None` if it is not part of
    /// the canonical view
    fn attribute_name(&self, name: &QualName, mode: Mode, element_in_ns: bool) -> Option<QualName> {
        if name.in_namespace(XML_NAMESPACE) {
            return Some(name.clone());
        }
        let local = match mode {
            Mode::Namespaced if name.in_namespace(&self.namespace) => &name.local,
            Mode::Namespaced if element_in_ns && name.namespace.is_none() && name.prefix.is_none() => {
                &name.local
            }
            Mode::Plain if name.namespace.is_none() && name.prefix.is_none() => {
                return Some(QualName::new(name.local.clone()));
            }
            _ => return None,
        };
        (*local != self.type_attribute).then(|| QualName::new(local.clone()))
    }

    /// Fill the hoist attribute from text-only content
    fn hoist(
        &self,
        source: &DomTree,
        out: &mut DomTree,
        foreign: NodeId,
        canonical: NodeId,
        hoist: &str,
    ) -> Result<(), NormalizeError> {
        if out.attributes(canonical).is_some_and(|a| a.contains_key(hoist)) {
            return Ok(());
        }
        let mut text = String::new();
        for kid in source.child_iter(foreign) {
            match source.get(kid).map(|n| &n.data) {
                Some(NodeData::Element(_)) => return Ok(()),
                Some(NodeData::Text(t) | NodeData::CDataSection(t)) => text.push_str(t.data()),
                _ => {}
            }
        }
        let text = text.trim();
        if !text.is_empty() {
            out.set_attribute_local(canonical, hoist, text)?;
        }
        Ok(())
    }

    /// Turn the top-level results into a single container root
    fn assemble(&self, out: &mut DomTree, holder: NodeId) -> Result<NodeId, NormalizeError> {
        let tops: Vec<NodeId> = out.child_iter(holder).collect();
        let types: Vec<ResourceType> = tops
            .iter()
            .map(|&t| self.registry.element_type(out, t))
            .collect();
        let doc = out.document();

        match (tops.as_slice(), types.as_slice()) {
            ([], _) => Err(NormalizeError::Empty),
            ([root], [ty]) if self.registry.is_container(*ty) => {
                let tree: &DomTree = out;
                let stray = tree
                    .child_iter(*root)
                    .filter(|&kid| tree.get(kid).is_some_and(Node::is_element))
                    .find(|&kid| self.registry.element_type(tree, kid).is_none());
                if let Some(kid) = stray {
                    return Err(NormalizeError::Ambiguous(format!(
                        "container holds unrecognized <{}>",
                        out.node_name(kid).unwrap_or_default()
                    )));
                }
                out.append_child(doc, *root)?;
                Ok(*root)
            }
            _ if types.iter().any(|&t| self.registry.is_container(t)) => Err(NormalizeError::Ambiguous(
                format!("container among {} top-level elements", tops.len()),
            )),
            _ => {
                if self.container == ContainerPolicy::Never {
                    return Err(NormalizeError::WrapDisabled);
                }
                let name = self.registry.name(self.registry.container()).to_string();
                tracing::debug!("synthesizing <{}> around {} elements", name, tops.len());
                let root = out.create_element(&name)?;
                for top in tops {
                    out.append_child(root, top)?;
                }
                out.append_child(doc, root)?;
                Ok(root)
            }
        }
    }

    fn classify(&self, tree: &DomTree, element: NodeId, mode: Mode) -> Class {
        let Some(qname) = tree.element_name(element) else {
            return Class::Transparent;
        };

        let mut named = None;
        if mode != Mode::Plain {
            let explicit = tree
                .attributes(element)
                .and_then(|a| a.get_ns(Some(&self.namespace), &self.type_attribute));
            named = explicit.or_else(|| {
                qname
                    .in_namespace(&self.namespace)
                    .then(|| qname.local.clone())
            });
        }
        let via_namespace = named.is_some();
        if named.is_none() && mode != Mode::Namespaced && qname.namespace.is_none() {
            named = Some(qname.qualified());
        }
        let Some(name) = named else {
            return Class::Transparent;
        };

        if let Some(transform) = self.transform {
            if transform.drops(&name) {
                return Class::Dropped;
            }
            if let Some(ty) = transform.rename(&name) {
                return Class::Named { name, ty, via_namespace };
            }
        }
        let ty = self.registry.match_name(&name);
        Class::Named { name, ty, via_namespace }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = HDX_NAMESPACE;

    fn plain(tree: &mut DomTree, parent: NodeId, name: &str) -> NodeId {
        let el = tree.create_element(name).unwrap();
        tree.append_child(parent, el).unwrap();
        el
    }

    fn names(tree: &DomTree, parent: NodeId) -> Vec<String> {
        tree.child_iter(parent)
            .filter_map(|c| tree.element_name(c).map(|n| n.qualified()))
            .collect()
    }

    #[test]
    fn test_plain_container() {
        let registry = ResourceTypeRegistry::standard();
        let mut tree = DomTree::new();
        let doc = tree.document();
        let ndx = plain(&mut tree, doc, "ndx");
        let data = plain(&mut tree, ndx, "data");
        tree.set_attribute(data, "uri", "file:a.sdf").unwrap();
        let source = tree.shared();

        let result = Normalizer::new(&registry).normalize(&source, ndx).unwrap();
        let root = result.root();
        assert_eq!(result.tree().node_name(root).as_deref(), Some("ndx"));
        assert_eq!(names(result.tree(), root), vec!["data"]);
        let data = result.tree().first_child(root).unwrap();
        let attrs = result.tree().attributes(data).unwrap();
        assert!(attrs.is_shadow("uri"));
        assert_eq!(attrs.get("uri").as_deref(), Some("file:a.sdf"));
    }

    #[test]
    fn test_namespace_mode_ignores_plain_names() {
        let registry = ResourceTypeRegistry::standard();
        let mut tree = DomTree::new();
        let doc = tree.document();
        let top = plain(&mut tree, doc, "observation");
        let data = tree.create_element_ns(Some(NS), "h:data").unwrap();
        tree.append_child(top, data).unwrap();
        tree.set_attribute(data, "uri", "a.sdf").unwrap();
        // Plain-named, but the tree is read in namespace mode
        plain(&mut tree, top, "variance");
        let source = tree.shared();

        let result = Normalizer::new(&registry).normalize(&source, top).unwrap();
        let root = result.root();
        assert_eq!(result.tree().node_name(root).as_deref(), Some("ndx"));
        assert_eq!(names(result.tree(), root), vec!["data"]);
    }

    #[test]
    fn test_explicit_type_attribute() {
        let registry = ResourceTypeRegistry::standard();
        let mut tree = DomTree::new();
        let doc = tree.document();
        let top = plain(&mut tree, doc, "wrapper");
        let spectrum = plain(&mut tree, top, "spectrum");
        tree.set_attribute_ns(spectrum, Some(NS), "h:name", "data").unwrap();
        tree.set_attribute_ns(spectrum, Some(NS), "h:uri", "s.fits").unwrap();
        tree.set_attribute(spectrum, "colour", "red").unwrap();
        let source = tree.shared();

        let result = Normalizer::new(&registry).normalize(&source, top).unwrap();
        let data = result.tree().first_child(result.root()).unwrap();
        let attrs = result.tree().attributes(data).unwrap();
        assert_eq!(attrs.get("uri").as_deref(), Some("s.fits"));
        assert!(!attrs.contains_key("name"));
        assert!(!attrs.contains_key("colour"));
    }

    #[test]
    fn test_hoist_text() {
        let registry = ResourceTypeRegistry::standard();
        let mut tree = DomTree::new();
        let doc = tree.document();
        let ndx = plain(&mut tree, doc, "ndx");
        let title = plain(&mut tree, ndx, "title");
        let text = tree.create_text_node("  M31 mosaic \n");
        tree.append_child(title, text).unwrap();
        let data = plain(&mut tree, ndx, "data");
        tree.set_attribute(data, "uri", "m31.sdf").unwrap();
        let source = tree.shared();

        let result = Normalizer::new(&registry).normalize(&source, ndx).unwrap();
        let canonical = result.tree().first_child(result.root()).unwrap();
        assert_eq!(
            result.tree().attributes(canonical).unwrap().get("value").as_deref(),
            Some("M31 mosaic")
        );
        assert!(result.tree().first_child(canonical).is_none());
        // The foreign element is left alone
        assert!(source.borrow_mut().attribute(title, "value").is_none());
    }

    #[test]
    fn test_unrecognized_policy() {
        let registry = ResourceTypeRegistry::standard();
        let mut tree = DomTree::new();
        let doc = tree.document();
        let ndx = plain(&mut tree, doc, "ndx");
        let history = plain(&mut tree, ndx, "history");
        let data = plain(&mut tree, history, "data");
        tree.set_attribute(data, "uri", "a.sdf").unwrap();
        let source = tree.shared();

        let keep = Normalizer::new(&registry).normalize(&source, ndx);
        assert!(matches!(keep, Err(NormalizeError::Unrecognized(ref n)) if n == "history"));

        let skip = Normalizer::new(&registry)
            .unrecognized(UnrecognizedPolicy::Skip)
            .normalize(&source, ndx)
            .unwrap();
        assert_eq!(names(skip.tree(), skip.root()), vec!["data"]);
    }

    #[test]
    fn test_wrap_disabled() {
        let registry = ResourceTypeRegistry::standard();
        let mut tree = DomTree::new();
        let doc = tree.document();
        let top = tree.create_element_ns(Some(NS), "h:data").unwrap();
        tree.append_child(doc, top).unwrap();
        let source = tree.shared();
        let result = Normalizer::new(&registry)
            .container(ContainerPolicy::Never)
            .normalize(&source, top);
        assert!(matches!(result, Err(NormalizeError::WrapDisabled)));
    }

    #[test]
    fn test_busy_source() {
        let registry = ResourceTypeRegistry::standard();
        let mut tree = DomTree::new();
        let el = tree.create_element("ndx").unwrap();
        let source = tree.shared();
        let _guard = source.borrow_mut();
        assert!(matches!(
            Normalizer::new(&registry).normalize(&source, el),
            Err(NormalizeError::Busy)
        ));
    }

    #[test]
    fn test_not_an_element() {
        let registry = ResourceTypeRegistry::standard();
        let mut tree = DomTree::new();
        let text = tree.create_text_node("ndx");
        let source = tree.shared();
        assert!(matches!(
            Normalizer::new(&registry).normalize(&source, text),
            Err(NormalizeError::NotAnElement)
        ));
    }
}
