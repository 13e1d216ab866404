//! HDX Factory
//!
//! Entry point tying together the type registry, the normalizer and URI
//! resolution. A factory is an explicit value; [`HdxFactory::standard`] is
//! the convenience for callers happy with the standard vocabulary.

use std::any::Any;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use hdx_dom::{BoxError, DomError, DomTree, Facade, NodeId, PluginError, QualName, Resolver};
use url::Url;

use crate::{
    CompiledTransform, Container, HdxConfig, HdxError, HdxResult, Normalizer, ResourceType,
    ResourceTypeRegistry,
};

/// Location attribute callers fill in
pub const URI_ATTRIBUTE: &str = "uri";

/// Cached absolute form of [`URI_ATTRIBUTE`]
pub const URL_ATTRIBUTE: &str = "url";

/// Reads a document from a location
pub trait DocumentLoader: fmt::Debug {
    /// The document at `url`, or `Ok(None)` if this loader does not handle it
    fn load(&self, url: &Url) -> Result<Option<DomTree>, BoxError>;
}

/// Creates canonical containers and the objects behind their elements
#[derive(Debug)]
pub struct HdxFactory {
    registry: ResourceTypeRegistry,
    config: HdxConfig,
    resolver: Resolver,
    transform: OnceCell<Option<CompiledTransform>>,
    /// Newest first
    loaders: Vec<Box<dyn DocumentLoader>>,
}

impl HdxFactory {
    /// Factory over `registry`
    ///
    /// Fails if the configured default base is not an absolute URL.
    pub fn new(registry: ResourceTypeRegistry, config: HdxConfig) -> HdxResult<Self> {
        let resolver = match &config.default_base {
            Some(base) => Resolver::with_default_base(Url::parse(base).map_err(|source| {
                HdxError::Location {
                    location: base.clone(),
                    source,
                }
            })?),
            None => Resolver::new(),
        };
        Ok(Self {
            registry,
            config,
            resolver,
            transform: OnceCell::new(),
            loaders: Vec::new(),
        })
    }

    /// Standard vocabulary, default configuration
    pub fn standard() -> Self {
        Self {
            registry: ResourceTypeRegistry::standard(),
            config: HdxConfig::default(),
            resolver: Resolver::new(),
            transform: OnceCell::new(),
            loaders: Vec::new(),
        }
    }

    pub fn registry(&self) -> &ResourceTypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &HdxConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Add a loader; later loaders are tried first
    pub fn register_loader(&mut self, loader: impl DocumentLoader + 'static) {
        self.loaders.insert(0, Box::new(loader));
    }

    /// Compiled transform rules, compiled on first use
    pub fn transform(&self) -> HdxResult<Option<&CompiledTransform>> {
        if let Some(compiled) = self.transform.get() {
            return Ok(compiled.as_ref());
        }
        let compiled = match &self.config.transform {
            Some(spec) if !spec.is_empty() => Some(CompiledTransform::compile(spec, &self.registry)?),
            _ => None,
        };
        Ok(self.transform.get_or_init(|| compiled).as_ref())
    }

    /// Normalizer configured like this factory
    pub fn normalizer(&self) -> HdxResult<Normalizer<'_>> {
        Ok(Normalizer::new(&self.registry)
            .namespace(self.config.namespace.clone())
            .type_attribute(self.config.type_attribute.clone())
            .unrecognized(self.config.unrecognized)
            .container(self.config.container)
            .transform(self.transform()?)
            .resolver(self.resolver.clone()))
    }

    /// Canonical container for the tree rooted at `element`
    ///
    /// The result is normalized and validated.
    pub fn new_container(&self, source: &hdx_dom::SharedTree, element: NodeId) -> HdxResult<Container> {
        let mut container = self.normalizer()?.normalize(source, element)?;
        if !container.is_valid(&self.registry) {
            let root = container.root();
            return Err(HdxError::Invalid {
                element: container.tree().node_name(root).unwrap_or_default(),
                kind: self.registry.name(self.registry.container()).to_string(),
            });
        }
        Ok(container)
    }

    /// Load the document at `location` and build its container
    ///
    /// Relative locations resolve against the default base. References in
    /// the loaded document resolve against its own location.
    pub fn load_container(&self, location: &str) -> HdxResult<Container> {
        let url = self.resolver.resolve_detached(location)?;
        for loader in &self.loaders {
            let tree = loader.load(&url).map_err(|source| HdxError::Handler {
                element: url.to_string(),
                source,
            })?;
            let Some(mut tree) = tree else {
                continue;
            };
            let root = tree
                .document_element()
                .ok_or_else(|| HdxError::InvalidArgument(format!("{url} has no document element")))?;
            tree.set_import_base(root, url.clone())?;
            tracing::debug!("loaded {} with {:?}", url, loader);
            let source = tree.shared();
            let container = self.new_container(&source, root)?;
            return Ok(container.keep_source(source));
        }
        Err(HdxError::NoHandler(url.to_string()))
    }

    /// Create a canonical element of type `ty`, bound to `facade` if given
    pub fn create_element(
        &self,
        tree: &mut DomTree,
        ty: ResourceType,
        facade: Option<Box<dyn Facade>>,
    ) -> HdxResult<NodeId> {
        let Some(def) = self.registry.get(ty) else {
            return Err(HdxError::InvalidArgument("cannot create an element of type none".into()));
        };
        let element = match facade {
            Some(facade) => tree.create_facade_element(QualName::new(def.name()), facade)?,
            None => tree.create_element(def.name())?,
        };
        Ok(element)
    }

    /// Absolute location of `element`
    ///
    /// Uses the cached `url` attribute when present. Otherwise resolves
    /// `uri` in the element's context and caches the result locally, so the
    /// foreign tree behind a normalized element is left unchanged.
    pub fn resolve_location(&self, tree: &mut DomTree, element: NodeId) -> HdxResult<Option<Url>> {
        if let Some(cached) = tree.attribute(element, URL_ATTRIBUTE) {
            let url = Url::parse(&cached).map_err(|source| HdxError::Location {
                location: cached.clone(),
                source,
            })?;
            return Ok(Some(url));
        }
        let Some(uri) = tree.attribute(element, URI_ATTRIBUTE) else {
            return Ok(None);
        };
        let url = self.resolver.resolve(tree, &uri, element)?;
        match tree.set_attribute_local(element, URL_ATTRIBUTE, url.as_str()) {
            Ok(()) => {}
            Err(DomError::NoModificationAllowed(_)) => {
                tracing::trace!("facade refused caching url on <{}>", self.name_of(tree, element));
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Some(url))
    }

    /// Domain object for `element`
    ///
    /// A facade-bound element supplies its own object. Otherwise the
    /// factories registered for its type are asked in turn. An object of
    /// the wrong declared type is a contract violation.
    pub fn get_object(&self, tree: &mut DomTree, element: NodeId) -> HdxResult<Rc<dyn Any>> {
        let ty = self.registry.element_type(tree, element);
        if ty.is_none() {
            return Err(HdxError::Unrecognized(self.name_of(tree, element)));
        }
        if let Err(e) = self.resolve_location(tree, element) {
            if e.is_contract_violation() {
                return Err(e);
            }
            tracing::warn!("cannot resolve location of <{}>: {}", self.name_of(tree, element), e);
        }
        tree.try_synchronize(element)?;

        let object = match tree.node_object(element)? {
            Some(object) => object,
            None => self.from_factories(tree, element, ty)?,
        };

        if let Some(expected) = self.registry.constructed(ty) {
            if !expected.matches(object.as_ref()) {
                return Err(PluginError::new(
                    self.name_of(tree, element),
                    format!("object is not a {}", expected.name),
                )
                .into());
            }
        }
        Ok(object)
    }

    fn from_factories(&self, tree: &DomTree, element: NodeId, ty: ResourceType) -> HdxResult<Rc<dyn Any>> {
        for factory in self.registry.factories(ty) {
            match factory.get_object(tree, element) {
                Ok(Some(object)) => return Ok(object),
                Ok(None) => continue,
                Err(source) => {
                    return Err(HdxError::Handler {
                        element: self.name_of(tree, element),
                        source,
                    });
                }
            }
        }
        Err(HdxError::NoHandler(self.name_of(tree, element)))
    }

    /// Validate `element` against its type
    pub fn is_valid(&self, tree: &mut DomTree, element: NodeId) -> bool {
        self.registry.is_valid(tree, element)
    }

    fn name_of(&self, tree: &DomTree, element: NodeId) -> String {
        tree.node_name(element).unwrap_or_default()
    }
}
