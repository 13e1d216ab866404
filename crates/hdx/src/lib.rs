//! HDX - uniform typed trees over heterogeneous data
//!
//! Canonical HDX trees are built from foreign XML-like trees by the
//! [`Normalizer`], whose canonical elements shadow their foreign twins, or
//! from backing objects exposed through [`hdx_dom::Facade`]s. The
//! [`ResourceTypeRegistry`] fixes which element types exist and how they are
//! validated; [`HdxFactory`] ties registry, normalizer and URI resolution
//! together.

mod config;
mod container;
mod error;
mod factory;
mod normalize;
mod resource;
mod transform;

pub use config::{ContainerPolicy, HdxConfig, UnrecognizedPolicy};
pub use container::Container;
pub use error::{HdxError, HdxResult};
pub use factory::{DocumentLoader, HdxFactory, URI_ATTRIBUTE, URL_ATTRIBUTE};
pub use normalize::{NormalizeError, Normalizer};
pub use resource::{
    ConstructedType, RegistryBuilder, ResourceFactory, ResourceType, ResourceTypeDef,
    ResourceTypeRegistry, Validator,
};
pub use transform::{CompiledTransform, TransformSpec};

pub use hdx_dom;

/// Namespace of HDX elements and of the explicit-type attribute
pub const HDX_NAMESPACE: &str = "http://www.starlink.ac.uk/HDX";

/// Local name of the attribute that names an element's type directly
pub const TYPE_ATTRIBUTE: &str = "name";

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
