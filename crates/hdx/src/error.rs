//! Error types

use hdx_dom::{BoxError, DomError, PluginError, ResolveError};

use crate::NormalizeError;

/// Result type for HDX operations
pub type HdxResult<T> = Result<T, HdxError>;

/// HDX errors
///
/// Everything except [`HdxError::Plugin`] is recoverable. A plugin error
/// reports a facade or handler that broke its contract.
#[derive(Debug, thiserror::Error)]
pub enum HdxError {
    #[error(transparent)]
    Dom(#[from] DomError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("<{element}> is not a valid {kind} element")]
    Invalid { element: String, kind: String },

    #[error("<{0}> is not a recognized resource type")]
    Unrecognized(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no handler produced an object for <{0}>")]
    NoHandler(String),

    #[error("handler for <{element}> failed")]
    Handler {
        element: String,
        #[source]
        source: BoxError,
    },

    #[error("registry: {0}")]
    Registry(String),

    #[error("transform: {0}")]
    Transform(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid location {location:?}: {source}")]
    Location {
        location: String,
        #[source]
        source: url::ParseError,
    },
}

impl HdxError {
    /// Did a facade or handler violate its contract?
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::Plugin(_) | Self::Normalize(NormalizeError::Plugin(_))
        )
    }
}
