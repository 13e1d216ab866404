//! HDX Configuration

use serde::{Deserialize, Serialize};

use crate::{HdxResult, TransformSpec, HDX_NAMESPACE, TYPE_ATTRIBUTE};

/// What the normalizer does with elements named in the active naming mode
/// whose name is not a registered type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnrecognizedPolicy {
    /// Keep them; a tree containing one cannot be normalized
    #[default]
    Keep,
    /// Treat them as transparent
    Skip,
}

/// Whether a missing container may be synthesized around recognized
/// top-level elements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerPolicy {
    #[default]
    Synthesize,
    Never,
}

/// Factory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HdxConfig {
    /// Namespace of HDX elements and of the type attribute
    pub namespace: String,

    /// Local name of the explicit-type attribute
    pub type_attribute: String,

    /// Last-resort base URL (working directory when unset)
    pub default_base: Option<String>,

    pub unrecognized: UnrecognizedPolicy,

    pub container: ContainerPolicy,

    /// Rename and drop rules applied while normalizing
    pub transform: Option<TransformSpec>,
}

impl Default for HdxConfig {
    fn default() -> Self {
        Self {
            namespace: HDX_NAMESPACE.to_string(),
            type_attribute: TYPE_ATTRIBUTE.to_string(),
            default_base: None,
            unrecognized: UnrecognizedPolicy::default(),
            container: ContainerPolicy::default(),
            transform: None,
        }
    }
}

impl HdxConfig {
    /// Parse a JSON configuration; missing keys take their defaults
    pub fn from_json(json: &str) -> HdxResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> HdxResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HdxError;

    #[test]
    fn test_default_config() {
        let config = HdxConfig::default();
        assert_eq!(config.namespace, "http://www.starlink.ac.uk/HDX");
        assert_eq!(config.type_attribute, "name");
        assert_eq!(config.unrecognized, UnrecognizedPolicy::Keep);
        assert_eq!(config.container, ContainerPolicy::Synthesize);
        assert!(config.transform.is_none());
    }

    #[test]
    fn test_partial_json() {
        let config = HdxConfig::from_json(
            r#"{ "default-base": "file:///data/", "unrecognized": "skip", "container": "never" }"#,
        )
        .unwrap();
        assert_eq!(config.default_base.as_deref(), Some("file:///data/"));
        assert_eq!(config.unrecognized, UnrecognizedPolicy::Skip);
        assert_eq!(config.container, ContainerPolicy::Never);
        assert_eq!(config.type_attribute, "name");
    }

    #[test]
    fn test_transform_json() {
        let config = HdxConfig::from_json(
            r#"{ "transform": { "rename": { "spectrum": "data" }, "drop": ["history"] } }"#,
        )
        .unwrap();
        let transform = config.transform.unwrap();
        assert_eq!(transform.rename.get("spectrum").map(String::as_str), Some("data"));
        assert_eq!(transform.drop, vec!["history".to_string()]);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            HdxConfig::from_json(r#"{ "container": "sometimes" }"#),
            Err(HdxError::Config(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = HdxConfig::default();
        config.unrecognized = UnrecognizedPolicy::Skip;
        let json = config.to_json().unwrap();
        assert_eq!(HdxConfig::from_json(&json).unwrap(), config);
    }
}
