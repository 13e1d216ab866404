//! Declarative normalization rules
//!
//! A [`TransformSpec`] covers foreign vocabularies the name-based matcher
//! cannot: `rename` maps a foreign element name onto a registered type and
//! `drop` removes whole foreign subtrees from the canonical view.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{HdxError, HdxResult, ResourceType, ResourceTypeRegistry};

/// Serialized form of the rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSpec {
    /// Foreign name to registered type name
    #[serde(default)]
    pub rename: BTreeMap<String, String>,

    /// Foreign names whose subtrees are dropped
    #[serde(default)]
    pub drop: Vec<String>,
}

impl TransformSpec {
    pub fn is_empty(&self) -> bool {
        self.rename.is_empty() && self.drop.is_empty()
    }
}

/// Rules checked against a registry
#[derive(Debug, Clone, Default)]
pub struct CompiledTransform {
    renames: HashMap<String, ResourceType>,
    dropped: HashSet<String>,
}

impl CompiledTransform {
    /// Check every rename target is registered and no name is both renamed
    /// and dropped
    pub fn compile(spec: &TransformSpec, registry: &ResourceTypeRegistry) -> HdxResult<Self> {
        let mut renames = HashMap::with_capacity(spec.rename.len());
        for (from, to) in &spec.rename {
            let ty = registry.match_name(to);
            if ty.is_none() {
                return Err(HdxError::Transform(format!(
                    "rename of {from} targets unregistered type {to}"
                )));
            }
            renames.insert(from.clone(), ty);
        }
        let dropped: HashSet<String> = spec.drop.iter().cloned().collect();
        if let Some(name) = dropped.iter().find(|n| renames.contains_key(*n)) {
            return Err(HdxError::Transform(format!("{name} is both renamed and dropped")));
        }
        tracing::debug!(
            "compiled transform: {} renames, {} drops",
            renames.len(),
            dropped.len()
        );
        Ok(Self { renames, dropped })
    }

    /// Registered type a foreign name is renamed to
    pub fn rename(&self, name: &str) -> Option<ResourceType> {
        self.renames.get(name).copied()
    }

    pub fn drops(&self, name: &str) -> bool {
        self.dropped.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(rename: &[(&str, &str)], drop: &[&str]) -> TransformSpec {
        TransformSpec {
            rename: rename
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            drop: drop.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_compile() {
        let registry = ResourceTypeRegistry::standard();
        let compiled =
            CompiledTransform::compile(&spec(&[("spectrum", "data")], &["history"]), &registry).unwrap();
        assert_eq!(compiled.rename("spectrum"), Some(registry.match_name("data")));
        assert_eq!(compiled.rename("data"), None);
        assert!(compiled.drops("history"));
        assert!(!compiled.drops("spectrum"));
    }

    #[test]
    fn test_unregistered_target() {
        let registry = ResourceTypeRegistry::standard();
        let result = CompiledTransform::compile(&spec(&[("spectrum", "cube")], &[]), &registry);
        assert!(matches!(result, Err(HdxError::Transform(_))));
    }

    #[test]
    fn test_renamed_and_dropped() {
        let registry = ResourceTypeRegistry::standard();
        let result =
            CompiledTransform::compile(&spec(&[("spectrum", "data")], &["spectrum"]), &registry);
        assert!(matches!(result, Err(HdxError::Transform(_))));
    }
}
