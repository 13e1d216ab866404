//! Base URI resolution
//!
//! Relative references in a tree are resolved against the nearest absolute
//! `xml:base` found walking up from the context node, then against the base
//! recorded when the enclosing subtree was imported, then against the
//! resolver's default (the working directory unless configured).

use std::path::PathBuf;

use url::Url;

use crate::{DomError, DomResult, DomTree, NodeData, NodeId};

/// Namespace bound to the `xml` prefix
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Errors resolving a reference
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("cannot resolve {reference:?}: {source}")]
    InvalidReference {
        reference: String,
        #[source]
        source: url::ParseError,
    },

    #[error("cannot read working directory: {0}")]
    WorkingDirectory(#[from] std::io::Error),

    #[error("working directory {0} cannot be used as a base")]
    UnusableDirectory(PathBuf),

    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Resolves references relative to a context node
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    default_base: Option<Url>,
}

impl Resolver {
    /// Resolver falling back to the process working directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver falling back to `base`
    pub fn with_default_base(base: Url) -> Self {
        Self {
            default_base: Some(base),
        }
    }

    /// Last-resort base
    pub fn default_base(&self) -> Result<Url, ResolveError> {
        if let Some(base) = &self.default_base {
            return Ok(base.clone());
        }
        let cwd = std::env::current_dir()?;
        Url::from_directory_path(&cwd).map_err(|()| ResolveError::UnusableDirectory(cwd))
    }

    /// Effective base URI of `context`
    ///
    /// Attribute, text and other non-element nodes use their owner element
    /// or parent.
    pub fn base_of(&self, tree: &DomTree, context: NodeId) -> Result<Url, ResolveError> {
        match self.declared_base(tree, context)? {
            Some(base) => Ok(base),
            None => self.default_base(),
        }
    }

    /// Base URI declared in the tree for `context`
    ///
    /// `None` when neither an `xml:base` nor an import base applies, so the
    /// default base would be used.
    pub fn declared_base(&self, tree: &DomTree, context: NodeId) -> Result<Option<Url>, ResolveError> {
        tree.node(context)?;
        let mut partial: Vec<String> = Vec::new();
        for id in tree.ancestors(context) {
            let Some(node) = tree.get(id) else {
                break;
            };
            if let NodeData::Element(element) = &node.data {
                if let Some(base) = element.attrs.get("xml:base") {
                    match Url::parse(&base) {
                        Ok(absolute) => return compose(absolute, &partial).map(Some),
                        Err(url::ParseError::RelativeUrlWithoutBase) => partial.push(base),
                        Err(source) => {
                            return Err(ResolveError::InvalidReference {
                                reference: base,
                                source,
                            });
                        }
                    }
                }
            }
            if let Some(base) = tree.import_base(id) {
                return compose(base.clone(), &partial).map(Some);
            }
        }
        if partial.is_empty() {
            return Ok(None);
        }
        compose(self.default_base()?, &partial).map(Some)
    }

    /// Resolve `reference` to an absolute URL in the context of `context`
    ///
    /// A `file:` reference not followed by `/` is a relative path written
    /// with a scheme; the marker is stripped before resolving.
    pub fn resolve(&self, tree: &DomTree, reference: &str, context: NodeId) -> Result<Url, ResolveError> {
        let reference = strip_relative_file_scheme(reference);
        let base = self.base_of(tree, context)?;
        base.join(reference).map_err(|source| ResolveError::InvalidReference {
            reference: reference.to_string(),
            source,
        })
    }

    /// Resolve `reference` against the default base alone
    pub fn resolve_detached(&self, reference: &str) -> Result<Url, ResolveError> {
        let reference = strip_relative_file_scheme(reference);
        self.default_base()?
            .join(reference)
            .map_err(|source| ResolveError::InvalidReference {
                reference: reference.to_string(),
                source,
            })
    }
}

/// Apply relative bases, nearest last, on top of `base`
fn compose(mut base: Url, partial: &[String]) -> Result<Url, ResolveError> {
    for relative in partial.iter().rev() {
        base = base.join(relative).map_err(|source| ResolveError::InvalidReference {
            reference: relative.clone(),
            source,
        })?;
    }
    Ok(base)
}

fn strip_relative_file_scheme(reference: &str) -> &str {
    match reference.get(..5) {
        Some(scheme) if scheme.eq_ignore_ascii_case("file:") && !reference[5..].starts_with('/') => {
            &reference[5..]
        }
        _ => reference,
    }
}

impl DomTree {
    /// Record the location a subtree was imported from
    pub fn set_import_base(&mut self, root: NodeId, base: Url) -> DomResult<()> {
        self.node(root)?;
        self.import_bases.insert(root, base);
        Ok(())
    }

    /// Import base recorded on exactly this node
    pub fn import_base(&self, id: NodeId) -> Option<&Url> {
        self.import_bases.get(&id)
    }

    pub fn clear_import_base(&mut self, id: NodeId) -> Option<Url> {
        self.import_bases.remove(&id)
    }

    /// Import base of the nearest enclosing imported subtree
    pub fn import_base_in_effect(&self, id: NodeId) -> Option<&Url> {
        self.ancestors(id).find_map(|a| self.import_bases.get(&a))
    }

    /// Import a node from `source` and record where it came from
    pub fn import_with_base(
        &mut self,
        source: &DomTree,
        id: NodeId,
        deep: bool,
        base: Url,
    ) -> DomResult<NodeId> {
        let copy = self.import_node(source, id, deep)?;
        self.import_bases.insert(copy, base);
        Ok(copy)
    }
}
