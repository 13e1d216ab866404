//! Object facades
//!
//! A facade lets a backing object supply the content of an element lazily.
//! Before every structural or attribute read of a bound element the tree asks
//! the facade to synchronize, handing back the memento the facade returned
//! last time so it can skip work when nothing changed.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::{DomError, DomResult, DomTree, NodeId};

/// Boxed error returned by facade implementations
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Opaque synchronization state owned by a facade
///
/// Implemented for every `Clone + PartialEq + Debug` type, so facades usually
/// just return a counter or a small struct.
pub trait Memento: Any + fmt::Debug {
    fn clone_memento(&self) -> Box<dyn Memento>;

    /// Same state as `other`?
    fn same_as(&self, other: &dyn Memento) -> bool;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Clone + PartialEq + fmt::Debug> Memento for T {
    fn clone_memento(&self) -> Box<dyn Memento> {
        Box::new(self.clone())
    }

    fn same_as(&self, other: &dyn Memento) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|o| o == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Backing object of a facade-bound element
pub trait Facade: fmt::Debug {
    /// Bring the element's children and attributes up to date
    ///
    /// `memento` is `None` on the first call. Returning a memento equal to
    /// the one received means nothing changed, and the element's observable
    /// content must then be left as it is. Mutations made on `element` from
    /// inside this call go straight to storage.
    fn synchronize(
        &mut self,
        tree: &mut DomTree,
        element: NodeId,
        memento: Option<&dyn Memento>,
    ) -> Result<Box<dyn Memento>, BoxError>;

    /// The domain object this element stands for. Must not be `None`.
    fn get_object(&self, tree: &DomTree, element: NodeId) -> Result<Option<Rc<dyn Any>>, BoxError>;

    /// Accept an attribute change (`None` removes). Refused by default.
    fn set_attribute(
        &mut self,
        _tree: &DomTree,
        _element: NodeId,
        _name: &str,
        _value: Option<&str>,
    ) -> bool {
        false
    }

    /// Accept a child insertion. Refused by default.
    fn add_child_before(
        &mut self,
        _tree: &DomTree,
        _element: NodeId,
        _new_child: NodeId,
        _ref_child: Option<NodeId>,
    ) -> bool {
        false
    }

    /// Accept a child replacement, or removal when `new_child` is `None`.
    /// Refused by default.
    fn replace_child(
        &mut self,
        _tree: &DomTree,
        _element: NodeId,
        _old_child: NodeId,
        _new_child: Option<NodeId>,
    ) -> bool {
        false
    }

    /// Independent copy of the backing object
    fn clone_facade(&self) -> Box<dyn Facade>;
}

/// Facade state stored on an element
#[derive(Debug)]
pub struct FacadeBinding {
    /// Empty while lent out to a call
    facade: Option<Box<dyn Facade>>,
    memento: Option<Box<dyn Memento>>,
    suppressed: bool,
}

impl FacadeBinding {
    pub(crate) fn new(facade: Box<dyn Facade>) -> Self {
        Self {
            facade: Some(facade),
            memento: None,
            suppressed: false,
        }
    }

    /// Memento returned by the last successful synchronization
    pub fn memento(&self) -> Option<&dyn Memento> {
        self.memento.as_deref()
    }

    /// Is a synchronization or facade call in progress?
    pub fn is_suppressed(&self) -> bool {
        self.suppressed || self.facade.is_none()
    }

    /// Binding for a view clone: cloned facade and memento, not suppressed
    pub(crate) fn duplicate(&self) -> Option<Self> {
        let facade = self.facade.as_ref()?.clone_facade();
        Some(Self {
            facade: Some(facade),
            memento: self.memento.as_ref().map(|m| m.clone_memento()),
            suppressed: false,
        })
    }
}

/// Facade contract violation
///
/// Fatal: raised as a panic payload from accessors that cannot fail, and
/// returned as a value from the checked entry points. Never retried.
#[derive(Debug, thiserror::Error)]
#[error("facade of <{element}> violated its contract: {message}")]
pub struct PluginError {
    pub element: String,
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl PluginError {
    pub fn new(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: BoxError) -> Self {
        self.source = Some(source);
        self
    }

    /// Abort the current operation with this error as panic payload
    pub fn raise(self) -> ! {
        tracing::error!("{}", self);
        std::panic::panic_any(self)
    }
}

impl DomTree {
    fn binding_mut(&mut self, id: NodeId) -> Option<&mut FacadeBinding> {
        self.get_mut(id)?.as_element_mut()?.facade.as_mut()
    }

    pub(crate) fn binding(&self, id: NodeId) -> Option<&FacadeBinding> {
        self.get(id)?.as_element()?.facade.as_ref()
    }

    /// Synchronize a facade-bound element; a no-op for anything else
    ///
    /// Nodes the facade removes while synchronizing and leaves detached are
    /// released when it returns.
    pub fn try_synchronize(&mut self, id: NodeId) -> Result<(), PluginError> {
        let (mut facade, previous) = {
            let Some(binding) = self.binding_mut(id) else {
                return Ok(());
            };
            if binding.suppressed {
                return Ok(());
            }
            let Some(facade) = binding.facade.take() else {
                return Ok(());
            };
            binding.suppressed = true;
            (facade, binding.memento.take())
        };

        let mark = self.sync_removed.len();
        self.sync_depth += 1;
        let result = facade.synchronize(self, id, previous.as_deref());
        self.sync_depth -= 1;
        self.release_leftovers(mark);
        let name = self.node_name(id).unwrap_or_default();

        let Some(binding) = self.binding_mut(id) else {
            return Err(PluginError::new(name, "binding vanished during synchronize"));
        };
        binding.facade = Some(facade);
        binding.suppressed = false;
        match result {
            Ok(memento) => {
                if previous.as_deref().is_some_and(|p| p.same_as(memento.as_ref())) {
                    tracing::trace!("facade of <{}> unchanged", name);
                } else {
                    tracing::debug!("facade of <{}> synchronized", name);
                }
                binding.memento = Some(memento);
                Ok(())
            }
            Err(e) => {
                binding.memento = previous;
                Err(PluginError::new(name, "synchronize failed").with_source(e))
            }
        }
    }

    /// Release what was removed since `mark` and is still detached
    fn release_leftovers(&mut self, mark: usize) {
        let removed = self.sync_removed.split_off(mark);
        for id in removed {
            if self.get(id).is_some_and(|n| n.parent.is_none()) && self.release(id).is_err() {
                tracing::warn!("could not release node {} left by a facade", id);
            }
        }
    }

    /// Synchronize, raising a [`PluginError`] panic on failure
    pub fn synchronize(&mut self, id: NodeId) {
        if let Err(e) = self.try_synchronize(id) {
            e.raise();
        }
    }

    /// Synchronize every facade-bound element in a subtree
    ///
    /// Children are read after their parent has been brought up to date.
    pub fn try_synchronize_subtree(&mut self, root: NodeId) -> Result<(), PluginError> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            self.try_synchronize(id)?;
            let mut kids: Vec<NodeId> = self.child_iter(id).collect();
            kids.reverse();
            stack.extend(kids);
        }
        Ok(())
    }

    /// [`try_synchronize_subtree`](Self::try_synchronize_subtree), raising
    /// a [`PluginError`] panic on failure
    pub fn synchronize_subtree(&mut self, root: NodeId) {
        if let Err(e) = self.try_synchronize_subtree(root) {
            e.raise();
        }
    }

    /// Object behind a facade-bound element
    ///
    /// `Ok(None)` for elements without a facade. A facade that produces no
    /// object, or fails, violates its contract.
    pub fn node_object(&self, id: NodeId) -> Result<Option<Rc<dyn Any>>, PluginError> {
        let Some(binding) = self.binding(id) else {
            return Ok(None);
        };
        let name = self.node_name(id).unwrap_or_default();
        let Some(facade) = binding.facade.as_ref() else {
            return Err(PluginError::new(name, "object requested during synchronize"));
        };
        match facade.get_object(self, id) {
            Ok(Some(object)) => Ok(Some(object)),
            Ok(None) => Err(PluginError::new(name, "facade returned no object")),
            Err(e) => Err(PluginError::new(name, "facade failed to produce its object").with_source(e)),
        }
    }

    /// Ask the facade of `id`, if any, to accept a mutation
    ///
    /// Elements without a facade, and facades that are suppressed, accept
    /// everything.
    pub(crate) fn facade_permits(
        &mut self,
        id: NodeId,
        ask: impl FnOnce(&mut dyn Facade, &DomTree) -> bool,
    ) -> DomResult<()> {
        let mut facade = {
            let Some(binding) = self.binding_mut(id) else {
                return Ok(());
            };
            if binding.suppressed {
                return Ok(());
            }
            let Some(facade) = binding.facade.take() else {
                return Ok(());
            };
            facade
        };
        let accepted = ask(facade.as_mut(), self);
        if let Some(binding) = self.binding_mut(id) {
            binding.facade = Some(facade);
        }
        if accepted {
            Ok(())
        } else {
            Err(DomError::NoModificationAllowed(
                self.node_name(id).unwrap_or_default(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Version(u32);

    #[test]
    fn test_memento_same_as() {
        let a: Box<dyn Memento> = Box::new(Version(1));
        let b: Box<dyn Memento> = Box::new(Version(1));
        let c: Box<dyn Memento> = Box::new(Version(2));
        assert!(a.same_as(b.as_ref()));
        assert!(!a.same_as(c.as_ref()));
        // Different concrete types are never the same
        let d: Box<dyn Memento> = Box::new(1u32);
        assert!(!a.same_as(d.as_ref()));
    }

    #[test]
    fn test_memento_clone() {
        let a: Box<dyn Memento> = Box::new(Version(7));
        let b = a.clone_memento();
        assert!(b.same_as(a.as_ref()));
        assert_eq!(b.as_any().downcast_ref::<Version>(), Some(&Version(7)));
    }

    #[test]
    fn test_plugin_error_display() {
        let err = PluginError::new("data", "facade returned no object");
        assert_eq!(
            err.to_string(),
            "facade of <data> violated its contract: facade returned no object"
        );
    }
}
