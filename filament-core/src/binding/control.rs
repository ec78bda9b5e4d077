//! Controls and the injector boundary.
//!
//! A control is a component instance hosted by a document node (element
//! controls) or attached through an attribute (attribute controls). The
//! pipeline never constructs controls itself; it asks an [`Injector`] for a
//! descriptor during discovery and for a fresh instance whenever a manager
//! (or a clone of one) needs it.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::element::ManagerRef;
use super::template::TemplateRef;
use crate::context::{ContextOwner, Object, OwnerId, Value};

/// Something a control publishes for its descendants by name.
#[derive(Clone)]
pub enum Resource {
    /// A control whose context may serve as another control's context root.
    Observable(Arc<dyn Control>),
    /// A plain value. Cannot be used as a context source.
    Value(Value),
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Observable(control) => write!(f, "Observable({})", control.uid()),
            Resource::Value(value) => write!(f, "Value({value:?})"),
        }
    }
}

/// Lifecycle hooks of a hosted component. Every hook has a no-op default.
pub trait Control: ContextOwner {
    /// The context resolved for this control changed.
    fn context_changed(&self, _new: &Value, _old: &Value) {}

    /// A bound attribute on the control's node was (re)evaluated.
    fn property_changed(&self, _name: &str, _value: &Value) {}

    /// The control's subtree finished loading. For attribute controls this
    /// runs once their bound properties have been pushed.
    fn loaded(&self, _manager: &ManagerRef) {}

    /// Look up a resource published under `name`.
    fn resource(&self, _name: &str) -> Option<Resource> {
        None
    }

    fn disposed(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Registered by tag name (or named by the control attribute); hosts the node.
    Element,
    /// Registered by attribute name; decorates whatever node carries it.
    Attribute,
}

/// Static description of a registered control.
#[derive(Debug, Clone)]
pub struct ControlDescriptor {
    pub name: String,
    pub kind: ControlKind,
    /// Tag the hosting node is swapped to, if different.
    pub replace_tag: Option<String>,
    pub template: Option<TemplateRef>,
    /// The control sources its context itself instead of inheriting it.
    pub owns_context: bool,
    /// The node is replaced by a pair of marker comments; its content
    /// becomes a template stamped between them.
    pub removes_node: bool,
    /// Attribute controls on one node initialise highest priority first.
    pub priority: i32,
}

impl ControlDescriptor {
    pub fn element(name: impl Into<String>) -> Self {
        Self::new(name, ControlKind::Element)
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Self::new(name, ControlKind::Attribute)
    }

    fn new(name: impl Into<String>, kind: ControlKind) -> Self {
        Self {
            name: name.into(),
            kind,
            replace_tag: None,
            template: None,
            owns_context: false,
            removes_node: false,
            priority: 0,
        }
    }

    pub fn replace_tag(mut self, tag: impl Into<String>) -> Self {
        self.replace_tag = Some(tag.into());
        self
    }

    pub fn template(mut self, template: TemplateRef) -> Self {
        self.template = Some(template);
        self
    }

    pub fn owns_context(mut self) -> Self {
        self.owns_context = true;
        self
    }

    pub fn removes_node(mut self) -> Self {
        self.removes_node = true;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Dependency-resolution boundary.
pub trait Injector: Send + Sync {
    fn descriptor(&self, name: &str) -> Option<Arc<ControlDescriptor>>;

    /// A fresh instance of the control registered as `name`.
    fn resolve(&self, name: &str) -> Option<Arc<dyn Control>>;
}

type Factory = Arc<dyn Fn() -> Arc<dyn Control> + Send + Sync>;

/// Name -> (descriptor, factory) table.
#[derive(Default)]
pub struct ControlRegistry {
    entries: RwLock<IndexMap<String, (Arc<ControlDescriptor>, Factory)>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a control.
    pub fn register<F>(&self, descriptor: ControlDescriptor, factory: F)
    where
        F: Fn() -> Arc<dyn Control> + Send + Sync + 'static,
    {
        tracing::debug!(control = %descriptor.name, kind = ?descriptor.kind, "control registered");
        self.entries.write().insert(
            descriptor.name.clone(),
            (Arc::new(descriptor), Arc::new(factory)),
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Injector for ControlRegistry {
    fn descriptor(&self, name: &str) -> Option<Arc<ControlDescriptor>> {
        self.entries.read().get(name).map(|(d, _)| d.clone())
    }

    fn resolve(&self, name: &str) -> Option<Arc<dyn Control>> {
        let factory = self.entries.read().get(name).map(|(_, f)| f.clone())?;
        Some(factory())
    }
}

impl fmt::Debug for ControlRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.read().keys())
            .finish()
    }
}

/// Identity and scope storage shared by most control implementations.
/// Each base is one owner id, so it is deliberately not `Clone`.
#[derive(Debug, Default)]
pub struct ControlBase {
    uid: OwnerId,
    scope: Object,
}

impl ControlBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uid(&self) -> OwnerId {
        self.uid
    }

    pub fn scope(&self) -> &Object {
        &self.scope
    }
}

impl ContextOwner for ControlBase {
    fn uid(&self) -> OwnerId {
        self.uid
    }

    fn scope(&self) -> &Object {
        &self.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain(ControlBase);

    impl ContextOwner for Plain {
        fn uid(&self) -> OwnerId {
            self.0.uid()
        }

        fn scope(&self) -> &Object {
            self.0.scope()
        }
    }

    impl Control for Plain {}

    #[test]
    fn registry_resolves_fresh_instances() {
        let registry = ControlRegistry::new();
        registry.register(
            ControlDescriptor::element("card").owns_context().priority(2),
            || Arc::new(Plain(ControlBase::new())) as Arc<dyn Control>,
        );

        let descriptor = registry.descriptor("card").unwrap();
        assert!(descriptor.owns_context);
        assert_eq!(descriptor.priority, 2);
        assert_eq!(descriptor.kind, ControlKind::Element);

        let a = registry.resolve("card").unwrap();
        let b = registry.resolve("card").unwrap();
        assert_ne!(a.uid(), b.uid());
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn base_scope_holds_context() {
        let base = ControlBase::new();
        base.scope().set("context", 4);
        assert_eq!(ContextOwner::context(&base), Value::from(4));
    }

    #[test]
    fn each_base_is_its_own_owner() {
        let contexts = crate::context::ContextRegistry::default();
        let (a, b) = (ControlBase::new(), ControlBase::new());
        assert_ne!(a.uid(), b.uid());

        let first = contexts.get_manager(&a);
        assert!(Arc::ptr_eq(&first, &contexts.get_manager(&a)));
        assert!(!Arc::ptr_eq(&first, &contexts.get_manager(&b)));
        assert_eq!(contexts.len(), 2);
    }
}
