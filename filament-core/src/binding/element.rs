//! Element Managers
//!
//! One manager exists per document node. It pairs the node's shared
//! [`NodeMap`] with live state: the node id, the hosted control, child
//! managers, subscriptions and the compile/bind/load state machine.
//!
//! # Lifecycle
//!
//! ```text
//! Discovered -> Initialized -> (TemplateResolving) -> Bound -> Loaded
//!                    ^
//!                    '-- clone_into (from a compiled manager)
//! ```
//!
//! Any phase may move to `Disposed`. The current phase is published on a
//! `watch` channel, see [`ElementManager::wait_loaded`].
//!
//! # Scopes
//!
//! Identifiers in a binding resolve against the *declaring* scope: the
//! nearest ancestor that established a frame (a hosting control, or a node
//! with a context selector), or the environment's root scope. Identifiers
//! starting with the context key map onto the frame's absolute context path
//! on the owner that holds the data, so a cascade from the root reaches
//! every bound descendant directly.
//!
//! # Ownership
//!
//! A manager owns its children; the parent link is a `Weak`. Callbacks
//! registered with context managers only hold `Weak` references back.

use std::fmt;
use std::sync::{Arc, Weak};

use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};

use super::control::{Control, Resource};
use super::environment::{Environment, RootScope};
use super::expression::ContextSelector;
use super::node_map::{BindingTarget, NodeMap};
use super::template::TemplateRef;
use super::templates::BindableTemplates;
use crate::context::path;
use crate::context::{
    ContextManager, ContextOwner, ContextRegistry, Object, OwnerId, Subscription, Value,
};
use crate::dom::{NodeId, NodeKind, NodeSpec};
use crate::error::{BindError, DocumentError};

pub type ManagerRef = Arc<ElementManager>;

/// Shared completion of a template resolution or a subtree load.
pub type LoadFuture = Shared<BoxFuture<'static, Result<(), BindError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Discovered,
    Initialized,
    TemplateResolving,
    Bound,
    Loaded,
    Disposed,
}

// ----------------------------------------------------------------------------
// Scope frames
// ----------------------------------------------------------------------------

#[derive(Clone)]
enum ScopeOwner {
    Root(Arc<RootScope>),
    Control(Arc<dyn Control>),
}

impl ScopeOwner {
    fn scope(&self) -> &Object {
        match self {
            ScopeOwner::Root(root) => root.scope(),
            ScopeOwner::Control(control) => control.scope(),
        }
    }

    fn manager(&self, contexts: &ContextRegistry) -> Arc<ContextManager> {
        match self {
            ScopeOwner::Root(root) => contexts.get_manager(root.as_ref()),
            ScopeOwner::Control(control) => contexts.get_manager(control.as_ref()),
        }
    }

    fn resolve(&self, identifier: &str) -> Value {
        Value::Object(self.scope().clone()).lookup(identifier)
    }
}

#[derive(Clone)]
struct Frame {
    /// Owner of non-context identifiers.
    scope: ScopeOwner,
    /// Owner holding the context data.
    context: ScopeOwner,
    /// Absolute path of the context on `context`.
    path: String,
}

impl Frame {
    fn root(env: &Environment) -> Self {
        let root = ScopeOwner::Root(env.root_scope().clone());
        Self {
            scope: root.clone(),
            context: root,
            path: env.config().context_key.clone(),
        }
    }

    fn locate(&self, identifier: &str, key: &str) -> (ScopeOwner, String) {
        if identifier == key {
            return (self.context.clone(), self.path.clone());
        }
        match path::relative(key, identifier) {
            Some(rest) => (self.context.clone(), path::join(&self.path, rest)),
            None => (self.scope.clone(), identifier.to_string()),
        }
    }
}

// ----------------------------------------------------------------------------
// Manager
// ----------------------------------------------------------------------------

struct State {
    node: NodeId,
    end_marker: Option<NodeId>,
    children: Vec<ManagerRef>,
    control: Option<Arc<dyn Control>>,
    attribute_controls: Vec<Arc<dyn Control>>,
    is_clone: bool,
    frame: Option<Frame>,
    subscriptions: Vec<Subscription>,
    template: Option<LoadFuture>,
    template_content: Option<NodeId>,
    templates: Option<Arc<BindableTemplates>>,
    load: Option<LoadFuture>,
    disposed: bool,
}

pub struct ElementManager {
    uid: OwnerId,
    env: Arc<Environment>,
    node_map: Arc<NodeMap>,
    parent: Weak<ElementManager>,
    this: Weak<ElementManager>,
    state: Mutex<State>,
    phase: watch::Sender<Phase>,
}

impl ElementManager {
    /// Discover `node`, build its manager and compile its subtree.
    ///
    /// The manager attaches itself to `parent`. When the node hosts a
    /// control and has a parent, `None` is returned: the hosted subtree is
    /// reached through the parent (and completed by template resolution),
    /// never registered a second time by the caller.
    pub fn create(
        env: &Arc<Environment>,
        node: NodeId,
        parent: Option<&ManagerRef>,
    ) -> Result<Option<ManagerRef>, BindError> {
        let document = env.document();
        let map = NodeMap::discover(env, node);

        let mut node = node;
        if let Some(tag) = map.host().and_then(|h| h.replace_tag.as_deref()) {
            if document.tag(node).as_deref() != Some(tag) {
                node = document.retag(node, tag)?;
            }
        }

        let map = Arc::new(map);
        let host = map.host().cloned();
        let manager = Self::construct(
            env.clone(),
            node,
            parent.map(Arc::downgrade).unwrap_or_default(),
            map,
            false,
        )?;
        if let Some(parent) = parent {
            parent.push_child(manager.clone());
        }

        match &host {
            Some(host) if host.removes_node || host.template.is_some() => {
                if host.removes_node {
                    manager.bracket(&host.name)?;
                }
                manager.schedule_template(host.template.clone());
            }
            _ => manager.compile_children()?,
        }
        manager.set_phase(Phase::Initialized);
        tracing::trace!(manager = %manager.uid, node = ?node, control = ?host.as_ref().map(|h| &h.name), "created");

        Ok(match (&host, parent) {
            (Some(_), Some(_)) => None,
            _ => Some(manager),
        })
    }

    pub(crate) fn construct(
        env: Arc<Environment>,
        node: NodeId,
        parent: Weak<ElementManager>,
        node_map: Arc<NodeMap>,
        is_clone: bool,
    ) -> Result<ManagerRef, BindError> {
        let controls = env.controls();
        let control = match node_map.host() {
            Some(descriptor) => Some(
                controls
                    .resolve(&descriptor.name)
                    .ok_or_else(|| BindError::UnknownControl(descriptor.name.clone()))?,
            ),
            None => None,
        };
        let attribute_controls = node_map
            .attribute_controls()
            .iter()
            .map(|descriptor| {
                controls
                    .resolve(&descriptor.name)
                    .ok_or_else(|| BindError::UnknownControl(descriptor.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (phase, _) = watch::channel(Phase::Discovered);
        Ok(Arc::new_cyclic(|this| Self {
            uid: OwnerId::new(),
            env,
            node_map,
            parent,
            this: this.clone(),
            state: Mutex::new(State {
                node,
                end_marker: None,
                children: Vec::new(),
                control,
                attribute_controls,
                is_clone,
                frame: None,
                subscriptions: Vec::new(),
                template: None,
                template_content: None,
                templates: None,
                load: None,
                disposed: false,
            }),
            phase,
        }))
    }

    /// Replace the node with a start/end comment pair. The node's children
    /// move into a detached container that becomes the template content.
    fn bracket(&self, name: &str) -> Result<(), BindError> {
        let document = self.env.document();
        let node = self.node();
        let container = document.create_element("template");
        for child in document.children(node) {
            document.append_child(container, child)?;
        }

        let parent = document.parent(node).ok_or(DocumentError::NoParent(node))?;
        let start = document.create_comment(name);
        let end = document.create_comment(format!("/{name}"));
        document.replace(node, start)?;
        document.insert_before(parent, end, document.sibling_at(start, 1))?;

        let mut state = self.state.lock();
        state.node = start;
        state.end_marker = Some(end);
        state.template_content = Some(container);
        Ok(())
    }

    pub(crate) fn compile_children(self: &Arc<Self>) -> Result<(), BindError> {
        for child in self.env.document().children(self.node()) {
            Self::create(&self.env, child, Some(self))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------------

    /// Set up template resolution. Resolution is lazy: it starts when first
    /// awaited, runs once, and its result is shared by every awaiter. If a
    /// resolution is already outstanding, that one is returned.
    pub fn set_template(self: &Arc<Self>, template: Option<TemplateRef>) -> LoadFuture {
        let name = self.name();
        let mut state = self.state.lock();
        state
            .template
            .get_or_insert_with(|| {
                Self::resolve_template(self.this.clone(), self.env.clone(), name, template)
                    .boxed()
                    .shared()
            })
            .clone()
    }

    /// Store the template task without awaiting it. Loading picks it up.
    fn schedule_template(self: &Arc<Self>, template: Option<TemplateRef>) {
        drop(self.set_template(template));
    }

    async fn resolve_template(
        this: Weak<ElementManager>,
        env: Arc<Environment>,
        control: String,
        template: Option<TemplateRef>,
    ) -> Result<(), BindError> {
        if let Some(manager) = this.upgrade() {
            manager.set_phase(Phase::TemplateResolving);
        }

        let nodes = match &template {
            Some(template) => Some(
                template
                    .load(env.templates())
                    .await
                    .map_err(|source| BindError::Template {
                        control: control.clone(),
                        source,
                    })?,
            ),
            None => None,
        };

        let Some(manager) = this.upgrade() else {
            return Ok(());
        };
        if manager.is_disposed() {
            tracing::debug!(control, "template settled after disposal");
            return Ok(());
        }
        let templates = manager.install_template(nodes.as_deref())?;
        drop(manager);

        if let Some(templates) = templates {
            templates.ready().await?;
        }
        Ok(())
    }

    fn install_template(
        self: &Arc<Self>,
        nodes: Option<&[NodeSpec]>,
    ) -> Result<Option<Arc<BindableTemplates>>, BindError> {
        let document = self.env.document();
        let (node, content) = {
            let state = self.state.lock();
            (state.node, state.template_content)
        };

        match content {
            Some(container) => {
                if let Some(nodes) = nodes {
                    document.replace_children(container, nodes)?;
                }
                let templates = BindableTemplates::compile(&self.env, container, self)?;
                self.state.lock().templates = Some(templates.clone());
                Ok(Some(templates))
            }
            None => {
                if let Some(nodes) = nodes {
                    document.replace_children(node, nodes)?;
                }
                self.compile_children()?;
                Ok(None)
            }
        }
    }

    /// Wait until every template in this subtree has resolved, without binding.
    pub fn resolve_templates(self: &Arc<Self>) -> BoxFuture<'static, Result<(), BindError>> {
        let this = self.clone();
        async move {
            let template = this.state.lock().template.clone();
            if let Some(template) = template {
                template.await?;
            }
            let results = join_all(this.children().iter().map(|c| c.resolve_templates())).await;
            results.into_iter().collect::<Result<Vec<_>, _>>().map(|_| ())
        }
        .boxed()
    }

    // ------------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------------

    /// Resolve this node's context and subscribe its bindings.
    pub fn bind(self: &Arc<Self>) -> Result<(), BindError> {
        if self.is_disposed() {
            return Err(BindError::Disposed);
        }
        if self.node_map.is_inert() {
            self.set_phase(Phase::Bound);
            return Ok(());
        }

        let key = self.env.config().context_key.clone();
        let declaring = self.parent_frame();
        let (control, attribute_controls) = {
            let state = self.state.lock();
            (state.control.clone(), state.attribute_controls.clone())
        };

        let frame = match (&control, self.node_map.host()) {
            (Some(control), Some(host)) if host.owns_context => {
                let own = ScopeOwner::Control(control.clone());
                Some(Frame {
                    scope: own.clone(),
                    context: own,
                    path: key.clone(),
                })
            }
            (Some(control), Some(_)) => {
                let (owner, path) = self.resolve_context(&declaring, &key);
                self.observe_host_context(control, &owner, &path, &key);
                Some(Frame {
                    scope: ScopeOwner::Control(control.clone()),
                    context: owner,
                    path,
                })
            }
            _ => self.node_map.context_selector().map(|_| {
                let (owner, path) = self.resolve_context(&declaring, &key);
                Frame {
                    scope: declaring.scope.clone(),
                    context: owner,
                    path,
                }
            }),
        };
        self.state.lock().frame = frame;

        let contexts = self.env.contexts();
        for (index, binding) in self.node_map.bindings().iter().enumerate() {
            for identifier in &binding.identifiers {
                let (owner, path) = declaring.locate(identifier, &key);
                let weak = self.this.clone();
                let subscription =
                    owner
                        .manager(contexts)
                        .observe(&path, self.uid, move |_: &Value, _: &Value| {
                            if let Some(manager) = weak.upgrade() {
                                if let Err(err) = manager.apply_binding(index) {
                                    tracing::warn!(manager = %manager.uid, error = %err, "binding update failed");
                                }
                            }
                        });
                self.state.lock().subscriptions.push(subscription);
            }
            if let Err(err) = self.apply_binding(index) {
                tracing::warn!(manager = %self.uid, error = %err, "binding evaluation failed");
            }
        }

        for control in &attribute_controls {
            control.loaded(self);
        }
        self.set_phase(Phase::Bound);
        Ok(())
    }

    fn observe_host_context(
        &self,
        control: &Arc<dyn Control>,
        owner: &ScopeOwner,
        path: &str,
        key: &str,
    ) {
        let weak = Arc::downgrade(control);
        let field = key.to_string();
        let subscription = owner.manager(self.env.contexts()).observe(
            path,
            control.uid(),
            move |new: &Value, old: &Value| {
                if let Some(control) = weak.upgrade() {
                    control.scope().set(field.as_str(), new.clone());
                    control.context_changed(new, old);
                }
            },
        );
        self.state.lock().subscriptions.push(subscription);

        let current = owner.resolve(path);
        control.scope().set(key, current.clone());
        control.context_changed(&current, &Value::Undefined);
    }

    fn resolve_context(&self, declaring: &Frame, key: &str) -> (ScopeOwner, String) {
        let inherit = || (declaring.context.clone(), declaring.path.clone());
        match self.node_map.context_selector() {
            None => inherit(),
            Some(ContextSelector::Relative(relative)) => (
                declaring.context.clone(),
                path::join(&declaring.path, relative),
            ),
            Some(ContextSelector::Alias { resource, path: rest }) => {
                match self.find_resource(resource) {
                    Some(Resource::Observable(source)) => {
                        (ScopeOwner::Control(source), path::join(key, rest))
                    }
                    Some(Resource::Value(_)) => {
                        tracing::warn!(resource = %resource, "context source is not observable; inheriting");
                        inherit()
                    }
                    None => {
                        tracing::warn!(resource = %resource, "context source not found; inheriting");
                        inherit()
                    }
                }
            }
        }
    }

    fn find_resource(&self, name: &str) -> Option<Resource> {
        let mut current = self.parent.upgrade();
        while let Some(manager) = current {
            if let Some(resource) = manager.control().and_then(|c| c.resource(name)) {
                return Some(resource);
            }
            current = manager.parent.upgrade();
        }
        None
    }

    fn frame(&self) -> Option<Frame> {
        self.state.lock().frame.clone()
    }

    fn parent_frame(&self) -> Frame {
        let mut current = self.parent.upgrade();
        while let Some(manager) = current {
            if let Some(frame) = manager.frame() {
                return frame;
            }
            current = manager.parent.upgrade();
        }
        Frame::root(&self.env)
    }

    /// Re-evaluate binding `index` and push the result to the node and to
    /// the controls on it.
    fn apply_binding(&self, index: usize) -> Result<(), BindError> {
        let Some(binding) = self.node_map.bindings().get(index) else {
            return Ok(());
        };
        let (node, ranged, control, attribute_controls) = {
            let state = self.state.lock();
            if state.disposed {
                return Ok(());
            }
            (
                state.node,
                state.end_marker.is_some(),
                state.control.clone(),
                state.attribute_controls.clone(),
            )
        };

        let key = &self.env.config().context_key;
        let frame = self.parent_frame();
        let value = binding.interpolation.evaluate(|identifier| {
            let (owner, path) = frame.locate(identifier, key);
            owner.resolve(&path)
        });

        let document = self.env.document();
        match &binding.target {
            BindingTarget::Text => document.set_text(node, value.to_display_string())?,
            BindingTarget::Attribute(name) => {
                if !ranged {
                    document.set_attribute(node, name, value.to_display_string())?;
                }
                for control in &attribute_controls {
                    control.property_changed(name, &value);
                }
                if let Some(control) = &control {
                    control.property_changed(name, &value);
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Wait for this subtree's templates, bind it, then load every child.
    ///
    /// Children that source their own context wait for it to become
    /// non-null first. Sibling loads are joined; the first error (if any)
    /// is this manager's result and the manager is then not marked loaded.
    /// Calling this again returns the same shared completion.
    pub fn bind_and_load(self: &Arc<Self>) -> LoadFuture {
        let mut state = self.state.lock();
        if let Some(load) = &state.load {
            return load.clone();
        }
        let weak = self.this.clone();
        let task = async move {
            match weak.upgrade() {
                Some(manager) => manager.run_load().await,
                None => Ok(()),
            }
        }
        .boxed()
        .shared();
        state.load = Some(task.clone());
        task
    }

    async fn run_load(self: Arc<Self>) -> Result<(), BindError> {
        let template = self.state.lock().template.clone();
        if let Some(template) = template {
            if let Err(err) = template.await {
                tracing::error!(manager = %self.uid, error = %err, "template resolution failed; subtree left uncompiled");
                return Err(err);
            }
        }
        if self.is_disposed() {
            return Ok(());
        }
        self.bind()?;

        let loads: Vec<BoxFuture<'static, Result<(), BindError>>> = self
            .children()
            .into_iter()
            .filter_map(|child| {
                let owns_context = child.owns_context();
                if owns_context && child.is_clone() {
                    // scheduled by clone_into
                    return None;
                }
                Some(if owns_context {
                    async move {
                        child.wait_for_context().await?;
                        child.bind_and_load().await
                    }
                    .boxed()
                } else {
                    child.bind_and_load().boxed()
                })
            })
            .collect();

        let results = join_all(loads).await;
        if let Some(err) = results.into_iter().find_map(Result::err) {
            return Err(err);
        }

        self.load();
        Ok(())
    }

    fn load(self: &Arc<Self>) {
        if self.is_disposed() {
            return;
        }
        self.set_phase(Phase::Loaded);
        if let Some(control) = self.control() {
            control.loaded(self);
        }
        tracing::trace!(manager = %self.uid, "loaded");
    }

    /// Resolve once the hosted control's own context is non-null.
    pub async fn wait_for_context(self: &Arc<Self>) -> Result<(), BindError> {
        let Some(control) = self.control() else {
            return Ok(());
        };
        let key = self.env.config().context_key.clone();
        if !control.scope().get(&key).is_nullish() {
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let subscription = self
            .env
            .contexts()
            .get_manager(control.as_ref())
            .observe(&key, self.uid, move |new: &Value, _: &Value| {
                if !new.is_nullish() {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(());
                    }
                }
            });

        if !control.scope().get(&key).is_nullish() {
            subscription.unsubscribe();
            return Ok(());
        }
        let delivered = rx.await;
        subscription.unsubscribe();
        delivered.map_err(|_| BindError::Disposed)
    }

    /// Resolves when the manager is loaded; fails if it is disposed first.
    pub async fn wait_loaded(&self) -> Result<(), BindError> {
        let mut phases = self.phase.subscribe();
        let phase = *phases
            .wait_for(|phase| *phase >= Phase::Loaded)
            .await
            .map_err(|_| BindError::Disposed)?;
        match phase {
            Phase::Loaded => Ok(()),
            _ => Err(BindError::Disposed),
        }
    }

    // ------------------------------------------------------------------------
    // Cloning
    // ------------------------------------------------------------------------

    /// Build a manager for `new_node` (a structural copy of this manager's
    /// nodes) under `parent`, recursively cloning children. The clone shares
    /// this manager's node map unless `node_map` overrides it.
    ///
    /// Returns how many sibling nodes the clone consumed: one, or the whole
    /// marker range for controls that replace their node.
    pub fn clone_into(
        self: &Arc<Self>,
        new_node: NodeId,
        parent: &ManagerRef,
        node_map: Option<Arc<NodeMap>>,
    ) -> Result<usize, BindError> {
        let (pending, start, end_marker, templates, children) = {
            let state = self.state.lock();
            (
                state.template.as_ref().is_some_and(|t| t.peek().is_none()),
                state.node,
                state.end_marker,
                state.templates.clone(),
                state.children.clone(),
            )
        };
        if pending {
            return Err(BindError::TemplateNotReady(self.name()));
        }

        let document = self.env.document();
        let node_map = node_map.unwrap_or_else(|| self.node_map.clone());
        let clone = Self::construct(
            self.env.clone(),
            new_node,
            Arc::downgrade(parent),
            node_map,
            true,
        )?;
        parent.push_child(clone.clone());

        let consumed = match end_marker {
            Some(end) => {
                let span = match (document.index_of(start), document.index_of(end)) {
                    (Some(first), Some(last)) if last > first => last - first + 1,
                    _ => 2,
                };
                let clone_end = document
                    .sibling_at(new_node, span - 1)
                    .filter(|n| matches!(document.kind(*n), Ok(NodeKind::Comment(_))));
                let Some(clone_end) = clone_end else {
                    parent.remove_child(&clone);
                    return Err(BindError::StructureMismatch {
                        parent: document.parent(new_node).unwrap_or(new_node),
                        index: span - 1,
                    });
                };
                let mut state = clone.state.lock();
                state.end_marker = Some(clone_end);
                state.templates = templates;
                span
            }
            None => {
                let mut offset = 0;
                for child in children {
                    let cloned = document
                        .child_at(new_node, offset)
                        .ok_or(BindError::StructureMismatch {
                            parent: new_node,
                            index: offset,
                        })
                        .and_then(|target| child.clone_into(target, &clone, None));
                    match cloned {
                        Ok(consumed) => offset += consumed,
                        Err(err) => {
                            parent.remove_child(&clone);
                            return Err(err);
                        }
                    }
                }
                1
            }
        };

        clone.set_phase(Phase::Initialized);
        if clone.owns_context() {
            let deferred = clone.clone();
            self.env.deferred().spawn(async move {
                let result = match deferred.wait_for_context().await {
                    Ok(()) => deferred.bind_and_load().await,
                    Err(err) => Err(err),
                };
                match result {
                    Ok(()) | Err(BindError::Disposed) => {}
                    Err(err) => {
                        tracing::error!(manager = %deferred.uid, error = %err, "deferred clone load failed")
                    }
                }
            });
        }
        Ok(consumed)
    }

    // ------------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------------

    /// Tear down the subtree: subscriptions, hosted controls' context
    /// managers, child managers and document nodes. Idempotent.
    pub fn dispose(self: &Arc<Self>) {
        let (children, subscriptions, control, attribute_controls, node, end_marker) = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.templates = None;
            (
                std::mem::take(&mut state.children),
                std::mem::take(&mut state.subscriptions),
                state.control.take(),
                std::mem::take(&mut state.attribute_controls),
                state.node,
                state.end_marker,
            )
        };

        drop(subscriptions);
        for child in children {
            child.dispose();
        }

        let contexts = self.env.contexts();
        for control in control.iter().chain(attribute_controls.iter()) {
            contexts.dispose_owner(control.uid());
            control.disposed();
        }
        contexts.dispose_owner(self.uid);

        self.remove_nodes(node, end_marker);
        if let Some(parent) = self.parent.upgrade() {
            parent.remove_child(self);
        }
        self.set_phase(Phase::Disposed);
        tracing::trace!(manager = %self.uid, "disposed");
    }

    fn remove_nodes(&self, node: NodeId, end_marker: Option<NodeId>) {
        let document = self.env.document();
        let Some(end) = end_marker else {
            if let Err(err) = document.remove(node) {
                tracing::debug!(error = %err, "node already gone");
            }
            return;
        };

        let mut current = Some(node);
        while let Some(n) = current {
            let next = document.sibling_at(n, 1);
            if let Err(err) = document.remove(n) {
                tracing::debug!(error = %err, "node already gone");
            }
            if n == end {
                break;
            }
            current = next;
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn uid(&self) -> OwnerId {
        self.uid
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn node_map(&self) -> &Arc<NodeMap> {
        &self.node_map
    }

    pub fn node(&self) -> NodeId {
        self.state.lock().node
    }

    /// Closing marker of a range-replacing control.
    pub fn end_marker(&self) -> Option<NodeId> {
        self.state.lock().end_marker
    }

    /// Sibling nodes this manager occupies, in document order.
    pub fn node_span(&self) -> Vec<NodeId> {
        let (node, end) = {
            let state = self.state.lock();
            (state.node, state.end_marker)
        };
        let Some(end) = end else {
            return vec![node];
        };
        let document = self.env.document();
        let mut span = vec![node];
        let mut current = node;
        while current != end {
            match document.sibling_at(current, 1) {
                Some(next) => {
                    span.push(next);
                    current = next;
                }
                None => break,
            }
        }
        span
    }

    pub fn parent(&self) -> Option<ManagerRef> {
        self.parent.upgrade()
    }

    pub fn children(&self) -> Vec<ManagerRef> {
        self.state.lock().children.clone()
    }

    pub fn control(&self) -> Option<Arc<dyn Control>> {
        self.state.lock().control.clone()
    }

    pub fn attribute_controls(&self) -> Vec<Arc<dyn Control>> {
        self.state.lock().attribute_controls.clone()
    }

    pub fn templates(&self) -> Option<Arc<BindableTemplates>> {
        self.state.lock().templates.clone()
    }

    pub fn is_clone(&self) -> bool {
        self.state.lock().is_clone
    }

    pub fn owns_context(&self) -> bool {
        self.node_map.host().is_some_and(|h| h.owns_context)
    }

    pub fn replaces_element(&self) -> bool {
        self.node_map.host().is_some_and(|h| h.removes_node)
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// The context this node's own bindings see (its declaring context), or
    /// the context it established for its subtree once bound.
    pub fn context(&self) -> Value {
        let frame = self.frame().unwrap_or_else(|| self.parent_frame());
        frame.context.resolve(&frame.path)
    }

    fn name(&self) -> String {
        match self.node_map.host() {
            Some(host) => host.name.clone(),
            None => self
                .env
                .document()
                .tag(self.node())
                .unwrap_or_else(|| format!("{:?}", self.node())),
        }
    }

    fn set_phase(&self, next: Phase) {
        self.phase.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn push_child(&self, child: ManagerRef) {
        self.state.lock().children.push(child);
    }

    pub(crate) fn remove_child(&self, child: &ElementManager) {
        self.state
            .lock()
            .children
            .retain(|c| !std::ptr::eq(c.as_ref(), child));
    }
}

impl fmt::Debug for ElementManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ElementManager")
            .field("uid", &self.uid)
            .field("node", &state.node)
            .field("control", &self.node_map.host().map(|h| &h.name))
            .field("children", &state.children.len())
            .field("is_clone", &state.is_clone)
            .field("phase", &*self.phase.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::control::ControlRegistry;
    use crate::binding::template::MemoryTemplates;
    use crate::config::Config;
    use crate::dom::Document;

    fn environment() -> (Arc<Environment>, Document) {
        let document = Document::new();
        let env = Environment::new(
            Config::default(),
            document.clone(),
            Arc::new(ControlRegistry::new()),
            Arc::new(MemoryTemplates::new()),
        );
        (env, document)
    }

    fn mount(document: &Document, spec: NodeSpec) -> NodeId {
        let node = document.build(&spec);
        document.append_child(document.root(), node).unwrap();
        node
    }

    #[tokio::test]
    async fn inert_subtree_loads_without_frames() {
        let (env, document) = environment();
        let div = mount(
            &document,
            NodeSpec::element("div").child(NodeSpec::element("span").child(NodeSpec::text("static"))),
        );
        env.set_context("ctx");

        let root = ElementManager::create(&env, div, None).unwrap().unwrap();
        assert!(root.node_map().is_inert());
        assert_eq!(root.children().len(), 1);

        root.bind_and_load().await.unwrap();
        assert_eq!(root.phase(), Phase::Loaded);
        assert!(root.frame().is_none());
        assert_eq!(root.children()[0].context().to_display_string(), "ctx");
        root.wait_loaded().await.unwrap();
    }

    #[tokio::test]
    async fn phase_never_moves_backwards() {
        let (env, document) = environment();
        let div = mount(&document, NodeSpec::element("div"));
        let root = ElementManager::create(&env, div, None).unwrap().unwrap();

        root.bind_and_load().await.unwrap();
        root.set_phase(Phase::Bound);
        assert_eq!(root.phase(), Phase::Loaded);
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let (env, document) = environment();
        let div = mount(
            &document,
            NodeSpec::element("div").child(NodeSpec::element("p").attr("title", "{{context}}")),
        );
        env.set_context("a");
        let root = ElementManager::create(&env, div, None).unwrap().unwrap();
        let child = root.children()[0].clone();
        root.bind_and_load().await.unwrap();

        root.dispose();
        root.dispose();
        assert!(root.is_disposed());
        assert!(child.is_disposed());
        assert_eq!(child.phase(), Phase::Disposed);
        assert!(root.children().is_empty());
        assert!(document.parent(div).is_none());
        assert!(root.wait_loaded().await.is_err());

        // listeners are gone with the manager
        env.set_context("b");
        assert_eq!(document.attribute(child.node(), "title").as_deref(), Some("a"));
        assert!(matches!(root.bind(), Err(BindError::Disposed)));
    }
}
