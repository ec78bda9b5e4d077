//! Bindable Templates
//!
//! Compiled template content of a control that replaces its node with a
//! marker range (a repeater, a conditional). The content is compiled once,
//! into managers that are never bound, and [`BindableTemplates::stamp`]
//! produces live copies of it between the host's markers.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::element::{ElementManager, ManagerRef, Phase};
use super::environment::Environment;
use super::expression::ContextSelector;
use super::node_map::NodeMap;
use crate::dom::NodeId;
use crate::error::{BindError, DocumentError};

pub struct BindableTemplates {
    env: Arc<Environment>,
    container: NodeId,
    root: ManagerRef,
}

impl BindableTemplates {
    /// Compile the children of the detached `container` for `host`.
    pub(crate) fn compile(
        env: &Arc<Environment>,
        container: NodeId,
        host: &ManagerRef,
    ) -> Result<Arc<Self>, BindError> {
        let root = ElementManager::construct(
            env.clone(),
            container,
            Arc::downgrade(host),
            Arc::new(NodeMap::default()),
            false,
        )?;
        root.compile_children()?;
        tracing::debug!(host = %host.uid(), templates = root.children().len(), "templates compiled");

        Ok(Arc::new(Self {
            env: env.clone(),
            container,
            root,
        }))
    }

    /// Resolves once every nested template of the content has resolved.
    pub fn ready(&self) -> BoxFuture<'static, Result<(), BindError>> {
        self.root.resolve_templates()
    }

    /// Top-level template managers, in content order.
    pub fn len(&self) -> usize {
        self.root.children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    /// Insert a copy of the content before `host`'s end marker and attach
    /// managers for it to `host`. `selector`, when given, becomes the
    /// context selector of each copy's top-level nodes.
    ///
    /// If the host is already bound, the new managers are bound and loaded
    /// on the next turn; those that own their context are loaded once it is
    /// set.
    pub fn stamp(
        &self,
        host: &ManagerRef,
        selector: Option<ContextSelector>,
    ) -> Result<Vec<ManagerRef>, BindError> {
        let document = self.env.document();
        let end = host
            .end_marker()
            .ok_or(BindError::StructureMismatch {
                parent: host.node(),
                index: 0,
            })?;
        let parent = document.parent(end).ok_or(DocumentError::NoParent(end))?;
        let before = host.children().len();

        for template in self.root.children() {
            let mut first = None;
            for node in template.node_span() {
                let copy = document.deep_clone(node)?;
                document.insert_before(parent, copy, Some(end))?;
                first.get_or_insert(copy);
            }
            let Some(first) = first else { continue };

            let node_map = selector
                .as_ref()
                .map(|s| template.node_map().with_context_selector(Some(s.clone())));
            template.clone_into(first, host, node_map)?;
        }

        let stamped: Vec<ManagerRef> = host.children().into_iter().skip(before).collect();
        let phase = host.phase();
        if phase >= Phase::Bound && phase != Phase::Disposed {
            for manager in stamped.iter().filter(|m| !m.owns_context()) {
                let load = manager.bind_and_load();
                let uid = manager.uid();
                self.env.deferred().spawn(async move {
                    if let Err(err) = load.await {
                        tracing::error!(manager = %uid, error = %err, "stamped subtree failed to load");
                    }
                });
            }
        }
        Ok(stamped)
    }
}

impl fmt::Debug for BindableTemplates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindableTemplates")
            .field("container", &self.container)
            .field("templates", &self.len())
            .finish()
    }
}
