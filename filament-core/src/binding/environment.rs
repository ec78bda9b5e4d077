//! Shared pipeline environment.
//!
//! Everything an element manager needs from the outside world, passed by
//! `Arc` to every manager of a document: the configuration, the document
//! itself, the context registry, the injector, the template source and the
//! deferred-load queue. There is no global state.

use std::fmt;
use std::sync::Arc;

use super::control::Injector;
use super::deferred::DeferredLoads;
use super::template::TemplateSource;
use crate::config::Config;
use crate::context::{ContextOwner, ContextRegistry, Object, OwnerId, Value};
use crate::dom::Document;

/// Context owner for everything outside any control.
#[derive(Debug)]
pub struct RootScope {
    uid: OwnerId,
    scope: Object,
}

impl ContextOwner for RootScope {
    fn uid(&self) -> OwnerId {
        self.uid
    }

    fn scope(&self) -> &Object {
        &self.scope
    }
}

pub struct Environment {
    config: Config,
    document: Document,
    contexts: ContextRegistry,
    controls: Arc<dyn Injector>,
    templates: Arc<dyn TemplateSource>,
    deferred: DeferredLoads,
    root: Arc<RootScope>,
}

impl Environment {
    pub fn new(
        config: Config,
        document: Document,
        controls: Arc<dyn Injector>,
        templates: Arc<dyn TemplateSource>,
    ) -> Arc<Self> {
        let contexts = ContextRegistry::new(config.reset_on_dispose);
        Arc::new(Self {
            config,
            document,
            contexts,
            controls,
            templates,
            deferred: DeferredLoads::new(),
            root: Arc::new(RootScope {
                uid: OwnerId::new(),
                scope: Object::new(),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    pub fn controls(&self) -> &dyn Injector {
        self.controls.as_ref()
    }

    pub fn templates(&self) -> &dyn TemplateSource {
        self.templates.as_ref()
    }

    pub fn deferred(&self) -> &DeferredLoads {
        &self.deferred
    }

    pub fn root_scope(&self) -> &Arc<RootScope> {
        &self.root
    }

    /// Replace the context every top-level binding resolves against.
    pub fn set_context(&self, context: impl Into<Value>) {
        self.root.scope.set(self.config.context_key.as_str(), context);
    }

    pub fn context(&self) -> Value {
        self.root.scope.get(&self.config.context_key)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.config)
            .field("contexts", &self.contexts.len())
            .field("deferred", &self.deferred)
            .finish()
    }
}
