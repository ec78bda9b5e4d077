//! Context Registry
//!
//! Maps each context owner to its [`ContextManager`]. Managers are created
//! lazily on first lookup and dropped once their owner is disposed or no
//! identifier remains observed below it.
//!
//! The registry is shared by every element manager of a document, so it is
//! a concurrent map rather than a locked `HashMap`: lookups from different
//! threads (deferred loads run on the tokio runtime) never contend on a
//! single lock.

use std::sync::Arc;

use dashmap::DashMap;

use super::manager::ContextManager;
use super::subscriber::OwnerId;
use super::value::{Object, Value};

/// Something that owns a context: it has a stable uid and a scope object
/// whose `context` key holds the context value.
pub trait ContextOwner: Send + Sync {
    fn uid(&self) -> OwnerId;

    /// The scope object the owner's identifiers resolve against.
    fn scope(&self) -> &Object;

    /// Current context value.
    fn context(&self) -> Value {
        self.scope().get("context")
    }
}

/// Owner -> manager lookup.
#[derive(Debug)]
pub struct ContextRegistry {
    managers: DashMap<OwnerId, Arc<ContextManager>>,
    reset_on_dispose: bool,
}

impl ContextRegistry {
    /// `reset_on_dispose` strips accessors from the graph when a manager is
    /// torn down; without it they are left in place and simply stop firing.
    pub fn new(reset_on_dispose: bool) -> Self {
        Self {
            managers: DashMap::new(),
            reset_on_dispose,
        }
    }

    /// The manager for `owner`, created on first use.
    pub fn get_manager<O: ContextOwner + ?Sized>(&self, owner: &O) -> Arc<ContextManager> {
        let uid = owner.uid();
        self.managers
            .entry(uid)
            .or_insert_with(|| {
                tracing::debug!(owner = %uid, "context manager created");
                ContextManager::new(uid, owner.scope().clone())
            })
            .clone()
    }

    pub fn get(&self, uid: OwnerId) -> Option<Arc<ContextManager>> {
        self.managers.get(&uid).map(|entry| entry.value().clone())
    }

    /// Remove every registration made by `uid` from every manager. The
    /// owner's own manager, and any manager left without observers, is
    /// torn down.
    pub fn dispose_owner(&self, uid: OwnerId) {
        let managers: Vec<Arc<ContextManager>> = self
            .managers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for manager in managers {
            manager.remove_owner(uid);
            if manager.owner() == uid || manager.is_empty() {
                if let Some((_, removed)) = self.managers.remove(&manager.owner()) {
                    removed.dispose(self.reset_on_dispose);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}
