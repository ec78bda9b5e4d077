//! Path Accessors
//!
//! A path accessor is the interception unit attached to one `(container, key)`
//! slot. It turns a plain store into an observed one: after the slot owner
//! has written the new value it hands the write to every hook registered on
//! the accessor, and each hook forwards it to the context manager that
//! installed it, tagged with that manager's identifier for the slot.
//!
//! # Variants
//!
//! The accessor is a tagged variant. An object-valued accessor fires the
//! child cascade on every identity change because everything observed below
//! it now resolves through a different parent; a primitive-valued accessor
//! only notifies, unless the new value is itself a container. The swap
//! between the two happens inside the slot owner's write lock, so callers
//! never observe a slot whose variant disagrees with its value.

use std::fmt;
use std::sync::{Arc, Weak};

use smallvec::SmallVec;

use super::value::{ArrayMutation, Value};

/// Receiver of intercepted writes. Implemented by the context manager.
pub(crate) trait WriteSink: Send + Sync {
    /// An observed slot changed from `old` to `new`.
    fn value_written(&self, identifier: &str, new: &Value, old: &Value, cascade: bool);

    /// An intercepted array ran one of its mutators.
    fn array_mutated(&self, identifier: &str, mutation: &ArrayMutation);
}

/// Which accessor variant is active on a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    /// The slot holds an object or array; identity changes cascade.
    ObjectValued,
    /// The slot holds a primitive (or nothing).
    PrimitiveValued,
}

impl AccessorKind {
    pub fn for_value(value: &Value) -> Self {
        if value.is_container() {
            AccessorKind::ObjectValued
        } else {
            AccessorKind::PrimitiveValued
        }
    }
}

/// Link from an intercepted slot (or array) back to the manager that watches it.
#[derive(Clone)]
pub(crate) struct Hook {
    sink: Weak<dyn WriteSink>,
    identifier: Arc<str>,
}

impl Hook {
    pub(crate) fn new(sink: Weak<dyn WriteSink>, identifier: &str) -> Self {
        Self {
            sink,
            identifier: Arc::from(identifier),
        }
    }

    pub(crate) fn same_as(&self, other: &Hook) -> bool {
        Weak::ptr_eq(&self.sink, &other.sink) && self.identifier == other.identifier
    }

    pub(crate) fn array_mutated(&self, mutation: &ArrayMutation) {
        if let Some(sink) = self.sink.upgrade() {
            sink.array_mutated(&self.identifier, mutation);
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("identifier", &self.identifier)
            .field("live", &(self.sink.strong_count() > 0))
            .finish()
    }
}

pub(crate) type Hooks = SmallVec<[Hook; 1]>;

pub(crate) fn add_hook(hooks: &mut Hooks, hook: Hook) {
    if !hooks.iter().any(|h| h.same_as(&hook)) {
        hooks.push(hook);
    }
}

pub(crate) fn remove_hook(hooks: &mut Hooks, hook: &Hook) {
    hooks.retain(|h| !h.same_as(hook));
}

/// Interception state stored inside an observed slot.
#[derive(Debug, Clone)]
pub(crate) struct PathAccessor {
    kind: AccessorKind,
    hooks: Hooks,
}

impl PathAccessor {
    pub(crate) fn new(current: &Value) -> Self {
        Self {
            kind: AccessorKind::for_value(current),
            hooks: Hooks::new(),
        }
    }

    pub(crate) fn kind(&self) -> AccessorKind {
        self.kind
    }

    pub(crate) fn add_hook(&mut self, hook: Hook) {
        add_hook(&mut self.hooks, hook);
    }

    /// Returns true when no hook remains and the accessor can be dropped.
    pub(crate) fn remove_hook(&mut self, hook: &Hook) -> bool {
        remove_hook(&mut self.hooks, hook);
        self.hooks.is_empty()
    }

    /// Swap to the variant matching `new` and capture what must be
    /// dispatched once the slot lock is released.
    pub(crate) fn transition(&mut self, old: Value, new: &Value) -> PendingWrite {
        let fired = self.kind;
        self.kind = AccessorKind::for_value(new);
        PendingWrite {
            fired,
            hooks: self.hooks.clone(),
            old,
        }
    }
}

/// An intercepted write waiting to be delivered.
pub(crate) struct PendingWrite {
    fired: AccessorKind,
    hooks: Hooks,
    old: Value,
}

impl PendingWrite {
    pub(crate) fn dispatch(self, new: &Value) {
        let cascade = self.fired == AccessorKind::ObjectValued || new.is_container();
        for hook in &self.hooks {
            if let Some(sink) = hook.sink.upgrade() {
                sink.value_written(&hook.identifier, new, &self.old, cascade);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::value::Object;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<(String, bool)>>,
    }

    impl WriteSink for RecordingSink {
        fn value_written(&self, identifier: &str, _new: &Value, _old: &Value, cascade: bool) {
            self.writes.lock().push((identifier.to_string(), cascade));
        }

        fn array_mutated(&self, _identifier: &str, _mutation: &ArrayMutation) {}
    }

    fn hook_for(sink: &Arc<RecordingSink>, identifier: &str) -> Hook {
        let weak: Weak<dyn WriteSink> = Arc::downgrade(sink) as Weak<dyn WriteSink>;
        Hook::new(weak, identifier)
    }

    #[test]
    fn variant_follows_value_type() {
        let sink = Arc::new(RecordingSink::default());
        let obj = Object::new();
        obj.set("k", 5);
        obj.install_hook("k", hook_for(&sink, "k"));
        assert_eq!(obj.accessor_kind("k"), Some(AccessorKind::PrimitiveValued));

        obj.set("k", Object::new());
        assert_eq!(obj.accessor_kind("k"), Some(AccessorKind::ObjectValued));

        obj.set("k", "text");
        assert_eq!(obj.accessor_kind("k"), Some(AccessorKind::PrimitiveValued));

        // primitive -> object cascades (new is a container); object -> primitive
        // cascades (fired from the object-valued variant)
        let writes = sink.writes.lock().clone();
        assert_eq!(writes, vec![("k".to_string(), true), ("k".to_string(), true)]);
    }

    #[test]
    fn primitive_write_does_not_cascade() {
        let sink = Arc::new(RecordingSink::default());
        let obj = Object::new();
        obj.set("n", 1);
        obj.install_hook("n", hook_for(&sink, "n"));
        obj.set("n", 2);
        assert_eq!(sink.writes.lock().clone(), vec![("n".to_string(), false)]);
    }

    #[test]
    fn duplicate_hooks_are_collapsed() {
        let sink = Arc::new(RecordingSink::default());
        let obj = Object::new();
        obj.install_hook("n", hook_for(&sink, "n"));
        obj.install_hook("n", hook_for(&sink, "n"));
        obj.set("n", 1);
        assert_eq!(sink.writes.lock().len(), 1);
    }

    #[test]
    fn dropped_sink_is_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let obj = Object::new();
        obj.install_hook("n", hook_for(&sink, "n"));
        drop(sink);
        obj.set("n", 1);
        assert_eq!(obj.get("n"), Value::from(1));
    }

    #[test]
    fn removing_last_hook_restores_plain_slot() {
        let sink = Arc::new(RecordingSink::default());
        let obj = Object::new();
        let hook = hook_for(&sink, "n");
        obj.install_hook("n", hook.clone());
        obj.remove_hook("n", &hook);
        assert_eq!(obj.accessor_kind("n"), None);
        obj.set("n", 3);
        assert!(sink.writes.lock().is_empty());
    }
}
