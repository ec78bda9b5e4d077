//! Context Manager
//!
//! One manager exists per context owner (the root of an owner chain). It owns
//! every accessor installed on that owner's object graph, every listener
//! registered against a dotted identifier below the owner, and the array
//! interception registry.
//!
//! # Tables
//!
//! - `listeners`: full identifier -> callbacks, in registration order.
//! - `hash`: identifier prefix -> full identifiers below it, in insertion
//!   order. Every observed identifier has an entry for itself and one under
//!   each strict prefix; the cascade walks these entries.
//! - `cache`: last value seen per identifier.
//! - `installed`: identifier -> the `(container, key)` slot currently
//!   carrying this manager's hook for it. Prefixes of observed identifiers
//!   are installed too (without callbacks) so that replacing an ancestor
//!   reaches the manager.
//! - `intercepted`: identifier -> the array whose mutators report here.
//!
//! # Notification
//!
//! Delivery is synchronous and depth-first: the write that triggers it does
//! not return until every listener (and every cascaded descendant) has run.
//! No lock is held while a listener runs, so listeners may read, write,
//! subscribe or unsubscribe freely.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;

use super::accessor::{Hook, WriteSink};
use super::path::{self, IdentPath};
use super::subscriber::{ListenerId, OwnerId};
use super::value::{Array, ArrayMutation, Container, Object, Value};

/// Callback invoked with `(new, old)` when an observed identifier changes.
pub type ValueCallback = Arc<dyn Fn(&Value, &Value) + Send + Sync>;

/// Callback invoked after an intercepted array mutator ran.
pub type ArrayCallback = Arc<dyn Fn(&ArrayMutation) + Send + Sync>;

struct Listener {
    owner: OwnerId,
    id: ListenerId,
    callback: ValueCallback,
}

struct ArrayListener {
    owner: OwnerId,
    id: ListenerId,
    callback: ArrayCallback,
}

struct Installed {
    parent: Container,
    key: String,
}

#[derive(Default)]
struct State {
    listeners: IndexMap<String, Vec<Listener>>,
    hash: IndexMap<String, IndexSet<String>>,
    cache: HashMap<String, Value>,
    installed: HashMap<String, Installed>,
    intercepted: HashMap<String, Array>,
    array_listeners: IndexMap<String, Vec<ArrayListener>>,
}

impl State {
    fn is_needed(&self, identifier: &str) -> bool {
        self.listeners.contains_key(identifier)
            || self.array_listeners.contains_key(identifier)
            || self.hash.get(identifier).is_some_and(|set| !set.is_empty())
    }

    fn wants_interception(&self, identifier: &str) -> bool {
        self.listeners.contains_key(identifier)
            || self.array_listeners.contains_key(identifier)
            || self
                .listeners
                .contains_key(format!("{identifier}.length").as_str())
    }
}

/// Observation engine for one owner's object graph.
pub struct ContextManager {
    owner: OwnerId,
    root: Object,
    state: Mutex<State>,
    this: Weak<ContextManager>,
}

impl ContextManager {
    /// Create a manager observing `root` on behalf of `owner`.
    pub fn new(owner: OwnerId, root: Object) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            owner,
            root,
            state: Mutex::new(State::default()),
            this: this.clone(),
        })
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn root(&self) -> &Object {
        &self.root
    }

    /// Current value at `identifier`, read through the live graph.
    pub fn resolve(&self, identifier: &str) -> Value {
        Value::Object(self.root.clone()).lookup(identifier)
    }

    /// Last value delivered for (or resolved at) `identifier`.
    pub fn cached(&self, identifier: &str) -> Option<Value> {
        self.state.lock().cache.get(identifier).cloned()
    }

    pub fn listener_count(&self, identifier: &str) -> usize {
        let state = self.state.lock();
        state.listeners.get(identifier).map_or(0, Vec::len)
            + state.array_listeners.get(identifier).map_or(0, Vec::len)
    }

    /// Observed identifiers, in registration order.
    pub fn identifiers(&self) -> Vec<String> {
        self.state.lock().listeners.keys().cloned().collect()
    }

    /// Observed identifiers strictly below `identifier`, in registration order.
    pub fn descendants(&self, identifier: &str) -> Vec<String> {
        self.state
            .lock()
            .hash
            .get(identifier)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether any slot of the graph carries this manager's hook for `identifier`.
    pub fn is_installed(&self, identifier: &str) -> bool {
        self.state.lock().installed.contains_key(identifier)
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.listeners.is_empty() && state.array_listeners.is_empty()
    }

    /// Register `callback` for changes at `identifier` on behalf of `owner`.
    ///
    /// Intermediate objects that do not exist yet are not an error: the
    /// registration is kept and activates once an ancestor write makes the
    /// path resolvable.
    pub fn observe<F>(&self, identifier: &str, owner: OwnerId, callback: F) -> Subscription
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        {
            let mut state = self.state.lock();
            state
                .listeners
                .entry(identifier.to_string())
                .or_default()
                .push(Listener {
                    owner,
                    id,
                    callback: Arc::new(callback),
                });

            let path = IdentPath::parse(identifier);
            for prefix in path.strict_prefixes() {
                state
                    .hash
                    .entry(prefix.to_string())
                    .or_default()
                    .insert(identifier.to_string());
            }
            state.hash.entry(identifier.to_string()).or_default();

            self.attach_path(&mut state, &path);
        }
        tracing::trace!(identifier, %owner, "observe");

        Subscription {
            manager: self.this.clone(),
            identifier: identifier.to_string(),
            id,
            kind: SubscriptionKind::Value,
            active: true,
        }
    }

    /// Register `callback` for mutator calls on the array held at `identifier`.
    ///
    /// `previous` is the array formerly held there; its interception is
    /// released before `array` is intercepted.
    pub fn observe_array<F>(
        &self,
        owner: OwnerId,
        callback: F,
        identifier: &str,
        array: &Array,
        previous: Option<&Array>,
    ) -> Subscription
    where
        F: Fn(&ArrayMutation) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        {
            let mut state = self.state.lock();
            state
                .array_listeners
                .entry(identifier.to_string())
                .or_default()
                .push(ArrayListener {
                    owner,
                    id,
                    callback: Arc::new(callback),
                });

            let hook = self.hook(identifier);
            if let Some(previous) = previous {
                previous.release(&hook);
                if state
                    .intercepted
                    .get(identifier)
                    .is_some_and(|current| current.ptr_eq(previous))
                {
                    state.intercepted.remove(identifier);
                }
            }
            self.intercept(&mut state, identifier, Some(array.clone()));
        }
        tracing::trace!(identifier, %owner, "observe array");

        Subscription {
            manager: self.this.clone(),
            identifier: identifier.to_string(),
            id,
            kind: SubscriptionKind::Array,
            active: true,
        }
    }

    /// Remove every registration made on behalf of `owner`.
    pub fn remove_owner(&self, owner: OwnerId) {
        let mut state = self.state.lock();

        let mut emptied = Vec::new();
        for (identifier, listeners) in state.listeners.iter_mut() {
            let before = listeners.len();
            listeners.retain(|l| l.owner != owner);
            if before > 0 && listeners.is_empty() {
                emptied.push(identifier.clone());
            }
        }
        for identifier in &emptied {
            state.listeners.shift_remove(identifier);
        }

        let mut emptied_arrays = Vec::new();
        for (identifier, listeners) in state.array_listeners.iter_mut() {
            let before = listeners.len();
            listeners.retain(|l| l.owner != owner);
            if before > 0 && listeners.is_empty() {
                emptied_arrays.push(identifier.clone());
            }
        }
        for identifier in &emptied_arrays {
            state.array_listeners.shift_remove(identifier);
        }

        for identifier in emptied.iter().chain(emptied_arrays.iter()) {
            self.release(&mut state, identifier);
        }
    }

    /// Drop all registrations. With `reset`, every accessor and array
    /// interception this manager installed is stripped from the graph.
    pub fn dispose(&self, reset: bool) {
        let mut state = self.state.lock();
        if reset {
            for (identifier, installed) in state.installed.drain() {
                installed.parent.remove_hook(&installed.key, &self.hook(&identifier));
            }
            for (identifier, array) in state.intercepted.drain() {
                array.release(&self.hook(&identifier));
            }
        }
        *state = State::default();
        tracing::debug!(owner = %self.owner, reset, "context manager disposed");
    }

    // ------------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------------

    fn execute(&self, identifier: &str, new: &Value, old: &Value) {
        let callbacks: Vec<ValueCallback> = {
            let mut state = self.state.lock();
            if state.hash.contains_key(identifier) {
                state.cache.insert(identifier.to_string(), new.clone());
            }
            state
                .listeners
                .get(identifier)
                .map(|ls| ls.iter().map(|l| l.callback.clone()).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(new, old))).is_err() {
                tracing::error!(identifier, "context listener panicked");
            }
        }
    }

    /// Re-resolve every observed identifier below `identifier` after the
    /// value there was replaced, re-installing accessors against the new
    /// intermediate objects and notifying each descendant whose value changed.
    fn notify_child_properties(&self, identifier: &str, new: &Value, old: &Value) {
        let descendants = self.descendants(identifier);
        if descendants.is_empty() {
            return;
        }

        let mut new_walk = Walk::new(new.clone());
        let mut old_walk = Walk::new(old.clone());

        for descendant in descendants {
            let Some(relative) = path::relative(identifier, &descendant) else {
                continue;
            };
            let relative = IdentPath::parse(relative);

            let (new_value, old_value) = {
                let mut state = self.state.lock();
                // an earlier listener in this pass may have unsubscribed it
                if !state.listeners.contains_key(descendant.as_str()) {
                    continue;
                }
                let new_value = new_walk.resolve(&relative, |prefix, parent, segment, value| {
                    let full = path::join(identifier, prefix);
                    self.rebind(&mut state, &full, parent, segment, value);
                });
                let old_value = old_walk.resolve(&relative, |_, _, _, _| {});
                (new_value, old_value)
            };

            if !new_value.same(&old_value) {
                self.execute(&descendant, &new_value, &old_value);
            }
        }
    }

    /// Tell observed ancestors of `identifier` that something below them changed.
    fn notify_ancestors(&self, identifier: &str) {
        let path = IdentPath::parse(identifier);
        let ancestors: Vec<&str> = {
            let state = self.state.lock();
            path.strict_prefixes()
                .filter(|prefix| state.listeners.contains_key(*prefix))
                .collect()
        };
        for ancestor in ancestors.into_iter().rev() {
            let current = self.resolve(ancestor);
            self.execute(ancestor, &current, &current);
        }
    }

    // ------------------------------------------------------------------------
    // Accessor bookkeeping (state lock held)
    // ------------------------------------------------------------------------

    fn hook(&self, identifier: &str) -> Hook {
        Hook::new(self.this.clone(), identifier)
    }

    fn attach_path(&self, state: &mut State, path: &IdentPath<'_>) {
        let mut parent = Value::Object(self.root.clone());
        for (depth, segment) in path.segments().iter().enumerate() {
            let value = parent.child(segment);
            self.rebind(state, path.prefix(depth + 1), &parent, segment, &value);
            parent = value;
        }
    }

    /// Point the accessor for `identifier` at `(parent, key)`, moving it off
    /// whatever slot carried it before. A non-container parent leaves the
    /// identifier uninstalled until an ancestor write activates it.
    fn rebind(&self, state: &mut State, identifier: &str, parent: &Value, key: &str, value: &Value) {
        if state.hash.contains_key(identifier) {
            state.cache.insert(identifier.to_string(), value.clone());
        }

        let target = Container::of(parent);
        let unchanged = matches!(
            (state.installed.get(identifier), &target),
            (Some(installed), Some(target)) if installed.parent.same(target)
        );
        if !unchanged {
            let hook = self.hook(identifier);
            if let Some(previous) = state.installed.remove(identifier) {
                previous.parent.remove_hook(&previous.key, &hook);
            }
            if let Some(target) = target {
                if target.install_hook(key, hook) {
                    state.installed.insert(
                        identifier.to_string(),
                        Installed {
                            parent: target,
                            key: key.to_string(),
                        },
                    );
                }
            }
        }

        let wanted = match value {
            Value::Array(array) if state.wants_interception(identifier) => Some(array.clone()),
            _ => None,
        };
        self.intercept(state, identifier, wanted);
    }

    /// Make `array` (or nothing) the array intercepted for `identifier`.
    fn intercept(&self, state: &mut State, identifier: &str, array: Option<Array>) {
        let current = state.intercepted.get(identifier);
        if let (Some(current), Some(array)) = (current, &array) {
            if current.ptr_eq(array) {
                return;
            }
        }
        if current.is_none() && array.is_none() {
            return;
        }

        let hook = self.hook(identifier);
        if let Some(previous) = state.intercepted.remove(identifier) {
            previous.release(&hook);
        }
        if let Some(array) = array {
            array.intercept(hook);
            state.intercepted.insert(identifier.to_string(), array);
        }
    }

    fn teardown(&self, state: &mut State, identifier: &str) {
        let hook = self.hook(identifier);
        if let Some(installed) = state.installed.remove(identifier) {
            installed.parent.remove_hook(&installed.key, &hook);
        }
        if let Some(array) = state.intercepted.remove(identifier) {
            array.release(&hook);
        }
        state.hash.shift_remove(identifier);
        state.cache.remove(identifier);
    }

    /// Forget `identifier` after its last callback went away, tearing down
    /// every accessor along its path that nothing else needs.
    fn release(&self, state: &mut State, identifier: &str) {
        let path = IdentPath::parse(identifier);
        for prefix in path.strict_prefixes() {
            if let Some(set) = state.hash.get_mut(prefix) {
                set.shift_remove(identifier);
            }
        }

        for depth in (1..=path.len()).rev() {
            let candidate = path.prefix(depth);
            if !state.is_needed(candidate) {
                self.teardown(state, candidate);
            } else if !state.wants_interception(candidate) {
                self.intercept(state, candidate, None);
            }
        }
    }

    fn remove_listener(&self, identifier: &str, id: ListenerId) {
        let mut state = self.state.lock();
        let emptied = match state.listeners.get_mut(identifier) {
            Some(listeners) => {
                listeners.retain(|l| l.id != id);
                listeners.is_empty()
            }
            None => return,
        };
        if emptied {
            state.listeners.shift_remove(identifier);
            self.release(&mut state, identifier);
        }
    }

    fn remove_array_listener(&self, identifier: &str, id: ListenerId) {
        let mut state = self.state.lock();
        let emptied = match state.array_listeners.get_mut(identifier) {
            Some(listeners) => {
                listeners.retain(|l| l.id != id);
                listeners.is_empty()
            }
            None => return,
        };
        if emptied {
            state.array_listeners.shift_remove(identifier);
            self.release(&mut state, identifier);
        }
    }
}

impl WriteSink for ContextManager {
    fn value_written(&self, identifier: &str, new: &Value, old: &Value, cascade: bool) {
        {
            let mut state = self.state.lock();
            let wanted = match new {
                Value::Array(array) if state.wants_interception(identifier) => Some(array.clone()),
                _ => None,
            };
            self.intercept(&mut state, identifier, wanted);
        }

        self.execute(identifier, new, old);
        if cascade {
            self.notify_child_properties(identifier, new, old);
        }
        self.notify_ancestors(identifier);
    }

    fn array_mutated(&self, identifier: &str, mutation: &ArrayMutation) {
        if mutation.method.cascades() {
            self.notify_child_properties(
                identifier,
                &Value::Array(mutation.new_array.clone()),
                &Value::Array(mutation.old_array.clone()),
            );
        } else {
            let (old_len, new_len) = (mutation.old_array.len(), mutation.new_array.len());
            if old_len != new_len {
                self.execute(
                    &format!("{identifier}.length"),
                    &Value::from(new_len),
                    &Value::from(old_len),
                );
            }
        }

        let callbacks: Vec<ArrayCallback> = self
            .state
            .lock()
            .array_listeners
            .get(identifier)
            .map(|ls| ls.iter().map(|l| l.callback.clone()).collect())
            .unwrap_or_default();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(mutation))).is_err() {
                tracing::error!(identifier, method = %mutation.method, "array listener panicked");
            }
        }
    }
}

impl fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ContextManager")
            .field("owner", &self.owner)
            .field("identifiers", &state.listeners.len())
            .field("installed", &state.installed.len())
            .field("intercepted", &state.intercepted.len())
            .finish()
    }
}

/// One side (new or old) of a cascade pass, memoising every relative prefix
/// it has resolved so sibling descendants share the work.
struct Walk {
    root: Value,
    memo: HashMap<String, Value>,
}

impl Walk {
    fn new(root: Value) -> Self {
        Self {
            root,
            memo: HashMap::new(),
        }
    }

    /// Resolve `path` below the root. `visit(prefix, parent, segment, value)`
    /// runs once per relative prefix the first time it is resolved.
    fn resolve(
        &mut self,
        path: &IdentPath<'_>,
        mut visit: impl FnMut(&str, &Value, &str, &Value),
    ) -> Value {
        let mut parent = self.root.clone();
        for (depth, segment) in path.segments().iter().enumerate() {
            let prefix = path.prefix(depth + 1);
            let value = match self.memo.get(prefix) {
                Some(value) => value.clone(),
                None => {
                    let value = parent.child(segment);
                    visit(prefix, &parent, segment, &value);
                    self.memo.insert(prefix.to_string(), value.clone());
                    value
                }
            };
            parent = value;
        }
        parent
    }
}

// ----------------------------------------------------------------------------
// Subscriptions
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriptionKind {
    Value,
    Array,
}

/// Handle to one registered callback.
///
/// Dropping the handle unsubscribes, exactly like calling [`unsubscribe`].
/// Only this callback is removed; other owners observing the same
/// identifier keep receiving notifications.
///
/// [`unsubscribe`]: Subscription::unsubscribe
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    manager: Weak<ContextManager>,
    identifier: String,
    id: ListenerId,
    kind: SubscriptionKind,
    active: bool,
}

impl Subscription {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn is_active(&self) -> bool {
        self.active && self.manager.strong_count() > 0
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Some(manager) = self.manager.upgrade() {
            match self.kind {
                SubscriptionKind::Value => manager.remove_listener(&self.identifier, self.id),
                SubscriptionKind::Array => manager.remove_array_listener(&self.identifier, self.id),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("identifier", &self.identifier)
            .field("kind", &self.kind)
            .field("active", &self.active)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::value::ArrayMethod;
    use crate::context::AccessorKind;
    use serde_json::json;

    type Log = Arc<Mutex<Vec<(Value, Value)>>>;

    fn manager(json: serde_json::Value) -> Arc<ContextManager> {
        let root = Value::from(json);
        let root = root.as_object().cloned().unwrap();
        ContextManager::new(OwnerId::new(), root)
    }

    fn recorder(log: &Log) -> impl Fn(&Value, &Value) + Send + Sync + 'static {
        let log = log.clone();
        move |new: &Value, old: &Value| log.lock().push((new.clone(), old.clone()))
    }

    fn obj(cm: &ContextManager, path: &str) -> Object {
        cm.resolve(path).as_object().cloned().unwrap()
    }

    #[test]
    fn write_notifies_with_new_and_old() {
        let cm = manager(json!({"user": {"name": "ada"}}));
        let log = Log::default();
        let _sub = cm.observe("user.name", OwnerId::new(), recorder(&log));

        obj(&cm, "user").set("name", "grace");

        assert_eq!(
            log.lock().clone(),
            vec![(Value::from("grace"), Value::from("ada"))]
        );
        assert_eq!(cm.cached("user.name"), Some(Value::from("grace")));
    }

    #[test]
    fn identity_equal_write_is_silent() {
        let cm = manager(json!({"n": 1, "o": {}}));
        let log = Log::default();
        let _n = cm.observe("n", OwnerId::new(), recorder(&log));
        let _o = cm.observe("o", OwnerId::new(), recorder(&log));

        cm.root().set("n", 1);
        let same = cm.resolve("o");
        cm.root().set("o", same);

        assert!(log.lock().is_empty());
    }

    #[test]
    fn replacing_ancestor_cascades_to_descendant() {
        let cm = manager(json!({"a": {"b": {"c": 1}}}));
        let log = Log::default();
        let _sub = cm.observe("a.b.c", OwnerId::new(), recorder(&log));

        cm.root().set("a", Value::from(json!({"b": {"c": 2}})));
        assert_eq!(log.lock().clone(), vec![(Value::from(2), Value::from(1))]);

        // the accessor followed the new intermediate objects
        obj(&cm, "a.b").set("c", 3);
        assert_eq!(log.lock().len(), 2);
        assert_eq!(log.lock()[1], (Value::from(3), Value::from(2)));

        // and the prefix accessor for `a.b` moved too
        obj(&cm, "a").set("b", Value::from(json!({"c": 4})));
        assert_eq!(log.lock().len(), 3);
        assert_eq!(log.lock()[2], (Value::from(4), Value::from(3)));
    }

    #[test]
    fn cascade_skips_unchanged_descendants() {
        let cm = manager(json!({"a": {"b": 1}}));
        let log = Log::default();
        let _sub = cm.observe("a.b", OwnerId::new(), recorder(&log));

        cm.root().set("a", Value::from(json!({"b": 1})));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn disappearing_ancestor_yields_undefined() {
        let cm = manager(json!({"a": {"b": {"c": 1}}}));
        let log = Log::default();
        let _sub = cm.observe("a.b.c", OwnerId::new(), recorder(&log));

        cm.root().set("a", Value::Null);
        assert_eq!(
            log.lock().clone(),
            vec![(Value::Undefined, Value::from(1))]
        );
    }

    #[test]
    fn observing_through_null_activates_later() {
        let cm = manager(json!({"a": null}));
        let log = Log::default();
        let _sub = cm.observe("a.b.c", OwnerId::new(), recorder(&log));
        assert!(!cm.is_installed("a.b.c"));

        cm.root().set("a", Value::from(json!({"b": {"c": "x"}})));
        assert_eq!(
            log.lock().clone(),
            vec![(Value::from("x"), Value::Undefined)]
        );
        assert!(cm.is_installed("a.b.c"));

        obj(&cm, "a.b").set("c", "y");
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn accessor_swaps_between_variants() {
        let cm = manager(json!({"obj": {"k": 5}}));
        let k_log = Log::default();
        let n_log = Log::default();
        let _k = cm.observe("obj.k", OwnerId::new(), recorder(&k_log));
        let holder = obj(&cm, "obj");
        assert_eq!(holder.accessor_kind("k"), Some(AccessorKind::PrimitiveValued));

        holder.set("k", Value::from(json!({"n": 1})));
        assert_eq!(holder.accessor_kind("k"), Some(AccessorKind::ObjectValued));

        let _n = cm.observe("obj.k.n", OwnerId::new(), recorder(&n_log));
        obj(&cm, "obj.k").set("n", 2);

        let k_events = k_log.lock().clone();
        assert_eq!(k_events.len(), 2);
        assert_eq!(k_events[0].1, Value::from(5));
        assert!(k_events[1].0.same(&k_events[1].1));
        assert_eq!(n_log.lock().clone(), vec![(Value::from(2), Value::from(1))]);
    }

    #[test]
    fn unsubscribe_is_per_owner() {
        let cm = manager(json!({"x": 0}));
        let first = Log::default();
        let second = Log::default();
        let sub1 = cm.observe("x", OwnerId::new(), recorder(&first));
        let _sub2 = cm.observe("x", OwnerId::new(), recorder(&second));

        sub1.unsubscribe();
        cm.root().set("x", 1);

        assert!(first.lock().is_empty());
        assert_eq!(second.lock().len(), 1);
        assert!(cm.is_installed("x"));
    }

    #[test]
    fn last_unsubscribe_tears_down_path() {
        let cm = manager(json!({"a": {"b": 1}}));
        let sub = cm.observe("a.b", OwnerId::new(), |_: &Value, _: &Value| {});
        assert!(cm.is_installed("a"));
        assert!(cm.is_installed("a.b"));

        drop(sub);
        assert!(!cm.is_installed("a"));
        assert!(!cm.is_installed("a.b"));
        assert!(cm.is_empty());
        assert_eq!(obj(&cm, "a").accessor_kind("b"), None);
        assert_eq!(cm.root().accessor_kind("a"), None);
    }

    #[test]
    fn shared_prefix_survives_sibling_teardown() {
        let cm = manager(json!({"a": {"b": 1, "c": 2}}));
        let log = Log::default();
        let b = cm.observe("a.b", OwnerId::new(), |_: &Value, _: &Value| {});
        let _c = cm.observe("a.c", OwnerId::new(), recorder(&log));
        drop(b);

        cm.root().set("a", Value::from(json!({"b": 1, "c": 3})));
        assert_eq!(log.lock().clone(), vec![(Value::from(3), Value::from(2))]);
        assert_eq!(cm.descendants("a"), vec!["a.c".to_string()]);
    }

    #[test]
    fn cascade_runs_in_registration_order() {
        let cm = manager(json!({"a": {"z": 1, "m": 1, "b": 1}}));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();
        for key in ["a.z", "a.b", "a.m"] {
            let order = order.clone();
            subs.push(cm.observe(key, OwnerId::new(), move |_: &Value, _: &Value| {
                order.lock().push(key)
            }));
        }

        cm.root().set("a", Value::from(json!({"z": 2, "m": 2, "b": 2})));
        assert_eq!(order.lock().clone(), vec!["a.z", "a.b", "a.m"]);
    }

    #[test]
    fn push_reports_length_and_mutation() {
        let cm = manager(json!({"list": [{"v": 1}, {"v": 2}]}));
        let lengths = Log::default();
        let first = Log::default();
        let mutations = Arc::new(Mutex::new(Vec::new()));
        let owner = OwnerId::new();

        let _len = cm.observe("list.length", owner, recorder(&lengths));
        let _v = cm.observe("list.0.v", owner, recorder(&first));
        let list = cm.resolve("list").as_array().cloned().unwrap();
        let _arr = {
            let mutations = mutations.clone();
            cm.observe_array(
                owner,
                move |m: &ArrayMutation| mutations.lock().push(m.clone()),
                "list",
                &list,
                None,
            )
        };

        list.push(Value::from(json!({"v": 3})));

        assert_eq!(lengths.lock().clone(), vec![(Value::from(3), Value::from(2))]);
        assert!(first.lock().is_empty());
        let mutations = mutations.lock();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].method, ArrayMethod::Push);
        assert_eq!(mutations[0].old_array.len(), 2);
        assert_eq!(mutations[0].new_array.len(), 3);
        assert_eq!(mutations[0].new_array.get(2).lookup("v"), Value::from(3));
        assert_eq!(mutations[0].return_value, Value::from(3));
    }

    #[test]
    fn shift_cascades_instead_of_length_notification() {
        let cm = manager(json!({"list": [{"v": 1}, {"v": 2}]}));
        let first = Log::default();
        let lengths = Log::default();
        let _v = cm.observe("list.0.v", OwnerId::new(), recorder(&first));
        let _len = cm.observe("list.length", OwnerId::new(), recorder(&lengths));

        let list = cm.resolve("list").as_array().cloned().unwrap();
        list.shift();

        assert_eq!(first.lock().clone(), vec![(Value::from(2), Value::from(1))]);
        assert_eq!(lengths.lock().clone(), vec![(Value::from(1), Value::from(2))]);

        // accessor moved to the element now at index 0
        list.get(0).as_object().unwrap().set("v", 5);
        assert_eq!(first.lock().len(), 2);
    }

    #[test]
    fn push_fills_observed_index() {
        let cm = manager(json!({"list": [{"v": 1}, {"v": 2}]}));
        let log = Log::default();
        let _v = cm.observe("list.2.v", OwnerId::new(), recorder(&log));

        let list = cm.resolve("list").as_array().cloned().unwrap();
        list.push(Value::from(json!({"v": 3})));
        assert_eq!(log.lock().clone(), vec![(Value::from(3), Value::Undefined)]);

        list.get(2).as_object().unwrap().set("v", 4);
        assert_eq!(log.lock().len(), 2);
        assert_eq!(log.lock()[1], (Value::from(4), Value::from(3)));
    }

    #[test]
    fn pop_detaches_observed_index() {
        let cm = manager(json!({"list": [{"v": 1}, {"v": 2}]}));
        let log = Log::default();
        let lengths = Log::default();
        let _v = cm.observe("list.1.v", OwnerId::new(), recorder(&log));
        let _len = cm.observe("list.length", OwnerId::new(), recorder(&lengths));

        let list = cm.resolve("list").as_array().cloned().unwrap();
        let popped = list.pop().as_object().cloned().unwrap();
        assert_eq!(log.lock().clone(), vec![(Value::Undefined, Value::from(2))]);
        assert_eq!(lengths.lock().clone(), vec![(Value::from(1), Value::from(2))]);
        assert_eq!(cm.resolve("list.1.v"), Value::Undefined);

        // the popped element is no longer observed under its old index
        popped.set("v", 99);
        assert_eq!(log.lock().len(), 1);

        list.push(Value::from(json!({"v": 7})));
        assert_eq!(log.lock().len(), 2);
        assert_eq!(log.lock()[1], (Value::from(7), Value::Undefined));
    }

    #[test]
    fn shift_reaches_index_observers_without_interception() {
        let cm = manager(json!({"list": [{"v": 1}, {"v": 2}]}));
        let log = Log::default();
        let _v = cm.observe("list.0.v", OwnerId::new(), recorder(&log));

        let list = cm.resolve("list").as_array().cloned().unwrap();
        assert!(!list.is_intercepted());
        list.shift();
        assert_eq!(log.lock().clone(), vec![(Value::from(2), Value::from(1))]);
    }

    #[test]
    fn replacing_array_moves_interception() {
        let cm = manager(json!({"list": [1, 2]}));
        let lengths = Log::default();
        let _len = cm.observe("list.length", OwnerId::new(), recorder(&lengths));

        let old = cm.resolve("list").as_array().cloned().unwrap();
        assert!(old.is_intercepted());

        cm.root().set("list", Value::from(json!([1, 2, 3])));
        assert_eq!(lengths.lock().clone(), vec![(Value::from(3), Value::from(2))]);
        assert!(!old.is_intercepted());

        old.push(9);
        assert_eq!(lengths.lock().len(), 1);

        let new = cm.resolve("list").as_array().cloned().unwrap();
        assert!(new.is_intercepted());
        new.pop();
        assert_eq!(lengths.lock().len(), 2);
    }

    #[test]
    fn observe_array_releases_previous() {
        let cm = manager(json!({}));
        let first = Array::new();
        let second = Array::new();
        let owner = OwnerId::new();
        let _a = cm.observe_array(owner, |_: &ArrayMutation| {}, "items", &first, None);
        assert!(first.is_intercepted());

        let b = cm.observe_array(owner, |_: &ArrayMutation| {}, "items", &second, Some(&first));
        assert!(!first.is_intercepted());
        assert!(second.is_intercepted());

        drop(b);
        drop(_a);
        assert!(!second.is_intercepted());
    }

    #[test]
    fn panicking_listener_does_not_stop_delivery() {
        let cm = manager(json!({"x": 0}));
        let log = Log::default();
        let _bad = cm.observe("x", OwnerId::new(), |_: &Value, _: &Value| panic!("listener failure"));
        let _good = cm.observe("x", OwnerId::new(), recorder(&log));

        cm.root().set("x", 1);
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn remove_owner_clears_only_that_owner() {
        let cm = manager(json!({"x": 0, "y": 0}));
        let gone = OwnerId::new();
        let kept = OwnerId::new();
        let log = Log::default();
        let _a = cm.observe("x", gone, |_: &Value, _: &Value| {});
        let _b = cm.observe("y", gone, |_: &Value, _: &Value| {});
        let _c = cm.observe("y", kept, recorder(&log));

        cm.remove_owner(gone);
        assert!(!cm.is_installed("x"));
        assert_eq!(cm.identifiers(), vec!["y".to_string()]);

        cm.root().set("y", 1);
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn listener_may_write_reentrantly() {
        let cm = manager(json!({"a": 0, "b": 0}));
        let log = Log::default();
        let root = cm.root().clone();
        let _a = cm.observe("a", OwnerId::new(), move |new: &Value, _: &Value| {
            root.set("b", new.as_f64().unwrap_or_default() * 10.0);
        });
        let _b = cm.observe("b", OwnerId::new(), recorder(&log));

        cm.root().set("a", 2);
        assert_eq!(log.lock().clone(), vec![(Value::from(20), Value::from(0))]);
    }

    #[test]
    fn dispose_with_reset_strips_accessors() {
        let cm = manager(json!({"a": {"b": [1]}}));
        let _sub = cm.observe("a.b", OwnerId::new(), |_: &Value, _: &Value| {});
        let list = cm.resolve("a.b").as_array().cloned().unwrap();
        assert!(list.is_intercepted());

        cm.dispose(true);
        assert_eq!(cm.root().accessor_kind("a"), None);
        assert!(!list.is_intercepted());
        assert!(cm.is_empty());
    }
}
