//! Context Values
//!
//! Contexts are arbitrary nested data. Rust has no property interception, so
//! the data model is a small dynamic value type whose containers are shared
//! handles: an [`Object`] or [`Array`] cloned out of a context is the same
//! container, and writing through it is visible (and observed) everywhere.
//!
//! # Identity
//!
//! Containers compare by reference identity, primitives by value. The
//! no-op write rule ("setting an observed property to its current value
//! notifies nobody") uses exactly this comparison, see [`Value::same`].
//!
//! # Interception
//!
//! Every object key and array index is a slot that may carry a
//! [`PathAccessor`](super::accessor::PathAccessor). Writes go through
//! [`Object::set`] / [`Array::set`]; the accessor swap happens under the
//! container's lock and notification runs after the lock is released, so
//! listeners are free to read or write the same container.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::accessor::{self, AccessorKind, Hook, Hooks, PathAccessor};

/// A dynamically typed context value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Object(Object),
    Array(Array),
}

impl Value {
    /// Identity comparison: containers by reference, primitives by value.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Read one path segment: an object key, an array index, or an array's
    /// `length`. Anything else (including reading through a primitive)
    /// yields `Undefined`.
    pub fn child(&self, segment: &str) -> Value {
        match self {
            Value::Object(o) => o.get(segment),
            Value::Array(a) if segment == "length" => Value::Number(a.len() as f64),
            Value::Array(a) => segment
                .parse::<usize>()
                .map(|index| a.get(index))
                .unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Read a dotted path below this value. An empty path is the value itself.
    pub fn lookup(&self, path: &str) -> Value {
        if path.is_empty() {
            return self.clone();
        }
        path.split('.').fold(self.clone(), |value, segment| value.child(segment))
    }

    /// Text used when the value is interpolated into markup.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined | Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Object(_) | Value::Array(_) => self.to_json().to_string(),
        }
    }

    /// Snapshot as JSON. `Undefined` object entries are omitted.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Build a fresh container graph from JSON.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(Arc::from(s)),
            serde_json::Value::Array(items) => {
                Value::Array(Array::from_vec(items.into_iter().map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => Value::Object(Object::from_entries(
                map.into_iter().map(|(k, v)| (k, Value::from_json(v))),
            )),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(o) => fmt::Debug::fmt(o, f),
            Value::Array(a) => fmt::Debug::fmt(a, f),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Object(o) => {
                let entries = o.entries();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in &entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Array(a) => {
                let items = a.to_vec();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in &items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::from_vec(items))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

// ----------------------------------------------------------------------------
// Objects
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Slot {
    value: Value,
    accessor: Option<PathAccessor>,
}

#[derive(Default)]
struct ObjectInner {
    slots: RwLock<IndexMap<String, Slot>>,
}

/// A shared, insertion-ordered string-keyed container.
#[derive(Clone, Default)]
pub struct Object(Arc<ObjectInner>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let slots = entries
            .into_iter()
            .map(|(k, v)| {
                (
                    k.into(),
                    Slot {
                        value: v.into(),
                        accessor: None,
                    },
                )
            })
            .collect();
        Self(Arc::new(ObjectInner {
            slots: RwLock::new(slots),
        }))
    }

    /// Plain read. Missing keys are `Undefined`.
    pub fn get(&self, key: &str) -> Value {
        self.0
            .slots
            .read()
            .get(key)
            .map(|slot| slot.value.clone())
            .unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0
            .slots
            .read()
            .get(key)
            .is_some_and(|slot| !slot.value.is_undefined())
    }

    /// Write a key. If the slot is observed, listeners run before this returns.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        let pending = {
            let mut slots = self.0.slots.write();
            let slot = slots.entry(key.into()).or_default();
            if slot.value.same(&value) {
                return;
            }
            let old = std::mem::replace(&mut slot.value, value.clone());
            slot.accessor
                .as_mut()
                .map(|accessor| accessor.transition(old, &value))
        };
        if let Some(pending) = pending {
            pending.dispatch(&value);
        }
    }

    /// Remove a key. An observed key keeps its accessor and is written to
    /// `Undefined` instead, so its listeners see the removal.
    pub fn remove(&self, key: &str) -> Value {
        {
            let mut slots = self.0.slots.write();
            match slots.get(key).map(|slot| slot.accessor.is_some()) {
                None => return Value::Undefined,
                Some(false) => {
                    return slots
                        .shift_remove(key)
                        .map(|slot| slot.value)
                        .unwrap_or_default()
                }
                Some(true) => {}
            }
        }
        let previous = self.get(key);
        self.set(key, Value::Undefined);
        previous
    }

    pub fn keys(&self) -> Vec<String> {
        self.0
            .slots
            .read()
            .iter()
            .filter(|(_, slot)| !slot.value.is_undefined())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .slots
            .read()
            .iter()
            .filter(|(_, slot)| !slot.value.is_undefined())
            .map(|(key, slot)| (key.clone(), slot.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The accessor variant installed on `key`, if the key is observed.
    pub fn accessor_kind(&self, key: &str) -> Option<AccessorKind> {
        self.0
            .slots
            .read()
            .get(key)
            .and_then(|slot| slot.accessor.as_ref().map(PathAccessor::kind))
    }

    pub(crate) fn install_hook(&self, key: &str, hook: Hook) {
        let mut slots = self.0.slots.write();
        let slot = slots.entry(key.to_string()).or_default();
        slot.accessor
            .get_or_insert_with(|| PathAccessor::new(&slot.value))
            .add_hook(hook);
    }

    pub(crate) fn remove_hook(&self, key: &str, hook: &Hook) {
        let mut slots = self.0.slots.write();
        if let Some(slot) = slots.get_mut(key) {
            if slot.accessor.as_mut().is_some_and(|a| a.remove_hook(hook)) {
                slot.accessor = None;
            }
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

// ----------------------------------------------------------------------------
// Arrays
// ----------------------------------------------------------------------------

/// The mutators whose calls are intercepted on observed arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayMethod {
    Push,
    Pop,
    Shift,
    Unshift,
    Splice,
    Sort,
    Reverse,
}

impl ArrayMethod {
    pub fn name(self) -> &'static str {
        match self {
            ArrayMethod::Push => "push",
            ArrayMethod::Pop => "pop",
            ArrayMethod::Shift => "shift",
            ArrayMethod::Unshift => "unshift",
            ArrayMethod::Splice => "splice",
            ArrayMethod::Sort => "sort",
            ArrayMethod::Reverse => "reverse",
        }
    }

    /// Mutators that move existing elements to other indices.
    pub fn is_shift_family(self) -> bool {
        matches!(
            self,
            ArrayMethod::Shift | ArrayMethod::Unshift | ArrayMethod::Splice
        )
    }

    /// Mutators after which observed descendants are re-resolved through
    /// the child cascade instead of a bare length notification.
    pub fn cascades(self) -> bool {
        self.is_shift_family() || matches!(self, ArrayMethod::Sort | ArrayMethod::Reverse)
    }
}

impl fmt::Display for ArrayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Record handed to array-mutation listeners.
#[derive(Debug, Clone)]
pub struct ArrayMutation {
    pub method: ArrayMethod,
    pub arguments: Vec<Value>,
    pub return_value: Value,
    /// Shallow copy taken before the mutation ran.
    pub old_array: Array,
    /// The mutated array itself.
    pub new_array: Array,
}

#[derive(Default)]
struct ArrayState {
    items: Vec<Value>,
    accessors: HashMap<usize, PathAccessor>,
    hooks: Hooks,
}

#[derive(Default)]
struct ArrayInner {
    state: RwLock<ArrayState>,
}

/// A shared list container.
#[derive(Clone, Default)]
pub struct Array(Arc<ArrayInner>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Arc::new(ArrayInner {
            state: RwLock::new(ArrayState {
                items,
                ..ArrayState::default()
            }),
        }))
    }

    pub fn len(&self) -> usize {
        self.0.state.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Value {
        self.0
            .state
            .read()
            .items
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.state.read().items.clone()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether any manager intercepts this array's mutators.
    pub fn is_intercepted(&self) -> bool {
        !self.0.state.read().hooks.is_empty()
    }

    pub fn accessor_kind(&self, index: usize) -> Option<AccessorKind> {
        self.0
            .state
            .read()
            .accessors
            .get(&index)
            .map(PathAccessor::kind)
    }

    /// Write one index, padding with `Undefined` past the end.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        let pending = {
            let mut state = self.0.state.write();
            if state.items.len() <= index {
                state.items.resize(index + 1, Value::Undefined);
            }
            if state.items[index].same(&value) {
                return;
            }
            let old = std::mem::replace(&mut state.items[index], value.clone());
            state
                .accessors
                .get_mut(&index)
                .map(|accessor| accessor.transition(old, &value))
        };
        if let Some(pending) = pending {
            pending.dispatch(&value);
        }
    }

    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate(
            ArrayMethod::Push,
            vec![value.clone()],
            move |items| {
                items.push(value);
                items.len()
            },
            |len| Value::from(*len),
        )
    }

    pub fn pop(&self) -> Value {
        self.mutate(
            ArrayMethod::Pop,
            Vec::new(),
            |items| items.pop().unwrap_or_default(),
            Value::clone,
        )
    }

    pub fn shift(&self) -> Value {
        self.mutate(
            ArrayMethod::Shift,
            Vec::new(),
            |items| {
                if items.is_empty() {
                    Value::Undefined
                } else {
                    items.remove(0)
                }
            },
            Value::clone,
        )
    }

    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate(
            ArrayMethod::Unshift,
            vec![value.clone()],
            move |items| {
                items.insert(0, value);
                items.len()
            },
            |len| Value::from(*len),
        )
    }

    /// Remove `delete_count` items at `start` and insert `insert` in their
    /// place. Returns the removed items.
    pub fn splice(&self, start: usize, delete_count: usize, insert: Vec<Value>) -> Vec<Value> {
        let mut arguments = vec![Value::from(start), Value::from(delete_count)];
        arguments.extend(insert.iter().cloned());
        self.mutate(
            ArrayMethod::Splice,
            arguments,
            move |items| {
                let start = start.min(items.len());
                let end = start.saturating_add(delete_count).min(items.len());
                items.splice(start..end, insert).collect::<Vec<_>>()
            },
            |removed| Value::Array(Array::from_vec(removed.clone())),
        )
    }

    /// Sort by display string.
    pub fn sort(&self) {
        self.sort_by(|a, b| a.to_display_string().cmp(&b.to_display_string()));
    }

    /// Sort with a comparator. The comparator runs outside the array lock.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let mut sorted = self.to_vec();
        sorted.sort_by(compare);
        let this = self.clone();
        self.mutate(
            ArrayMethod::Sort,
            Vec::new(),
            move |items| *items = sorted,
            move |_| Value::Array(this),
        );
    }

    pub fn reverse(&self) {
        let this = self.clone();
        self.mutate(
            ArrayMethod::Reverse,
            Vec::new(),
            |items| items.reverse(),
            move |_| Value::Array(this),
        );
    }

    /// Run `op` on the items, then deliver index-slot writes and the
    /// mutation record to intercepting managers, outside the lock.
    fn mutate<R>(
        &self,
        method: ArrayMethod,
        arguments: Vec<Value>,
        op: impl FnOnce(&mut Vec<Value>) -> R,
        returned: impl FnOnce(&R) -> Value,
    ) -> R {
        let (result, pending, writes) = {
            let mut state = self.0.state.write();
            let snapshot = (!state.hooks.is_empty()).then(|| state.items.clone());
            // index slots are written through their accessors, except when an
            // intercepting manager re-resolves every descendant itself
            let slot_writes = !method.cascades() || state.hooks.is_empty();
            let mut before: Vec<(usize, Value)> = if slot_writes {
                state
                    .accessors
                    .keys()
                    .map(|&index| (index, state.items.get(index).cloned().unwrap_or_default()))
                    .collect()
            } else {
                Vec::new()
            };
            before.sort_unstable_by_key(|(index, _)| *index);

            let result = op(&mut state.items);

            let mut writes = Vec::new();
            for (index, old) in before {
                let new = state.items.get(index).cloned().unwrap_or_default();
                if new.same(&old) {
                    continue;
                }
                if let Some(accessor) = state.accessors.get_mut(&index) {
                    writes.push((accessor.transition(old, &new), new));
                }
            }
            (result, snapshot.map(|old| (old, state.hooks.clone())), writes)
        };

        for (write, new) in writes {
            write.dispatch(&new);
        }
        if let Some((old, hooks)) = pending {
            let mutation = ArrayMutation {
                method,
                arguments,
                return_value: returned(&result),
                old_array: Array::from_vec(old),
                new_array: self.clone(),
            };
            for hook in &hooks {
                hook.array_mutated(&mutation);
            }
        }
        result
    }

    pub(crate) fn install_hook(&self, index: usize, hook: Hook) {
        let mut state = self.0.state.write();
        let current = state.items.get(index).cloned().unwrap_or_default();
        state
            .accessors
            .entry(index)
            .or_insert_with(|| PathAccessor::new(&current))
            .add_hook(hook);
    }

    pub(crate) fn remove_hook(&self, index: usize, hook: &Hook) {
        let mut state = self.0.state.write();
        if state
            .accessors
            .get_mut(&index)
            .is_some_and(|a| a.remove_hook(hook))
        {
            state.accessors.remove(&index);
        }
    }

    pub(crate) fn intercept(&self, hook: Hook) {
        accessor::add_hook(&mut self.0.state.write().hooks, hook);
    }

    pub(crate) fn release(&self, hook: &Hook) {
        accessor::remove_hook(&mut self.0.state.write().hooks, hook);
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Array::from_vec(iter.into_iter().collect())
    }
}

// ----------------------------------------------------------------------------
// Slot addressing
// ----------------------------------------------------------------------------

/// The container half of an observed `(container, key)` pair.
#[derive(Debug, Clone)]
pub(crate) enum Container {
    Object(Object),
    Array(Array),
}

impl Container {
    pub(crate) fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Object(o) => Some(Container::Object(o.clone())),
            Value::Array(a) => Some(Container::Array(a.clone())),
            _ => None,
        }
    }

    pub(crate) fn same(&self, other: &Container) -> bool {
        match (self, other) {
            (Container::Object(a), Container::Object(b)) => a.ptr_eq(b),
            (Container::Array(a), Container::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Install an accessor hook on `key`. Arrays only take index keys;
    /// `length` and other names are never intercepted. Returns whether an
    /// accessor was installed.
    pub(crate) fn install_hook(&self, key: &str, hook: Hook) -> bool {
        match self {
            Container::Object(o) => {
                o.install_hook(key, hook);
                true
            }
            Container::Array(a) => match key.parse::<usize>() {
                Ok(index) => {
                    a.install_hook(index, hook);
                    true
                }
                Err(_) => false,
            },
        }
    }

    pub(crate) fn remove_hook(&self, key: &str, hook: &Hook) {
        match self {
            Container::Object(o) => o.remove_hook(key, hook),
            Container::Array(a) => {
                if let Ok(index) = key.parse::<usize>() {
                    a.remove_hook(index, hook);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_semantics() {
        let a = Object::new();
        let b = Object::new();
        assert!(Value::from(a.clone()).same(&Value::from(a.clone())));
        assert!(!Value::from(a).same(&Value::from(b)));
        assert!(Value::from("x").same(&Value::from("x")));
        assert!(Value::from(1).same(&Value::from(1.0)));
        assert!(!Value::Null.same(&Value::Undefined));
    }

    #[test]
    fn child_reads() {
        let value = Value::from(json!({"list": [{"v": 1}, {"v": 2}], "n": 3}));
        assert_eq!(value.lookup("list.1.v"), Value::from(2));
        assert_eq!(value.lookup("list.length"), Value::from(2));
        assert_eq!(value.lookup("n.deeper"), Value::Undefined);
        assert_eq!(value.lookup("missing.deeper"), Value::Undefined);
        assert_eq!(value.lookup("list.x"), Value::Undefined);
    }

    #[test]
    fn json_round_trip_keeps_shape() {
        let source = json!({"a": {"b": [1, 2.5, "x", null, true]}});
        let value = Value::from(source.clone());
        assert_eq!(value.to_json(), source);
    }

    #[test]
    fn shared_handles_see_writes() {
        let obj = Object::new();
        let alias = Value::from(obj.clone());
        obj.set("k", 1);
        assert_eq!(alias.child("k"), Value::from(1));
    }

    #[test]
    fn array_mutators() {
        let arr = Array::from_vec(vec![Value::from(3), Value::from(1)]);
        assert_eq!(arr.push(2), 3);
        arr.sort();
        assert_eq!(Value::from(arr.clone()).to_json(), json!([1, 2, 3]));
        assert_eq!(arr.shift(), Value::from(1));
        assert_eq!(arr.unshift(0), 3);
        let removed = arr.splice(1, 1, vec![Value::from(9), Value::from(8)]);
        assert_eq!(removed, vec![Value::from(2)]);
        arr.reverse();
        assert_eq!(Value::from(arr.clone()).to_json(), json!([3, 8, 9, 0]));
        assert_eq!(arr.pop(), Value::from(0));
        assert_eq!(arr.len(), 3);
    }

    #[test]
    fn index_write_pads() {
        let arr = Array::new();
        arr.set(2, "x");
        assert_eq!(arr.len(), 3);
        assert!(arr.get(0).is_undefined());
    }

    #[test]
    fn display_strings() {
        assert_eq!(Value::from(3.0).to_display_string(), "3");
        assert_eq!(Value::from(2.5).to_display_string(), "2.5");
        assert_eq!(Value::Null.to_display_string(), "");
        assert_eq!(Value::from(json!([1, 2])).to_display_string(), "[1,2]");
    }

    #[test]
    fn removing_plain_key() {
        let obj = Object::from_entries([("a", 1), ("b", 2)]);
        assert_eq!(obj.remove("a"), Value::from(1));
        assert_eq!(obj.keys(), vec!["b".to_string()]);
        assert_eq!(obj.remove("zzz"), Value::Undefined);
    }
}
