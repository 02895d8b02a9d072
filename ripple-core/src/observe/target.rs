//! Observed containers.
//!
//! A [`Target`] is the raw data behind every view. Its methods here read and
//! write without tracking or notifying anyone, the way code holding the
//! unwrapped object would. Go through a [`View`](super::View) to get
//! observed access.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::Config;
use crate::error::{ReactivityError, Result};
use crate::reactive::{Key, Observable, Runtime, Shape, TargetId};

use super::value::Value;
use super::view::ViewInner;

/// The three container kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Keyed object with insertion-ordered string keys and an optional
    /// prototype for delegated reads.
    Object,
    /// Indexed sequence.
    Array,
    /// Associative map. Replacing a value is visible to value enumeration.
    Map,
}

pub(crate) enum Data {
    Object {
        entries: IndexMap<Arc<str>, Value>,
        proto: Option<Target>,
    },
    Array(Vec<Value>),
    Map(IndexMap<Arc<str>, Value>),
}

pub(crate) struct TargetInner {
    id: TargetId,
    kind: TargetKind,
    data: RwLock<Data>,
    /// One cached view per wrapping mode.
    pub(crate) views: Mutex<[Weak<ViewInner>; 4]>,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        Runtime::release(self.id);
    }
}

/// Shared handle to a raw container.
#[derive(Clone)]
pub struct Target {
    pub(crate) inner: Arc<TargetInner>,
}

impl Target {
    fn with_data(kind: TargetKind, data: Data) -> Self {
        Self {
            inner: Arc::new(TargetInner {
                id: TargetId::new(),
                kind,
                data: RwLock::new(data),
                views: Mutex::new(Default::default()),
            }),
        }
    }

    /// Create an empty keyed object.
    pub fn object() -> Self {
        Self::with_data(
            TargetKind::Object,
            Data::Object {
                entries: IndexMap::new(),
                proto: None,
            },
        )
    }

    /// Create an empty keyed object whose missing keys are read from
    /// `proto`.
    pub fn object_with_proto(proto: &Target) -> Self {
        Self::with_data(
            TargetKind::Object,
            Data::Object {
                entries: IndexMap::new(),
                proto: Some(proto.clone()),
            },
        )
    }

    /// Create an empty array.
    pub fn array() -> Self {
        Self::with_data(TargetKind::Array, Data::Array(Vec::new()))
    }

    /// Create an array holding `values`.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self::with_data(TargetKind::Array, Data::Array(values.into_iter().collect()))
    }

    /// Create an empty associative map.
    pub fn map() -> Self {
        Self::with_data(TargetKind::Map, Data::Map(IndexMap::new()))
    }

    /// Build a container from a JSON object or array.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match Value::from_json(json) {
            Value::Object(target) => Ok(target),
            _ => Err(ReactivityError::NotAContainer),
        }
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    pub fn kind(&self) -> TargetKind {
        self.inner.kind
    }

    pub fn ptr_eq(&self, other: &Target) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn proto(&self) -> Option<Target> {
        match &*self.inner.data.read() {
            Data::Object { proto, .. } => proto.clone(),
            _ => None,
        }
    }

    /// Number of own entries (or elements).
    pub fn len(&self) -> usize {
        match &*self.inner.data.read() {
            Data::Object { entries, .. } => entries.len(),
            Data::Array(items) => items.len(),
            Data::Map(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Own keys in enumeration order.
    pub fn keys(&self) -> Vec<Key> {
        match &*self.inner.data.read() {
            Data::Object { entries, .. } | Data::Map(entries) => {
                entries.keys().cloned().map(Key::Name).collect()
            }
            Data::Array(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    /// Read an own key without tracking.
    pub fn get_raw(&self, key: impl Into<Key>) -> Option<Value> {
        let key = self.normalize(key.into());
        self.data().own(&key)
    }

    /// Write an own key without notifying anyone. Returns the previous
    /// value. Keys a container cannot hold are ignored.
    pub fn insert_raw(&self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        let key = self.normalize(key.into());
        self.data_mut().insert(&key, value.into())
    }

    /// Remove an own key without notifying anyone.
    pub fn remove_raw(&self, key: impl Into<Key>) -> Option<Value> {
        let key = self.normalize(key.into());
        self.data_mut().remove(&key)
    }

    /// Snapshot as JSON. Only own entries are included.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_inner(&mut HashSet::new())
    }

    pub(crate) fn to_json_inner(&self, seen: &mut HashSet<TargetId>) -> serde_json::Value {
        if !seen.insert(self.id()) {
            return serde_json::Value::Null;
        }
        // Clone out so nested containers are serialized without this lock.
        let (is_array, entries) = {
            let data = self.data();
            (data.items().is_some(), data.entries())
        };
        let json = if is_array {
            serde_json::Value::Array(
                entries
                    .iter()
                    .map(|(_, value)| value.to_json_inner(seen))
                    .collect(),
            )
        } else {
            serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_json_inner(seen)))
                    .collect(),
            )
        };
        seen.remove(&self.id());
        json
    }

    pub(crate) fn normalize(&self, key: Key) -> Key {
        key.normalize(self.shape())
    }

    pub(crate) fn data(&self) -> RwLockReadGuard<'_, Data> {
        self.inner.data.read()
    }

    pub(crate) fn data_mut(&self) -> RwLockWriteGuard<'_, Data> {
        self.inner.data.write()
    }

    /// Resolve `key` along the prototype chain, calling `visit` with every
    /// target consulted, the receiver first.
    pub(crate) fn resolve(&self, key: &Key, mut visit: impl FnMut(&Target)) -> Option<Value> {
        let mut current = self.clone();
        loop {
            visit(&current);
            let (own, proto) = {
                let data = current.data();
                let proto = match &*data {
                    Data::Object { proto, .. } => proto.clone(),
                    _ => None,
                };
                (data.own(key), proto)
            };
            if own.is_some() {
                return own;
            }
            match proto {
                Some(proto) => current = proto,
                None => return None,
            }
        }
    }
}

impl Data {
    /// Read an own, already normalized key.
    pub(crate) fn own(&self, key: &Key) -> Option<Value> {
        match (self, key) {
            (Data::Object { entries, .. }, Key::Name(name)) | (Data::Map(entries), Key::Name(name)) => {
                entries.get(name).cloned()
            }
            (Data::Array(items), Key::Index(index)) => items.get(*index).cloned(),
            (Data::Array(items), Key::Length) => Some(Value::from(items.len())),
            _ => None,
        }
    }

    pub(crate) fn has_own(&self, key: &Key) -> bool {
        match (self, key) {
            (Data::Object { entries, .. }, Key::Name(name)) | (Data::Map(entries), Key::Name(name)) => {
                entries.contains_key(name)
            }
            (Data::Array(items), Key::Index(index)) => *index < items.len(),
            (Data::Array(_), Key::Length) => true,
            _ => false,
        }
    }

    /// Store at an own key. Arrays grow with `Null` padding when written
    /// past their end, up to `Config::max_array_length`.
    pub(crate) fn insert(&mut self, key: &Key, value: Value) -> Option<Value> {
        match (self, key) {
            (Data::Object { entries, .. }, Key::Name(name)) | (Data::Map(entries), Key::Name(name)) => {
                entries.insert(name.clone(), value)
            }
            (Data::Array(items), Key::Index(index)) => {
                if *index < items.len() {
                    Some(std::mem::replace(&mut items[*index], value))
                } else if *index >= Config::current().max_array_length {
                    tracing::warn!(index, "array index past the configured length bound ignored");
                    None
                } else {
                    items.resize(*index, Value::Null);
                    items.push(value);
                    None
                }
            }
            _ => None,
        }
    }

    /// Remove an own key. Array slots are emptied to `Null`; the length
    /// does not change.
    pub(crate) fn remove(&mut self, key: &Key) -> Option<Value> {
        match (self, key) {
            (Data::Object { entries, .. }, Key::Name(name)) | (Data::Map(entries), Key::Name(name)) => {
                entries.shift_remove(name)
            }
            (Data::Array(items), Key::Index(index)) => items
                .get_mut(*index)
                .map(|slot| std::mem::replace(slot, Value::Null)),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Data::Object { entries, .. } | Data::Map(entries) => entries.len(),
            Data::Array(items) => items.len(),
        }
    }

    pub(crate) fn clear(&mut self) {
        match self {
            Data::Object { entries, .. } | Data::Map(entries) => entries.clear(),
            Data::Array(items) => items.clear(),
        }
    }

    pub(crate) fn items_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Data::Array(items) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn items(&self) -> Option<&[Value]> {
        match self {
            Data::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Own entries in enumeration order.
    pub(crate) fn entries(&self) -> Vec<(Key, Value)> {
        match self {
            Data::Object { entries, .. } | Data::Map(entries) => entries
                .iter()
                .map(|(key, value)| (Key::Name(key.clone()), value.clone()))
                .collect(),
            Data::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, value)| (Key::Index(index), value.clone()))
                .collect(),
        }
    }
}

impl Observable for Target {
    fn target_id(&self) -> TargetId {
        self.inner.id
    }

    fn shape(&self) -> Shape {
        match self.inner.kind {
            TargetKind::Object => Shape::Plain,
            TargetKind::Array => Shape::Sequence,
            TargetKind::Map => Shape::Associative,
        }
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("len", &self.len())
            .finish()
    }
}
