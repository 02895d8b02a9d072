//! Whole-container reads and writes on views.
//!
//! Maps record enumeration against two keys: listing keys reads
//! [`Key::MapKeyIterate`], while sizes, values and entries read
//! [`Key::Iterate`]. Replacing a map value notifies only the latter.

use crate::reactive::{Key, Runtime, TrackOp};

use super::handlers::Mode;
use super::target::TargetKind;
use super::value::Value;
use super::view::{wrap, View};

impl View {
    /// Number of entries, recording a read of the key set.
    pub fn len(&self) -> usize {
        if !self.is_readonly() {
            let key = match self.kind() {
                TargetKind::Array => Key::Length,
                TargetKind::Object | TargetKind::Map => Key::Iterate,
            };
            Runtime::track(self.target(), TrackOp::Iterate, key);
        }
        self.target().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Alias of [`len`](Self::len), named after the map accessor.
    pub fn size(&self) -> usize {
        self.len()
    }

    /// Values in enumeration order, wrapped like [`get`](Self::get) would.
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Key/value pairs in enumeration order.
    ///
    /// Maps record a single read of their contents. Objects and arrays
    /// record their key set plus one read per key.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        if self.kind() != TargetKind::Map {
            return self
                .keys()
                .into_iter()
                .map(|key| {
                    let value = self.get(key.clone());
                    (key, value)
                })
                .collect();
        }

        if !self.is_readonly() {
            Runtime::track(self.target(), TrackOp::Iterate, Key::Iterate);
        }
        let entries = self.target().data().entries();
        let mode = self.mode();
        entries
            .into_iter()
            .map(|(key, value)| (key, wrap_nested(value, mode)))
            .collect()
    }

    /// Call `f` with every entry. The entries are collected first, so `f`
    /// may write to the container.
    pub fn for_each(&self, mut f: impl FnMut(Key, Value)) {
        for (key, value) in self.entries() {
            f(key, value);
        }
    }

    /// Remove every entry, notifying every reader of the container.
    /// Returns whether anything was removed.
    pub fn clear(&self) -> bool {
        match self.handler().clear(self.target()) {
            Ok(cleared) => cleared,
            Err(err) => {
                err.report();
                false
            }
        }
    }
}

fn wrap_nested(value: Value, mode: Mode) -> Value {
    match mode {
        Mode::ShallowReactive | Mode::ShallowReadonly => value,
        Mode::Reactive | Mode::Readonly => wrap(value, mode),
    }
}
