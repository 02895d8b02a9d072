//! Interception handlers.
//!
//! A view forwards every read and write to one of four static handlers,
//! picked when the view is created. Writable handlers record reads and
//! announce writes; read-only handlers do neither and reject every write.
//! Deep handlers wrap nested containers on the way out; shallow handlers
//! hand them out raw.

use tracing::trace;

use crate::config::Config;
use crate::error::{ReactivityError, Result};
use crate::reactive::{Key, Runtime, TrackOp, TriggerOp};

use super::target::{Target, TargetKind};
use super::value::Value;
use super::view::wrap;

/// Wrapping mode of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Writable, nested containers wrapped on access.
    Reactive,
    /// Writable, nested containers returned raw.
    ShallowReactive,
    /// Read-only, nested containers wrapped read-only on access.
    Readonly,
    /// Read-only, nested containers returned raw.
    ShallowReadonly,
}

impl Mode {
    pub fn is_readonly(self) -> bool {
        matches!(self, Mode::Readonly | Mode::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, Mode::ShallowReactive | Mode::ShallowReadonly)
    }

    /// Slot in a target's view cache.
    pub(crate) fn index(self) -> usize {
        match self {
            Mode::Reactive => 0,
            Mode::ShallowReactive => 1,
            Mode::Readonly => 2,
            Mode::ShallowReadonly => 3,
        }
    }
}

/// The operations a view intercepts.
///
/// Keys arrive as given by the caller; handlers normalize them for the
/// target's kind.
pub trait Handler: Send + Sync {
    fn mode(&self) -> Mode;

    /// Read `key`, returning `Null` when absent.
    fn get(&self, target: &Target, key: Key) -> Value;

    fn set(&self, target: &Target, key: Key, value: Value) -> Result<()>;

    /// Remove `key`. Returns whether it was present.
    fn delete(&self, target: &Target, key: Key) -> Result<bool>;

    /// Whether `key` exists on the target or its prototype chain.
    fn has(&self, target: &Target, key: Key) -> bool;

    fn own_keys(&self, target: &Target) -> Vec<Key>;

    fn clear(&self, target: &Target) -> Result<bool>;
}

static REACTIVE: MutableHandler = MutableHandler { shallow: false };
static SHALLOW_REACTIVE: MutableHandler = MutableHandler { shallow: true };
static READONLY: ReadonlyHandler = ReadonlyHandler { shallow: false };
static SHALLOW_READONLY: ReadonlyHandler = ReadonlyHandler { shallow: true };

pub(crate) fn handler_for(mode: Mode) -> &'static dyn Handler {
    match mode {
        Mode::Reactive => &REACTIVE,
        Mode::ShallowReactive => &SHALLOW_REACTIVE,
        Mode::Readonly => &READONLY,
        Mode::ShallowReadonly => &SHALLOW_READONLY,
    }
}

/// Read shared by every mode.
fn base_get(target: &Target, key: Key, readonly: bool, shallow: bool) -> Value {
    let key = target.normalize(key);
    if matches!(key, Key::Iterate | Key::MapKeyIterate | Key::Value) {
        return Value::Null;
    }

    let value = target
        .resolve(&key, |current| {
            if !readonly {
                Runtime::track(current, TrackOp::Get, key.clone());
            }
        })
        .unwrap_or(Value::Null);

    if shallow {
        return value;
    }

    // Only keyed objects unwrap signals; arrays and maps keep the cell.
    let value = match value {
        Value::Signal(signal) if target.kind() == TargetKind::Object => signal.get().to_raw(),
        value => value,
    };

    if readonly {
        wrap(value, Mode::Readonly)
    } else {
        wrap(value, Mode::Reactive)
    }
}

fn base_has(target: &Target, key: Key, readonly: bool) -> bool {
    let key = target.normalize(key);
    let mut found = false;
    let mut current = Some(target.clone());
    while let Some(t) = current {
        if !readonly {
            Runtime::track(&t, TrackOp::Has, key.clone());
        }
        if t.data().has_own(&key) {
            found = true;
            break;
        }
        current = t.proto();
    }
    found
}

fn base_own_keys(target: &Target, readonly: bool) -> Vec<Key> {
    if !readonly {
        let key = match target.kind() {
            TargetKind::Object => Key::Iterate,
            TargetKind::Array => Key::Length,
            TargetKind::Map => Key::MapKeyIterate,
        };
        Runtime::track(target, TrackOp::Iterate, key);
    }
    target.keys()
}

/// The form in which a writable view stores `value`. Deep views store raw
/// containers, except views that are themselves shallow or read-only.
pub(crate) fn stored_value(value: Value, shallow: bool) -> Value {
    match value {
        Value::View(view) if !shallow && !view.is_shallow() && !view.is_readonly() => {
            Value::Object(view.target().clone())
        }
        value => value,
    }
}

/// Handler for writable views.
pub struct MutableHandler {
    shallow: bool,
}

impl MutableHandler {
    fn set_length(&self, target: &Target, value: &Value) -> Result<()> {
        let max_length = Config::current().max_array_length;
        let length = match value.as_number() {
            Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= max_length as f64 => n as usize,
            Some(n) => return Err(ReactivityError::InvalidLength(n)),
            None => return Err(ReactivityError::InvalidLength(f64::NAN)),
        };

        let old_length = {
            let mut data = target.data_mut();
            let Some(items) = data.items_mut() else {
                return Ok(());
            };
            let old_length = items.len();
            items.resize(length, Value::Null);
            old_length
        };

        if old_length != length {
            Runtime::trigger(
                target,
                TriggerOp::Set,
                Some(Key::Length),
                Some(Value::from(length)),
                Some(Value::from(old_length)),
            );
        }
        Ok(())
    }
}

impl Handler for MutableHandler {
    fn mode(&self) -> Mode {
        if self.shallow {
            Mode::ShallowReactive
        } else {
            Mode::Reactive
        }
    }

    fn get(&self, target: &Target, key: Key) -> Value {
        base_get(target, key, false, self.shallow)
    }

    fn set(&self, target: &Target, key: Key, value: Value) -> Result<()> {
        let key = target.normalize(key);
        let kind = target.kind();
        match (&key, kind) {
            (Key::Length, TargetKind::Array) => return self.set_length(target, &value),
            (Key::Index(index), TargetKind::Array)
                if *index >= Config::current().max_array_length =>
            {
                return Err(ReactivityError::InvalidKey {
                    key: key.to_string(),
                })
            }
            (Key::Name(_), TargetKind::Object | TargetKind::Map) | (Key::Index(_), TargetKind::Array) => {}
            _ => {
                return Err(ReactivityError::InvalidKey {
                    key: key.to_string(),
                })
            }
        }

        let old_value = target.data().own(&key);

        let value = stored_value(value, self.shallow);
        let assigns_through =
            !self.shallow && kind == TargetKind::Object && !matches!(value, Value::Signal(_));
        if let (true, Some(Value::Signal(signal))) = (assigns_through, &old_value) {
            trace!(key = %key, "assigning through signal");
            signal.set(value);
            return Ok(());
        }

        let (had_key, old_value) = {
            let mut data = target.data_mut();
            let had_key = data.has_own(&key);
            let old_value = data.insert(&key, value.clone());
            (had_key, old_value)
        };

        if !had_key {
            Runtime::trigger(target, TriggerOp::Add, Some(key), Some(value), None);
        } else {
            let old_value = old_value.unwrap_or(Value::Null);
            if !old_value.same_value(&value) {
                Runtime::trigger(target, TriggerOp::Set, Some(key), Some(value), Some(old_value));
            }
        }
        Ok(())
    }

    fn delete(&self, target: &Target, key: Key) -> Result<bool> {
        let key = target.normalize(key);
        let old_value = {
            let mut data = target.data_mut();
            if !data.has_own(&key) || key == Key::Length {
                return Ok(false);
            }
            // A deleted array slot holds `Null`; deleting it again is a no-op.
            if key.is_index() && data.own(&key).is_some_and(|value| value.is_null()) {
                return Ok(false);
            }
            data.remove(&key)
        };

        Runtime::trigger(target, TriggerOp::Delete, Some(key), None, old_value);
        Ok(true)
    }

    fn has(&self, target: &Target, key: Key) -> bool {
        base_has(target, key, false)
    }

    fn own_keys(&self, target: &Target) -> Vec<Key> {
        base_own_keys(target, false)
    }

    fn clear(&self, target: &Target) -> Result<bool> {
        let had_items = {
            let mut data = target.data_mut();
            let had_items = data.len() != 0;
            data.clear();
            had_items
        };

        if had_items {
            Runtime::trigger(target, TriggerOp::Clear, None, None, None);
        }
        Ok(had_items)
    }
}

/// Handler for read-only views. Never records reads.
pub struct ReadonlyHandler {
    shallow: bool,
}

impl Handler for ReadonlyHandler {
    fn mode(&self) -> Mode {
        if self.shallow {
            Mode::ShallowReadonly
        } else {
            Mode::Readonly
        }
    }

    fn get(&self, target: &Target, key: Key) -> Value {
        base_get(target, key, true, self.shallow)
    }

    fn set(&self, _target: &Target, key: Key, _value: Value) -> Result<()> {
        Err(ReactivityError::ReadonlyTarget {
            op: "set",
            key: key.to_string(),
        })
    }

    fn delete(&self, _target: &Target, key: Key) -> Result<bool> {
        Err(ReactivityError::ReadonlyTarget {
            op: "delete",
            key: key.to_string(),
        })
    }

    fn has(&self, target: &Target, key: Key) -> bool {
        base_has(target, key, true)
    }

    fn own_keys(&self, target: &Target) -> Vec<Key> {
        base_own_keys(target, true)
    }

    fn clear(&self, _target: &Target) -> Result<bool> {
        Err(ReactivityError::ReadonlyTarget {
            op: "clear",
            key: String::new(),
        })
    }
}
