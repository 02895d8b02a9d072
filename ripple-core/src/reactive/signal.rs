//! Signal Implementation
//!
//! A Signal is a single-value reference cell. Reading it inside a subscriber
//! run records a dependency; writing a different value notifies the readers.
//!
//! Signals can be stored inside observed objects. A writable view reading
//! such a property returns the signal's inner value, and assigning a plain
//! value to that property writes into the signal instead of replacing it, so
//! everyone holding the signal sees the update.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::observe::{wrap, Mode, Value};

use super::runtime::{Key, Observable, Runtime, TargetId, TrackOp, TriggerOp};

struct SignalInner {
    id: TargetId,
    /// Stored raw; containers are wrapped on the way out.
    value: RwLock<Value>,
}

impl Observable for SignalInner {
    fn target_id(&self) -> TargetId {
        self.id
    }
}

impl Drop for SignalInner {
    fn drop(&mut self) {
        Runtime::release(self.id);
    }
}

/// A reactive single-value cell.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    /// Create a new signal with the given initial value.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: TargetId::new(),
                value: RwLock::new(value.into().to_raw()),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// Inside a subscriber run this also records a dependency. Containers
    /// come back as deep writable views.
    pub fn get(&self) -> Value {
        Runtime::track(&*self.inner, TrackOp::Get, Key::Value);
        self.get_untracked()
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> Value {
        let value = self.inner.value.read().clone();
        wrap(value, Mode::Reactive)
    }

    /// Update the value, notifying readers if it changed.
    pub fn set(&self, value: impl Into<Value>) {
        let new_value = value.into().to_raw();
        let old_value = {
            let mut slot = self.inner.value.write();
            if slot.same_value(&new_value) {
                return;
            }
            std::mem::replace(&mut *slot, new_value.clone())
        };

        Runtime::trigger(
            &*self.inner,
            TriggerOp::Set,
            Some(Key::Value),
            Some(new_value),
            Some(old_value),
        );
    }

    /// Update the value with a function of the current one.
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) {
        let current = self.inner.value.read().clone();
        self.set(f(&current));
    }

    pub fn ptr_eq(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Observable for Signal {
    fn target_id(&self) -> TargetId {
        self.inner.id
    }
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
