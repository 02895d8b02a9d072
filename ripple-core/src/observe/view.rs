//! Wrapped views.
//!
//! A [`View`] is the observed face of a [`Target`]. There is at most one live
//! view per `(target, mode)` pair: wrapping the same target in the same mode
//! while a view exists returns that view, so views can be compared by
//! identity.

use std::fmt;
use std::sync::Arc;

use crate::error::{ReactivityError, Result};
use crate::reactive::{Key, Runtime, TrackOp};

use super::handlers::{handler_for, Handler, Mode};
use super::target::{Target, TargetKind};
use super::value::Value;

pub(crate) struct ViewInner {
    target: Target,
    handler: &'static dyn Handler,
}

/// An observed view of a container.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(&Target::object());
///
/// let s = state.clone();
/// let _effect = effect(move || println!("{:?}", s.get("count")), Default::default());
///
/// state.set("count", 1); // re-runs the effect
/// ```
#[derive(Clone)]
pub struct View {
    inner: Arc<ViewInner>,
}

impl View {
    /// The view of `target` in `mode`, created if no live one exists.
    pub fn new(target: &Target, mode: Mode) -> Self {
        let mut views = target.inner.views.lock();
        let slot = &mut views[mode.index()];
        if let Some(inner) = slot.upgrade() {
            return Self { inner };
        }

        let inner = Arc::new(ViewInner {
            target: target.clone(),
            handler: handler_for(mode),
        });
        *slot = Arc::downgrade(&inner);
        Self { inner }
    }

    /// Read `key`, recording the read unless the view is read-only.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        self.inner.handler.get(&self.inner.target, key.into())
    }

    /// Write `key`.
    ///
    /// A write through a read-only view is not applied; it is logged and
    /// still reports `true`. Returns `false` only for writes the container
    /// cannot represent.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        match self.try_set(key, value) {
            Ok(()) => true,
            Err(err) => {
                err.report();
                matches!(err, ReactivityError::ReadonlyTarget { .. })
            }
        }
    }

    pub fn try_set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.inner
            .handler
            .set(&self.inner.target, key.into(), value.into())
    }

    /// Remove `key`. Returns whether it was present; read-only views log the
    /// attempt and report `true`.
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        match self.try_delete(key) {
            Ok(deleted) => deleted,
            Err(err) => {
                err.report();
                matches!(err, ReactivityError::ReadonlyTarget { .. })
            }
        }
    }

    pub fn try_delete(&self, key: impl Into<Key>) -> Result<bool> {
        self.inner.handler.delete(&self.inner.target, key.into())
    }

    /// Whether `key` exists here or along the prototype chain. Records an
    /// existence read, which is invalidated by adds and deletes.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        self.inner.handler.has(&self.inner.target, key.into())
    }

    /// Whether `key` is an own key of the target. Records an existence read.
    pub fn has_own(&self, key: impl Into<Key>) -> bool {
        let key = self.inner.target.normalize(key.into());
        if !self.is_readonly() {
            Runtime::track(&self.inner.target, TrackOp::Has, key.clone());
        }
        self.inner.target.data().has_own(&key)
    }

    /// Own keys, recording a read of the key set.
    pub fn keys(&self) -> Vec<Key> {
        self.inner.handler.own_keys(&self.inner.target)
    }

    pub fn target(&self) -> &Target {
        &self.inner.target
    }

    pub fn kind(&self) -> TargetKind {
        self.inner.target.kind()
    }

    pub fn mode(&self) -> Mode {
        self.inner.handler.mode()
    }

    pub fn is_readonly(&self) -> bool {
        self.mode().is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.mode().is_shallow()
    }

    pub fn ptr_eq(&self, other: &View) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Untracked JSON snapshot of the underlying target.
    pub fn to_json(&self) -> serde_json::Value {
        self.inner.target.to_json()
    }

    pub(crate) fn handler(&self) -> &'static dyn Handler {
        self.inner.handler
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("target", &self.inner.target)
            .field("mode", &self.mode())
            .finish()
    }
}

/// Wrap `value` in `mode`.
///
/// Raw containers get the cached view for `mode`. A writable view wrapped
/// read-only becomes the read-only view of the same target; any other view,
/// and every non-container value, is returned unchanged.
pub fn wrap(value: Value, mode: Mode) -> Value {
    match value {
        Value::Object(target) => Value::View(View::new(&target, mode)),
        Value::View(view) if mode.is_readonly() && !view.is_readonly() => {
            Value::View(View::new(view.target(), mode))
        }
        value => value,
    }
}

/// The raw value behind `value`. Non-views are returned unchanged.
pub fn unwrap(value: &Value) -> Value {
    value.to_raw()
}

/// Whether `value` is a wrapped view, in `mode` if given.
pub fn is_wrapped(value: &Value, mode: Option<Mode>) -> bool {
    match (value, mode) {
        (Value::View(_), None) => true,
        (Value::View(view), Some(mode)) => view.mode() == mode,
        _ => false,
    }
}

/// Deep writable view of `target`.
pub fn reactive(target: &Target) -> View {
    View::new(target, Mode::Reactive)
}

/// Writable view of `target` whose nested containers are returned raw.
pub fn shallow_reactive(target: &Target) -> View {
    View::new(target, Mode::ShallowReactive)
}

/// Deep read-only view of `target`.
pub fn readonly(target: &Target) -> View {
    View::new(target, Mode::Readonly)
}

pub fn shallow_readonly(target: &Target) -> View {
    View::new(target, Mode::ShallowReadonly)
}
