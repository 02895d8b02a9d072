//! Reactive Runtime
//!
//! The runtime owns the tracking registry and implements the two primitives
//! everything else is built on:
//!
//! - [`Runtime::track`] records that the current subscriber read a
//!   `(target, key)` pair.
//! - [`Runtime::trigger`] announces a write to a `(target, key)` pair and
//!   re-runs (or schedules) every subscriber that read something the write
//!   may have changed.
//!
//! # Registry layout
//!
//! The registry is a two-level map, `target -> key -> Dep`, kept per thread.
//! It is keyed by [`TargetId`] rather than by the target itself, so it never
//! extends a target's lifetime. Targets call [`Runtime::release`] when their
//! last handle is dropped, which removes their entry.
//!
//! # Notification order
//!
//! Subscribers collected for one write are deduplicated, then notified in two
//! passes: memo subscribers first, plain subscribers second. A plain effect
//! that reads a memo therefore always sees the memo already invalidated.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::observe::Value;

use super::context::ReactiveContext;
use super::effect::EffectNode;
use super::subscriber::{Dep, SubscriberId};

/// Anything that runs under tracking and can be notified of changes.
pub(crate) trait Reactive: Send + Sync {
    /// Tracking state shared by every subscriber kind.
    fn node(&self) -> &EffectNode;

    /// Run the computation again, discarding its result.
    fn rerun(self: Arc<Self>);

    fn subscriber_id(&self) -> SubscriberId {
        self.node().id()
    }
}

/// Identity of an observed target in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

/// Container shape, which decides the extra keys a write notifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A keyed object, or anything with plain value semantics.
    Plain,
    /// An indexed sequence with a length.
    Sequence,
    /// An associative map whose value enumeration observes replacements.
    Associative,
}

/// Something that can be passed to [`Runtime::track`] and
/// [`Runtime::trigger`].
///
/// Implementors that are not [`Target`](crate::observe::Target)s should call
/// [`Runtime::release`] with their id when dropped.
pub trait Observable {
    fn target_id(&self) -> TargetId;

    fn shape(&self) -> Shape {
        Shape::Plain
    }
}

/// A dependency key within one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named property (plain objects and maps).
    Name(Arc<str>),
    /// A sequence index.
    Index(usize),
    /// A sequence's length.
    Length,
    /// The set of keys of a container, read by enumeration.
    Iterate,
    /// The set of keys of a map, read by key-only enumeration.
    MapKeyIterate,
    /// The value of a single-value cell or memo.
    Value,
}

impl Key {
    pub fn name(name: &str) -> Self {
        Key::Name(Arc::from(name))
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Key::Index(_))
    }

    /// Rewrite a key into the form a container of `shape` stores.
    ///
    /// Sequences understand `"length"` and canonical integer names;
    /// keyed containers see indices and `Length` as names.
    pub(crate) fn normalize(self, shape: Shape) -> Key {
        match (shape, self) {
            (Shape::Sequence, Key::Name(name)) => {
                if &*name == "length" {
                    return Key::Length;
                }
                match name.parse::<usize>() {
                    Ok(index) if index.to_string() == *name => Key::Index(index),
                    _ => Key::Name(name),
                }
            }
            (Shape::Sequence, key) => key,
            (_, Key::Index(index)) => Key::Name(Arc::from(index.to_string())),
            (_, Key::Length) => Key::name("length"),
            (_, key) => key,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{}", index),
            Key::Length => f.write_str("length"),
            Key::Iterate => f.write_str("<iterate>"),
            Key::MapKeyIterate => f.write_str("<map key iterate>"),
            Key::Value => f.write_str("value"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::name(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(Arc::from(name))
    }
}

impl From<Arc<str>> for Key {
    fn from(name: Arc<str>) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// Kind of read being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// Kind of write being announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugOp {
    Track(TrackOp),
    Trigger(TriggerOp),
}

/// Payload handed to `on_track` / `on_trigger` hooks in debug builds.
#[derive(Debug, Clone)]
pub struct DebuggerEvent {
    pub subscriber: SubscriberId,
    pub target: TargetId,
    pub op: DebugOp,
    pub key: Option<Key>,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

type KeyToDepMap = HashMap<Key, Arc<Dep>>;

thread_local! {
    static TARGET_MAP: RefCell<HashMap<TargetId, KeyToDepMap>> = RefCell::new(HashMap::new());
    static PENDING_RELEASE: RefCell<Vec<TargetId>> = const { RefCell::new(Vec::new()) };
}

/// The reactive runtime.
///
/// All state is thread-local; these are associated functions only.
pub struct Runtime;

impl Runtime {
    /// Record a read of `key` on `target` by the current subscriber.
    ///
    /// No-op outside a subscriber run or while tracking is paused.
    pub fn track<O: Observable + ?Sized>(target: &O, op: TrackOp, key: Key) {
        if !ReactiveContext::is_tracking() {
            return;
        }
        let Some(active) = ReactiveContext::active() else {
            return;
        };

        let target_id = target.target_id();
        let dep = Self::with_registry(|map| {
            map.entry(target_id)
                .or_default()
                .entry(key.clone())
                .or_insert_with(Dep::new)
                .clone()
        });

        Self::track_effects(&active, &dep, || DebuggerEvent {
            subscriber: active.subscriber_id(),
            target: target_id,
            op: DebugOp::Track(op),
            key: Some(key.clone()),
            new_value: None,
            old_value: None,
        });
    }

    /// Add the active subscriber to `dep`, keeping both sides of the edge in
    /// sync.
    fn track_effects(
        active: &Arc<dyn Reactive>,
        dep: &Arc<Dep>,
        #[allow(unused_variables)] event: impl FnOnce() -> DebuggerEvent,
    ) {
        let id = active.subscriber_id();
        let should_track = if ReactiveContext::uses_markers() {
            let bit = ReactiveContext::track_op_bit();
            if dep.new_tracked(bit) {
                false
            } else {
                dep.mark_new_tracked(bit);
                !dep.was_tracked(bit)
            }
        } else {
            !dep.contains(id)
        };

        if should_track {
            dep.insert(id, Arc::downgrade(active));
            active.node().push_dep(dep.clone());
            #[cfg(debug_assertions)]
            active.node().emit_track(event);
        }
    }

    /// Announce a write and notify every affected subscriber.
    ///
    /// No-op if `target` has never been tracked.
    pub fn trigger<O: Observable + ?Sized>(
        target: &O,
        op: TriggerOp,
        key: Option<Key>,
        new_value: Option<Value>,
        old_value: Option<Value>,
    ) {
        let target_id = target.target_id();
        let shape = target.shape();

        let deps = Self::with_registry(|map| {
            let deps_map = map.get(&target_id)?;
            Some(collect_deps(deps_map, shape, op, key.as_ref(), new_value.as_ref()))
        });
        let Some(deps) = deps else {
            return;
        };

        let mut subscribers: IndexMap<SubscriberId, Arc<dyn Reactive>> = IndexMap::new();
        for dep in &deps {
            for subscriber in dep.subscribers() {
                subscribers
                    .entry(subscriber.subscriber_id())
                    .or_insert(subscriber);
            }
        }
        if subscribers.is_empty() {
            return;
        }

        trace!(
            target_id = target_id.raw(),
            ?op,
            key = ?key,
            subscribers = subscribers.len(),
            "trigger"
        );

        let event = DebuggerEvent {
            subscriber: SubscriberId::default(),
            target: target_id,
            op: DebugOp::Trigger(op),
            key,
            new_value,
            old_value,
        };
        Self::trigger_effects(subscribers.into_values().collect(), &event);
    }

    /// Notify memos first, then plain subscribers.
    fn trigger_effects(subscribers: Vec<Arc<dyn Reactive>>, event: &DebuggerEvent) {
        for subscriber in subscribers.iter().filter(|s| s.node().is_memo()) {
            Self::trigger_effect(subscriber, event);
        }
        for subscriber in subscribers.iter().filter(|s| !s.node().is_memo()) {
            Self::trigger_effect(subscriber, event);
        }
    }

    #[allow(unused_variables)]
    fn trigger_effect(subscriber: &Arc<dyn Reactive>, event: &DebuggerEvent) {
        let node = subscriber.node();
        if !node.is_active() {
            return;
        }
        // A subscriber writing to data it reads must not re-trigger itself.
        if ReactiveContext::current_subscriber() == Some(node.id()) && !node.allow_recurse() {
            return;
        }

        #[cfg(debug_assertions)]
        node.emit_trigger(|| DebuggerEvent {
            subscriber: node.id(),
            ..event.clone()
        });

        EffectNode::notify(subscriber);
    }

    /// Drop the registry entry for a target that no longer exists.
    pub fn release(target_id: TargetId) {
        let _ = TARGET_MAP.try_with(|map| match map.try_borrow_mut() {
            Ok(mut map) => {
                let removed = map.remove(&target_id);
                drop(map);
                drop(removed);
            }
            Err(_) => {
                debug!(target_id = target_id.raw(), "registry busy, deferring release");
                let _ = PENDING_RELEASE.try_with(|pending| pending.borrow_mut().push(target_id));
            }
        });
    }

    /// Whether `target_id` has a registry entry.
    pub fn is_observed(target_id: TargetId) -> bool {
        Self::with_registry(|map| map.contains_key(&target_id))
    }

    /// The dependency set for `(target_id, key)`, if one was ever created.
    pub fn dep(target_id: TargetId, key: &Key) -> Option<Arc<Dep>> {
        Self::with_registry(|map| map.get(&target_id)?.get(key).cloned())
    }

    /// Number of targets with a registry entry on this thread.
    pub fn observed_count() -> usize {
        Self::with_registry(|map| map.len())
    }

    fn with_registry<R>(f: impl FnOnce(&mut HashMap<TargetId, KeyToDepMap>) -> R) -> R {
        let pending: Vec<TargetId> = PENDING_RELEASE
            .try_with(|pending| std::mem::take(&mut *pending.borrow_mut()))
            .unwrap_or_default();

        let (result, released) = TARGET_MAP.with(|map| {
            let mut map = map.borrow_mut();
            let released: Vec<KeyToDepMap> =
                pending.iter().filter_map(|id| map.remove(id)).collect();
            (f(&mut map), released)
        });
        drop(released);
        result
    }
}

/// Pick the dependency sets a write of `op` to `key` must notify.
fn collect_deps(
    deps_map: &KeyToDepMap,
    shape: Shape,
    op: TriggerOp,
    key: Option<&Key>,
    new_value: Option<&Value>,
) -> SmallVec<[Arc<Dep>; 4]> {
    let mut deps: SmallVec<[Arc<Dep>; 4]> = SmallVec::new();

    if op == TriggerOp::Clear {
        deps.extend(deps_map.values().cloned());
        return deps;
    }

    if shape == Shape::Sequence && key == Some(&Key::Length) {
        let new_length = new_value.and_then(Value::as_number).unwrap_or(0.0);
        for (key, dep) in deps_map {
            let out_of_bounds = match key {
                Key::Length => true,
                Key::Index(index) => *index as f64 >= new_length,
                _ => false,
            };
            if out_of_bounds {
                deps.push(dep.clone());
            }
        }
        return deps;
    }

    let mut push = |key: &Key| {
        if let Some(dep) = deps_map.get(key) {
            deps.push(dep.clone());
        }
    };

    if let Some(key) = key {
        push(key);
    }

    match op {
        TriggerOp::Add => {
            if shape != Shape::Sequence {
                push(&Key::Iterate);
                if shape == Shape::Associative {
                    push(&Key::MapKeyIterate);
                }
            } else if key.is_some_and(Key::is_index) {
                // New index added to a sequence: its length changed.
                push(&Key::Length);
            }
        }
        TriggerOp::Delete => {
            if shape != Shape::Sequence {
                push(&Key::Iterate);
                if shape == Shape::Associative {
                    push(&Key::MapKeyIterate);
                }
            }
        }
        TriggerOp::Set => {
            if shape == Shape::Associative {
                push(&Key::Iterate);
            }
        }
        TriggerOp::Clear => {}
    }

    deps
}
