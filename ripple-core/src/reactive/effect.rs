//! Effect Implementation
//!
//! A [`ReactiveEffect`] is a re-runnable computation whose reads are
//! tracked. When something it read changes, it runs again, or, if it was
//! given a scheduler, the scheduler is called instead.
//!
//! # How Effects Work
//!
//! 1. A run makes the effect the current reader and pushes the previous
//!    reader into its parent slot.
//!
//! 2. Before the computation starts, every dependency set the effect belongs
//!    to is marked "was tracked" for the current depth. Reads during the run
//!    mark sets "newly tracked" and add the effect to sets it was not in.
//!
//! 3. After the computation, sets that were tracked before but not during
//!    this run drop the effect. Both sides of every edge stay in sync.
//!
//! 4. Past the configured nesting bound the markers are not available; the
//!    effect then leaves all its sets up front and re-adds itself on read.
//!
//! # Lifetime
//!
//! Dependency sets hold effects weakly. An effect lives as long as a handle
//! to it does; dropping the last handle removes it from every set.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::ReactivityError;

use super::context::ReactiveContext;
use super::runtime::{DebuggerEvent, Reactive};
use super::subscriber::{Dep, SubscriberId};

/// Custom re-run policy, called instead of re-running the effect.
pub type Scheduler = Arc<dyn Fn() + Send + Sync>;

/// Diagnostic hook for track/trigger events.
pub type DebugHook = Arc<dyn Fn(&DebuggerEvent) + Send + Sync>;

type StopHook = Box<dyn FnOnce() + Send + Sync>;

/// Options accepted by [`effect`] and [`ReactiveEffect::with_options`].
#[derive(Default)]
pub struct EffectOptions {
    lazy: bool,
    scheduler: Option<Scheduler>,
    allow_recurse: bool,
    on_stop: Option<StopHook>,
    on_track: Option<DebugHook>,
    on_trigger: Option<DebugHook>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the initial run in [`effect`].
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Let a write made during the effect's own run notify the effect.
    /// Only observable through a scheduler: a direct re-run is still cut
    /// by the run-stack check.
    pub fn allow_recurse(mut self, allow: bool) -> Self {
        self.allow_recurse = allow;
        self
    }

    /// Called once, the first time the effect is stopped.
    pub fn on_stop<F>(mut self, on_stop: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.on_stop = Some(Box::new(on_stop));
        self
    }

    /// Called for every new dependency in debug builds.
    pub fn on_track<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + Send + Sync + 'static,
    {
        self.on_track = Some(Arc::new(hook));
        self
    }

    /// Called for every notification in debug builds.
    pub fn on_trigger<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + Send + Sync + 'static,
    {
        self.on_trigger = Some(Arc::new(hook));
        self
    }
}

/// Tracking state common to plain effects and memos.
pub(crate) struct EffectNode {
    id: SubscriberId,
    is_memo: bool,
    allow_recurse: bool,
    scheduler: Option<Scheduler>,
    on_stop: Mutex<Option<StopHook>>,
    on_track: Option<DebugHook>,
    on_trigger: Option<DebugHook>,
    state: Mutex<NodeState>,
}

struct NodeState {
    active: bool,
    /// Reverse index: every dependency set this effect is a member of.
    deps: Vec<Arc<Dep>>,
    /// The reader that was current when this effect's run started.
    parent: Option<Arc<dyn Reactive>>,
    defer_stop: bool,
}

impl EffectNode {
    fn new(options: EffectOptions, is_memo: bool) -> Self {
        Self {
            id: SubscriberId::new(),
            is_memo,
            allow_recurse: options.allow_recurse,
            scheduler: options.scheduler,
            on_stop: Mutex::new(options.on_stop),
            on_track: options.on_track,
            on_trigger: options.on_trigger,
            state: Mutex::new(NodeState {
                active: true,
                deps: Vec::new(),
                parent: None,
                defer_stop: false,
            }),
        }
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn is_memo(&self) -> bool {
        self.is_memo
    }

    pub(crate) fn allow_recurse(&self) -> bool {
        self.allow_recurse
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub(crate) fn parent(&self) -> Option<Arc<dyn Reactive>> {
        self.state.lock().parent.clone()
    }

    pub(crate) fn set_parent(&self, parent: Option<Arc<dyn Reactive>>) {
        self.state.lock().parent = parent;
    }

    pub(crate) fn take_parent(&self) -> Option<Arc<dyn Reactive>> {
        self.state.lock().parent.take()
    }

    pub(crate) fn push_dep(&self, dep: Arc<Dep>) {
        self.state.lock().deps.push(dep);
    }

    fn deps(&self) -> Vec<Arc<Dep>> {
        self.state.lock().deps.clone()
    }

    fn init_markers(&self, bit: u32) {
        for dep in &self.state.lock().deps {
            dep.mark_was_tracked(bit);
        }
    }

    /// Drop memberships that this run no longer read and clear the markers.
    fn finalize_markers(&self, bit: u32) {
        let mut state = self.state.lock();
        let deps = std::mem::take(&mut state.deps);
        let mut kept = Vec::with_capacity(deps.len());
        for dep in deps {
            if dep.was_tracked(bit) && !dep.new_tracked(bit) {
                dep.remove(self.id);
            } else {
                kept.push(dep.clone());
            }
            dep.clear_markers(bit);
        }
        state.deps = kept;
    }

    /// Leave every dependency set.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut self.state.lock().deps);
        for dep in deps {
            dep.remove(self.id);
        }
    }

    /// Stop `subscriber`, or defer the stop until its run ends if it is
    /// anywhere on the run stack. Its dependency sets still carry markers
    /// for that run, which only the run's own reconciliation clears.
    pub(crate) fn stop(subscriber: &Arc<dyn Reactive>) {
        let node = subscriber.node();
        if ReactiveContext::is_running(node.id) {
            node.state.lock().defer_stop = true;
            return;
        }

        let was_active = std::mem::replace(&mut node.state.lock().active, false);
        if !was_active {
            return;
        }
        node.cleanup();
        trace!(subscriber = node.id.raw(), "effect stopped");
        let on_stop = node.on_stop.lock().take();
        if let Some(on_stop) = on_stop {
            on_stop();
        }
    }

    /// Run `subscriber`'s scheduler, or the subscriber itself.
    pub(crate) fn notify(subscriber: &Arc<dyn Reactive>) {
        match &subscriber.node().scheduler {
            Some(scheduler) => scheduler(),
            None => subscriber.clone().rerun(),
        }
    }

    #[cfg(debug_assertions)]
    pub(crate) fn emit_track(&self, event: impl FnOnce() -> DebuggerEvent) {
        if let Some(hook) = &self.on_track {
            hook(&event());
        }
    }

    #[cfg(debug_assertions)]
    pub(crate) fn emit_trigger(&self, event: impl FnOnce() -> DebuggerEvent) {
        if let Some(hook) = &self.on_trigger {
            hook(&event());
        }
    }
}

impl Drop for EffectNode {
    fn drop(&mut self) {
        for dep in self.state.get_mut().deps.drain(..) {
            dep.remove(self.id);
        }
    }
}

/// Bookkeeping around one tracked run. Reconciles memberships and restores
/// the previous reader on drop, including while unwinding.
struct RunScope {
    subscriber: Arc<dyn Reactive>,
    bit: Option<u32>,
    context: Option<ReactiveContext>,
}

impl RunScope {
    fn enter(subscriber: Arc<dyn Reactive>) -> Self {
        let context = ReactiveContext::enter(subscriber.clone());
        let bit = if ReactiveContext::uses_markers() {
            let bit = ReactiveContext::track_op_bit();
            subscriber.node().init_markers(bit);
            Some(bit)
        } else {
            subscriber.node().cleanup();
            None
        };

        Self {
            subscriber,
            bit,
            context: Some(context),
        }
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        let node = self.subscriber.node();
        if let Some(bit) = self.bit {
            node.finalize_markers(bit);
        }
        drop(self.context.take());

        let deferred = std::mem::take(&mut node.state.lock().defer_stop);
        if deferred {
            EffectNode::stop(&self.subscriber);
        }
    }
}

struct EffectInner<T> {
    node: EffectNode,
    run: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: 'static> Reactive for EffectInner<T> {
    fn node(&self) -> &EffectNode {
        &self.node
    }

    fn rerun(self: Arc<Self>) {
        let _ = run_effect(&self);
    }
}

fn run_effect<T: 'static>(this: &Arc<EffectInner<T>>) -> Option<T> {
    if !this.node.is_active() {
        return Some((this.run)());
    }
    if ReactiveContext::is_running(this.node.id) {
        trace!("{}", ReactivityError::SelfRecursion(this.node.id));
        return None;
    }

    let subscriber: Arc<dyn Reactive> = this.clone();
    let scope = RunScope::enter(subscriber);
    let value = (this.run)();
    drop(scope);
    Some(value)
}

/// A tracked, re-runnable computation.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(&Target::from_json(json!({ "count": 0 }))?);
///
/// let s = state.clone();
/// let effect = effect(move || println!("count is {:?}", s.get("count")), Default::default());
///
/// state.set("count", 5);  // prints "count is Number(5.0)"
/// ```
#[must_use = "an effect is dropped, and stops reacting, when its last handle goes away"]
pub struct ReactiveEffect<T: 'static> {
    inner: Arc<EffectInner<T>>,
}

impl<T: 'static> ReactiveEffect<T> {
    /// Create an effect with default options. It does not run until
    /// [`run`](Self::run) is called.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(run, EffectOptions::default())
    }

    /// Create an effect. The `lazy` option is ignored here; see [`effect`].
    pub fn with_options<F>(run: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(run, options, false)
    }

    pub(crate) fn build<F>(run: F, options: EffectOptions, is_memo: bool) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(EffectInner {
                node: EffectNode::new(options, is_memo),
                run: Box::new(run),
            }),
        }
    }

    /// Run the computation under tracking and return its result.
    ///
    /// A stopped effect runs its computation without any tracking. Returns
    /// `None` when the effect is already on the run stack.
    pub fn run(&self) -> Option<T> {
        run_effect(&self.inner)
    }

    /// Leave every dependency set and stop reacting to changes. Stopping
    /// from inside the effect's own run takes effect when the run ends.
    pub fn stop(&self) {
        let subscriber: Arc<dyn Reactive> = self.inner.clone();
        EffectNode::stop(&subscriber);
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.node.id
    }

    pub fn is_active(&self) -> bool {
        self.inner.node.is_active()
    }

    /// Dependency sets this effect is currently a member of.
    pub fn dependencies(&self) -> Vec<Arc<Dep>> {
        self.inner.node.deps()
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.node.state.lock().deps.len()
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.inner.node.state.lock().active = active;
    }
}

impl<T: 'static> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> std::fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Create an effect and, unless `options` is lazy, run it immediately.
///
/// Dependency sets only hold the effect weakly: keep the returned handle
/// for as long as the effect should react. Dropping the last handle removes
/// it from every set without calling `on_stop`.
#[must_use = "an effect is dropped, and stops reacting, when its last handle goes away"]
pub fn effect<T, F>(run: F, options: EffectOptions) -> ReactiveEffect<T>
where
    T: 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    let lazy = options.lazy;
    let effect = ReactiveEffect::with_options(run, options);
    if !lazy {
        effect.run();
    }
    effect
}

/// Stop the effect behind `handle`.
pub fn stop<T: 'static>(handle: &ReactiveEffect<T>) {
    handle.stop();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    use crate::observe::{reactive, Target, Value};

    fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
        let count = Arc::new(AtomicI32::new(0));
        (count.clone(), count)
    }

    #[test]
    fn effect_runs_on_creation() {
        let (run_count, run_count_clone) = counter();

        let _effect = effect(
            move || {
                run_count_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::new(),
        );

        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_effect_does_not_run_on_creation() {
        let (run_count, run_count_clone) = counter();

        let effect = effect(
            move || run_count_clone.fetch_add(1, Ordering::SeqCst),
            EffectOptions::new().lazy(true),
        );
        assert_eq!(run_count.load(Ordering::SeqCst), 0);

        assert_eq!(effect.run(), Some(0));
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_returns_computation_result() {
        let effect = ReactiveEffect::new(|| 42);
        assert_eq!(effect.run(), Some(42));
    }

    #[test]
    fn stopped_effect_runs_untracked() {
        let state = reactive(&Target::object());
        let (run_count, run_count_clone) = counter();

        let s = state.clone();
        let effect = effect(
            move || {
                s.get("a");
                run_count_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::new(),
        );
        assert_eq!(effect.dependency_count(), 1);

        effect.stop();
        assert!(!effect.is_active());
        assert_eq!(effect.dependency_count(), 0);

        state.set("a", 1);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        effect.run();
        assert_eq!(run_count.load(Ordering::SeqCst), 2);
        assert_eq!(effect.dependency_count(), 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let (stops, stops_clone) = counter();

        let effect = effect(
            || {},
            EffectOptions::new().on_stop(move || {
                stops_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        stop(&effect);
        stop(&effect);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn self_stop_is_deferred_until_run_ends() {
        let state = reactive(&Target::object());
        let slot: Arc<Mutex<Option<ReactiveEffect<()>>>> = Arc::new(Mutex::new(None));
        let (stops, stops_clone) = counter();

        let s = state.clone();
        let slot_clone = slot.clone();
        let effect = effect(
            move || {
                s.get("a");
                let me = slot_clone.lock().clone();
                if let Some(me) = me {
                    me.stop();
                    // Still active until the run completes.
                    assert!(me.is_active());
                }
                s.get("b");
            },
            EffectOptions::new().lazy(true).on_stop(move || {
                stops_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        *slot.lock() = Some(effect.clone());

        effect.run();
        assert!(!effect.is_active());
        assert_eq!(effect.dependency_count(), 0);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        slot.lock().take();
    }

    #[test]
    fn stopping_an_ancestor_keeps_later_subscribers_tracked() {
        let state = reactive(&Target::object());
        let slot: Arc<Mutex<Option<ReactiveEffect<()>>>> = Arc::new(Mutex::new(None));

        let s = state.clone();
        let slot_clone = slot.clone();
        let outer = effect(
            move || {
                s.get("x");
                let slot = slot_clone.clone();
                let _inner = effect(
                    move || {
                        let outer = slot.lock().clone();
                        if let Some(outer) = outer {
                            outer.stop();
                            assert!(outer.is_active());
                        }
                    },
                    EffectOptions::new(),
                );
            },
            EffectOptions::new().lazy(true),
        );
        *slot.lock() = Some(outer.clone());

        outer.run();
        assert!(!outer.is_active());
        assert_eq!(outer.dependency_count(), 0);

        let (runs, runs_clone) = counter();
        let s = state.clone();
        let watcher = effect(
            move || {
                s.get("x");
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::new(),
        );
        assert_eq!(watcher.dependency_count(), 1);

        state.set("x", 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        slot.lock().take();
    }

    #[test]
    fn scheduler_replaces_rerun() {
        let state = reactive(&Target::object());
        let (runs, runs_clone) = counter();
        let (scheduled, scheduled_clone) = counter();

        let s = state.clone();
        let _effect = effect(
            move || {
                s.get("a");
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::new().scheduler(move || {
                scheduled_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        state.set("a", 1);
        state.set("a", 2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduled.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn allow_recurse_lets_scheduler_see_own_writes() {
        let state = reactive(&Target::object());
        state.set("n", 0);
        let (scheduled, scheduled_clone) = counter();

        let s = state.clone();
        let _effect = effect(
            move || {
                let n = s.get("n").as_number().unwrap_or(0.0);
                s.set("n", n + 1.0);
            },
            EffectOptions::new().allow_recurse(true).scheduler(move || {
                scheduled_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(scheduled.load(Ordering::SeqCst), 1);
        assert_eq!(state.get("n"), Value::from(1));
    }

    #[test]
    fn dropped_effect_leaves_its_dependency_sets() {
        let target = Target::object();
        let state = reactive(&target);

        let s = state.clone();
        let effect = effect(move || s.get("a"), EffectOptions::new());
        let dep = crate::reactive::Runtime::dep(target.id(), &"a".into()).unwrap();
        assert_eq!(dep.len(), 1);

        drop(effect);
        assert!(dep.is_empty());
    }

    #[cfg(debug_assertions)]
    #[test]
    fn debug_hooks_fire() {
        let state = reactive(&Target::object());
        let (tracks, tracks_clone) = counter();
        let (triggers, triggers_clone) = counter();

        let s = state.clone();
        let _effect = effect(
            move || {
                s.get("a");
                s.get("a");
            },
            EffectOptions::new()
                .on_track(move |_| {
                    tracks_clone.fetch_add(1, Ordering::SeqCst);
                })
                .on_trigger(move |event| {
                    assert_eq!(event.key, Some("a".into()));
                    triggers_clone.fetch_add(1, Ordering::SeqCst);
                }),
        );
        assert_eq!(tracks.load(Ordering::SeqCst), 1);

        state.set("a", 1);
        assert_eq!(triggers.load(Ordering::SeqCst), 1);
    }
}
