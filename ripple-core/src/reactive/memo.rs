//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. A memo starts dirty, so the first read always computes.
//!
//! 2. A read of a dirty memo runs the getter under tracking, caches the
//!    result and marks the memo clean. A read of a clean memo returns the
//!    cached value.
//!
//! 3. The memo's backing effect has a scheduler that only marks the memo
//!    dirty. Recomputation waits for the next read.
//!
//! 4. On the clean-to-dirty transition, and only then, the memo notifies
//!    everything that read it, so chains of memos invalidate once.
//!
//! Memos are notified before plain effects by the runtime, so an effect
//! that reads a memo always sees the memo already invalidated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::fmt::Debug;

use parking_lot::RwLock;

use crate::error::{ReactivityError, Result};

use super::effect::{EffectOptions, ReactiveEffect};
use super::runtime::{Key, Observable, Runtime, TargetId, TrackOp, TriggerOp};
use super::subscriber::SubscriberId;

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed since the last computation.
    Dirty,
}

type Setter<T> = Box<dyn Fn(T) + Send + Sync>;

struct MemoInner<T: 'static> {
    target_id: TargetId,
    effect: ReactiveEffect<T>,
    value: RwLock<Option<T>>,
    dirty: AtomicBool,
    cacheable: bool,
    setter: Option<Setter<T>>,
}

impl<T: 'static> MemoInner<T> {
    /// Scheduler body of the backing effect.
    fn invalidate(&self) {
        if !self.dirty.swap(true, Ordering::SeqCst) {
            Runtime::trigger(self, TriggerOp::Set, Some(Key::Value), None, None);
        }
    }
}

impl<T: 'static> Observable for MemoInner<T> {
    fn target_id(&self) -> TargetId {
        self.target_id
    }
}

impl<T: 'static> Drop for MemoInner<T> {
    fn drop(&mut self) {
        Runtime::release(self.target_id);
    }
}

/// A cached derived value.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + Send + Sync.
pub struct Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a read-only memo. The getter does not run until the first
    /// read.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(getter, None, true)
    }

    /// Create a writable memo; writes are delegated to `setter`.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Self::build(getter, Some(Box::new(setter)), true)
    }

    /// Create a memo that recomputes on every read. Its getter's reads are
    /// attributed to whichever subscriber reads the memo.
    pub fn uncached<F>(getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(getter, None, false)
    }

    fn build<F>(getter: F, setter: Option<Setter<T>>, cacheable: bool) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<MemoInner<T>>| {
            let weak = weak.clone();
            let options = EffectOptions::new().scheduler(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.invalidate();
                }
            });
            let effect = ReactiveEffect::build(getter, options, true);
            effect.set_active(cacheable);

            MemoInner {
                target_id: TargetId::new(),
                effect,
                value: RwLock::new(None),
                dirty: AtomicBool::new(true),
                cacheable,
                setter,
            }
        });

        Self { inner }
    }

    /// Get the current value, recomputing if dirty.
    ///
    /// A memo read by its own getter (directly or through a cycle) before it
    /// has produced a value reads as `T::default()`; the skipped run is
    /// logged. Use [`try_get`](Self::try_get) to see it as an error.
    pub fn get(&self) -> T
    where
        T: Default,
    {
        self.try_get().unwrap_or_else(|err| {
            err.report();
            T::default()
        })
    }

    /// Get the current value, recomputing if dirty.
    ///
    /// Fails with [`ReactivityError::SelfRecursion`] when the memo is read
    /// from inside its own computation and has no cached value yet.
    pub fn try_get(&self) -> Result<T> {
        let inner = &self.inner;
        Runtime::track(&**inner, TrackOp::Get, Key::Value);

        if inner.dirty.load(Ordering::SeqCst) || !inner.cacheable {
            inner.dirty.store(false, Ordering::SeqCst);
            if let Some(value) = inner.effect.run() {
                *inner.value.write() = Some(value);
            }
        }

        inner
            .value
            .read()
            .as_ref()
            .cloned()
            .ok_or_else(|| ReactivityError::SelfRecursion(inner.effect.id()))
    }

    /// Assign through the setter. Without a setter the write is rejected
    /// and logged.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            err.report();
        }
    }

    pub fn try_set(&self, value: T) -> Result<()> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => Err(ReactivityError::ReadonlyMemo),
        }
    }

    /// Force the memo dirty and notify its readers.
    pub fn mark_dirty(&self) {
        self.inner.invalidate();
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        if self.inner.dirty.load(Ordering::SeqCst) {
            MemoState::Dirty
        } else {
            MemoState::Clean
        }
    }

    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    pub fn id(&self) -> TargetId {
        self.inner.target_id
    }

    /// Id of the backing subscriber.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.effect.id()
    }

    /// The backing subscriber.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.inner.effect
    }
}

impl<T> Observable for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn target_id(&self) -> TargetId {
        self.inner.target_id
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.target_id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    use parking_lot::Mutex;

    use crate::observe::{reactive, Target, Value};
    use crate::reactive::{effect, EffectOptions};

    #[test]
    fn memo_computes_on_first_access() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        // Not computed yet
        assert!(!memo.has_value());
        assert_eq!(memo.state(), MemoState::Dirty);
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        assert_eq!(memo.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(memo.has_value());
        assert_eq!(memo.state(), MemoState::Clean);
    }

    #[test]
    fn memo_caches_value_when_clean() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memo_recomputes_lazily_after_dependency_change() {
        let state = reactive(&Target::object());
        state.set("n", 1);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let s = state.clone();
        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            s.get("n").as_number().unwrap_or(0.0) * 2.0
        });
        assert_eq!(memo.get(), 2.0);

        state.set("n", 5);
        // Invalidated, but not recomputed yet.
        assert_eq!(memo.state(), MemoState::Dirty);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        assert_eq!(memo.get(), 10.0);
        assert_eq!(memo.get(), 10.0);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn repeated_invalidation_notifies_once() {
        let state = reactive(&Target::object());
        state.set("n", 1);

        let s = state.clone();
        let memo = Memo::new(move || s.get("n"));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let m = memo.clone();
        let _watcher = effect(
            move || {
                m.get();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::new().scheduler(|| {}),
        );

        // The scheduler swallows re-runs, so the memo stays dirty after the
        // first write and the second write must not notify again.
        let notified = Arc::new(AtomicI32::new(0));
        let notified_clone = notified.clone();
        let m = memo.clone();
        let _counter = effect(
            move || {
                m.get();
            },
            EffectOptions::new().scheduler(move || {
                notified_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        state.set("n", 2);
        state.set("n", 3);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memo_without_setter_rejects_writes() {
        let memo = Memo::new(|| 1);
        assert!(!memo.is_writable());
        assert!(matches!(memo.try_set(2), Err(ReactivityError::ReadonlyMemo)));
        memo.set(2);
        assert_eq!(memo.get(), 1);
    }

    #[test]
    fn writable_memo_delegates_to_setter() {
        let state = reactive(&Target::object());
        state.set("n", 1);

        let getter_state = state.clone();
        let setter_state = state.clone();
        let memo = Memo::with_setter(
            move || getter_state.get("n"),
            move |value: Value| {
                setter_state.set("n", value);
            },
        );

        memo.set(Value::from(7));
        assert_eq!(memo.get(), Value::from(7));
        assert_eq!(state.get("n"), Value::from(7));
    }

    #[test]
    fn uncached_memo_recomputes_every_read() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::uncached(move || call_count_clone.fetch_add(1, Ordering::SeqCst));
        memo.get();
        memo.get();
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn memo_reading_itself_falls_back_to_default() {
        let slot: Arc<Mutex<Option<Memo<i32>>>> = Arc::new(Mutex::new(None));

        let slot_clone = slot.clone();
        let memo = Memo::new(move || {
            let me = slot_clone.lock().clone();
            me.map(|me| me.get() + 1).unwrap_or(0)
        });
        *slot.lock() = Some(memo.clone());

        assert_eq!(memo.get(), 1);
        assert_eq!(memo.state(), MemoState::Clean);

        // With a cached value, the inner read sees the previous result.
        memo.mark_dirty();
        assert_eq!(memo.get(), 2);
        slot.lock().take();
    }

    #[test]
    fn memo_cycle_does_not_panic() {
        let slot: Arc<Mutex<Option<Memo<i32>>>> = Arc::new(Mutex::new(None));

        let slot_clone = slot.clone();
        let first = Memo::new(move || {
            let other = slot_clone.lock().clone();
            other.map(|other| other.get() + 1).unwrap_or(0)
        });
        let f = first.clone();
        let second = Memo::new(move || f.get() * 10);
        *slot.lock() = Some(second.clone());

        // first -> second -> first: the innermost read of `first` has no
        // value yet and yields the default.
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 0);
        slot.lock().take();
    }

    #[test]
    fn try_get_reports_self_recursion() {
        let slot: Arc<Mutex<Option<Memo<i32>>>> = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(None));

        let slot_clone = slot.clone();
        let seen_clone = seen.clone();
        let memo = Memo::new(move || {
            let me = slot_clone.lock().clone();
            if let Some(me) = me {
                *seen_clone.lock() = Some(me.try_get().is_err());
            }
            5
        });
        *slot.lock() = Some(memo.clone());

        assert_eq!(memo.get(), 5);
        assert_eq!(*seen.lock(), Some(true));
        slot.lock().take();
    }

    #[test]
    fn memo_clone_shares_state() {
        let memo1 = Memo::new(|| 42);
        assert_eq!(memo1.get(), 42);

        let memo2 = memo1.clone();
        assert_eq!(memo1.id(), memo2.id());
        assert!(memo2.has_value());

        memo1.mark_dirty();
        assert_eq!(memo2.state(), MemoState::Dirty);
    }
}
