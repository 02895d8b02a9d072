//! Reactive Context
//!
//! The reactive context tracks which subscriber is currently running and
//! whether reads should be recorded at all. This enables automatic dependency
//! tracking: when observed data is read, the current subscriber is registered
//! as a dependent.
//!
//! # Implementation
//!
//! The state is thread-local. Entering a subscriber run stores the previous
//! reader in the subscriber's parent slot and makes the subscriber current;
//! leaving restores the parent. The parent links form the run stack, which is
//! what lets a subscriber detect that it is already one of its own ancestors.
//!
//! Recording can be suspended with [`pause_tracking`] and restored with
//! [`reset_tracking`]. Both the run guard and [`UntrackedScope`] restore the
//! prior state on drop, so an unwinding computation cannot leave recording
//! disabled.

use std::cell::RefCell;
use std::sync::Arc;

use crate::config::Config;

use super::runtime::Reactive;
use super::SubscriberId;

thread_local! {
    static CONTEXT: RefCell<TrackingState> = RefCell::new(TrackingState::new());
}

struct TrackingState {
    /// The subscriber whose run is in progress, if any.
    active: Option<Arc<dyn Reactive>>,
    /// Whether reads are currently recorded.
    should_track: bool,
    /// Saved `should_track` values for pause/enable/reset.
    track_stack: Vec<bool>,
    /// Current run nesting depth.
    depth: u32,
    /// Depth bound for the generation-bit scheme, refreshed from the
    /// config at each outermost run.
    marker_limit: u32,
}

impl TrackingState {
    fn new() -> Self {
        Self {
            active: None,
            should_track: true,
            track_stack: Vec::new(),
            depth: 0,
            marker_limit: Config::current().max_marker_bits,
        }
    }
}

/// Guard for one subscriber run.
///
/// Restores the previous reader, recording flag and depth when dropped.
pub struct ReactiveContext {
    subscriber: Arc<dyn Reactive>,
    last_should_track: bool,
}

impl ReactiveContext {
    /// Make `subscriber` the current reader.
    pub(crate) fn enter(subscriber: Arc<dyn Reactive>) -> Self {
        let (previous, last_should_track) = CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            if ctx.depth == 0 {
                ctx.marker_limit = Config::current().max_marker_bits;
            }
            ctx.depth += 1;
            let last = std::mem::replace(&mut ctx.should_track, true);
            (ctx.active.replace(subscriber.clone()), last)
        });
        subscriber.node().set_parent(previous);

        Self {
            subscriber,
            last_should_track,
        }
    }

    /// Check if a subscriber run is in progress.
    pub fn is_active() -> bool {
        CONTEXT.with(|ctx| ctx.borrow().active.is_some())
    }

    /// Check if a read right now would be recorded.
    pub fn is_tracking() -> bool {
        CONTEXT.with(|ctx| {
            let ctx = ctx.borrow();
            ctx.should_track && ctx.active.is_some()
        })
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT.with(|ctx| {
            ctx.borrow()
                .active
                .as_ref()
                .map(|active| active.subscriber_id())
        })
    }

    /// Current run nesting depth.
    pub fn depth() -> u32 {
        CONTEXT.with(|ctx| ctx.borrow().depth)
    }

    pub(crate) fn active() -> Option<Arc<dyn Reactive>> {
        CONTEXT.with(|ctx| ctx.borrow().active.clone())
    }

    /// Whether `id` is the current reader or one of its ancestors.
    pub(crate) fn is_running(id: SubscriberId) -> bool {
        let mut current = Self::active();
        while let Some(subscriber) = current {
            if subscriber.subscriber_id() == id {
                return true;
            }
            current = subscriber.node().parent();
        }
        false
    }

    /// Whether the generation-bit scheme is usable at the current depth.
    pub(crate) fn uses_markers() -> bool {
        CONTEXT.with(|ctx| {
            let ctx = ctx.borrow();
            ctx.depth <= ctx.marker_limit
        })
    }

    /// The marker bit for the current depth. Only meaningful when
    /// [`uses_markers`](Self::uses_markers) holds.
    pub(crate) fn track_op_bit() -> u32 {
        CONTEXT.with(|ctx| 1u32 << ctx.borrow().depth)
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let parent = self.subscriber.node().take_parent();
        let last_should_track = self.last_should_track;
        let popped = CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            ctx.depth -= 1;
            ctx.should_track = last_should_track;
            std::mem::replace(&mut ctx.active, parent)
        });

        if let Some(popped) = popped {
            debug_assert_eq!(
                popped.subscriber_id(),
                self.subscriber.subscriber_id(),
                "ReactiveContext mismatch"
            );
        }
    }
}

/// Stop recording reads until the matching [`reset_tracking`].
pub fn pause_tracking() {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        let last = ctx.should_track;
        ctx.track_stack.push(last);
        ctx.should_track = false;
    });
}

/// Record reads until the matching [`reset_tracking`].
pub fn enable_tracking() {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        let last = ctx.should_track;
        ctx.track_stack.push(last);
        ctx.should_track = true;
    });
}

/// Restore the recording state saved by the last pause or enable.
pub fn reset_tracking() {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        ctx.should_track = ctx.track_stack.pop().unwrap_or(true);
    });
}

/// Scoped [`pause_tracking`]; resets on drop.
pub struct UntrackedScope {
    _private: (),
}

impl UntrackedScope {
    pub fn new() -> Self {
        pause_tracking();
        Self { _private: () }
    }
}

impl Default for UntrackedScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UntrackedScope {
    fn drop(&mut self) {
        reset_tracking();
    }
}

/// Run `f` without recording any reads.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _scope = UntrackedScope::new();
    f()
}
