//! Reactive Engine
//!
//! This module implements dependency tracking: which subscriber read which
//! key of which target, and who must re-run when that key is written.
//!
//! # Concepts
//!
//! ## Effects
//!
//! A [`ReactiveEffect`] wraps a re-runnable computation. While it runs, every
//! tracked read registers the effect in the dependency set of the key read.
//! A write to that key re-runs the effect, or calls its scheduler.
//!
//! ## Memos
//!
//! A [`Memo`] is a cached derived value backed by an effect whose scheduler
//! only marks the cache dirty. Reads recompute when dirty.
//!
//! ## Signals
//!
//! A [`Signal`] is a single-value cell with its own dependency set.
//!
//! # Implementation Notes
//!
//! All tracking state is thread-local: the current reader and recording flag
//! live in [`ReactiveContext`], the `target -> key -> Dep` registry lives in
//! [`Runtime`]. Each effect keeps a reverse list of the dependency sets it is
//! in, so leaving them costs its own edge count rather than a graph scan.

mod context;
mod effect;
mod memo;
mod runtime;
mod signal;
mod subscriber;

pub use context::{
    enable_tracking, pause_tracking, reset_tracking, untracked, ReactiveContext, UntrackedScope,
};
pub use effect::{effect, stop, DebugHook, EffectOptions, ReactiveEffect, Scheduler};
pub use memo::{Memo, MemoState};
pub use runtime::{
    DebugOp, DebuggerEvent, Key, Observable, Runtime, Shape, TargetId, TrackOp, TriggerOp,
};
pub use signal::Signal;
pub use subscriber::{Dep, SubscriberId};
