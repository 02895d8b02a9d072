//! Ripple Core
//!
//! This crate provides a fine-grained dependency tracking engine. It records
//! which computation read which key of which container, and when a key is
//! written it re-runs exactly the computations that read it.
//!
//! It implements:
//!
//! - Observed containers with four wrapping modes (deep or shallow, writable
//!   or read-only)
//! - Effects: re-runnable tracked computations with optional schedulers
//! - Memos: lazily recomputed cached derived values
//! - Signals: single-value reactive cells
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `observe`: Containers, values, and the views that intercept reads and
//!   writes
//! - `reactive`: Dependency tracking, effects, memos and signals
//! - `config`: Per-thread engine configuration
//! - `error`: Error types for rejected operations
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::observe::{reactive, Target};
//! use ripple_core::reactive::{effect, Memo};
//!
//! // Wrap a container
//! let state = reactive(&Target::from_json(serde_json::json!({ "count": 0 }))?);
//!
//! // Create a derived value
//! let s = state.clone();
//! let doubled = Memo::new(move || s.get("count").as_number().unwrap_or(0.0) * 2.0);
//!
//! // Create an effect
//! let (s, d) = (state.clone(), doubled.clone());
//! let _effect = effect(
//!     move || println!("Count: {:?}, Doubled: {}", s.get("count"), d.get()),
//!     Default::default(),
//! );
//!
//! // Write through the view
//! state.set("count", 5);
//! // Effect automatically runs, prints: "Count: Number(5.0), Doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod observe;
pub mod reactive;

pub use config::Config;
pub use error::{ReactivityError, Result};
pub use observe::{Mode, Target, TargetKind, Value, View};
pub use reactive::{EffectOptions, Memo, ReactiveEffect, Signal};
