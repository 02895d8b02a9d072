//! Observed Data
//!
//! This module turns plain containers into observable ones. A [`Target`]
//! holds the raw data; a [`View`] is an observed handle to it in one of four
//! [`Mode`]s:
//!
//! | Mode | Reads recorded | Writes | Nested containers |
//! |---|---|---|---|
//! | `Reactive` | yes | applied and announced | wrapped writable |
//! | `ShallowReactive` | yes | applied and announced | raw |
//! | `Readonly` | no | rejected | wrapped read-only |
//! | `ShallowReadonly` | no | rejected | raw |
//!
//! Wrapping is lazy: a nested container is wrapped when it is read, not when
//! its parent is wrapped.

mod array;
mod collection;
mod handlers;
mod target;
mod value;
mod view;

pub use handlers::{Handler, Mode, MutableHandler, ReadonlyHandler};
pub use target::{Target, TargetKind};
pub use value::Value;
pub use view::{
    is_wrapped, reactive, readonly, shallow_reactive, shallow_readonly, unwrap, wrap, View,
};
