//! Error types.
//!
//! Most operations in this crate never fail outright: a rejected write is a
//! no-op that reports success to the caller, and the rejection is logged as a
//! warning. The `try_*` variants return these errors instead, for callers that
//! want to propagate them.

use thiserror::Error;

use crate::config::Config;
use crate::reactive::SubscriberId;

pub type Result<T> = std::result::Result<T, ReactivityError>;

#[derive(Debug, Error)]
pub enum ReactivityError {
    /// A write or delete went through a read-only view.
    #[error("{op} operation on key \"{key}\" failed: target is readonly")]
    ReadonlyTarget { op: &'static str, key: String },

    /// A memo without a setter was assigned to.
    #[error("write operation failed: memo value is readonly")]
    ReadonlyMemo,

    /// A subscriber was asked to run while already on the run stack.
    #[error("subscriber {0:?} is already running; nested run skipped")]
    SelfRecursion(SubscriberId),

    #[error("value is not a container and cannot be observed")]
    NotAContainer,

    /// A write used a key the container cannot hold, such as a name on an
    /// array.
    #[error("key \"{key}\" is not valid for this container")]
    InvalidKey { key: String },

    #[error("invalid array length: {0}")]
    InvalidLength(f64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ReactivityError {
    /// Log a rejected operation on the diagnostic channel.
    pub(crate) fn report(&self) {
        if Config::current().dev_warnings {
            tracing::warn!("{}", self);
        }
    }
}
