//! Engine configuration.
//!
//! Configuration is per thread, like the rest of the tracking state. A new
//! marker bound takes effect at the next outermost subscriber run.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::error::{ReactivityError, Result};

/// Largest run nesting depth for which the generation-bit scheme is usable.
pub const MAX_MARKER_BITS: u32 = 30;

/// Default bound on array lengths reachable through index or length writes.
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 1 << 24;

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run nesting depth up to which dependency reconciliation uses
    /// generation bitmasks. Deeper runs fall back to a full cleanup.
    pub max_marker_bits: u32,

    /// Emit warnings for rejected writes and similar inert operations.
    pub dev_warnings: bool,

    /// Largest array length an index write or length write may produce.
    /// Writes past it are rejected rather than allocating.
    pub max_array_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_marker_bits: MAX_MARKER_BITS,
            dev_warnings: cfg!(debug_assertions),
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
        }
    }
}

impl Config {
    /// Parse and validate a configuration from JSON. Missing fields take
    /// their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_marker_bits == 0 || self.max_marker_bits > MAX_MARKER_BITS {
            return Err(ReactivityError::InvalidConfig(format!(
                "max_marker_bits must be in 1..={}, got {}",
                MAX_MARKER_BITS, self.max_marker_bits
            )));
        }
        if self.max_array_length == 0 {
            return Err(ReactivityError::InvalidConfig(
                "max_array_length must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Install this configuration for the current thread, returning the
    /// previous one.
    pub fn install(self) -> Result<Config> {
        self.validate()?;
        tracing::debug!(?self, "installing reactivity config");
        Ok(CONFIG.with(|config| std::mem::replace(&mut *config.borrow_mut(), self)))
    }

    /// The configuration in effect on the current thread.
    pub fn current() -> Config {
        CONFIG
            .try_with(|config| config.borrow().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = Config::from_json(r#"{"max_marker_bits": 4}"#).unwrap();
        assert_eq!(config.max_marker_bits, 4);
        assert_eq!(config.dev_warnings, cfg!(debug_assertions));
        assert_eq!(config.max_array_length, DEFAULT_MAX_ARRAY_LENGTH);
    }

    #[test]
    fn rejects_zero_array_length() {
        assert!(matches!(
            Config::from_json(r#"{"max_array_length": 0}"#),
            Err(ReactivityError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_marker_bits() {
        assert!(matches!(
            Config::from_json(r#"{"max_marker_bits": 0}"#),
            Err(ReactivityError::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{"max_marker_bits": 31}"#),
            Err(ReactivityError::InvalidConfig(_))
        ));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            Config::from_json("{not json"),
            Err(ReactivityError::Json(_))
        ));
    }

    #[test]
    fn install_returns_previous() {
        let custom = Config {
            max_marker_bits: 8,
            dev_warnings: false,
            max_array_length: 16,
        };
        let previous = custom.clone().install().unwrap();
        assert_eq!(Config::current(), custom);
        previous.install().unwrap();
        assert_eq!(Config::current().max_marker_bits, MAX_MARKER_BITS);
    }
}
