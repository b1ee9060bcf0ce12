//! Run defaults loaded from the environment

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Error raised when an environment override cannot be used
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}={value} is invalid: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Defaults applied to a run when the caller does not set them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDefaults {
    /// Starting cash
    pub initial_cash: f64,
    /// Margin ratio for short positions
    pub margin_requirement: f64,
    pub model_name: String,
    pub model_provider: String,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            margin_requirement: 0.0,
            model_name: "gpt-4o".to_string(),
            model_provider: "OpenAI".to_string(),
        }
    }
}

impl RunDefaults {
    /// Defaults overridden from `HEDGE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden from a variable lookup
    ///
    /// Reads `HEDGE_INITIAL_CASH`, `HEDGE_MARGIN_REQUIREMENT`,
    /// `HEDGE_MODEL_NAME` and `HEDGE_MODEL_PROVIDER`. Blank values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut defaults = Self::default();

        if let Some(value) = lookup("HEDGE_INITIAL_CASH") {
            defaults.initial_cash = parse_f64("HEDGE_INITIAL_CASH", &value)?;
        }
        if let Some(value) = lookup("HEDGE_MARGIN_REQUIREMENT") {
            defaults.margin_requirement = parse_f64("HEDGE_MARGIN_REQUIREMENT", &value)?;
        }
        if let Some(value) = lookup("HEDGE_MODEL_NAME") {
            defaults.model_name = value.trim().to_string();
        }
        if let Some(value) = lookup("HEDGE_MODEL_PROVIDER") {
            defaults.model_provider = value.trim().to_string();
        }
        debug!(?defaults, "Loaded run defaults");
        Ok(defaults)
    }
}

fn parse_f64(name: &'static str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
