//! Aggregation engine configuration.
//!
//! # Responsibility
//! - Hold tunables for window length and activity bound.
//! - Parse and validate JSON configuration documents.
//!
//! # Invariants
//! - `aggregation_window_ms` is strictly positive.
//! - `max_activities_per_notification` is at least 1.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One week in epoch milliseconds.
pub const DEFAULT_AGGREGATION_WINDOW_MS: i64 = 7 * 24 * 60 * 60 * 1000;
pub const DEFAULT_MAX_ACTIVITIES_PER_NOTIFICATION: u32 = 100;

/// Engine tunables. Missing keys fall back to defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Sliding lookback within which activities fold into one notification.
    pub aggregation_window_ms: i64,
    /// Oldest activities beyond this bound are dropped on fold.
    pub max_activities_per_notification: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            aggregation_window_ms: DEFAULT_AGGREGATION_WINDOW_MS,
            max_activities_per_notification: DEFAULT_MAX_ACTIVITIES_PER_NOTIFICATION,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document and validates the result.
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(source).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregation_window_ms <= 0 {
            return Err(ConfigError::InvalidWindow(self.aggregation_window_ms));
        }
        if self.max_activities_per_notification == 0 {
            return Err(ConfigError::InvalidActivityBound);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    InvalidWindow(i64),
    InvalidActivityBound,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid engine config: {message}"),
            Self::InvalidWindow(value) => {
                write!(f, "aggregationWindowMs must be > 0, got {value}")
            }
            Self::InvalidActivityBound => {
                write!(f, "maxActivitiesPerNotification must be >= 1")
            }
        }
    }
}

impl Error for ConfigError {}
