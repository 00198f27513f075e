//! Error types for the core crate.
//!
//! Fetch failures are not represented here: they travel as
//! [`ClassifiedError`](scrapmarket_market_data::ClassifiedError) from the
//! market data crate.

use thiserror::Error;

/// Failure of the durable backup store.
///
/// Backup failures are logged and never propagate into cache reads or writes.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Backup I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backup payload could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Invalid configuration detected at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Could not parse {var}='{value}'")]
    Parse { var: String, value: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Invalid chart layout parameters.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Pixel budget must be greater than zero")]
    ZeroPixelBudget,

    #[error("Label width plus spacing must be greater than zero")]
    ZeroLabelSlot,
}
