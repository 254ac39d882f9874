//! Error types for the optimizer pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for optimizer operations.
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Everything that can stop a run before a report is produced.
#[derive(Error, Debug)]
pub enum OptimizerError {
    /// Input file missing or unreadable.
    #[error("Cannot read input {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed header or data row.
    #[error("Malformed input at line {line}: {message}")]
    Format { line: u64, message: String },

    /// Not enough days to form returns or a sample covariance.
    #[error("Insufficient data: need at least {required} days, got {available}")]
    InsufficientData { required: usize, available: usize },

    /// A zero or negative price.
    #[error("Non-positive price on day {day} for instrument {instrument}")]
    NonPositivePrice { day: usize, instrument: usize },

    /// A daily return overflowed to infinity or NaN.
    #[error("Non-finite return on day {day} for instrument {instrument}")]
    NonFiniteReturn { day: usize, instrument: usize },

    /// Mean or covariance estimate overflowed.
    #[error("Non-finite mean or covariance estimate for instrument {instrument}")]
    NonFiniteEstimate { instrument: usize },

    /// Invalid runtime configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl OptimizerError {
    pub fn input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Input {
            path: path.into(),
            source,
        }
    }

    pub fn format(line: u64, message: impl Into<String>) -> Self {
        Self::Format {
            line,
            message: message.into(),
        }
    }

    pub fn insufficient_data(required: usize, available: usize) -> Self {
        Self::InsufficientData {
            required,
            available,
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
