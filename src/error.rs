//! Error types for Synheart TLX

use thiserror::Error;

/// Errors that can occur while loading, training or evaluating
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid label in row {row}: {value:?}")]
    InvalidLabel { row: usize, value: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Need at least 2 distinct groups for leave-one-group-out, found {0}")]
    InsufficientGroups(usize),

    #[error("Training labels contain a single class ({0})")]
    SingleClass(u8),

    #[error("Model failed to converge after {iterations} iterations")]
    ConvergenceFailure { iterations: usize },

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Invalid hyperparameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Every grid point failed during hyperparameter search")]
    SearchFailed,
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, EvalError>;

impl From<config::ConfigError> for EvalError {
    fn from(e: config::ConfigError) -> Self {
        EvalError::ConfigError(e.to_string())
    }
}
