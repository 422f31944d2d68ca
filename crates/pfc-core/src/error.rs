//! Error types for the calibration workspace

use thiserror::Error;

/// Calibration error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input or configuration
    #[error("Validation error: {0}")]
    Validation(String),

    /// Numerical failure (empty selection, singular matrix, ...)
    #[error("Computation error: {0}")]
    Computation(String),

    /// Iterative procedure ran out of iterations
    #[error("Convergence error: {0}")]
    Convergence(String),

    /// Requested column/branch is not present in a table
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// Unsupported or corrupt file contents
    #[error("Format error: {0}")]
    Format(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
