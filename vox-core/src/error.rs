//! Structured error types for the vox crates.

use thiserror::Error;

/// Unified error type for all vox operations.
#[derive(Debug, Error)]
pub enum VoxError {
    /// I/O error surfaced by a reader or writer supplied by the caller.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error (malformed state dump, bad numeric field)
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid input (bad arguments, out-of-range values)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Observation frames do not match the model's feature dimensionality.
    #[error("dimension mismatch: model expects {expected}, observation has {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the vox crates.
pub type Result<T> = std::result::Result<T, VoxError>;
