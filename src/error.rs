use thiserror::Error;

/// Error types for the calopt library.
#[derive(Error, Debug)]
pub enum CalOptError {
    /// Error indicating a mismatch in array or matrix dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid input data (non-positive tolerances, empty helper lists, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Violation of an algorithmic invariant. Unrecoverable for the
    /// current calibration attempt.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Error during cost function evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// Error for boundary constraint violations.
    #[error("Bounds error: {0}")]
    BoundsError(String),

    /// Not implemented functionality.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Generic error for cases that don't fit the other categories.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for calopt operations.
pub type Result<T> = std::result::Result<T, CalOptError>;

/// Extensions for converting from other error types.
impl From<String> for CalOptError {
    fn from(s: String) -> Self {
        CalOptError::Other(s)
    }
}

impl From<&str> for CalOptError {
    fn from(s: &str) -> Self {
        CalOptError::Other(s.to_string())
    }
}
