use thiserror::Error;

/// Errors returned by the booster.
#[derive(Debug, Error)]
pub enum GbdtError {
    /// Training or validation data cannot be used as given
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Column count of a matrix differs from what the model expects
    #[error("feature count mismatch: expected {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    /// Hyperparameter outside its valid range
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for booster operations
pub type Result<T> = std::result::Result<T, GbdtError>;
