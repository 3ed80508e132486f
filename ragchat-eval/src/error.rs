//! Error types for the ragchat-eval crate.

use thiserror::Error;

/// Top-level error type for grading and driver setup.
///
/// Remote failures during a driver call are not errors here: they are
/// reported inside the driver's response so the caller always gets JSON.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for eval operations.
pub type Result<T> = std::result::Result<T, EvalError>;
