//! Error types for the ragchat core library.
//!
//! Uses `thiserror` for public API error types. Lower layers return typed
//! failures only; mapping to HTTP status codes happens in the gateway.

/// Broad classification of a [`RagError`], used by the outermost layer to
/// pick a user-visible status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was well-formed but nothing matched.
    NotFound,
    /// The caller sent something we cannot serve.
    ClientInput,
    /// Something on our side or upstream failed.
    ServerFault,
}

/// Top-level error type for the answer pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("Failed to retrieve documents: {message}")]
    RetrievalFailure { message: String },

    #[error("No relevant documents found for the query")]
    NoRelevantDocuments,

    #[error("Unsupported model: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("{provider} is not configured: environment variable {variable} not set")]
    ConfigurationMissing { provider: String, variable: String },

    #[error("{provider} error: {message}")]
    GenerationFailure { provider: String, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("An unexpected error occurred: {message}")]
    Unexpected { message: String },
}

impl RagError {
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::RetrievalFailure {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Classify this error for the outermost layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::NoRelevantDocuments => ErrorKind::NotFound,
            RagError::UnsupportedProvider { .. } | RagError::InvalidRequest { .. } => {
                ErrorKind::ClientInput
            }
            RagError::RetrievalFailure { .. }
            | RagError::ConfigurationMissing { .. }
            | RagError::GenerationFailure { .. }
            | RagError::Unexpected { .. } => ErrorKind::ServerFault,
        }
    }
}

/// Errors from LLM provider interactions.
///
/// Internal to the provider layer: the registry converts these into
/// [`RagError::GenerationFailure`] before they leave the gateway.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

impl LlmError {
    /// Wrap this error with the provider label so it can cross the gateway.
    pub fn into_generation_failure(self, provider: &str) -> RagError {
        RagError::GenerationFailure {
            provider: provider.to_string(),
            message: self.to_string(),
        }
    }
}

/// Errors from the index and embedding collaborators.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Vector search failed: {message}")]
    Search { message: String },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Failed to load seed documents: {message}")]
    Seed { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {0}")]
    Parse(#[from] Box<figment::Error>),
}

/// A type alias for results using [`RagError`].
pub type Result<T> = std::result::Result<T, RagError>;
