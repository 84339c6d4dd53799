//! Error types for model transports

use thiserror::Error;

/// Result type for transport operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failures of a chat completion call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The conversation no longer fits the model's context window
    #[error("Token limit exceeded: {message}")]
    TokenLimitExceeded { message: String },

    #[error("HTTP error: {message}")]
    Http { message: String },

    #[error("Provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Failed to decode provider response: {message}")]
    Decode { message: String },

    #[error("Unknown provider: {provider}")]
    UnknownProvider { provider: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl ProviderError {
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn token_limit(message: impl Into<String>) -> Self {
        Self::TokenLimitExceeded {
            message: message.into(),
        }
    }

    /// Build the error for a non-success HTTP status.
    ///
    /// Context-window overflows are recognised from the response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        if lower.contains("context_length_exceeded")
            || lower.contains("maximum context length")
            || lower.contains("prompt is too long")
        {
            return Self::token_limit(body);
        }
        Self::Status {
            status,
            message: body.to_string(),
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_token_limit(&self) -> bool {
        matches!(self, Self::TokenLimitExceeded { .. })
    }
}
