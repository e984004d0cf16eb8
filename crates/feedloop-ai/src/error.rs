//! Error types for the AI module

use thiserror::Error;

/// AI module error types
#[derive(Error, Debug)]
pub enum AiError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("{provider} API error {status}: {message}")]
    LlmHttp {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Malformed stream frame: {0}")]
    MalformedFrame(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiError {
    /// HTTP status returned by the provider, if the error came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AiError::LlmHttp { status, .. } => Some(*status),
            AiError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the provider rejected our credentials.
    pub fn is_auth_error(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// A single unparseable frame; the stream itself is still usable.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self, AiError::MalformedFrame(_))
    }
}

/// Result type alias for AI operations
pub type Result<T> = std::result::Result<T, AiError>;
