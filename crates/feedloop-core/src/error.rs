//! Relay error taxonomy

use std::time::Duration;

use feedloop_ai::AiError;
use feedloop_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Feedback thread '{0}' not found")]
    NotFound(String),

    #[error("Invalid relay request: {0}")]
    BadRequest(String),

    #[error("Upstream rejected credentials: {0}")]
    UpstreamAuth(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Upstream sent nothing for {}s", .0.as_secs())]
    UpstreamTimeout(Duration),

    #[error("Malformed upstream frame: {0}")]
    MalformedUpstreamFrame(String),

    #[error("Datastore error: {0}")]
    Storage(#[from] StorageError),
}

impl RelayError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::NotFound(_) => "not_found",
            RelayError::BadRequest(_) => "bad_request",
            RelayError::UpstreamAuth(_) => "upstream_auth_error",
            RelayError::Upstream(_) => "upstream_error",
            RelayError::UpstreamTimeout(_) => "upstream_timeout",
            RelayError::MalformedUpstreamFrame(_) => "malformed_upstream_frame",
            RelayError::Storage(_) => "storage_error",
        }
    }
}

impl From<AiError> for RelayError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::MalformedFrame(frame) => RelayError::MalformedUpstreamFrame(frame),
            err if err.is_auth_error() => RelayError::UpstreamAuth(err.to_string()),
            err => RelayError::Upstream(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
