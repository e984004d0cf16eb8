use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Datastore request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Datastore unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected datastore payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid datastore configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
