use crate::client::ClientError;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, TimelineError>;

#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Logging setup error: {0}")]
    LoggingSetup(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Remote client error: {0}")]
    Client(#[from] ClientError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

