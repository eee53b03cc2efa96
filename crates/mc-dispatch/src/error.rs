use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to serialize dispatch payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job API rejected the request with status {status}: {body}")]
    RemoteRejection { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, DispatchError>;
