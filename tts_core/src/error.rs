use std::time::Duration;

use thiserror::Error;

use crate::protocol::ProtocolViolation;

/// Failure of a single synthesis request.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request failed with status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// A failure the worker reported without an HTTP status.
    #[error("synthesis failed in worker: {0}")]
    Remote(String),

    #[error("worker protocol error: {0}")]
    WorkerProtocol(#[from] ProtocolViolation),

    #[error("synthesis timed out after {0:?}")]
    Timeout(Duration),

    #[error("synthesis worker channel is closed")]
    ChannelClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SynthesisError::HttpStatus {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => SynthesisError::Network(err.to_string()),
        }
    }
}

/// Misuse or failure of a [`crate::MediaHandle`].
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media handle was already released")]
    UseAfterRelease,

    #[error("could not read audio resource: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio sink failed: {0}")]
    Sink(#[from] anyhow::Error),
}
