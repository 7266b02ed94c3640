use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Failure of a single text generation call.
///
/// Every variant is a genuine failure: callers never see a failed call
/// disguised as an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API request failed with status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("generation service returned no usable text")]
    EmptyResponse,

    #[error("could not decode generation response: {0}")]
    Decode(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation task failed: {0}")]
    Task(String),
}

impl GenerationError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            GenerationError::HttpStatus {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            GenerationError::Decode(err.to_string())
        } else {
            GenerationError::Network(err.to_string())
        }
    }
}

/// Failure of a batch: the first member that failed, in completion order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("story {index} of the batch failed ({request_id}): {source}")]
    Member {
        index: usize,
        request_id: Uuid,
        #[source]
        source: GenerationError,
    },
}

impl BatchError {
    /// The member error that aborted the batch.
    pub fn cause(&self) -> &GenerationError {
        match self {
            BatchError::Member { source, .. } => source,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            BatchError::Member { index, .. } => *index,
        }
    }
}
