use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use llm_core::BatchError;
use serde::Serialize;
use thiserror::Error;
use tts_core::{MediaError, SynthesisError};

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Story generation failed: {0}")]
    Generation(#[from] BatchError),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Audio playback failed: {0}")]
    Media(#[from] MediaError),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Generation(_) => StatusCode::BAD_GATEWAY,
            ApiError::Synthesis(e) => match e {
                SynthesisError::Network(_)
                | SynthesisError::HttpStatus { .. }
                | SynthesisError::Remote(_) => StatusCode::BAD_GATEWAY,
                SynthesisError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                SynthesisError::WorkerProtocol(_)
                | SynthesisError::ChannelClosed
                | SynthesisError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Media(MediaError::UseAfterRelease) => StatusCode::CONFLICT,
            ApiError::Media(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
