//! Messages exchanged with the synthesis worker.
//!
//! Frames are JSON text, one message per frame:
//!
//! - request: `{correlationId, text, credentials}`
//! - success: `{correlationId, success: true, resourceRef}`
//! - failure: `{correlationId, success: false, error, kind?, status?}`
//!
//! `kind` is `network`, `http` or `remote`; `status` is only present for
//! `http`. Frames without a `kind` are read as `http` when they carry a
//! status and `remote` otherwise. `resourceRef` is opaque to the protocol;
//! it names the spooled audio file and whatever the worker could tell
//! about it.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::SynthesisError;

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub correlation_id: Uuid,
    pub text: String,
    pub credentials: String,
}

// Credentials stay out of logs.
impl fmt::Debug for WorkerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRequest")
            .field("correlation_id", &self.correlation_id)
            .field("text", &self.text)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ResourceRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sample_rate: None,
            duration_ms: None,
        }
    }
}

/// Which part of the worker's call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Network,
    Http,
    Remote,
}

impl FailureKind {
    /// Rebuild the caller-side error from a failure frame.
    pub fn into_error(self, message: String, status: Option<u16>) -> SynthesisError {
        match (self, status) {
            (FailureKind::Network, _) => SynthesisError::Network(message),
            (FailureKind::Http, Some(status)) => SynthesisError::HttpStatus { status, message },
            (FailureKind::Http, None) | (FailureKind::Remote, _) => SynthesisError::Remote(message),
        }
    }
}

/// A response frame as it appears on the wire.
///
/// The correlation id is kept as text so that a bad id can be reported
/// instead of failing the whole frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub correlation_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ref: Option<ResourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// A well-formed response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Succeeded(ResourceRef),
    Failed {
        kind: FailureKind,
        message: String,
        status: Option<u16>,
    },
}

impl WorkerResponse {
    pub fn success(correlation_id: Uuid, resource: ResourceRef) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            success: true,
            resource_ref: Some(resource),
            error: None,
            kind: None,
            status: None,
        }
    }

    pub fn failure(correlation_id: Uuid, error: &SynthesisError) -> Self {
        let (kind, message, status) = match error {
            SynthesisError::Network(message) => (FailureKind::Network, message.clone(), None),
            SynthesisError::HttpStatus { status, message } => {
                (FailureKind::Http, message.clone(), Some(*status))
            }
            other => (FailureKind::Remote, other.to_string(), None),
        };
        Self {
            correlation_id: correlation_id.to_string(),
            success: false,
            resource_ref: None,
            error: Some(message),
            kind: Some(kind),
            status,
        }
    }

    pub fn correlation(&self) -> Result<Uuid, ProtocolViolation> {
        Uuid::parse_str(&self.correlation_id)
            .map_err(|_| ProtocolViolation::BadCorrelationId(self.correlation_id.clone()))
    }

    pub fn into_reply(self) -> Result<Reply, ProtocolViolation> {
        match (self.success, self.resource_ref, self.error) {
            (true, Some(resource), _) => Ok(Reply::Succeeded(resource)),
            (true, None, _) => Err(ProtocolViolation::MissingResource(self.correlation_id)),
            (false, _, Some(message)) => {
                let kind = self.kind.unwrap_or(match self.status {
                    Some(_) => FailureKind::Http,
                    None => FailureKind::Remote,
                });
                Ok(Reply::Failed {
                    kind,
                    message,
                    status: self.status,
                })
            }
            (false, _, None) => Err(ProtocolViolation::MissingError(self.correlation_id)),
        }
    }
}

/// A frame that cannot be delivered to any caller as a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("unparsable frame: {0}")]
    Unparsable(String),

    #[error("could not encode request: {0}")]
    Encode(String),

    #[error("malformed correlation id {0:?}")]
    BadCorrelationId(String),

    #[error("no pending request for correlation id {0}")]
    UnknownCorrelationId(Uuid),

    #[error("correlation id {0} is already pending")]
    DuplicateCorrelationId(Uuid),

    #[error("success response {0} carries no resourceRef")]
    MissingResource(String),

    #[error("failure response {0} carries no error")]
    MissingError(String),

    #[error("resource {0:?} lies outside the spool directory")]
    ForeignResource(PathBuf),
}
