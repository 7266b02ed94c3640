use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::GenerationError;
use crate::prompt::PromptConfig;
use crate::TextGenerationService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Fulfilled,
    Failed,
}

/// A single generation call, owned by whichever component issued it.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub prompt: PromptConfig,
    status: RequestStatus,
    result: Option<String>,
    error: Option<GenerationError>,
}

impl GenerationRequest {
    pub fn new(prompt: PromptConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt,
            status: RequestStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// Calls the service and settles the request with its outcome.
    pub async fn run(mut self, service: Arc<dyn TextGenerationService>) -> Self {
        debug!(request_id = %self.id, "generation request started");
        let outcome = service.generate(&self.prompt).await;
        self.settle(outcome);
        self
    }

    /// Records an outcome. Blank text counts as a failure.
    pub fn settle(&mut self, outcome: Result<String, GenerationError>) {
        match outcome {
            Ok(text) if !text.trim().is_empty() => {
                self.status = RequestStatus::Fulfilled;
                self.result = Some(text);
            }
            Ok(_) => {
                self.status = RequestStatus::Failed;
                self.error = Some(GenerationError::EmptyResponse);
            }
            Err(e) => {
                self.status = RequestStatus::Failed;
                self.error = Some(e);
            }
        }
        debug!(request_id = %self.id, status = ?self.status, "generation request settled");
    }

    /// Consumes a settled request. A request that never settled is a task failure.
    pub fn into_outcome(self) -> Result<String, GenerationError> {
        match (self.status, self.result, self.error) {
            (RequestStatus::Fulfilled, Some(text), _) => Ok(text),
            (RequestStatus::Failed, _, Some(e)) => Err(e),
            _ => Err(GenerationError::Task(format!(
                "request {} consumed before it settled",
                self.id
            ))),
        }
    }
}
