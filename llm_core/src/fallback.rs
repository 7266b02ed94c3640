//! Single story generation with a guaranteed default.
//!
//! This is fallback-on-failure, not a latency race: the default is ready
//! immediately, but the primary always gets to finish first. Only a genuine
//! failure of the primary (an error, blank text, or an elapsed deadline)
//! hands the result to the default.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::GenerationError;
use crate::prompt::PromptConfig;
use crate::request::GenerationRequest;
use crate::TextGenerationService;

/// The story served when generation fails.
pub const FAVORITE_STORY: &str =
    "In a cozy forest, a playful squirrel taught a shy bunny the joy of friendship";

/// How a fallback generation was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceOutcome {
    Primary(String),
    Fallback { text: String, cause: GenerationError },
}

impl RaceOutcome {
    pub fn text(&self) -> &str {
        match self {
            RaceOutcome::Primary(text) => text,
            RaceOutcome::Fallback { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            RaceOutcome::Primary(text) => text,
            RaceOutcome::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, RaceOutcome::Fallback { .. })
    }
}

pub struct FallbackRace {
    service: Arc<dyn TextGenerationService>,
    deadline: Option<Duration>,
}

impl FallbackRace {
    pub fn new(service: Arc<dyn TextGenerationService>) -> Self {
        Self { service, deadline: None }
    }

    /// Bound the primary attempt. Running out of time counts as a failure.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Resolve to the primary's story, or `default` if the primary failed.
    pub async fn generate_with_fallback(&self, prompt: &PromptConfig, default: &str) -> String {
        self.resolve(prompt, default).await.into_text()
    }

    pub async fn resolve(&self, prompt: &PromptConfig, default: &str) -> RaceOutcome {
        let request = GenerationRequest::new(prompt.clone());
        let request_id = request.id;
        let primary = request.run(self.service.clone());

        let outcome = match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, primary).await {
                Ok(settled) => settled.into_outcome(),
                Err(_) => Err(GenerationError::Timeout(limit)),
            },
            None => primary.await.into_outcome(),
        };

        match outcome {
            Ok(text) => {
                info!(%request_id, "primary story generated");
                RaceOutcome::Primary(text)
            }
            Err(cause) => {
                warn!(%request_id, error = %cause, "primary story failed, serving default");
                RaceOutcome::Fallback {
                    text: default.to_string(),
                    cause,
                }
            }
        }
    }
}
