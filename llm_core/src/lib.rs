mod batch;
mod error;
mod fallback;
mod prompt;
mod request;
#[cfg(test)]
mod test_support;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

pub use batch::{BatchGenerator, InFlightPolicy};
pub use error::{BatchError, GenerationError};
pub use fallback::{FallbackRace, RaceOutcome, FAVORITE_STORY};
pub use prompt::{PromptConfig, PromptMessage, DEFAULT_MODEL};
pub use request::{GenerationRequest, RequestStatus};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Anything that turns a prompt into a short piece of text.
#[async_trait]
pub trait TextGenerationService: Send + Sync {
    async fn generate(&self, prompt: &PromptConfig) -> Result<String, GenerationError>;
}

/// Structure for the OpenAI Chat API response
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatResponse {
    /// The first choice's text. Missing or blank content is a failure.
    fn into_text(self) -> Result<String, GenerationError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}

pub struct OpenAiClient {
    api_key: String,
    client: Client,
    url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            url: CHAT_COMPLETIONS_URL.to_string(),
        }
    }

    /// Point the client at a different chat completions endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl TextGenerationService for OpenAiClient {
    async fn generate(&self, prompt: &PromptConfig) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(prompt)
            .send()
            .await
            .map_err(GenerationError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?
            .into_text()
    }
}
