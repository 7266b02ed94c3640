use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const BEDTIME_PROMPT: &str = "Generate a one sentence bedtime story that uses no more than 14 words for me to read. Don't start the story with once upon of time.";

/// Keeps each story short and the bill small.
const BEDTIME_MAX_TOKENS: u16 = 20;

/// One role-tagged message of a chat prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Prompt configuration sent to the text generation service.
///
/// Serializes directly as the chat completions request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub max_tokens: u16,
}

impl PromptConfig {
    /// The one-sentence bedtime story prompt.
    pub fn bedtime_story(model: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                PromptMessage::system(SYSTEM_PROMPT),
                PromptMessage::user(BEDTIME_PROMPT),
            ],
            max_tokens: BEDTIME_MAX_TOKENS,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self::bedtime_story(DEFAULT_MODEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bedtime_prompt_body() {
        let body = serde_json::to_value(PromptConfig::default()).unwrap();
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["max_tokens"], 20);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("bedtime story"));
    }
}
