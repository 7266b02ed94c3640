use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::SynthesisError;

const SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
pub const DEFAULT_TTS_MODEL: &str = "tts-1";
pub const DEFAULT_VOICE: &str = "shimmer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }

    fn response_format(&self) -> &'static str {
        self.extension()
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(format!("unsupported audio format {other:?}")),
        }
    }
}

/// Binary audio returned by a synthesis service.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}

/// Anything that turns text into audio, given the caller's credentials.
#[async_trait]
pub trait SynthesisService: Send + Sync {
    async fn synthesize(&self, text: &str, credentials: &str) -> Result<AudioPayload, SynthesisError>;
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Client for the OpenAI speech endpoint.
pub struct OpenAiSpeechClient {
    client: Client,
    url: String,
    model: String,
    voice: String,
    format: AudioFormat,
}

impl Default for OpenAiSpeechClient {
    fn default() -> Self {
        Self::new(DEFAULT_TTS_MODEL, DEFAULT_VOICE)
    }
}

impl OpenAiSpeechClient {
    pub fn new(model: &str, voice: &str) -> Self {
        Self {
            client: Client::new(),
            url: SPEECH_URL.to_string(),
            model: model.to_string(),
            voice: voice.to_string(),
            format: AudioFormat::Wav,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Ask for `format` instead of WAV. Only WAV audio carries a sample rate and duration.
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }
}

#[async_trait]
impl SynthesisService for OpenAiSpeechClient {
    async fn synthesize(&self, text: &str, credentials: &str) -> Result<AudioPayload, SynthesisError> {
        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: self.format.response_format(),
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(credentials)
            .json(&body)
            .send()
            .await
            .map_err(SynthesisError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SynthesisError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await.map_err(SynthesisError::from_reqwest)?;
        Ok(AudioPayload {
            bytes: bytes.to_vec(),
            format: self.format,
        })
    }
}
