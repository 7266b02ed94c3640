// Configuration for the server, read from the environment

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use llm_core::{DEFAULT_MODEL, FAVORITE_STORY};
use tracing::warn;
use tts_core::{AudioFormat, DEFAULT_TTS_MODEL, DEFAULT_VOICE};

/// Largest batch the `/stories` endpoint accepts.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub llm_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub tts_format: AudioFormat,
    pub rate_limit_per_minute: u32,
    pub llm_timeout_secs: u64,
    pub synthesis_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub max_batch_size: usize,
    pub audio_spool_dir: PathBuf,
    pub default_story: String,
}

// Never print the API key.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<set>"))
            .field("llm_model", &self.llm_model)
            .field("tts_model", &self.tts_model)
            .field("tts_voice", &self.tts_voice)
            .field("tts_format", &self.tts_format)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("synthesis_timeout_secs", &self.synthesis_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_batch_size", &self.max_batch_size)
            .field("audio_spool_dir", &self.audio_spool_dir)
            .finish_non_exhaustive()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            openai_api_key: None,
            llm_model: DEFAULT_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            tts_voice: DEFAULT_VOICE.to_string(),
            tts_format: AudioFormat::Wav,
            rate_limit_per_minute: 60,
            llm_timeout_secs: 45,
            synthesis_timeout_secs: 45,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            audio_spool_dir: std::env::temp_dir().join("story-audio"),
            default_story: FAVORITE_STORY.to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_allowed_origins = env_string("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .collect()
        });

        Self {
            port: env_parse("PORT", defaults.port),
            openai_api_key: env_string("OPENAI_API_KEY"),
            llm_model: env_string("LLM_MODEL").unwrap_or(defaults.llm_model),
            tts_model: env_string("TTS_MODEL").unwrap_or(defaults.tts_model),
            tts_voice: env_string("TTS_VOICE").unwrap_or(defaults.tts_voice),
            tts_format: env_parse("TTS_FORMAT", defaults.tts_format),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS", defaults.llm_timeout_secs),
            synthesis_timeout_secs: env_parse("SYNTHESIS_TIMEOUT_SECS", defaults.synthesis_timeout_secs),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            cors_allowed_origins,
            max_batch_size: env_parse("MAX_BATCH_SIZE", defaults.max_batch_size).max(1),
            audio_spool_dir: env_string("AUDIO_SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.audio_spool_dir),
            default_story: env_string("DEFAULT_STORY").unwrap_or(defaults.default_story),
        }
        .with_bounded_timeouts()
    }

    /// The request timeout must fire last: a hung story generation has to
    /// end in the fallback story, and a hung batch or synthesis in its own
    /// error, never in a bare request timeout.
    pub fn with_bounded_timeouts(mut self) -> Self {
        self.request_timeout_secs = self.request_timeout_secs.max(2);
        let limit = self.request_timeout_secs - 1;
        if self.llm_timeout_secs > limit {
            warn!(
                "LLM_TIMEOUT_SECS={} does not fit inside REQUEST_TIMEOUT_SECS={}, using {}",
                self.llm_timeout_secs, self.request_timeout_secs, limit
            );
            self.llm_timeout_secs = limit;
        }
        if self.synthesis_timeout_secs > limit {
            warn!(
                "SYNTHESIS_TIMEOUT_SECS={} does not fit inside REQUEST_TIMEOUT_SECS={}, using {}",
                self.synthesis_timeout_secs, self.request_timeout_secs, limit
            );
            self.synthesis_timeout_secs = limit;
        }
        self.llm_timeout_secs = self.llm_timeout_secs.max(1);
        self.synthesis_timeout_secs = self.synthesis_timeout_secs.max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }
}
