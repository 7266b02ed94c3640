//! Common utilities for integration tests

#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use llm_core::{GenerationError, PromptConfig, TextGenerationService};
use story_server::{config::ServerConfig, router, AppState};
use tempfile::TempDir;
use tower::ServiceExt;
use tts_core::{
    AudioFormat, AudioPayload, ChannelConfig, SynthesisChannel, SynthesisError, SynthesisService,
};

pub const SAMPLE_RATE: u32 = 8000;

/// Text the speech stub refuses with a 401.
pub const REFUSED_TEXT: &str = "The dragon would not sleep.";

/// Answers every prompt with a numbered story, or fails every call.
pub struct StubGenerator {
    calls: AtomicUsize,
    failure: Option<GenerationError>,
    delay: Option<Duration>,
}

impl StubGenerator {
    pub fn working() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), failure: None, delay: None })
    }

    pub fn failing(error: GenerationError) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), failure: Some(error), delay: None })
    }

    /// Answers only after `delay`, which tests pick to outlast every timeout.
    pub fn hanging(delay: Duration) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), failure: None, delay: Some(delay) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerationService for StubGenerator {
    async fn generate(&self, _prompt: &PromptConfig) -> Result<String, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(format!("Story {n}: a sleepy owl hummed the moon to sleep.")),
        }
    }
}

/// Speaks every text as a short WAV whose length depends on the text.
pub struct StubSpeech;

pub fn wav_for(text: &str) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..(text.len() * 80) {
            writer.write_sample((i % 64) as i16 * 100).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

#[async_trait]
impl SynthesisService for StubSpeech {
    async fn synthesize(&self, text: &str, credentials: &str) -> Result<AudioPayload, SynthesisError> {
        assert_eq!(credentials, "sk-test");
        if text == REFUSED_TEXT {
            return Err(SynthesisError::HttpStatus {
                status: 401,
                message: "invalid api key".to_string(),
            });
        }
        Ok(AudioPayload { bytes: wav_for(text), format: AudioFormat::Wav })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub spool: TempDir,
}

impl TestApp {
    /// Must be called from within a tokio runtime.
    pub fn new(generator: Arc<dyn TextGenerationService>) -> Self {
        let spool = TempDir::new().unwrap();
        let config = ServerConfig {
            audio_spool_dir: spool.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let narrator = SynthesisChannel::spawn(
            Arc::new(StubSpeech),
            ChannelConfig {
                spool_dir: config.audio_spool_dir.clone(),
                timeout: config.synthesis_timeout(),
            },
        )
        .unwrap();

        let state = AppState::new(generator, narrator, "sk-test", config);
        Self { router: router(state.clone()), state, spool }
    }

    /// Wraps the router in the same request timeout `main` applies.
    pub fn with_request_timeout(mut self) -> Self {
        let timeout = self.state.config.request_timeout();
        self.router = self.router.layer(tower_http::timeout::TimeoutLayer::new(timeout));
        self
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub fn spooled_files(&self) -> usize {
        count_files(self.spool.path())
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).count())
        .unwrap_or(0)
}
