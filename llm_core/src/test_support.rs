//! Scripted generation service for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GenerationError;
use crate::prompt::PromptConfig;
use crate::TextGenerationService;

#[derive(Debug, Clone)]
pub struct Script {
    outcome: Result<String, GenerationError>,
    delay: Duration,
    panics: bool,
}

impl Script {
    pub fn ok(text: &str, delay: Duration) -> Self {
        Self { outcome: Ok(text.to_string()), delay, panics: false }
    }

    pub fn err(error: GenerationError, delay: Duration) -> Self {
        Self { outcome: Err(error), delay, panics: false }
    }

    /// Panic inside the service call after `delay`.
    pub fn panic(delay: Duration) -> Self {
        Self {
            outcome: Err(GenerationError::Task("unreachable".to_string())),
            delay,
            panics: true,
        }
    }
}

/// Answers the nth call with the nth script entry after its delay.
pub struct ScriptedService {
    scripts: Vec<Script>,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl ScriptedService {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerationService for ScriptedService {
    async fn generate(&self, _prompt: &PromptConfig) -> Result<String, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .get(n)
            .cloned()
            .unwrap_or_else(|| Script::err(GenerationError::Task("script exhausted".to_string()), Duration::ZERO));
        tokio::time::sleep(script.delay).await;
        if script.panics {
            panic!("scripted generation panic on call {n}");
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        script.outcome
    }
}
