//! Join-all generation of several stories at once.
//!
//! All members run concurrently as tokio tasks. The batch succeeds only when
//! every member succeeds, and the stories come back in the order they were
//! issued, not the order they finished in. The first member to fail aborts
//! the batch without waiting for the rest.

use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::error::{BatchError, GenerationError};
use crate::prompt::PromptConfig;
use crate::request::GenerationRequest;
use crate::TextGenerationService;

/// What happens to members still in flight once a batch has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InFlightPolicy {
    /// Let them finish in the background and discard their outcomes.
    #[default]
    Drain,
    /// Abort them.
    Cancel,
}

pub struct BatchGenerator {
    service: Arc<dyn TextGenerationService>,
    prompt: PromptConfig,
    policy: InFlightPolicy,
}

impl BatchGenerator {
    pub fn new(service: Arc<dyn TextGenerationService>, prompt: PromptConfig) -> Self {
        Self {
            service,
            prompt,
            policy: InFlightPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: InFlightPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> InFlightPolicy {
        self.policy
    }

    /// Generate `n` stories concurrently.
    pub async fn generate_batch(&self, n: NonZeroUsize) -> Result<Vec<String>, BatchError> {
        let n = n.get();
        info!("Generating batch of {} stories", n);

        let mut request_ids = Vec::with_capacity(n);
        let mut abort_handles: Vec<AbortHandle> = Vec::with_capacity(n);
        let mut in_flight = FuturesUnordered::new();

        for index in 0..n {
            let request = GenerationRequest::new(self.prompt.clone());
            request_ids.push(request.id);
            let handle = tokio::spawn(request.run(self.service.clone()));
            abort_handles.push(handle.abort_handle());
            in_flight.push(async move { (index, handle.await) });
        }

        let mut stories: Vec<Option<String>> = vec![None; n];
        while let Some((index, joined)) = in_flight.next().await {
            let outcome = match joined {
                Ok(request) => request.into_outcome(),
                Err(join_err) => Err(GenerationError::Task(join_err.to_string())),
            };

            match outcome {
                Ok(story) => {
                    debug!("Batch member {} fulfilled", index);
                    stories[index] = Some(story);
                }
                Err(source) => {
                    warn!("Batch member {} failed, aborting batch: {}", index, source);
                    self.abandon(&abort_handles, in_flight.len());
                    return Err(BatchError::Member {
                        index,
                        request_id: request_ids[index],
                        source,
                    });
                }
            }
        }

        Ok(stories.into_iter().flatten().collect())
    }

    fn abandon(&self, handles: &[AbortHandle], remaining: usize) {
        if remaining == 0 {
            return;
        }
        match self.policy {
            InFlightPolicy::Drain => {
                debug!("Leaving {} in-flight requests to drain", remaining);
            }
            InFlightPolicy::Cancel => {
                debug!("Cancelling {} in-flight requests", remaining);
                for handle in handles {
                    handle.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Script, ScriptedService};
    use std::time::Duration;

    fn batch(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_preserves_issuance_order() {
        // Later calls finish first.
        let service = ScriptedService::new(vec![
            Script::ok("first", Duration::from_millis(300)),
            Script::ok("second", Duration::from_millis(200)),
            Script::ok("third", Duration::from_millis(100)),
        ]);
        let generator = BatchGenerator::new(service.clone(), PromptConfig::default());

        let stories = generator.generate_batch(batch(3)).await.unwrap();
        assert_eq!(stories, vec!["first", "second", "third"]);
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_fails_with_member_error() {
        let service = ScriptedService::new(vec![
            Script::ok("X", Duration::from_millis(10)),
            Script::err(
                GenerationError::HttpStatus { status: 500, message: "boom".to_string() },
                Duration::from_millis(20),
            ),
            Script::ok("Z", Duration::from_millis(30)),
        ]);
        let generator = BatchGenerator::new(service, PromptConfig::default());

        let err = generator.generate_batch(batch(3)).await.unwrap_err();
        assert_eq!(err.index(), 1);
        assert_eq!(
            err.cause(),
            &GenerationError::HttpStatus { status: 500, message: "boom".to_string() }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_member_reported_as_task_failure() {
        let service = ScriptedService::new(vec![
            Script::ok("X", Duration::from_millis(30)),
            Script::ok("Y", Duration::from_millis(30)),
            Script::panic(Duration::from_millis(10)),
        ]);
        let generator = BatchGenerator::new(service, PromptConfig::default());

        let err = generator.generate_batch(batch(3)).await.unwrap_err();
        match err {
            BatchError::Member { index, source: GenerationError::Task(message), .. } => {
                assert_eq!(index, 2);
                assert!(message.contains("panic"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_does_not_wait_for_slow_members() {
        let service = ScriptedService::new(vec![
            Script::ok("slow", Duration::from_secs(600)),
            Script::err(GenerationError::Network("reset".to_string()), Duration::from_millis(5)),
        ]);
        let generator = BatchGenerator::new(service, PromptConfig::default());

        let started = tokio::time::Instant::now();
        let err = generator.generate_batch(batch(2)).await.unwrap_err();
        assert_eq!(err.index(), 1);
        assert!(started.elapsed() < Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_policy_lets_members_finish() {
        let service = ScriptedService::new(vec![
            Script::err(GenerationError::EmptyResponse, Duration::from_millis(5)),
            Script::ok("late", Duration::from_millis(50)),
        ]);
        let generator = BatchGenerator::new(service.clone(), PromptConfig::default());
        assert_eq!(generator.policy(), InFlightPolicy::Drain);

        assert!(generator.generate_batch(batch(2)).await.is_err());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(service.completed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_policy_aborts_members() {
        let service = ScriptedService::new(vec![
            Script::err(GenerationError::EmptyResponse, Duration::from_millis(5)),
            Script::ok("late", Duration::from_millis(50)),
        ]);
        let generator = BatchGenerator::new(service.clone(), PromptConfig::default())
            .with_policy(InFlightPolicy::Cancel);

        assert!(generator.generate_batch(batch(2)).await.is_err());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(service.completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_member_fails_batch() {
        let service = ScriptedService::new(vec![
            Script::ok("fine", Duration::from_millis(5)),
            Script::ok("", Duration::from_millis(5)),
        ]);
        let generator = BatchGenerator::new(service, PromptConfig::default());

        let err = generator.generate_batch(batch(2)).await.unwrap_err();
        assert_eq!(err.cause(), &GenerationError::EmptyResponse);
    }

    #[tokio::test]
    async fn test_single_story_batch() {
        let service = ScriptedService::new(vec![Script::ok("only", Duration::ZERO)]);
        let generator = BatchGenerator::new(service, PromptConfig::default());
        assert_eq!(generator.generate_batch(batch(1)).await.unwrap(), vec!["only"]);
    }
}
