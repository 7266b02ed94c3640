pub mod config;
pub mod error;
pub mod validation;

mod handlers;

use std::sync::Arc;

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
    routing::{delete, get, post},
    Router,
};
use llm_core::{BatchGenerator, FallbackRace, PromptConfig, TextGenerationService};
use tts_core::{MediaSlots, SynthesisChannel};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub batch: Arc<BatchGenerator>,
    pub fallback: Arc<FallbackRace>,
    pub prompt: PromptConfig,
    pub narrator: Arc<SynthesisChannel>,
    /// Audio currently held for each story slot.
    pub readings: Arc<MediaSlots<String>>,
    credentials: Arc<str>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(
        generator: Arc<dyn TextGenerationService>,
        narrator: SynthesisChannel,
        credentials: impl Into<String>,
        config: ServerConfig,
    ) -> Self {
        let prompt = PromptConfig::bedtime_story(&config.llm_model);
        let batch = BatchGenerator::new(generator.clone(), prompt.clone());
        let fallback = FallbackRace::new(generator).with_deadline(config.llm_timeout());
        let credentials: String = credentials.into();

        Self {
            batch: Arc::new(batch),
            fallback: Arc::new(fallback),
            prompt,
            narrator: Arc::new(narrator),
            readings: Arc::new(MediaSlots::new()),
            credentials: credentials.into(),
            config,
        }
    }

    pub(crate) fn credentials(&self) -> &str {
        &self.credentials
    }
}

/// Tag every request and response with an `x-request-id` header.
pub async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Application routes without the transport middleware (CORS, rate limiting, timeouts).
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/healthz", get(handlers::health_check))
        .route("/story", post(handlers::story_endpoint))
        .route("/stories", post(handlers::stories_endpoint))
        .route("/read", post(handlers::read_endpoint))
        .route("/read/{slot}", delete(handlers::release_endpoint));

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .with_state(state)
}
