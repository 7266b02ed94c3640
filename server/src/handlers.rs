use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use tts_core::MemorySink;

use crate::error::ApiError;
use crate::validation::{validate_read_request, validate_slot, validate_story_count};
use crate::AppState;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorySource {
    Generated,
    Fallback,
}

#[derive(Serialize)]
pub struct StoryResponse {
    story: String,
    source: StorySource,
}

#[derive(Deserialize)]
pub struct StoriesRequest {
    count: i64,
}

#[derive(Serialize)]
pub struct StoriesResponse {
    stories: Vec<String>,
}

#[derive(Deserialize)]
pub struct ReadRequest {
    slot: String,
    text: String,
}

#[derive(Serialize)]
pub struct ReadResponse {
    audio_base64: String,
    sample_rate: Option<u32>,
    duration_ms: Option<u64>,
}

pub async fn health_check() -> &'static str {
    "ok"
}

/// One story; the configured default is served when generation fails.
pub async fn story_endpoint(State(state): State<AppState>) -> Json<StoryResponse> {
    let outcome = state
        .fallback
        .resolve(&state.prompt, &state.config.default_story)
        .await;

    let source = if outcome.is_fallback() {
        StorySource::Fallback
    } else {
        StorySource::Generated
    };

    Json(StoryResponse {
        story: outcome.into_text(),
        source,
    })
}

pub async fn stories_endpoint(
    State(state): State<AppState>,
    Json(req): Json<StoriesRequest>,
) -> Result<Json<StoriesResponse>, ApiError> {
    let count = validate_story_count(req.count, state.config.max_batch_size)?;
    let start_time = std::time::Instant::now();

    let limit = state.config.llm_timeout();
    let stories = tokio::time::timeout(limit, state.batch.generate_batch(count))
        .await
        .map_err(|_| {
            ApiError::Timeout(format!(
                "Story batch did not finish within {} seconds",
                limit.as_secs()
            ))
        })??;

    info!(
        "Generated {} stories in {:.2}s",
        stories.len(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(Json(StoriesResponse { stories }))
}

/// Synthesize a story and hold its audio in `slot`, releasing whatever the slot held before.
pub async fn read_endpoint(
    State(state): State<AppState>,
    Json(req): Json<ReadRequest>,
) -> Result<Json<ReadResponse>, ApiError> {
    validate_read_request(&req.slot, &req.text)?;

    let handle = state
        .narrator
        .synthesize(&req.text, state.credentials())
        .await?;

    if state.readings.replace(req.slot.clone(), handle.clone()) {
        info!(slot = %req.slot, "released previous reading");
    }

    let mut sink = MemorySink::new();
    handle.play(&mut sink).await?;

    Ok(Json(ReadResponse {
        audio_base64: sink.into_base64(),
        sample_rate: handle.sample_rate(),
        duration_ms: handle.duration_ms(),
    }))
}

pub async fn release_endpoint(
    State(state): State<AppState>,
    Path(slot): Path<String>,
) -> Result<StatusCode, ApiError> {
    validate_slot(&slot)?;
    if state.readings.release(&slot) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No reading held for slot {}", slot)))
    }
}
