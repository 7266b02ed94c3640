use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer,
};
use tracing::{info, warn};

use llm_core::OpenAiClient;
use story_server::{config::ServerConfig, router, AppState};
use tts_core::{ChannelConfig, OpenAiSpeechClient, SynthesisChannel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let permissive = || {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any)
            .allow_credentials(false)
    };

    let Some(allowed_origins) = config.cors_allowed_origins.as_ref() else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        return permissive();
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
        return permissive();
    }

    info!("CORS configured for {} origin(s)", origins.len());
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false)
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting story server...");

    let config = ServerConfig::from_env();
    info!("Server configuration loaded: {:?}", config);

    let api_key = config
        .openai_api_key
        .clone()
        .context("OPENAI_API_KEY must be set")?;

    let generator = Arc::new(OpenAiClient::new(api_key.clone()));
    let speech = OpenAiSpeechClient::new(&config.tts_model, &config.tts_voice)
        .with_format(config.tts_format);
    info!(
        "Speech voice={} format={}, spooling to {}",
        speech.voice(),
        speech.format().extension(),
        config.audio_spool_dir.display()
    );

    let narrator = SynthesisChannel::spawn(
        Arc::new(speech),
        ChannelConfig {
            spool_dir: config.audio_spool_dir.clone(),
            timeout: config.synthesis_timeout(),
        },
    )
    .context("Failed to start synthesis worker")?;
    info!("Synthesis worker ready");

    let state = AppState::new(generator, narrator, api_key, config.clone());

    // Global key: behind Docker or a proxy every client shares one address anyway.
    let per_minute = config.rate_limit_per_minute.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(u64::from((per_minute / 60).max(1)))
            .burst_size(per_minute)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .context("Invalid rate limit configuration")?,
    );
    info!("Rate limiting: {} requests per minute", per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(&config))
        .into_inner();

    let app = router(state).layer(middleware_stack);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
