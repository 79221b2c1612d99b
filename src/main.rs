mod ad_copy;
mod assembler;
mod assets;
mod cancel;
mod config;
mod error;
mod gemini;
mod media;
mod models;
mod orchestrator;
mod product_image;
mod product_info;
mod prompts;
mod proofread;
mod routes;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::gemini::GeminiClient;
use crate::media::MediaStore;
use crate::orchestrator::CreativePipeline;
use crate::routes::{router, AppState};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env();
    if config.api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY is not set; every generation request will be rejected by the API");
    } else {
        let prefix: String = config.api_key.chars().take(6).collect();
        tracing::info!("Using API key: {}...", prefix);
    }
    tracing::info!(models = ?config.models, poll = ?config.video_poll, retention = ?config.retention, "Loaded configuration");

    let media = MediaStore::default();
    let gemini = Arc::new(GeminiClient::new(config.api_key.clone(), config.api_base.clone()));
    let pipeline = CreativePipeline::from_config(gemini, &config, media.clone());
    let state = AppState::new(pipeline, media).with_limits(config.max_upload_bytes, config.retention);

    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            sweeper.sweep(chrono::Utc::now());
        }
    });
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
