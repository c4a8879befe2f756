mod config;
mod db;
mod dvr;
mod error;
mod guide;
mod m3u;
mod models;
mod routes;
mod state;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{dvr::DvrClient, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dvrdeck=info,tower_http=info".into()),
        )
        .with(fmt::layer())
        .init();

    // ── Config ───────────────────────────────────────────────────────────────
    let config = config::AppConfig::from_env()?;
    let config = Arc::new(config);
    info!("Starting dvrdeck, binding to {}", config.bind);

    // ── Database ─────────────────────────────────────────────────────────────
    let db = db::connect(&config).await?;

    // ── DVR client ───────────────────────────────────────────────────────────
    let dvr = DvrClient::from_config(&config)?;
    match dvr.locate().await {
        Some(server) => info!("Using Channels DVR at {}", server.url),
        None => tracing::warn!("Channels DVR not found yet; will retry on demand"),
    }

    // ── Application state ─────────────────────────────────────────────────────
    let state = AppState::new(db, Arc::clone(&config), dvr.clone())?;
    info!("Guide times shown in {}", state.guide.config().timezone);

    // ── DVR rediscovery (every hour, not on startup) ──────────────────────────
    if dvr.uses_discovery() {
        tokio::spawn(async move {
            let period = tokio::time::Duration::from_secs(3600);
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                dvr.forget().await;
                if dvr.locate().await.is_none() {
                    tracing::warn!("Channels DVR rediscovery found nothing");
                }
            }
        });
    }

    // ── HTTP server ───────────────────────────────────────────────────────────
    let router = routes::build_router(state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Listening on http://{}", config.bind);

    axum::serve(listener, router).await?;

    Ok(())
}
