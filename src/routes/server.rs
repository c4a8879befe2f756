use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{db, error::Result, m3u, state::AppState};

const DVR_DISCOVERED: &str = "dvr_discovered";
const AUTO_SCAN_ATTEMPTED: &str = "auto_scan_attempted";

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub m3u_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epg_url: Option<String>,
}

/// GET /api/server
pub async fn server_status(State(state): State<AppState>) -> Json<ServerStatus> {
    let status = match state.dvr.check().await {
        Some(server) => ServerStatus {
            online: true,
            m3u_url: Some(state.dvr.m3u_url(&server.url)),
            epg_url: Some(state.dvr.epg_url(&server.url)),
            name: Some(server.name),
            url: Some(server.url),
        },
        None => ServerStatus {
            online: false,
            name: None,
            url: None,
            m3u_url: None,
            epg_url: None,
        },
    };
    Json(status)
}

/// Where the user is in the setup flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStage {
    NoDvr,
    NeedSetup,
    NeedPlaylists,
    ReadyToStream,
}

#[derive(Debug, Serialize)]
pub struct HomeStatus {
    pub stage: SetupStage,
    pub dvr_online: bool,
    /// The DVR was found now and never before.
    pub first_discovery: bool,
    /// The DVR is missing and has never been found.
    pub never_found: bool,
    pub channels_count: i64,
    pub enabled_channels_count: i64,
    pub playlists_count: i64,
    pub auto_scan_attempted: bool,
}

/// GET /api/status
///
/// On the first visit with a reachable DVR and no enabled channels the
/// lineup is imported once, with every channel disabled so the user picks
/// what to keep.
pub async fn home_status(State(state): State<AppState>) -> Result<Json<HomeStatus>> {
    let previously_discovered = db::get_flag(&state.db, DVR_DISCOVERED).await?;
    let dvr_online = state.dvr.check().await.is_some();
    if dvr_online {
        db::set_setting(&state.db, DVR_DISCOVERED, "true").await?;
    }

    let mut stage = SetupStage::NoDvr;
    if dvr_online {
        let (_, enabled, playlists) = counts(&state).await?;
        stage = match (enabled > 0, playlists > 0) {
            (false, _) => {
                if !db::get_flag(&state.db, AUTO_SCAN_ATTEMPTED).await? {
                    auto_scan(&state).await?;
                }
                SetupStage::NeedSetup
            }
            (true, false) => SetupStage::NeedPlaylists,
            (true, true) => SetupStage::ReadyToStream,
        };
    }

    let (channels_count, enabled_channels_count, playlists_count) = counts(&state).await?;
    Ok(Json(HomeStatus {
        stage,
        dvr_online,
        first_discovery: dvr_online && !previously_discovered,
        never_found: !dvr_online && !previously_discovered,
        channels_count,
        enabled_channels_count,
        playlists_count,
        auto_scan_attempted: db::get_flag(&state.db, AUTO_SCAN_ATTEMPTED).await?,
    }))
}

async fn counts(state: &AppState) -> Result<(i64, i64, i64)> {
    let (total, enabled): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_enabled THEN 1 ELSE 0 END), 0) FROM channels",
    )
    .fetch_one(&state.db)
    .await?;
    let (playlists,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM playlists")
        .fetch_one(&state.db)
        .await?;
    Ok((total, enabled, playlists))
}

async fn auto_scan(state: &AppState) -> Result<()> {
    info!("Attempting automatic channel sync on first visit");
    db::set_setting(&state.db, AUTO_SCAN_ATTEMPTED, "true").await?;

    match m3u::sync_channels(&state.db, &state.dvr, true).await {
        Ok(report) => {
            sqlx::query("UPDATE channels SET is_enabled=0")
                .execute(&state.db)
                .await?;
            info!(
                "Auto-scan imported {} channels, all disabled until chosen",
                report.total_channels
            );
        }
        Err(e) => warn!("Auto-scan failed: {e}"),
    }
    Ok(())
}

/// POST /api/factory-reset
pub async fn factory_reset(State(state): State<AppState>) -> Result<StatusCode> {
    let mut tx = state.db.begin().await?;
    for table in ["search_history", "playlist_channels", "playlists", "channels", "settings"] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    state.dvr.forget().await;
    warn!("Factory reset: all channels, playlists and settings removed");
    Ok(StatusCode::NO_CONTENT)
}
