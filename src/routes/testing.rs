//! Fixtures for handler tests: an in-memory database and a stub DVR.
use std::sync::Arc;

use axum::{Router, http::StatusCode, routing::get};
use axum_test::TestServer;
use chrono::{DateTime, TimeZone, Utc};

use crate::{config::AppConfig, db, dvr::DvrClient, guide::Clock, state::AppState};

pub const GUIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="espn.us"><display-name>ESPN</display-name></channel>
  <channel id="cnn.us"><display-name>CNN</display-name></channel>
  <programme channel="espn.us" start="20250310090000 +0000" stop="20250310100000 +0000"><title>SportsCenter</title></programme>
  <programme channel="espn.us" start="20250310100000 +0000" stop="20250310110000 +0000"><title>First Take</title><desc>Debate</desc></programme>
  <programme channel="espn.us" start="20250310110000 +0000" stop="20250310120000 +0000"><title>Morning News</title></programme>
  <programme channel="cnn.us" start="20250310120000 +0000" stop="20250310130000 +0000"><title>CNN Newsroom</title></programme>
</tv>"#;

pub const LINEUP: &str = "#EXTM3U
#EXTINF:-1 tvg-id=\"espn.us\" tvg-chno=\"206\" group-title=\"Sports\",ESPN News
http://dvr.local:8089/devices/ANY/channels/206/stream.mpg
#EXTINF:-1 tvg-id=\"cnn.us\" tvg-chno=\"202\" group-title=\"News\",CNN
http://dvr.local:8089/devices/ANY/channels/202/stream.mpg
";

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 10, 30, 0).unwrap()
}

/// Serve `guide` and `lineup` the way the DVR does; returns the base URL.
pub async fn spawn_dvr(guide: &'static str, lineup: &'static str) -> String {
    let app = Router::new()
        .route("/devices/ANY/guide/xmltv", get(move || async move { guide }))
        .route("/devices/ANY/channels.m3u", get(move || async move { lineup }));
    serve_stub(app).await
}

/// A DVR that answers every request with HTTP 500.
pub async fn spawn_failing_dvr() -> String {
    let app = Router::new().fallback(|| async { StatusCode::INTERNAL_SERVER_ERROR });
    serve_stub(app).await
}

async fn serve_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub async fn state_with_dvr(dvr_url: String) -> AppState {
    let config = Arc::new(AppConfig {
        dvr_url: Some(dvr_url),
        timezone: Some("UTC".into()),
        ..Default::default()
    });
    let db = db::connect_in_memory().await.unwrap();
    let dvr = DvrClient::from_config(&config).unwrap();
    let mut state = AppState::new(db, config, dvr).unwrap();
    state.guide = state.guide.with_clock(Clock::Fixed(now()));
    state
}

/// Test server backed by a stub DVR with [`GUIDE`] and [`LINEUP`].
pub async fn server() -> (TestServer, AppState) {
    let url = spawn_dvr(GUIDE, LINEUP).await;
    let state = state_with_dvr(url).await;
    let app = super::build_router(state.clone(), "ui/dist");
    (TestServer::new(app).unwrap(), state)
}

/// Server whose DVR refuses connections.
pub async fn offline_server() -> (TestServer, AppState) {
    let state = state_with_dvr("http://127.0.0.1:9".into()).await;
    let app = super::build_router(state.clone(), "ui/dist");
    (TestServer::new(app).unwrap(), state)
}

/// Server whose DVR is up but fails every request.
pub async fn failing_server() -> (TestServer, AppState) {
    let url = spawn_failing_dvr().await;
    let state = state_with_dvr(url).await;
    let app = super::build_router(state.clone(), "ui/dist");
    (TestServer::new(app).unwrap(), state)
}

/// Import [`LINEUP`] through the API.
pub async fn synced_server() -> (TestServer, AppState) {
    let (server, state) = server().await;
    server
        .post("/api/channels/sync")
        .json(&serde_json::json!({}))
        .await
        .assert_status_ok();
    (server, state)
}
