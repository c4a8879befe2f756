pub mod channels;
pub mod guide;
pub mod history;
pub mod playlists;
pub mod server;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::state::AppState;

pub fn build_router(state: AppState, static_dir: &str) -> Router {
    let api = Router::new()
        // DVR
        .route("/server", get(server::server_status))
        .route("/status", get(server::home_status))
        .route("/factory-reset", post(server::factory_reset))
        // Channels
        .route("/channels", get(channels::list_channels))
        .route("/channels/sync", post(channels::sync_channels))
        .route("/channels/stats", get(channels::channel_stats))
        .route("/channels/bulk-toggle", post(channels::bulk_toggle))
        .route("/channels/{id}", get(channels::get_channel))
        .route("/channels/{id}/toggle", post(channels::toggle_channel))
        // Playlists
        .route(
            "/playlists",
            get(playlists::list_playlists).post(playlists::save_playlists),
        )
        .route("/playlists/{id}/channels", get(playlists::playlist_channels))
        .route(
            "/search-history",
            get(history::get_history)
                .post(history::add_to_history)
                .delete(history::clear_history),
        )
        // Guide
        .route("/guide/data", post(guide::guide_data))
        .route("/guide/featured", get(guide::featured))
        .route("/guide/current/{id}", get(guide::current))
        .route("/search", get(guide::search))
        // Settings
        .route(
            "/settings",
            get(settings::list_settings).patch(settings::bulk_update_settings),
        )
        .route(
            "/settings/{key}",
            get(settings::get_setting).put(settings::set_setting),
        );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(server::health))
        .nest("/api", api)
        // Serve the compiled web UI for all other paths (SPA fallback)
        .fallback_service(
            ServeDir::new(static_dir)
                .not_found_service(ServeFile::new(format!("{static_dir}/index.html"))),
        )
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
