use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;

use crate::{
    db,
    error::{AppError, Result},
    models::{Channel, Playlist, PlaylistView, SavePlaylistsRequest},
    state::AppState,
};

/// Stored playlists with their ordered channels, preceded by the search
/// history when it has entries.
pub async fn playlist_views(state: &AppState) -> Result<Vec<PlaylistView>> {
    let mut views = Vec::new();

    let history = db::history_channels(&state.db, state.config.max_search_history).await?;
    if !history.is_empty() {
        views.push(PlaylistView::search_history(history));
    }

    let playlists: Vec<Playlist> = sqlx::query_as("SELECT * FROM playlists ORDER BY name")
        .fetch_all(&state.db)
        .await?;
    for playlist in playlists {
        let channels = db::playlist_channels(&state.db, playlist.id).await?;
        views.push(PlaylistView::stored(playlist, channels));
    }
    Ok(views)
}

/// GET /api/playlists
pub async fn list_playlists(State(state): State<AppState>) -> Result<Json<Vec<PlaylistView>>> {
    Ok(Json(playlist_views(&state).await?))
}

/// POST /api/playlists: replaces the whole set
pub async fn save_playlists(
    State(state): State<AppState>,
    Json(req): Json<SavePlaylistsRequest>,
) -> Result<Json<Vec<PlaylistView>>> {
    if let Some(blank) = req.playlists.iter().find(|p| p.name.trim().is_empty()) {
        return Err(AppError::BadRequest(format!(
            "playlist {:?} has no name",
            blank.id
        )));
    }

    let keep: HashSet<i64> = req.playlists.iter().filter_map(|p| p.id).collect();
    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    let mut tx = state.db.begin().await?;

    let existing: Vec<(i64,)> = sqlx::query_as("SELECT id FROM playlists")
        .fetch_all(&mut *tx)
        .await?;
    for (id,) in existing.into_iter().filter(|(id,)| !keep.contains(id)) {
        sqlx::query("DELETE FROM playlists WHERE id=?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    for input in &req.playlists {
        let mut playlist_id = None;
        if let Some(id) = input.stored_id() {
            let updated = sqlx::query(
                "UPDATE playlists SET name=?, description=?, updated_at=? WHERE id=?",
            )
            .bind(&input.name)
            .bind(&input.description)
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if updated > 0 {
                playlist_id = Some(id);
            }
        }

        let playlist_id = match playlist_id {
            Some(id) => id,
            None => sqlx::query("INSERT INTO playlists (name, description) VALUES (?, ?)")
                .bind(&input.name)
                .bind(&input.description)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid(),
        };

        sqlx::query("DELETE FROM playlist_channels WHERE playlist_id=?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        // Unknown channel ids are dropped by the SELECT
        for (order, channel) in input.channels.iter().enumerate() {
            sqlx::query(
                "INSERT OR REPLACE INTO playlist_channels (playlist_id, channel_id, sort_order) \
                 SELECT ?, id, ? FROM channels WHERE id=?",
            )
            .bind(playlist_id)
            .bind(order as i64 + 1)
            .bind(channel.id)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    info!("Saved {} playlists", req.playlists.len());

    Ok(Json(playlist_views(&state).await?))
}

/// GET /api/playlists/:id/channels (enabled members, by name)
pub async fn playlist_channels(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Channel>>> {
    let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM playlists WHERE id=?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound);
    }

    let channels: Vec<Channel> = sqlx::query_as(
        "SELECT c.* FROM channels c \
         JOIN playlist_channels pc ON c.id = pc.channel_id \
         WHERE pc.playlist_id=? AND c.is_enabled=1 ORDER BY c.name",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(channels))
}
