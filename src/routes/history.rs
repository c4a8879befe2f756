use axum::{Json, extract::State, http::StatusCode};

use crate::{
    db,
    error::{AppError, Result},
    models::{PlaylistView, SearchHistoryRequest},
    state::AppState,
};

/// POST /api/search-history
///
/// Moves the channel to the front of the history and trims it to the
/// configured size.
pub async fn add_to_history(
    State(state): State<AppState>,
    Json(req): Json<SearchHistoryRequest>,
) -> Result<Json<PlaylistView>> {
    let channel_id = req
        .channel_id
        .ok_or_else(|| AppError::BadRequest("Channel ID is required".into()))?;
    if db::channel_by_id(&state.db, channel_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM search_history WHERE channel_id=?")
        .bind(channel_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO search_history (channel_id) VALUES (?)")
        .bind(channel_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "DELETE FROM search_history WHERE id NOT IN \
         (SELECT id FROM search_history ORDER BY id DESC LIMIT ?)",
    )
    .bind(state.config.max_search_history)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    get_history(State(state)).await
}

/// GET /api/search-history
pub async fn get_history(State(state): State<AppState>) -> Result<Json<PlaylistView>> {
    let channels = db::history_channels(&state.db, state.config.max_search_history).await?;
    Ok(Json(PlaylistView::search_history(channels)))
}

/// DELETE /api/search-history
pub async fn clear_history(State(state): State<AppState>) -> Result<StatusCode> {
    sqlx::query("DELETE FROM search_history")
        .execute(&state.db)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::{db, routes::testing};

    #[tokio::test]
    async fn most_recent_first_without_duplicates() {
        let (server, _state) = testing::synced_server().await;
        for id in [1, 2, 1] {
            server
                .post("/api/search-history")
                .json(&json!({ "channel_id": id }))
                .await
                .assert_status_ok();
        }

        let history: Value = server.get("/api/search-history").await.json();
        assert_eq!(history["id"], "search-history");
        let ids: Vec<i64> = history["channels"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2]);

        let playlists: Value = server.get("/api/playlists").await.json();
        assert_eq!(playlists[0]["name"], "🕒 Search History");
    }

    #[tokio::test]
    async fn history_is_capped() {
        let (server, state) = testing::synced_server().await;
        let mut ids = Vec::new();
        for n in 0..15 {
            ids.push(db::insert_channel(&state.db, &format!("Extra {n:02}"), None, true).await);
        }
        for id in &ids {
            server
                .post("/api/search-history")
                .json(&json!({ "channel_id": id }))
                .await;
        }

        let history: Value = server.get("/api/search-history").await.json();
        let channels = history["channels"].as_array().unwrap();
        assert_eq!(channels.len(), 12);
        assert_eq!(channels[0]["id"], *ids.last().unwrap());

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM search_history")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(rows, 12);
    }

    #[tokio::test]
    async fn missing_channel_id_is_rejected() {
        let (server, _state) = testing::synced_server().await;
        server
            .post("/api/search-history")
            .json(&json!({}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        server
            .post("/api/search-history")
            .json(&json!({ "channel_id": 404 }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clear_empties_history_and_hides_pseudo_playlist() {
        let (server, _state) = testing::synced_server().await;
        server
            .post("/api/search-history")
            .json(&json!({ "channel_id": 1 }))
            .await;
        server
            .delete("/api/search-history")
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let playlists: Value = server.get("/api/playlists").await.json();
        assert!(playlists.as_array().unwrap().is_empty());
    }
}
