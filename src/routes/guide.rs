use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;

use crate::{
    db,
    error::{AppError, Result},
    guide::{FeaturedProgramView, GuideResult},
    models::{FeaturedQuery, GuideDataRequest, SearchQuery},
    state::AppState,
};

/// POST /api/guide/data
pub async fn guide_data(
    State(state): State<AppState>,
    Json(req): Json<GuideDataRequest>,
) -> Result<Response> {
    if req.channels.is_empty() {
        tracing::warn!("No channels requested for guide data");
        return Ok(Json(GuideResult::new()).into_response());
    }

    let channels = db::all_channels(&state.db, false).await?;
    let guide = state.guide.bulk_guide(&req.channels, &channels).await;

    let max_age = state.config.guide_cache_secs;
    let expires = Utc::now() + std::time::Duration::from_secs(max_age);
    Ok((
        [
            (header::CACHE_CONTROL, format!("max-age={max_age}")),
            (
                header::EXPIRES,
                expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            ),
        ],
        Json(guide),
    )
        .into_response())
}

/// GET /api/guide/featured?playlist_id=
///
/// Defaults to the first playlist by name.
pub async fn featured(
    State(state): State<AppState>,
    Query(q): Query<FeaturedQuery>,
) -> Result<Json<Vec<FeaturedProgramView>>> {
    let playlist_id = match q.playlist_id {
        Some(id) => Some(id),
        None => sqlx::query_as::<_, (i64,)>("SELECT id FROM playlists ORDER BY name LIMIT 1")
            .fetch_optional(&state.db)
            .await?
            .map(|(id,)| id),
    };
    let Some(playlist_id) = playlist_id else {
        return Ok(Json(Vec::new()));
    };

    let featured = db::playlist_channels(&state.db, playlist_id).await?;
    let channels = db::all_channels(&state.db, false).await?;
    Ok(Json(state.guide.featured_programs(&featured, &channels).await))
}

/// GET /api/guide/current/:id
pub async fn current(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FeaturedProgramView>> {
    let channels = db::all_channels(&state.db, false).await?;
    let channel = channels
        .iter()
        .find(|c| c.id == id)
        .ok_or(AppError::NotFound)?;
    Ok(Json(state.guide.current_program(channel, &channels).await))
}

/// GET /api/search?q=
pub async fn search(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>> {
    let query = q.q.trim();
    if query.is_empty() {
        return Ok(Json(json!({ "results": [] })));
    }

    let channels = db::all_channels(&state.db, true).await?;
    let results = state.guide.search(query, &channels).await;
    Ok(Json(json!({ "results": results })))
}
