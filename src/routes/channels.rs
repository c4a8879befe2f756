use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::{
    db,
    error::{AppError, Result},
    m3u,
    models::{
        BulkToggleRequest, BulkToggleResponse, Channel, ChannelListQuery, ChannelStats,
        SyncReport, SyncRequest, ToggleResponse,
    },
    state::AppState,
};

/// POST /api/channels/sync
pub async fn sync_channels(
    State(state): State<AppState>,
    body: Option<Json<SyncRequest>>,
) -> Result<Json<SyncReport>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let report = m3u::sync_channels(&state.db, &state.dvr, req.replace_existing).await?;
    Ok(Json(report))
}

/// GET /api/channels
pub async fn list_channels(
    State(state): State<AppState>,
    Query(q): Query<ChannelListQuery>,
) -> Result<Json<Vec<Channel>>> {
    Ok(Json(db::all_channels(&state.db, q.enabled_only).await?))
}

/// GET /api/channels/stats
pub async fn channel_stats(State(state): State<AppState>) -> Result<Json<ChannelStats>> {
    let (total, enabled): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_enabled THEN 1 ELSE 0 END), 0) FROM channels",
    )
    .fetch_one(&state.db)
    .await?;

    let groups: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT group_title FROM channels \
         WHERE group_title IS NOT NULL ORDER BY group_title",
    )
    .fetch_all(&state.db)
    .await?;
    let groups: Vec<String> = groups.into_iter().map(|(g,)| g).collect();

    Ok(Json(ChannelStats {
        total_channels: total,
        enabled_channels: enabled,
        disabled_channels: total - enabled,
        group_count: groups.len(),
        groups,
    }))
}

/// GET /api/channels/:id
pub async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Channel>> {
    db::channel_by_id(&state.db, id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

/// POST /api/channels/:id/toggle
pub async fn toggle_channel(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ToggleResponse>> {
    let row: Option<(bool,)> = sqlx::query_as(
        "UPDATE channels SET is_enabled = NOT is_enabled, \
         updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') \
         WHERE id=? RETURNING is_enabled",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?;

    let (is_enabled,) = row.ok_or(AppError::NotFound)?;
    Ok(Json(ToggleResponse {
        channel_id: id,
        is_enabled,
    }))
}

/// POST /api/channels/bulk-toggle
pub async fn bulk_toggle(
    State(state): State<AppState>,
    Json(req): Json<BulkToggleRequest>,
) -> Result<Json<BulkToggleResponse>> {
    let updated = sqlx::query(
        "UPDATE channels SET is_enabled=?, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') \
         WHERE is_enabled != ?",
    )
    .bind(req.enable)
    .bind(req.enable)
    .execute(&state.db)
    .await?
    .rows_affected();

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM channels")
        .fetch_one(&state.db)
        .await?;

    Ok(Json(BulkToggleResponse {
        channels_updated: updated,
        total_channels: total,
        enabled: req.enable,
    }))
}
