use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::{
    db,
    error::{AppError, Result},
    models::Setting,
    state::AppState,
};

/// GET /api/settings
pub async fn list_settings(State(state): State<AppState>) -> Result<Json<Vec<Setting>>> {
    let settings: Vec<Setting> = sqlx::query_as("SELECT * FROM settings ORDER BY key")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(settings))
}

/// GET /api/settings/:key
pub async fn get_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Setting>> {
    let setting: Option<Setting> = sqlx::query_as("SELECT * FROM settings WHERE key=?")
        .bind(&key)
        .fetch_optional(&state.db)
        .await?;

    setting.map(Json).ok_or(AppError::NotFound)
}

#[derive(Debug, Deserialize)]
pub struct SetSettingRequest {
    pub value: String,
}

/// PUT /api/settings/:key
pub async fn set_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<SetSettingRequest>,
) -> Result<Json<Setting>> {
    db::set_setting(&state.db, &key, &req.value).await?;

    let setting: Setting = sqlx::query_as("SELECT * FROM settings WHERE key=?")
        .bind(&key)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(setting))
}

/// PATCH /api/settings (bulk update)
pub async fn bulk_update_settings(
    State(state): State<AppState>,
    Json(updates): Json<HashMap<String, String>>,
) -> Result<StatusCode> {
    for (key, value) in updates {
        db::set_setting(&state.db, &key, &value).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::routes::testing;

    #[tokio::test]
    async fn set_then_read_back() {
        let (server, _state) = testing::offline_server().await;

        server
            .get("/api/settings/dvr_discovered")
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let set: Value = server
            .put("/api/settings/dvr_discovered")
            .json(&json!({ "value": "true" }))
            .await
            .json();
        assert_eq!(set["value"], "true");

        server
            .patch("/api/settings")
            .json(&json!({ "auto_scan_attempted": "true", "dvr_discovered": "false" }))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let all: Value = server.get("/api/settings").await.json();
        let keys: Vec<&str> = all
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["key"].as_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["auto_scan_attempted", "dvr_discovered"]);
        assert_eq!(all[1]["value"], "false");
    }
}
