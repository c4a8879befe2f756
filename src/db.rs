use anyhow::Context;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tracing::info;

use crate::config::AppConfig;
use crate::models::Channel;

pub type Db = SqlitePool;

pub async fn connect(config: &AppConfig) -> anyhow::Result<Db> {
    // Ensure the data directory exists
    if let Some(parent) = std::path::Path::new(&config.database_url)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create DB dir {parent:?}"))?;
    }

    let url = format!("sqlite://{}?mode=rwc", config.database_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .with_context(|| format!("connect to SQLite at {}", config.database_url))?;

    run_migrations(&pool).await?;

    info!("Database ready at {}", config.database_url);
    Ok(pool)
}

/// Private in-memory database; a single connection so every query sees the
/// same data.
#[cfg(test)]
pub async fn connect_in_memory() -> anyhow::Result<Db> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("open in-memory SQLite")?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &Db) -> anyhow::Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(pool)
        .await
        .context("set WAL mode")?;
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(pool)
        .await
        .context("enable foreign keys")?;

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("run migrations")?;

    Ok(())
}

// ── Shared queries ───────────────────────────────────────────────────────────

pub async fn all_channels(db: &Db, enabled_only: bool) -> sqlx::Result<Vec<Channel>> {
    let sql = if enabled_only {
        "SELECT * FROM channels WHERE is_enabled=1 ORDER BY name"
    } else {
        "SELECT * FROM channels ORDER BY name"
    };
    sqlx::query_as(sql).fetch_all(db).await
}

pub async fn channel_by_id(db: &Db, id: i64) -> sqlx::Result<Option<Channel>> {
    sqlx::query_as("SELECT * FROM channels WHERE id=?")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Members of a playlist in their saved order.
pub async fn playlist_channels(db: &Db, playlist_id: i64) -> sqlx::Result<Vec<Channel>> {
    sqlx::query_as(
        "SELECT c.* FROM channels c \
         JOIN playlist_channels pc ON c.id = pc.channel_id \
         WHERE pc.playlist_id=? ORDER BY pc.sort_order",
    )
    .bind(playlist_id)
    .fetch_all(db)
    .await
}

/// Enabled channels from the search history, most recent first.
pub async fn history_channels(db: &Db, limit: i64) -> sqlx::Result<Vec<Channel>> {
    sqlx::query_as(
        "SELECT c.* FROM search_history sh \
         JOIN channels c ON sh.channel_id = c.id \
         WHERE c.is_enabled=1 ORDER BY sh.id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(db)
    .await
}

pub async fn get_flag(db: &Db, key: &str) -> sqlx::Result<bool> {
    let value: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key=?")
        .bind(key)
        .fetch_optional(db)
        .await?;
    Ok(value.is_some_and(|(v,)| v == "true"))
}

pub async fn set_setting(db: &Db, key: &str, value: &str) -> sqlx::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(&now)
    .execute(db)
    .await?;
    Ok(())
}

#[cfg(test)]
pub async fn insert_channel(db: &Db, name: &str, tvg_id: Option<&str>, enabled: bool) -> i64 {
    sqlx::query(
        "INSERT INTO channels (name, tvg_id, stream_url, is_enabled) VALUES (?, ?, ?, ?)",
    )
    .bind(name)
    .bind(tvg_id)
    .bind(format!("http://dvr/{name}"))
    .bind(enabled)
    .execute(db)
    .await
    .unwrap()
    .last_insert_rowid()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channels_are_listed_by_name() {
        let db = connect_in_memory().await.unwrap();
        insert_channel(&db, "ESPN", Some("espn.us"), true).await;
        insert_channel(&db, "CNN", Some("cnn.us"), false).await;

        let all = all_channels(&db, false).await.unwrap();
        let names: Vec<&str> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["CNN", "ESPN"]);
        assert_eq!(all[0].attributes, "{}");

        let enabled = all_channels(&db, true).await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "ESPN");
    }

    #[tokio::test]
    async fn flags_default_to_false() {
        let db = connect_in_memory().await.unwrap();
        assert!(!get_flag(&db, "dvr_discovered").await.unwrap());
        set_setting(&db, "dvr_discovered", "true").await.unwrap();
        assert!(get_flag(&db, "dvr_discovered").await.unwrap());
    }
}
