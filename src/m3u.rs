//! M3U lineup parsing and import into the `channels` table.
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    db::Db,
    dvr::DvrClient,
    error::{AppError, Result},
    models::SyncReport,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedChannel {
    pub name: String,
    pub tvg_id: Option<String>,
    pub stream_url: String,
    pub logo_url: Option<String>,
    pub channel_number: Option<String>,
    pub group_title: Option<String>,
    /// Every other `key="value"` pair from the EXTINF line.
    pub attributes: Map<String, Value>,
}

/// Parse an extended M3U playlist. Entries whose EXTINF line cannot be read
/// are dropped along with their URL.
pub fn parse(content: &str) -> Vec<ParsedChannel> {
    let mut channels = Vec::new();
    let mut current: Option<ParsedChannel> = None;

    for line in content.lines().map(str::trim) {
        if line.starts_with("#EXTINF:") {
            current = parse_extinf(line);
            if current.is_none() {
                debug!("Unreadable EXTINF line: {line}");
            }
        } else if !line.is_empty() && !line.starts_with('#') {
            if let Some(mut channel) = current.take() {
                channel.stream_url = force_hls(line);
                channels.push(channel);
            }
        }
    }
    channels
}

fn parse_extinf(line: &str) -> Option<ParsedChannel> {
    static RE_EXTINF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#EXTINF:([^,]*),(.*)$").unwrap());
    static RE_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"([^=\s]+)="([^"]*)""#).unwrap());

    let caps = RE_EXTINF.captures(line)?;
    let mut channel = ParsedChannel {
        name: caps[2].trim().to_string(),
        ..Default::default()
    };

    for attr in RE_ATTR.captures_iter(&caps[1]) {
        let value = attr[2].to_string();
        match &attr[1] {
            "tvg-id" => channel.tvg_id = Some(value),
            "tvg-logo" => channel.logo_url = Some(value),
            "tvg-chno" => channel.channel_number = Some(value),
            "group-title" => channel.group_title = Some(value),
            "tvg-name" => {
                channel.attributes.insert("tvg_name".into(), Value::String(value));
            }
            other => {
                channel.attributes.insert(other.into(), Value::String(value));
            }
        }
    }
    Some(channel)
}

/// DVR device streams are switched to HLS passthrough so browsers can play
/// them; other URLs are returned unchanged.
pub fn force_hls(raw: &str) -> String {
    if !(raw.to_lowercase().contains("channels") && raw.contains("/devices/")) {
        return raw.to_string();
    }
    let Ok(mut url) = Url::parse(raw) else {
        warn!("Failed to modify stream URL: {raw}");
        return raw.to_string();
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "format" && k != "codec")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("format", "hls")
        .append_pair("codec", "copy");
    url.to_string()
}

/// Fetch the DVR lineup and upsert it. Channels are matched by guide id,
/// then by name and stream URL.
pub async fn sync_channels(db: &Db, dvr: &DvrClient, replace_existing: bool) -> Result<SyncReport> {
    let content = dvr
        .fetch_m3u()
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to fetch M3U content: {e:#}")))?;

    let parsed = parse(&content);
    if parsed.is_empty() {
        return Err(AppError::Upstream("No channels found in M3U content".into()));
    }

    let mut tx = db.begin().await?;
    if replace_existing {
        sqlx::query("DELETE FROM channels").execute(&mut *tx).await?;
    }

    let mut report = SyncReport::default();
    for channel in &parsed {
        report.channels_processed += 1;
        let attributes = Value::Object(channel.attributes.clone()).to_string();

        let mut existing: Option<(i64,)> = None;
        if let Some(tvg_id) = &channel.tvg_id {
            existing = sqlx::query_as("SELECT id FROM channels WHERE tvg_id=?")
                .bind(tvg_id)
                .fetch_optional(&mut *tx)
                .await?;
        }
        if existing.is_none() {
            existing = sqlx::query_as("SELECT id FROM channels WHERE name=? AND stream_url=?")
                .bind(&channel.name)
                .bind(&channel.stream_url)
                .fetch_optional(&mut *tx)
                .await?;
        }

        match existing {
            Some((id,)) => {
                sqlx::query(
                    "UPDATE channels SET name=?, tvg_id=?, stream_url=?, logo_url=?, \
                     channel_number=?, group_title=?, attributes=?, \
                     updated_at=strftime('%Y-%m-%dT%H:%M:%SZ', 'now') WHERE id=?",
                )
                .bind(&channel.name)
                .bind(&channel.tvg_id)
                .bind(&channel.stream_url)
                .bind(&channel.logo_url)
                .bind(&channel.channel_number)
                .bind(&channel.group_title)
                .bind(&attributes)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                report.channels_updated += 1;
            }
            None => {
                sqlx::query(
                    "INSERT INTO channels \
                     (name, tvg_id, stream_url, logo_url, channel_number, group_title, attributes) \
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&channel.name)
                .bind(&channel.tvg_id)
                .bind(&channel.stream_url)
                .bind(&channel.logo_url)
                .bind(&channel.channel_number)
                .bind(&channel.group_title)
                .bind(&attributes)
                .execute(&mut *tx)
                .await?;
                report.channels_added += 1;
            }
        }
    }

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM channels")
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    report.total_channels = total;
    info!(
        "Channel sync: {} processed, {} added, {} updated",
        report.channels_processed, report.channels_added, report.channels_updated
    );
    Ok(report)
}
