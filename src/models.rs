use serde::{Deserialize, Serialize, Serializer};
use sqlx::FromRow;

// ── Channel ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, FromRow)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub tvg_id: Option<String>,
    pub stream_url: String,
    pub logo_url: Option<String>,
    pub channel_number: Option<String>,
    pub group_title: Option<String>,
    pub is_enabled: bool,
    /// Extra M3U attributes as a JSON object.
    #[serde(serialize_with = "json_object")]
    pub attributes: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Emit stored JSON text as an object; unreadable text becomes `{}`.
fn json_object<S: Serializer>(raw: &str, s: S) -> Result<S::Ok, S::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .ok()
        .filter(serde_json::Value::is_object)
        .unwrap_or_else(|| serde_json::json!({}));
    value.serialize(s)
}

/// Result of importing the DVR lineup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub channels_processed: usize,
    pub channels_added: usize,
    pub channels_updated: usize,
    pub total_channels: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    pub total_channels: i64,
    pub enabled_channels: i64,
    pub disabled_channels: i64,
    pub groups: Vec<String>,
    pub group_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub channel_id: i64,
    pub is_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkToggleResponse {
    pub channels_updated: u64,
    pub total_channels: i64,
    pub enabled: bool,
}

// ── Playlists ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Identifier of a playlist as the UI sees it: stored playlists use their
/// row id, the search history is addressed by a fixed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKey {
    Stored(i64),
    SearchHistory,
}

pub const SEARCH_HISTORY_ID: &str = "search-history";
pub const SEARCH_HISTORY_NAME: &str = "🕒 Search History";

impl Serialize for PlaylistKey {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            PlaylistKey::Stored(id) => s.serialize_i64(*id),
            PlaylistKey::SearchHistory => s.serialize_str(SEARCH_HISTORY_ID),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistView {
    pub id: PlaylistKey,
    pub name: String,
    pub description: String,
    pub channels: Vec<Channel>,
    #[serde(rename = "isSearchHistory", skip_serializing_if = "std::ops::Not::not")]
    pub is_search_history: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl PlaylistView {
    pub fn stored(playlist: Playlist, channels: Vec<Channel>) -> Self {
        Self {
            id: PlaylistKey::Stored(playlist.id),
            name: playlist.name,
            description: playlist.description,
            channels,
            is_search_history: false,
            created_at: playlist.created_at,
            updated_at: playlist.updated_at,
        }
    }

    pub fn search_history(channels: Vec<Channel>) -> Self {
        Self {
            id: PlaylistKey::SearchHistory,
            name: SEARCH_HISTORY_NAME.to_string(),
            description: "Recently searched channels".to_string(),
            channels,
            is_search_history: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }
}

// ── Request / Response DTOs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct SyncRequest {
    #[serde(default)]
    pub replace_existing: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct ChannelListQuery {
    #[serde(default)]
    pub enabled_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct BulkToggleRequest {
    #[serde(default = "default_enable")]
    pub enable: bool,
}

fn default_enable() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SavePlaylistsRequest {
    #[serde(default)]
    pub playlists: Vec<PlaylistInput>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistInput {
    /// Absent or client-generated (timestamp) ids mean "create".
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channels: Vec<ChannelRef>,
}

/// Ids above this are timestamps minted by the browser for unsaved playlists.
pub const CLIENT_ID_THRESHOLD: i64 = 1_000_000_000;

impl PlaylistInput {
    pub fn stored_id(&self) -> Option<i64> {
        self.id.filter(|id| *id <= CLIENT_ID_THRESHOLD)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChannelRef {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchHistoryRequest {
    pub channel_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GuideDataRequest {
    #[serde(default)]
    pub channels: Vec<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct FeaturedQuery {
    pub playlist_id: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Key/value settings pair
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_serialise_as_object() {
        let channel = Channel {
            attributes: r#"{"tvg-type":"live"}"#.to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&channel).unwrap();
        assert_eq!(json["attributes"]["tvg-type"], "live");

        let broken = Channel {
            attributes: "not json".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&broken).unwrap();
        assert_eq!(json["attributes"], serde_json::json!({}));
    }

    #[test]
    fn search_history_view_uses_string_id() {
        let view = PlaylistView::search_history(Vec::new());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], "search-history");
        assert_eq!(json["isSearchHistory"], true);

        let stored = PlaylistView::stored(
            Playlist {
                id: 3,
                name: "Sports".into(),
                description: String::new(),
                created_at: String::new(),
                updated_at: String::new(),
            },
            Vec::new(),
        );
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["id"], 3);
        assert!(json.get("isSearchHistory").is_none());
    }

    #[test]
    fn client_minted_ids_are_not_stored_ids() {
        let input: PlaylistInput =
            serde_json::from_str(r#"{"id": 1735689600000, "name": "New"}"#).unwrap();
        assert_eq!(input.stored_id(), None);
        let input: PlaylistInput = serde_json::from_str(r#"{"id": 4, "name": "Old"}"#).unwrap();
        assert_eq!(input.stored_id(), Some(4));
    }
}
