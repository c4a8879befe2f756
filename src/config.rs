use anyhow::Context;
use chrono::Duration;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::guide::{GuideConfig, GuideWindowPolicy, SearchWindowPolicy};

/// Application configuration, loaded from environment variables / .env.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Bind address for the HTTP server.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Path to the SQLite database file.
    #[serde(default = "default_db_url")]
    pub database_url: String,

    /// Directory holding the compiled player UI.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Fixed DVR base URL (e.g. `http://192.168.1.10:8089`). When unset the
    /// server is located with mDNS.
    #[serde(default)]
    pub dvr_url: Option<String>,

    /// Device segment used in DVR URLs.
    #[serde(default = "default_dvr_device")]
    pub dvr_device: String,

    /// How long an mDNS browse waits for the DVR to answer.
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,

    /// Timeout for guide and lineup downloads.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Shorter timeout used when search fetches the guide.
    #[serde(default = "default_search_fetch_timeout")]
    pub search_fetch_timeout_secs: u64,

    /// `duration` query parameter sent with the XMLTV request.
    #[serde(default = "default_epg_duration")]
    pub epg_duration_secs: u64,

    /// `Cache-Control: max-age` on guide responses.
    #[serde(default = "default_guide_cache")]
    pub guide_cache_secs: u64,

    #[serde(default = "default_guide_lookback")]
    pub guide_lookback_hours: i64,

    #[serde(default = "default_guide_lookahead")]
    pub guide_lookahead_hours: i64,

    #[serde(default = "default_search_window")]
    pub search_window_hours: i64,

    #[serde(default = "default_max_featured")]
    pub max_featured_programs: usize,

    #[serde(default = "default_max_program_results")]
    pub max_program_results: usize,

    #[serde(default = "default_max_total_results")]
    pub max_total_search_results: usize,

    /// Number of distinct channels kept in search history.
    #[serde(default = "default_max_search_history")]
    pub max_search_history: i64,

    /// IANA timezone used for display strings. Defaults to the host zone.
    #[serde(default)]
    pub timezone: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:7734".to_string()
}
fn default_db_url() -> String {
    "config/channels.db".to_string()
}
fn default_static_dir() -> String {
    "ui/dist".to_string()
}
fn default_dvr_device() -> String {
    "ANY".to_string()
}
fn default_discovery_timeout() -> u64 {
    5
}
fn default_http_timeout() -> u64 {
    30
}
fn default_search_fetch_timeout() -> u64 {
    5
}
fn default_epg_duration() -> u64 {
    14400
}
fn default_guide_cache() -> u64 {
    900
}
fn default_guide_lookback() -> i64 {
    3
}
fn default_guide_lookahead() -> i64 {
    8
}
fn default_search_window() -> i64 {
    6
}
fn default_max_featured() -> usize {
    6
}
fn default_max_program_results() -> usize {
    5
}
fn default_max_total_results() -> usize {
    100
}
fn default_max_search_history() -> i64 {
    12
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            database_url: default_db_url(),
            static_dir: default_static_dir(),
            dvr_url: None,
            dvr_device: default_dvr_device(),
            discovery_timeout_secs: default_discovery_timeout(),
            http_timeout_secs: default_http_timeout(),
            search_fetch_timeout_secs: default_search_fetch_timeout(),
            epg_duration_secs: default_epg_duration(),
            guide_cache_secs: default_guide_cache(),
            guide_lookback_hours: default_guide_lookback(),
            guide_lookahead_hours: default_guide_lookahead(),
            search_window_hours: default_search_window(),
            max_featured_programs: default_max_featured(),
            max_program_results: default_max_program_results(),
            max_total_search_results: default_max_total_results(),
            max_search_history: default_max_search_history(),
            timezone: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        // .env is optional
        let _ = dotenvy::dotenv();

        envy::from_env::<AppConfig>().context("Failed to load config from environment")
    }

    /// Resolve the display timezone: explicit setting, then the host zone,
    /// then UTC.
    pub fn display_timezone(&self) -> anyhow::Result<Tz> {
        if let Some(name) = self.timezone.as_deref().filter(|s| !s.is_empty()) {
            return name
                .parse::<Tz>()
                .map_err(|e| anyhow::anyhow!("invalid TIMEZONE {name:?}: {e}"));
        }

        match iana_time_zone::get_timezone() {
            Ok(name) => Ok(name.parse::<Tz>().unwrap_or_else(|_| {
                tracing::warn!("Host timezone {name:?} not recognised, using UTC");
                Tz::UTC
            })),
            Err(e) => {
                tracing::warn!("Could not detect host timezone ({e}), using UTC");
                Ok(Tz::UTC)
            }
        }
    }

    /// Settings consumed by the guide engine.
    pub fn guide_config(&self) -> anyhow::Result<GuideConfig> {
        Ok(GuideConfig {
            timezone: self.display_timezone()?,
            guide_window: GuideWindowPolicy {
                lookback: Duration::hours(self.guide_lookback_hours),
                lookahead: Duration::hours(self.guide_lookahead_hours),
            },
            search_window: SearchWindowPolicy {
                lookahead: Duration::hours(self.search_window_hours),
            },
            max_featured_programs: self.max_featured_programs,
            max_program_results: self.max_program_results,
            max_total_search_results: self.max_total_search_results,
        })
    }
}
