//! Channel and programme-title search over the lineup and the guide document.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

use super::classify::clock;
use super::window::TimeWindow;
use super::xmltv::{XmltvDocument, parse_timestamp, programme_interval};
use crate::models::Channel;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchItem {
    Channel {
        id: i64,
        name: String,
        logo_url: Option<String>,
        channel_number: Option<String>,
        tvg_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_program: Option<String>,
    },
    Program {
        title: String,
        description: String,
        channel_id: i64,
        channel_name: String,
        start_time: String,
        artwork_url: Option<String>,
    },
}

impl SearchItem {
    pub fn channel(channel: &Channel, current_program: Option<String>) -> Self {
        SearchItem::Channel {
            id: channel.id,
            name: channel.name.clone(),
            logo_url: channel.logo_url.clone(),
            channel_number: channel.channel_number.clone(),
            tvg_id: channel.tvg_id.clone(),
            current_program,
        }
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

/// Enabled channels whose name, guide id or number contains `query`
/// (case-insensitive). Name matches rank first, then guide id, then number;
/// ties are ordered by name.
pub fn match_channels<'a>(query: &str, channels: &'a [Channel], limit: usize) -> Vec<&'a Channel> {
    let needle = query.to_lowercase();
    let mut ranked: Vec<(u8, &Channel)> = channels
        .iter()
        .filter(|c| c.is_enabled)
        .filter_map(|c| {
            if contains_ci(Some(c.name.as_str()), &needle) {
                Some((1, c))
            } else if contains_ci(c.tvg_id.as_deref(), &needle) {
                Some((2, c))
            } else if contains_ci(c.channel_number.as_deref(), &needle) {
                Some((3, c))
            } else {
                None
            }
        })
        .collect();

    ranked.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.name.cmp(&b.name)));
    ranked.into_iter().take(limit).map(|(_, c)| c).collect()
}

/// Title of the programme airing at `now` on each of `channels`, keyed by
/// guide id.
///
/// Uses inclusive `[start, stop]` containment and ignores the guide window:
/// this only answers "what is on right now".
pub fn live_titles(
    document: &XmltvDocument,
    channels: &[&Channel],
    now: DateTime<Utc>,
) -> HashMap<String, String> {
    let mut titles = HashMap::new();
    for programme in document.programmes() {
        let Some(guide_id) = programme.attr("channel") else {
            continue;
        };
        if !channels.iter().any(|c| c.tvg_id.as_deref() == Some(guide_id)) {
            continue;
        }
        let Ok((start, stop)) = programme_interval(programme) else {
            continue;
        };
        if start <= now && now <= stop {
            if let Some(title) = programme.child_text("title") {
                titles.insert(guide_id.to_string(), title.to_string());
            }
        }
    }
    titles
}

/// Programmes whose title contains `query` and whose start falls inside
/// `window`, restricted to the enabled `channels` given (the channel matches
/// of the same query). Stops after `limit` hits.
pub fn match_programs(
    document: &XmltvDocument,
    query: &str,
    channels: &[&Channel],
    window: TimeWindow,
    limit: usize,
    tz: Tz,
) -> Vec<SearchItem> {
    let needle = query.to_lowercase();
    let by_guide_id: HashMap<&str, &Channel> = channels
        .iter()
        .copied()
        .filter(|c| c.is_enabled)
        .filter_map(|c| {
            c.tvg_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .map(|id| (id, c))
        })
        .collect();

    let mut results = Vec::new();
    if limit == 0 {
        return results;
    }

    for programme in document.programmes() {
        let Some(start) = programme.attr("start").and_then(parse_timestamp) else {
            debug!("Search skipped programme without a usable start");
            continue;
        };
        if !window.contains(start) {
            continue;
        }
        let Some(title) = programme.child_text("title") else {
            continue;
        };
        if !title.to_lowercase().contains(&needle) {
            continue;
        }
        let Some(channel) = programme
            .attr("channel")
            .and_then(|id| by_guide_id.get(id))
        else {
            continue;
        };

        results.push(SearchItem::Program {
            title: title.to_string(),
            description: programme.child_text("desc").unwrap_or("").to_string(),
            channel_id: channel.id,
            channel_name: channel.name.clone(),
            start_time: clock(start, tz),
            artwork_url: None,
        });
        if results.len() >= limit {
            break;
        }
    }
    results
}
