//! Picks what a channel is showing right now for the featured cards.
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use super::xmltv::ProgramEntry;
use crate::models::Channel;

const CLOCK_FORMAT: &str = "%I:%M %p";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    Airing,
    Upcoming,
    Unavailable,
}

/// Either a real guide entry or a synthesized card body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeaturedProgram {
    Airing(ProgramEntry),
    Placeholder {
        title: String,
        description: String,
        artwork_url: Option<String>,
    },
}

impl FeaturedProgram {
    pub fn title(&self) -> &str {
        match self {
            FeaturedProgram::Airing(entry) => &entry.title,
            FeaturedProgram::Placeholder { title, .. } => title,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeaturedProgramView {
    pub channel: Channel,
    pub program: FeaturedProgram,
    pub status: ProgramStatus,
    /// Percentage of the programme already aired, 0–100.
    pub progress: f64,
    pub remaining_minutes: u32,
    pub start_time: String,
    pub end_time: String,
}

/// Build the featured view for `channel` from its sorted programme list.
///
/// Preference order: the programme airing at `now` (`start <= now < end`),
/// then the first programme starting after `now`, then a generic "Live TV"
/// card.
pub fn classify(
    channel: &Channel,
    programs: &[ProgramEntry],
    now: DateTime<Utc>,
    tz: Tz,
) -> FeaturedProgramView {
    if let Some(current) = programs
        .iter()
        .find(|p| p.start_time <= now && now < p.end_time)
    {
        let (progress, remaining_minutes) = airing_metrics(current, now);
        return FeaturedProgramView {
            channel: channel.clone(),
            program: FeaturedProgram::Airing(current.clone()),
            status: ProgramStatus::Airing,
            progress,
            remaining_minutes,
            start_time: clock(current.start_time, tz),
            end_time: clock(current.end_time, tz),
        };
    }

    if let Some(next) = programs.iter().find(|p| p.start_time > now) {
        return FeaturedProgramView {
            channel: channel.clone(),
            program: FeaturedProgram::Placeholder {
                title: format!("Coming Up: {}", next.title),
                description: next.description.clone(),
                artwork_url: next.artwork_url.clone(),
            },
            status: ProgramStatus::Upcoming,
            progress: 0.0,
            remaining_minutes: 0,
            start_time: clock(next.start_time, tz),
            end_time: String::new(),
        };
    }

    live_tv(channel)
}

/// Card shown when the guide has nothing for the channel.
pub fn live_tv(channel: &Channel) -> FeaturedProgramView {
    FeaturedProgramView {
        channel: channel.clone(),
        program: FeaturedProgram::Placeholder {
            title: "Live TV".to_string(),
            description: format!("Currently broadcasting on {}", channel.name),
            artwork_url: None,
        },
        status: ProgramStatus::Unavailable,
        progress: 0.0,
        remaining_minutes: 0,
        start_time: String::new(),
        end_time: String::new(),
    }
}

/// Progress percentage and whole minutes left.
fn airing_metrics(program: &ProgramEntry, now: DateTime<Utc>) -> (f64, u32) {
    let total = (program.end_time - program.start_time).num_milliseconds();
    let elapsed = (now - program.start_time).num_milliseconds();
    let progress = if total > 0 {
        (elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let remaining = (program.end_time - now).num_minutes().max(0);
    (progress, u32::try_from(remaining).unwrap_or(u32::MAX))
}

/// 12-hour wall clock in the display zone, e.g. `09:05 PM`.
pub fn clock(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format(CLOCK_FORMAT).to_string()
}
