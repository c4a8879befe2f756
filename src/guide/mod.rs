//! Guide engine: turns the DVR's XMLTV feed into per-channel schedules,
//! featured cards and search results.
//!
//! Nothing here is cached between calls; every query fetches and parses the
//! feed again. Upstream and parse failures degrade to empty results and are
//! logged, they never reach the caller as errors.
pub mod classify;
pub mod identity;
pub mod search;
pub mod window;
pub mod xmltv;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

pub use classify::FeaturedProgramView;
pub use identity::{ChannelIdentity, IdentityMap};
pub use search::SearchItem;
pub use window::{GuideWindowPolicy, SearchWindowPolicy, TimeWindow};
pub use xmltv::{GuideResult, ProgramEntry, XmltvDocument};

use crate::{dvr::DvrClient, models::Channel};

/// Limits and windows used by [`GuideService`].
#[derive(Debug, Clone)]
pub struct GuideConfig {
    /// Zone used for the 12-hour display strings.
    pub timezone: Tz,
    pub guide_window: GuideWindowPolicy,
    pub search_window: SearchWindowPolicy,
    pub max_featured_programs: usize,
    pub max_program_results: usize,
    pub max_total_search_results: usize,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            guide_window: GuideWindowPolicy::default(),
            search_window: SearchWindowPolicy::default(),
            max_featured_programs: 6,
            max_program_results: 5,
            max_total_search_results: 100,
        }
    }
}

/// Source of "now".
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GuideService {
    dvr: DvrClient,
    config: Arc<GuideConfig>,
    clock: Clock,
}

impl GuideService {
    pub fn new(dvr: DvrClient, config: GuideConfig) -> Self {
        Self {
            dvr,
            config: Arc::new(config),
            clock: Clock::System,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &GuideConfig {
        &self.config
    }

    /// Schedules for `channel_ids` inside the guide window, keyed by channel id.
    ///
    /// `channels` is the full lineup and is only used to build the id map.
    pub async fn bulk_guide(&self, channel_ids: &[i64], channels: &[Channel]) -> GuideResult {
        let identity = IdentityMap::build(channels.iter().map(ChannelIdentity::from));
        let wanted: HashSet<String> = identity.external_ids_for(channel_ids).into_iter().collect();
        if wanted.is_empty() {
            warn!("No guide ids found for requested channels");
            return GuideResult::new();
        }

        let Some(xml) = self.fetch_document(self.dvr.guide_timeout()).await else {
            return GuideResult::new();
        };

        let window = self.config.guide_window.window(self.clock.now());
        let parse = xmltv::parse(&xml, &wanted, identity.external_to_internal(), window);
        if !parse.skipped.is_empty() {
            debug!("{} guide entries skipped", parse.skipped.len());
        }
        parse.programs
    }

    /// Featured cards for `featured` (in order, capped), using `channels` to
    /// resolve guide ids.
    pub async fn featured_programs(
        &self,
        featured: &[Channel],
        channels: &[Channel],
    ) -> Vec<FeaturedProgramView> {
        let featured = &featured[..featured.len().min(self.config.max_featured_programs)];
        if featured.is_empty() {
            return Vec::new();
        }

        let ids: Vec<i64> = featured.iter().map(|c| c.id).collect();
        let guide = self.bulk_guide(&ids, channels).await;
        let now = self.clock.now();

        featured
            .iter()
            .map(|channel| {
                let programs = guide.get(&channel.id).map(Vec::as_slice).unwrap_or_default();
                classify::classify(channel, programs, now, self.config.timezone)
            })
            .collect()
    }

    /// Featured card for a single channel.
    pub async fn current_program(
        &self,
        channel: &Channel,
        channels: &[Channel],
    ) -> FeaturedProgramView {
        let guide = self.bulk_guide(&[channel.id], channels).await;
        let programs = guide.get(&channel.id).map(Vec::as_slice).unwrap_or_default();
        classify::classify(channel, programs, self.clock.now(), self.config.timezone)
    }

    /// Channel matches (with what they are airing) followed by upcoming
    /// programme-title matches on those same channels.
    pub async fn search(&self, query: &str, channels: &[Channel]) -> Vec<SearchItem> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let max_total = self.config.max_total_search_results;
        let matched = search::match_channels(query, channels, max_total);
        let now = self.clock.now();

        let document = match self.fetch_document(self.dvr.search_timeout()).await {
            Some(xml) => XmltvDocument::parse(&xml)
                .inspect_err(|e| warn!("Error parsing guide XML for search: {e}"))
                .ok(),
            None => None,
        };

        let live = document
            .as_ref()
            .map(|doc| search::live_titles(doc, &matched, now))
            .unwrap_or_default();

        let mut results: Vec<SearchItem> = matched
            .iter()
            .map(|channel| {
                let current = channel
                    .tvg_id
                    .as_deref()
                    .and_then(|id| live.get(id))
                    .cloned();
                SearchItem::channel(channel, current)
            })
            .collect();

        if let Some(doc) = document.as_ref().filter(|_| results.len() < max_total) {
            let programs = search::match_programs(
                doc,
                query,
                &matched,
                self.config.search_window.window(now),
                self.config.max_program_results,
                self.config.timezone,
            );
            let room = max_total - results.len();
            results.extend(programs.into_iter().take(room));
        }

        results.truncate(max_total);
        results
    }

    async fn fetch_document(&self, timeout: std::time::Duration) -> Option<String> {
        match self.dvr.fetch_xmltv(timeout).await {
            Ok(xml) if !xml.trim().is_empty() => Some(xml),
            Ok(_) => {
                warn!("DVR returned an empty guide document");
                None
            }
            Err(e) => {
                warn!("Error fetching guide data: {e:#}");
                None
            }
        }
    }
}
