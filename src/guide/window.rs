//! Time windows that bound which programmes a guide query returns.
//!
//! The full guide and the title search use different windows:
//! the guide looks back far enough to include whatever is airing now, while
//! search only considers programmes that have not started yet.
use chrono::{DateTime, Duration, Utc};

/// A closed interval of absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Window for the bulk guide and featured cards: `[now - lookback, now + lookahead]`.
///
/// Only the end bounds the guide: any programme starting at or before
/// `now + lookahead` is kept, including ones that already ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuideWindowPolicy {
    pub lookback: Duration,
    pub lookahead: Duration,
}

impl Default for GuideWindowPolicy {
    fn default() -> Self {
        Self {
            lookback: Duration::hours(3),
            lookahead: Duration::hours(8),
        }
    }
}

impl GuideWindowPolicy {
    pub fn window(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow {
            start: now - self.lookback,
            end: now + self.lookahead,
        }
    }
}

/// Window for programme-title search: `[now, now + lookahead]`, applied to
/// the programme start only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindowPolicy {
    pub lookahead: Duration,
}

impl Default for SearchWindowPolicy {
    fn default() -> Self {
        Self {
            lookahead: Duration::hours(6),
        }
    }
}

impl SearchWindowPolicy {
    pub fn window(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow {
            start: now,
            end: now + self.lookahead,
        }
    }
}
