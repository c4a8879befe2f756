//! XMLTV document parsing and guide extraction.
//!
//! The document is read with `quick-xml` into a small element tree, then the
//! `<channel>` and `<programme>` children of the root are walked. Parsing is
//! best-effort: a document that is not well-formed yields an empty guide,
//! and an individual programme that cannot be used is skipped and recorded
//! in [`GuideParse::skipped`].
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use super::window::TimeWindow;

const UNKNOWN_TITLE: &str = "Unknown Program";
const EPISODE_SEPARATOR: &str = " • ";

// ── Output types ───────────────────────────────────────────────────────────────

/// One programme as returned to guide callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub title: String,
    pub description: String,
    /// `<episode-num>` and `<sub-title>` joined with " • ".
    pub episode: Option<String>,
    pub artwork_url: Option<String>,
    #[serde(with = "utc_z")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "utc_z")]
    pub end_time: DateTime<Utc>,
    pub channel_display_name: String,
}

/// Internal channel id → programmes sorted by start time.
pub type GuideResult = BTreeMap<i64, Vec<ProgramEntry>>;

/// `<channel>` element of the guide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideChannelDescriptor {
    pub external_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    MissingTimestamp,
    InvalidTimestamp,
    InvertedInterval,
    OutsideWindow,
    UnmappedChannel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedProgramme {
    pub channel: String,
    pub reason: SkipReason,
}

/// Result of a guide parse: the programmes kept plus what was dropped and why.
#[derive(Debug, Clone, Default)]
pub struct GuideParse {
    pub programs: GuideResult,
    pub skipped: Vec<SkippedProgramme>,
    /// Set when the document itself could not be parsed.
    pub document_error: Option<String>,
}

impl GuideParse {
    fn failed(message: String) -> Self {
        Self {
            document_error: Some(message),
            ..Default::default()
        }
    }

    pub fn skip_count(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|s| s.reason == reason).count()
    }

    pub fn program_count(&self) -> usize {
        self.programs.values().map(Vec::len).sum()
    }
}

// ── Element tree ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum XmltvError {
    #[error("XML error at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("unclosed element <{0}>")]
    Unclosed(String),

    #[error("more than one root element")]
    MultipleRoots,

    #[error("document has no root element")]
    Empty,
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let attributes = start
            .attributes()
            .flatten()
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let value = match attr.unescape_value() {
                    Ok(value) => value.into_owned(),
                    Err(_) => String::from_utf8_lossy(attr.value.as_ref()).into_owned(),
                };
                (key, value)
            })
            .collect();
        Self {
            name,
            attributes,
            ..Default::default()
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text content, `None` when empty.
    pub fn text(&self) -> Option<&str> {
        Some(self.text.trim()).filter(|t| !t.is_empty())
    }

    /// Text of the first child with the given name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Element::text)
    }
}

/// A parsed XMLTV document.
#[derive(Debug, Clone)]
pub struct XmltvDocument {
    root: Element,
}

impl XmltvDocument {
    pub fn parse(xml: &str) -> Result<Self, XmltvError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let position = reader.buffer_position();
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(Element::from_start(&e)),
                Ok(Event::Empty(e)) => attach(&mut stack, &mut root, Element::from_start(&e))?,
                Ok(Event::End(_)) => match stack.pop() {
                    Some(element) => attach(&mut stack, &mut root, element)?,
                    None => {
                        return Err(XmltvError::Syntax {
                            position: position as u64,
                            message: "unexpected closing tag".to_string(),
                        });
                    }
                },
                Ok(Event::Text(e)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Ok(Event::GeneralRef(e)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&resolve_reference(&e));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(XmltvError::Syntax {
                        position: position as u64,
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(open) = stack.pop() {
            return Err(XmltvError::Unclosed(open.name));
        }
        root.map(|root| Self { root }).ok_or(XmltvError::Empty)
    }

    /// Channel descriptors keyed by guide id.
    pub fn channels(&self) -> HashMap<String, GuideChannelDescriptor> {
        self.root
            .children_named("channel")
            .filter_map(|channel| {
                let id = channel.attr("id").filter(|id| !id.is_empty())?;
                Some((
                    id.to_string(),
                    GuideChannelDescriptor {
                        external_id: id.to_string(),
                        display_name: channel.child_text("display-name").unwrap_or("").to_string(),
                    },
                ))
            })
            .collect()
    }

    pub fn programmes(&self) -> impl Iterator<Item = &Element> {
        self.root.children_named("programme")
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmltvError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(XmltvError::MultipleRoots),
    }
    Ok(())
}

/// Text for an `&name;` reference. Character and predefined references are
/// resolved; anything else is kept as written.
fn resolve_reference(reference: &BytesRef<'_>) -> String {
    if let Ok(Some(ch)) = reference.resolve_char_ref() {
        return ch.to_string();
    }
    let name = String::from_utf8_lossy(reference);
    match resolve_predefined_entity(&name) {
        Some(text) => text.to_string(),
        None => format!("&{name};"),
    }
}

// ── Timestamps ─────────────────────────────────────────────────────────────────

/// Parse an XMLTV timestamp such as `20231215120000 +0000`.
///
/// Only the first 14 characters are read and they are taken as UTC; the
/// offset suffix is ignored. Feeds that emit non-UTC offsets will be shifted.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let digits = raw.trim().get(..14)?;
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Start and stop of a programme, or why they could not be read.
pub fn programme_interval(
    programme: &Element,
) -> Result<(DateTime<Utc>, DateTime<Utc>), SkipReason> {
    let (Some(start), Some(stop)) = (
        programme.attr("start").filter(|s| !s.is_empty()),
        programme.attr("stop").filter(|s| !s.is_empty()),
    ) else {
        return Err(SkipReason::MissingTimestamp);
    };

    match (parse_timestamp(start), parse_timestamp(stop)) {
        (Some(start), Some(stop)) => Ok((start, stop)),
        _ => {
            debug!("Unparseable programme times {start}/{stop}");
            Err(SkipReason::InvalidTimestamp)
        }
    }
}

// ── Guide extraction ───────────────────────────────────────────────────────────

/// Parse `xml` and collect the programmes of the `wanted` guide channels that
/// start no later than the end of `window`, keyed by internal channel id.
pub fn parse(
    xml: &str,
    wanted: &HashSet<String>,
    external_to_internal: &HashMap<String, i64>,
    window: TimeWindow,
) -> GuideParse {
    match XmltvDocument::parse(xml) {
        Ok(document) => extract(&document, wanted, external_to_internal, window),
        Err(e) => {
            error!("Error parsing XMLTV data: {e}");
            GuideParse::failed(e.to_string())
        }
    }
}

pub fn extract(
    document: &XmltvDocument,
    wanted: &HashSet<String>,
    external_to_internal: &HashMap<String, i64>,
    window: TimeWindow,
) -> GuideParse {
    info!(
        "Parsing guide data from {} to {} for {} channels",
        window.start.format("%H:%M"),
        window.end.format("%H:%M"),
        wanted.len()
    );

    let channels = document.channels();
    let mut parse = GuideParse::default();

    for programme in document.programmes() {
        let Some(external_id) = programme.attr("channel") else {
            continue;
        };
        if !wanted.contains(external_id) {
            continue;
        }

        let entry = build_entry(programme, &channels, window).and_then(|entry| {
            external_to_internal
                .get(external_id)
                .map(|id| (*id, entry))
                .ok_or(SkipReason::UnmappedChannel)
        });

        match entry {
            Ok((internal_id, entry)) => parse.programs.entry(internal_id).or_default().push(entry),
            Err(reason) => {
                debug!("Skipping programme on {external_id}: {reason:?}");
                parse.skipped.push(SkippedProgramme {
                    channel: external_id.to_string(),
                    reason,
                });
            }
        }
    }

    for programs in parse.programs.values_mut() {
        programs.sort_by_key(|p| p.start_time);
    }

    debug!(
        "Guide parse kept {} programmes, skipped {}",
        parse.program_count(),
        parse.skipped.len()
    );
    parse
}

fn build_entry(
    programme: &Element,
    channels: &HashMap<String, GuideChannelDescriptor>,
    window: TimeWindow,
) -> Result<ProgramEntry, SkipReason> {
    let (start, stop) = programme_interval(programme)?;

    if stop < start {
        return Err(SkipReason::InvertedInterval);
    }
    if start > window.end {
        return Err(SkipReason::OutsideWindow);
    }

    let artwork_url = programme
        .child("icon")
        .and_then(|icon| icon.attr("src"))
        .filter(|src| !src.is_empty())
        .or_else(|| {
            programme
                .child("image")
                .and_then(|image| image.text().or_else(|| image.attr("src")))
        })
        .filter(|url| !url.is_empty())
        .map(str::to_string);

    let episode_parts: Vec<&str> = [
        programme.child_text("episode-num"),
        programme.child_text("sub-title"),
    ]
    .into_iter()
    .flatten()
    .collect();
    let episode = (!episode_parts.is_empty()).then(|| episode_parts.join(EPISODE_SEPARATOR));

    let channel_display_name = programme
        .attr("channel")
        .and_then(|id| channels.get(id))
        .map(|c| c.display_name.clone())
        .unwrap_or_default();

    Ok(ProgramEntry {
        title: programme.child_text("title").unwrap_or(UNKNOWN_TITLE).to_string(),
        description: programme.child_text("desc").unwrap_or("").to_string(),
        episode,
        artwork_url,
        start_time: start,
        end_time: stop,
        channel_display_name,
    })
}

/// Serialises instants as `YYYY-MM-DDTHH:MM:SSZ`.
mod utc_z {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const GUIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="channels-dvr">
  <channel id="espn.us">
    <display-name>ESPN</display-name>
    <display-name>206</display-name>
  </channel>
  <channel id="cnn.us"><display-name>CNN</display-name></channel>
  <programme channel="espn.us" start="20250310110000 +0000" stop="20250310120000 +0000">
    <title>SportsCenter</title>
    <desc>Highlights &amp; analysis.</desc>
    <episode-num system="onscreen">S45E69</episode-num>
    <sub-title>Monday Edition</sub-title>
    <icon src="http://dvr/art/sc.jpg"/>
  </programme>
  <programme channel="espn.us" start="20250310100000 +0000" stop="20250310110000 +0000">
    <title>First Take</title>
    <image>http://dvr/art/ft.jpg</image>
  </programme>
  <programme channel="espn.us" start="20250310120000 +0000">
    <title>No Stop</title>
  </programme>
  <programme channel="espn.us" start="20250310130000 +0000" stop="20250310123000 +0000">
    <title>Backwards</title>
  </programme>
  <programme channel="espn.us" start="20250311030000 +0000" stop="20250311040000 +0000">
    <title>Too Late</title>
  </programme>
  <programme channel="espn.us" start="garbage" stop="20250310140000 +0000">
    <title>Bad Start</title>
  </programme>
  <programme channel="cnn.us" start="20250310103000 +0000" stop="20250310113000 +0000">
    <desc>Untitled</desc>
  </programme>
  <programme channel="fox.us" start="20250310103000 +0000" stop="20250310113000 +0000">
    <title>Not Wanted</title>
  </programme>
</tv>"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 10, 30, 0).unwrap()
    }

    fn window() -> TimeWindow {
        crate::guide::window::GuideWindowPolicy::default().window(now())
    }

    fn wanted() -> HashSet<String> {
        ["espn.us", "cnn.us"].iter().map(|s| s.to_string()).collect()
    }

    fn mapping() -> HashMap<String, i64> {
        HashMap::from([("espn.us".to_string(), 1), ("cnn.us".to_string(), 2)])
    }

    #[test]
    fn keeps_wanted_programmes_sorted_by_start() {
        let parse = parse(GUIDE, &wanted(), &mapping(), window());
        assert!(parse.document_error.is_none());

        let espn = &parse.programs[&1];
        let titles: Vec<&str> = espn.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["First Take", "SportsCenter"]);
        assert!(espn.windows(2).all(|w| w[0].start_time <= w[1].start_time));
        assert!(
            parse
                .programs
                .values()
                .flatten()
                .all(|p| p.start_time <= p.end_time)
        );
    }

    #[test]
    fn extracts_programme_details() {
        let parse = parse(GUIDE, &wanted(), &mapping(), window());
        let sc = parse.programs[&1]
            .iter()
            .find(|p| p.title == "SportsCenter")
            .unwrap();
        assert_eq!(sc.description, "Highlights & analysis.");
        assert_eq!(sc.episode.as_deref(), Some("S45E69 • Monday Edition"));
        assert_eq!(sc.artwork_url.as_deref(), Some("http://dvr/art/sc.jpg"));
        assert_eq!(sc.channel_display_name, "ESPN");

        let ft = &parse.programs[&1][0];
        assert_eq!(ft.artwork_url.as_deref(), Some("http://dvr/art/ft.jpg"));
        assert_eq!(ft.episode, None);
        assert_eq!(ft.description, "");

        let cnn = &parse.programs[&2][0];
        assert_eq!(cnn.title, "Unknown Program");
        assert_eq!(cnn.channel_display_name, "CNN");
    }

    #[test]
    fn records_skipped_programmes() {
        let parse = parse(GUIDE, &wanted(), &mapping(), window());
        assert_eq!(parse.skip_count(SkipReason::MissingTimestamp), 1);
        assert_eq!(parse.skip_count(SkipReason::InvertedInterval), 1);
        assert_eq!(parse.skip_count(SkipReason::OutsideWindow), 1);
        assert_eq!(parse.skip_count(SkipReason::InvalidTimestamp), 1);
        // fox.us is filtered before any work is done, not skipped
        assert!(parse.skipped.iter().all(|s| s.channel != "fox.us"));
    }

    #[test]
    fn unmapped_wanted_channel_is_skipped() {
        let mapping = HashMap::from([("espn.us".to_string(), 1)]);
        let parse = parse(GUIDE, &wanted(), &mapping, window());
        assert!(!parse.programs.contains_key(&2));
        assert_eq!(parse.skip_count(SkipReason::UnmappedChannel), 1);
    }

    #[test]
    fn only_the_window_end_bounds_the_guide() {
        // window is 07:30 to 18:30
        let xml = r#"<tv>
          <programme channel="a" start="20250310050000 +0000" stop="20250310060000 +0000"><title>Early</title></programme>
          <programme channel="a" start="20250310060000 +0000" stop="20250310110000 +0000"><title>Marathon</title></programme>
          <programme channel="a" start="20250310100000 +0000" stop="20250310110000 +0000"><title>Now</title></programme>
          <programme channel="a" start="20250310183000 +0000" stop="20250310190000 +0000"><title>Edge</title></programme>
          <programme channel="a" start="20250310183100 +0000" stop="20250310190000 +0000"><title>After</title></programme>
        </tv>"#;
        let wanted = HashSet::from(["a".to_string()]);
        let mapping = HashMap::from([("a".to_string(), 3)]);
        let parse = parse(xml, &wanted, &mapping, window());

        let titles: Vec<&str> = parse.programs[&3].iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Early", "Marathon", "Now", "Edge"]);
        assert_eq!(parse.skipped.len(), 1);
        assert_eq!(parse.skip_count(SkipReason::OutsideWindow), 1);
    }

    #[test]
    fn programme_without_stop_is_skipped_but_siblings_kept() {
        let xml = r#"<tv>
          <programme channel="a" start="20250310100000 +0000"><title>Broken</title></programme>
          <programme channel="a" start="20250310100000 +0000" stop="20250310110000 +0000"><title>Fine</title></programme>
        </tv>"#;
        let wanted = HashSet::from(["a".to_string()]);
        let mapping = HashMap::from([("a".to_string(), 7)]);
        let parse = parse(xml, &wanted, &mapping, window());
        assert_eq!(parse.programs[&7].len(), 1);
        assert_eq!(parse.programs[&7][0].title, "Fine");
        assert_eq!(parse.skip_count(SkipReason::MissingTimestamp), 1);
    }

    #[test]
    fn truncated_document_yields_empty_guide() {
        let truncated = &GUIDE[..GUIDE.len() / 2];
        let parse = parse(truncated, &wanted(), &mapping(), window());
        assert!(parse.programs.is_empty());
        assert!(parse.document_error.is_some());
    }

    #[test]
    fn mismatched_tags_yield_empty_guide() {
        let parse = parse("<tv><channel></tv>", &wanted(), &mapping(), window());
        assert!(parse.programs.is_empty());
        assert!(parse.document_error.is_some());
    }

    #[test]
    fn parsing_is_deterministic() {
        let a = parse(GUIDE, &wanted(), &mapping(), window());
        let b = parse(GUIDE, &wanted(), &mapping(), window());
        assert_eq!(a.programs, b.programs);
        assert_eq!(
            serde_json::to_string(&a.programs).unwrap(),
            serde_json::to_string(&b.programs).unwrap()
        );
    }

    #[test]
    fn serialises_times_with_z_suffix() {
        let parse = parse(GUIDE, &wanted(), &mapping(), window());
        let json = serde_json::to_value(&parse.programs[&1][0]).unwrap();
        assert_eq!(json["start_time"], "2025-03-10T10:00:00Z");
        assert_eq!(json["end_time"], "2025-03-10T11:00:00Z");
        assert!(json["episode"].is_null());
    }

    #[test]
    fn timestamp_offset_is_ignored() {
        let t = parse_timestamp("20250310120000 -0500").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap());
        assert!(parse_timestamp("2025031012").is_none());
        assert!(parse_timestamp("2025133112000000").is_none());
    }

    #[test]
    fn decodes_character_references() {
        let xml = r#"<tv>
          <programme channel="a" start="20250310100000 +0000" stop="20250310110000 +0000">
            <title>Tom &amp; Jerry &lt;caf&#233;&gt; &#x41; &bogus;</title>
            <icon src="http://dvr/art?id=1&amp;size=&#x4C;"/>
          </programme>
        </tv>"#;
        let wanted = HashSet::from(["a".to_string()]);
        let mapping = HashMap::from([("a".to_string(), 1)]);
        let parse = parse(xml, &wanted, &mapping, window());

        let entry = &parse.programs[&1][0];
        assert_eq!(entry.title, "Tom & Jerry <café> A &bogus;");
        assert_eq!(entry.artwork_url.as_deref(), Some("http://dvr/art?id=1&size=L"));
    }
}
