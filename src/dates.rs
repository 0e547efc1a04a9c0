// src/dates.rs
//! Date normalization for feed timestamps.
//!
//! Feeds publish dates in whatever shape their CMS produces: RFC 2822 with
//! non-standard zone names, ISO 8601 with or without offsets, or prose with a
//! timestamp buried inside. `DateNormalizer::parse` runs an ordered fallback
//! chain and always returns UTC. Naive results are taken as UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::error::DateParseError;

/// Zone abbreviations resolved to fixed offsets (seconds east of UTC).
/// Anything not listed is treated as UTC rather than guessed.
const ZONE_OFFSETS: &[(&str, i32)] = &[
    ("PDT", -7 * 3600),
    ("PST", -8 * 3600),
    ("MDT", -6 * 3600),
    ("MST", -7 * 3600),
    ("CDT", -5 * 3600),
    ("CST", -6 * 3600),
    ("EDT", -4 * 3600),
    ("EST", -5 * 3600),
    ("CEST", 2 * 3600),
    ("CET", 3600),
    ("BST", 3600),
    ("AEST", 10 * 3600),
    ("AEDT", 11 * 3600),
    ("GMT", 0),
    ("UTC", 0),
    ("UT", 0),
    ("Z", 0),
];

const WEEKDAYS: &[&str] = &["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%a, %d %b %Y %H:%M:%S %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%d %B %Y %H:%M:%S",
    "%d %B %Y %H:%M",
    "%d %b %Y %I:%M:%S %p",
    "%d %b %Y %I:%M %p",
    "%d %B %Y %I:%M:%S %p",
    "%d %B %Y %I:%M %p",
    "%b %d, %Y %H:%M:%S",
    "%b %d %Y %H:%M:%S",
    "%B %d, %Y %H:%M:%S",
    "%B %d, %Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%B %d, %Y %I:%M %p",
];

const DATE_ONLY_FORMATS: &[&str] = &["%Y-%m-%d", "%d %b %Y", "%d %B %Y", "%b %d, %Y", "%B %d, %Y"];

static RE_ISO_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{4})-(\d{1,2})-(\d{1,2})(?:[ T](\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*(?i:([ap]m))\b)?)?",
    )
        .expect("iso fragment regex")
});

static RE_DMY_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{1,2})/(\d{1,2})/(\d{4})(?:[ T](\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*(?i:([ap]m))\b)?)?",
    )
        .expect("dmy fragment regex")
});

static RE_TEXT_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})(?:,?\s+(?:at\s+)?(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*([ap]m)\b)?)?",
    )
    .expect("text fragment regex")
});

static RE_ZONE_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\(?([A-Za-z]{1,5})(?:\)|\s|,|$)").expect("zone regex"));

/// Parses heterogeneous feed timestamps into UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateNormalizer;

impl DateNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// First success wins: strict formats, then lenient zone handling, then
    /// fuzzy fragment extraction.
    pub fn parse(&self, raw: &str) -> Result<DateTime<Utc>, DateParseError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(DateParseError::Empty);
        }
        // chrono reads any unknown 3-letter zone (CET, BST) as UTC, so a
        // zone from the table must be resolved before the strict parsers run.
        let table_zone_last = s
            .split_whitespace()
            .last()
            .and_then(|t| zone_offset(clean_token(t)))
            .is_some();
        let parsed = if table_zone_last {
            parse_lenient(s).or_else(|| parse_strict(s))
        } else {
            parse_strict(s).or_else(|| parse_lenient(s))
        };
        parsed
            .or_else(|| parse_fuzzy(s))
            .ok_or_else(|| DateParseError::Unrecognized(s.to_string()))
    }

    /// Convenience for optional source dates.
    pub fn parse_opt(&self, raw: Option<&str>) -> Result<DateTime<Utc>, DateParseError> {
        self.parse(raw.unwrap_or_default())
    }
}

/// Looks up a zone abbreviation (case-insensitive) in the offset table.
pub fn zone_offset(abbrev: &str) -> Option<FixedOffset> {
    let upper = abbrev.to_ascii_uppercase();
    ZONE_OFFSETS
        .iter()
        .find(|(name, _)| *name == upper)
        .and_then(|(_, secs)| FixedOffset::east_opt(*secs))
}

fn from_offset_datetime(dt: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

fn parse_strict(s: &str) -> Option<DateTime<Utc>> {
    parse_offset_aware(s).or_else(|| parse_naive(s).map(|naive| Utc.from_utc_datetime(&naive)))
}

/// Formats that carry their own offset.
fn parse_offset_aware(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return from_offset_datetime(dt);
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return from_offset_datetime(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive);
        }
    }
    for fmt in DATE_ONLY_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn is_weekday_token(token: &str) -> bool {
    let t = token.trim_end_matches([',', '.']).to_ascii_lowercase();
    t.len() >= 3 && WEEKDAYS.iter().any(|d| t.starts_with(d))
}

fn clean_token(token: &str) -> &str {
    token.trim_matches(|c: char| matches!(c, '(' | ')' | ',' | '.' | '[' | ']'))
}

/// Drops a leading weekday (feeds often get it wrong) and trailing tokens
/// without digits. Of the stripped tokens, the table zone nearest the time
/// sets the offset; unknown zone names fall back to UTC.
fn parse_lenient(s: &str) -> Option<DateTime<Utc>> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    if tokens.first().is_some_and(|t| is_weekday_token(t)) {
        tokens.remove(0);
    }

    let mut zone: Option<FixedOffset> = None;
    while let Some(last) = tokens.last() {
        if last.chars().any(|c| c.is_ascii_digit()) || tokens.len() <= 1 {
            break;
        }
        // "PM"/"AM" belong to the time, not the zone.
        if matches!(last.to_ascii_uppercase().as_str(), "AM" | "PM") {
            break;
        }
        if let Some(off) = zone_offset(clean_token(last)) {
            zone = Some(off);
        }
        tokens.pop();
    }
    if tokens.is_empty() {
        return None;
    }

    let remainder = tokens.join(" ");
    if remainder == s {
        return None;
    }
    // An explicit numeric offset left in the remainder beats a zone name.
    if let Some(dt) = parse_offset_aware(&remainder) {
        return Some(dt);
    }

    let naive = parse_naive(&remainder)?;
    let offset = zone.unwrap_or_else(|| Utc.fix());
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn month_number(name: &str) -> Option<u32> {
    let months = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = name.to_ascii_lowercase();
    months
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|i| i as u32 + 1)
}

fn cap_u32(caps: &regex::Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

/// Time groups 4..=6 plus an optional AM/PM marker in group 7.
fn fragment_hms(caps: &regex::Captures<'_>) -> (u32, u32, u32) {
    let mut hour = cap_u32(caps, 4).unwrap_or(0);
    match caps.get(7).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
        Some("pm") if hour < 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }
    (hour, cap_u32(caps, 5).unwrap_or(0), cap_u32(caps, 6).unwrap_or(0))
}

fn build(
    year: i32,
    month: u32,
    day: u32,
    hms: (u32, u32, u32),
    trailing: &str,
) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hms.0, hms.1, hms.2)?;
    let offset = RE_ZONE_AFTER
        .captures(trailing)
        .and_then(|c| c.get(1))
        .and_then(|m| zone_offset(m.as_str()))
        .unwrap_or_else(|| Utc.fix());
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Last resort: find a date/time fragment anywhere in the string and rebuild
/// it. A zone abbreviation directly after the fragment is honoured.
fn parse_fuzzy(s: &str) -> Option<DateTime<Utc>> {
    if let Some(c) = RE_ISO_FRAGMENT.captures(s) {
        let end = c.get(0).map(|m| m.end()).unwrap_or(s.len());
        let year = c.get(1)?.as_str().parse().ok()?;
        let hms = fragment_hms(&c);
        if let Some(dt) = build(year, cap_u32(&c, 2)?, cap_u32(&c, 3)?, hms, &s[end..]) {
            return Some(dt);
        }
    }
    if let Some(c) = RE_DMY_FRAGMENT.captures(s) {
        let end = c.get(0).map(|m| m.end()).unwrap_or(s.len());
        let year = c.get(3)?.as_str().parse().ok()?;
        let hms = fragment_hms(&c);
        if let Some(dt) = build(year, cap_u32(&c, 2)?, cap_u32(&c, 1)?, hms, &s[end..]) {
            return Some(dt);
        }
    }
    if let Some(c) = RE_TEXT_FRAGMENT.captures(s) {
        let end = c.get(0).map(|m| m.end()).unwrap_or(s.len());
        let year = c.get(3)?.as_str().parse().ok()?;
        let month = month_number(c.get(2)?.as_str())?;
        let hms = fragment_hms(&c);
        return build(year, month, cap_u32(&c, 1)?, hms, &s[end..]);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn strict_rfc2822_with_numeric_offset() {
        let p = DateNormalizer::new();
        assert_eq!(
            p.parse("Fri, 21 Nov 1997 09:55:06 -0600").unwrap(),
            utc(1997, 11, 21, 15, 55, 6)
        );
    }

    #[test]
    fn lenient_strips_unknown_trailing_zone() {
        let p = DateNormalizer::new();
        assert_eq!(
            p.parse("2023-10-26T10:00:00 WEIRDZONE").unwrap(),
            utc(2023, 10, 26, 10, 0, 0)
        );
    }

    #[test]
    fn lenient_keeps_pm_marker() {
        let p = DateNormalizer::new();
        assert_eq!(
            p.parse("April 10, 2023 5:00 PM").unwrap(),
            utc(2023, 4, 10, 17, 0, 0)
        );
    }

    #[test]
    fn zone_table_is_case_insensitive() {
        assert_eq!(zone_offset("cest"), FixedOffset::east_opt(7200));
        assert!(zone_offset("XYZ").is_none());
    }

    #[test]
    fn empty_is_its_own_error() {
        assert_eq!(DateNormalizer::new().parse("   "), Err(DateParseError::Empty));
    }
}
