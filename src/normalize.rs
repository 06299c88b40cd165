//! Defensive field extraction from raw feed entries.
//!
//! Every extractor documents its own default; none of them fail, so one
//! malformed entry never costs the rest of the feed.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::fetcher::RawEntry;
use crate::sanitize;

/// Where an item's `published_at` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    /// Date parsed by the feed parser itself.
    Structured,
    /// Date recovered from the raw `<pubDate>` text.
    RawString,
    /// No usable date; `published_at` is the processing time.
    ProcessingTime,
}

impl TimestampSource {
    pub fn is_estimated(self) -> bool {
        self == TimestampSource::ProcessingTime
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedItem {
    pub title: String,
    pub summary: String,
    pub published_at: DateTime<Utc>,
    pub timestamp_source: TimestampSource,
    pub source: String,
    pub link: String,
    pub translated_title: Option<String>,
    pub translated_summary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub unknown_source: String,
    pub summary_max_chars: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            unknown_source: "Unknown".to_string(),
            summary_max_chars: 500,
        }
    }
}

pub fn normalize(entry: &RawEntry, options: &NormalizeOptions, now: DateTime<Utc>) -> NormalizedItem {
    let (published_at, timestamp_source) = extract_published(entry, now);

    NormalizedItem {
        title: extract_title(entry),
        summary: extract_summary(entry, options.summary_max_chars),
        published_at,
        timestamp_source,
        source: extract_source(entry, &options.unknown_source),
        link: extract_link(entry),
        translated_title: None,
        translated_summary: None,
    }
}

/// Plain-text title; empty when absent.
pub fn extract_title(entry: &RawEntry) -> String {
    entry
        .title
        .as_deref()
        .map(sanitize::inline_text)
        .unwrap_or_default()
}

/// Sanitized, length-capped summary; empty when absent.
pub fn extract_summary(entry: &RawEntry, max_chars: usize) -> String {
    sanitize::summary(entry.summary.as_deref().unwrap_or(""), max_chars)
}

/// Structured date, then the raw date string, then `now`.
pub fn extract_published(entry: &RawEntry, now: DateTime<Utc>) -> (DateTime<Utc>, TimestampSource) {
    if let Some(published) = entry.published {
        return (published, TimestampSource::Structured);
    }

    if let Some(parsed) = entry.published_raw.as_deref().and_then(parse_date) {
        return (parsed, TimestampSource::RawString);
    }

    (now, TimestampSource::ProcessingTime)
}

/// Publisher name; `unknown` when blank or absent.
pub fn extract_source(entry: &RawEntry, unknown: &str) -> String {
    entry
        .source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(unknown)
        .to_string()
}

/// Trimmed link; empty when absent.
pub fn extract_link(entry: &RawEntry) -> String {
    entry
        .link
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

const ZONED_FORMATS: &[&str] = &["%d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M %z"];

/// Lenient date parsing for `<pubDate>` text the feed parser rejected.
///
/// Handles RFC 2822 (including a wrong weekday or a named UTC zone),
/// RFC 3339, and zone-less ISO-like strings which are taken as UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // "Tue, 09 Dec 2024 12:00:00 GMT" with a weekday that doesn't match the date
    let without_weekday = match raw.split_once(',') {
        Some((weekday, rest)) if weekday.chars().all(|c| c.is_ascii_alphabetic()) => rest.trim(),
        _ => raw,
    };
    let zoned = normalize_zone(without_weekday);
    for format in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&zoned, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    None
}

fn normalize_zone(value: &str) -> String {
    for zone in ["GMT", "UTC", "UT", "Z"] {
        if let Some(stripped) = value.strip_suffix(zone) {
            if stripped.ends_with(' ') {
                return format!("{}+0000", stripped);
            }
        }
    }
    value.to_string()
}
