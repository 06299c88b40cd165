//! Recency selection with fallback widening.
//!
//! One parametrized pass replaces every "fresh items, else backfill" variant:
//!
//! 1. keep items inside the primary window (feed order, capped);
//! 2. if fewer than `min_acceptable` survive, or none at all, backfill from
//!    the fallback window, or from the whole feed when no fallback window is set;
//! 3. while still short, backfill undated items, which never sit inside a window;
//! 4. if that still yields nothing, backfill from the whole feed;
//! 5. optionally sort newest first.
//!
//! Items are deduplicated by link, or by title when the link is empty.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::normalize::NormalizedItem;

/// How items without a usable publish date take part in windowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTimestamp {
    /// Never inside a window; only eligible for unfiltered backfill.
    #[default]
    Stale,
    /// Treated as published at selection time.
    Fresh,
}

#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    pub primary_window: Duration,
    pub fallback_window: Option<Duration>,
    pub min_acceptable: usize,
    pub max_results: usize,
    pub sort_by_published: bool,
    pub unknown_timestamp: UnknownTimestamp,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            primary_window: Duration::hours(12),
            fallback_window: Some(Duration::hours(36)),
            min_acceptable: 3,
            max_results: 10,
            sort_by_published: true,
            unknown_timestamp: UnknownTimestamp::Stale,
        }
    }
}

impl SelectionPolicy {
    /// Publish time used for windowing and ordering, `None` if unknown and stale.
    fn effective_time(&self, item: &NormalizedItem, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !item.timestamp_source.is_estimated() {
            return Some(item.published_at);
        }
        match self.unknown_timestamp {
            UnknownTimestamp::Stale => None,
            UnknownTimestamp::Fresh => Some(now),
        }
    }

    fn within(&self, item: &NormalizedItem, window: Duration, now: DateTime<Utc>) -> bool {
        self.effective_time(item, now)
            .map(|published| now.signed_duration_since(published) <= window)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub items: Vec<NormalizedItem>,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Link(String),
    Title(String),
}

/// Link when present, title otherwise; `None` for items with neither.
pub fn dedup_key(item: &NormalizedItem) -> Option<DedupKey> {
    if !item.link.is_empty() {
        Some(DedupKey::Link(item.link.clone()))
    } else if !item.title.is_empty() {
        Some(DedupKey::Title(item.title.clone()))
    } else {
        None
    }
}

/// Bounded, duplicate-free accumulator.
#[derive(Debug)]
pub struct Picked {
    items: Vec<NormalizedItem>,
    seen: HashSet<DedupKey>,
    limit: usize,
}

impl Picked {
    pub fn new(limit: usize) -> Self {
        Self {
            items: Vec::with_capacity(limit.min(64)),
            seen: HashSet::new(),
            limit,
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.limit
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns false if the item was a duplicate or the limit is reached.
    pub fn push(&mut self, item: &NormalizedItem) -> bool {
        if self.is_full() {
            return false;
        }
        if let Some(key) = dedup_key(item) {
            if !self.seen.insert(key) {
                return false;
            }
        }
        self.items.push(item.clone());
        true
    }

    pub fn extend<'a>(&mut self, items: impl IntoIterator<Item = &'a NormalizedItem>) {
        for item in items {
            if self.is_full() {
                break;
            }
            self.push(item);
        }
    }

    pub fn into_items(self) -> Vec<NormalizedItem> {
        self.items
    }
}

pub fn select(items: &[NormalizedItem], policy: &SelectionPolicy, now: DateTime<Utc>) -> Selection {
    let mut picked = Picked::new(policy.max_results);

    picked.extend(
        items
            .iter()
            .filter(|item| policy.within(item, policy.primary_window, now)),
    );

    let primary_count = picked.len();
    let mut used_fallback = false;

    let short = primary_count < policy.min_acceptable || picked.is_empty();
    if short && !picked.is_full() && !items.is_empty() {
        used_fallback = true;

        match policy.fallback_window {
            Some(window) => picked.extend(items.iter().filter(|item| policy.within(item, window, now))),
            None => picked.extend(items),
        }

        if picked.len() < policy.min_acceptable {
            picked.extend(items.iter().filter(|item| policy.effective_time(item, now).is_none()));
        }

        if picked.is_empty() {
            picked.extend(items);
        }

        tracing::debug!(
            "Primary window yielded {} item(s), backfilled to {}",
            primary_count,
            picked.len()
        );
    }

    let mut selected = picked.into_items();
    if policy.sort_by_published {
        selected.sort_by(|a, b| policy.effective_time(b, now).cmp(&policy.effective_time(a, now)));
    }

    Selection {
        items: selected,
        used_fallback,
    }
}
