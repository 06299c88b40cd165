//! List, lookup and search over freshly fetched feed entries.
//!
//! Every call re-fetches the configured feeds; nothing is cached between
//! requests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::{Config, FeedConfig};
use crate::fetcher::{fetch_all, FeedSource};
use crate::normalize::{normalize, NormalizeOptions, NormalizedItem};
use crate::sanitize;
use crate::selection::{select, Picked, Selection, SelectionPolicy};
use crate::translate::Translator;

#[derive(Debug, thiserror::Error)]
pub enum NewsError {
    #[error("No news item found for the requested link")]
    NotFound { link: String },
    #[error("{0}")]
    InvalidRequest(String),
}

pub struct NewsService {
    source: Arc<dyn FeedSource>,
    feeds: Vec<FeedConfig>,
    policy: SelectionPolicy,
    normalize: NormalizeOptions,
    translator: Option<Arc<dyn Translator>>,
    target_language: String,
    search_limit: usize,
}

impl NewsService {
    pub fn new(source: Arc<dyn FeedSource>, feeds: Vec<FeedConfig>) -> Self {
        Self {
            source,
            feeds,
            policy: SelectionPolicy::default(),
            normalize: NormalizeOptions::default(),
            translator: None,
            target_language: "zh-TW".to_string(),
            search_limit: 10,
        }
    }

    pub fn from_config(
        config: &Config,
        source: Arc<dyn FeedSource>,
        translator: Option<Arc<dyn Translator>>,
    ) -> Self {
        let mut service = Self::new(source, config.feeds.clone())
            .with_policy(config.selection.policy())
            .with_normalize_options(NormalizeOptions {
                unknown_source: config.unknown_source.clone(),
                summary_max_chars: config.summary_max_chars,
            })
            .with_search_limit(config.search_limit);

        if let Some(translator) = translator {
            service = service.with_translator(translator, config.translation.target_language.clone());
        }

        service
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_normalize_options(mut self, options: NormalizeOptions) -> Self {
        self.normalize = options;
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>, target_language: String) -> Self {
        self.translator = Some(translator);
        self.target_language = target_language;
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn can_translate(&self) -> bool {
        self.translator.is_some()
    }

    async fn collect(&self, options: &NormalizeOptions, now: DateTime<Utc>) -> Vec<NormalizedItem> {
        let entries = fetch_all(self.source.as_ref(), &self.feeds).await;
        debug!("Normalizing {} entries from {} feed(s)", entries.len(), self.feeds.len());

        entries
            .iter()
            .map(|entry| normalize(entry, options, now))
            .collect()
    }

    /// Fresh items from all feeds, widened per the selection policy when too few qualify.
    ///
    /// `limit` can only lower the configured maximum.
    pub async fn list(&self, limit: Option<usize>, translate: bool) -> Selection {
        let now = Utc::now();
        let items = self.collect(&self.normalize, now).await;

        let mut policy = self.policy.clone();
        if let Some(limit) = limit.filter(|l| *l > 0) {
            policy.max_results = policy.max_results.min(limit);
        }

        let mut selection = select(&items, &policy, now);
        info!(
            "Selected {} of {} items (fallback: {})",
            selection.items.len(),
            items.len(),
            selection.used_fallback
        );

        if translate {
            for item in &mut selection.items {
                self.annotate(item).await;
            }
        }

        selection
    }

    /// First item whose link equals `link` exactly.
    pub async fn lookup(&self, link: &str, translate: bool) -> Result<NormalizedItem, NewsError> {
        if link.trim().is_empty() {
            return Err(NewsError::InvalidRequest("Missing url".to_string()));
        }

        let now = Utc::now();
        let mut item = self
            .collect(&self.normalize, now)
            .await
            .into_iter()
            .find(|item| item.link == link)
            .ok_or_else(|| NewsError::NotFound {
                link: link.to_string(),
            })?;

        if translate {
            self.annotate(&mut item).await;
        }

        Ok(item)
    }

    /// Case-insensitive match on title and sanitized summary, in feed order.
    pub async fn search(&self, keyword: &str, limit: Option<usize>) -> Result<Vec<NormalizedItem>, NewsError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(NewsError::InvalidRequest("Missing keyword".to_string()));
        }
        let needle = keyword.to_lowercase();

        // Match against the whole summary, cap only what gets returned
        let uncapped = NormalizeOptions {
            summary_max_chars: 0,
            ..self.normalize.clone()
        };
        let items = self.collect(&uncapped, Utc::now()).await;

        let limit = limit.filter(|l| *l > 0).unwrap_or(self.search_limit);
        let mut picked = Picked::new(limit);
        picked.extend(items.iter().filter(|item| matches_keyword(item, &needle)));

        let mut results = picked.into_items();
        for item in &mut results {
            item.summary = sanitize::truncate(&item.summary, self.normalize.summary_max_chars);
        }

        info!("Search for '{}' matched {} item(s)", keyword, results.len());
        Ok(results)
    }

    async fn annotate(&self, item: &mut NormalizedItem) {
        let Some(translator) = &self.translator else {
            return;
        };

        item.translated_title = Some(translator.translate(&item.title, &self.target_language).await);
        item.translated_summary = Some(translator.translate(&item.summary, &self.target_language).await);
    }
}

/// `needle` must already be lowercase.
fn matches_keyword(item: &NormalizedItem, needle: &str) -> bool {
    item.title.to_lowercase().contains(needle) || item.summary.to_lowercase().contains(needle)
}
