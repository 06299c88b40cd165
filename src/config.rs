use serde::Deserialize;
use std::path::Path;

use crate::selection::{SelectionPolicy, UnknownTimestamp};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// strftime pattern used for every `published` field in responses
    #[serde(default = "default_published_format")]
    pub published_format: String,
    /// Source name reported when neither the item nor the feed names one
    #[serde(default = "default_unknown_source")]
    pub unknown_source: String,
    /// Summary length cap in characters, 0 disables truncation
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Feed fetch timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    pub feeds: Vec<FeedConfig>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_published_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

fn default_unknown_source() -> String {
    "Unknown".to_string()
}

fn default_summary_max_chars() -> usize {
    500
}

fn default_search_limit() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SelectionConfig {
    #[serde(default = "default_primary_window_hours")]
    pub primary_window_hours: i64,
    /// 0 means "backfill from the whole feed regardless of age"
    #[serde(default = "default_fallback_window_hours")]
    pub fallback_window_hours: Option<i64>,
    #[serde(default = "default_min_acceptable")]
    pub min_acceptable: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_true")]
    pub sort_by_published: bool,
    #[serde(default)]
    pub unknown_timestamp: UnknownTimestamp,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            primary_window_hours: default_primary_window_hours(),
            fallback_window_hours: default_fallback_window_hours(),
            min_acceptable: default_min_acceptable(),
            max_results: default_max_results(),
            sort_by_published: true,
            unknown_timestamp: UnknownTimestamp::default(),
        }
    }
}

impl SelectionConfig {
    pub fn policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            primary_window: chrono::Duration::hours(self.primary_window_hours),
            fallback_window: self
                .fallback_window_hours
                .filter(|hours| *hours > 0)
                .map(chrono::Duration::hours),
            min_acceptable: self.min_acceptable,
            max_results: self.max_results,
            sort_by_published: self.sort_by_published,
            unknown_timestamp: self.unknown_timestamp,
        }
    }
}

fn default_primary_window_hours() -> i64 {
    12
}

fn default_fallback_window_hours() -> Option<i64> {
    Some(36)
}

fn default_min_acceptable() -> usize {
    3
}

fn default_max_results() -> usize {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranslationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// LibreTranslate-compatible `/translate` endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_target_language")]
    pub target_language: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_translation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            target_language: default_target_language(),
            api_key: None,
            timeout_secs: default_translation_timeout_secs(),
        }
    }
}

fn default_target_language() -> String {
    "zh-TW".to_string()
}

fn default_translation_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.feeds.is_empty() {
            anyhow::bail!("at least one [[feeds]] entry is required");
        }

        let selection = &self.selection;
        if selection.max_results == 0 {
            anyhow::bail!("selection.max_results must be positive");
        }
        if selection.primary_window_hours <= 0 {
            anyhow::bail!("selection.primary_window_hours must be positive");
        }
        if let Some(fallback) = selection.fallback_window_hours {
            if fallback > 0 && fallback < selection.primary_window_hours {
                anyhow::bail!(
                    "selection.fallback_window_hours ({}) is narrower than the primary window ({})",
                    fallback,
                    selection.primary_window_hours
                );
            }
        }

        let format_items = chrono::format::StrftimeItems::new(&self.published_format);
        if format_items
            .into_iter()
            .any(|item| matches!(item, chrono::format::Item::Error))
        {
            anyhow::bail!("published_format '{}' is not a valid strftime pattern", self.published_format);
        }

        if self.translation.enabled && self.translation.endpoint.is_none() {
            anyhow::bail!("translation.endpoint is required when translation is enabled");
        }

        Ok(())
    }
}
