use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use reqwest::{Client, StatusCode};
use tracing::{info, warn};

use crate::config::FeedConfig;

/// One feed entry as delivered by the source, every field optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub title: Option<String>,
    /// Markup-bearing summary or content body
    pub summary: Option<String>,
    /// Date as understood by the feed parser
    pub published: Option<DateTime<Utc>>,
    /// Raw `<pubDate>` text, kept for dates the parser rejected
    pub published_raw: Option<String>,
    pub source: Option<String>,
    pub link: Option<String>,
}

/// Per-item fields feed_rs doesn't expose, recovered from the raw XML.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItemFields {
    pub pub_date: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("could not parse feed from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: parser::ParseFeedError,
    },
}

/// Anything that can turn a configured feed into raw entries.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, feed: &FeedConfig) -> Result<Vec<RawEntry>, FetchError>;
}

pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("SmartNews/1.0 (News Aggregator)")
            .build()?;

        Ok(Self { client })
    }

    /// Parse a feed document into raw entries, in document order.
    pub fn parse_entries(bytes: &[u8]) -> Result<Vec<RawEntry>, parser::ParseFeedError> {
        // feed_rs drops unparsable dates and RSS <source> names, so grab them from the XML
        let extra = Self::extract_item_fields_from_xml(bytes);

        let parsed = parser::parse(bytes)?;
        let feed_title = parsed.title.map(|t| t.content);

        Ok(parsed
            .entries
            .into_iter()
            .map(|entry| Self::raw_entry(entry, feed_title.as_deref(), &extra))
            .collect())
    }

    pub fn raw_entry(
        entry: feed_rs::model::Entry,
        feed_title: Option<&str>,
        extra: &HashMap<String, RawItemFields>,
    ) -> RawEntry {
        let link = entry
            .links
            .first()
            .map(|l| l.href.trim().to_string())
            .filter(|href| !href.is_empty())
            .or_else(|| {
                // RSS permalink guids double as the article URL
                let id = entry.id.trim();
                (id.starts_with("http://") || id.starts_with("https://")).then(|| id.to_string())
            });

        let fields = link
            .as_ref()
            .and_then(|l| extra.get(l))
            .or_else(|| extra.get(entry.id.trim()));

        let summary = entry
            .summary
            .map(|s| s.content)
            .filter(|s| !s.trim().is_empty())
            .or_else(|| entry.content.and_then(|c| c.body));

        let published: Option<DateTime<Utc>> = entry.published.or(entry.updated);

        let source = fields
            .and_then(|f| f.source.clone())
            .or_else(|| feed_title.map(str::to_string));

        RawEntry {
            title: entry.title.map(|t| t.content),
            summary,
            published,
            published_raw: fields.and_then(|f| f.pub_date.clone()),
            source,
            link,
        }
    }

    /// Map each RSS item's `<link>` and `<guid>` to its raw `<pubDate>` and `<source>` text.
    pub fn extract_item_fields_from_xml(xml_bytes: &[u8]) -> HashMap<String, RawItemFields> {
        let mut fields_map = HashMap::new();
        let xml_str = match std::str::from_utf8(xml_bytes) {
            Ok(s) => s,
            Err(_) => return fields_map,
        };

        for item in Self::item_blocks(xml_str) {
            // Markup bodies may embed HTML such as <picture><source ...>
            let children = Self::strip_element(&Self::strip_element(item, "description"), "content:encoded");

            let keys: Vec<String> = ["link", "guid"]
                .iter()
                .filter_map(|tag| Self::extract_xml_element(&children, tag))
                .filter(|key| !key.is_empty())
                .collect();
            if keys.is_empty() {
                continue;
            }

            let fields = RawItemFields {
                pub_date: Self::extract_xml_element(&children, "pubDate").filter(|s| !s.is_empty()),
                source: Self::extract_xml_element(&children, "source").filter(|s| !s.is_empty()),
            };
            for key in keys {
                fields_map.entry(key).or_insert_with(|| fields.clone());
            }
        }

        fields_map
    }

    /// Copy of `xml` with every `tag` element removed, CDATA bodies included.
    fn strip_element(xml: &str, tag: &str) -> String {
        let end_tag = format!("</{}>", tag);
        let mut out = String::with_capacity(xml.len());
        let mut rest = xml;

        while let Some(body_start) = Self::find_open_tag(rest, tag) {
            let tag_start = rest[..body_start].rfind('<').unwrap_or(0);
            out.push_str(&rest[..tag_start]);

            let body = &rest[body_start..];
            let skip = match body.trim_start().strip_prefix("<![CDATA[") {
                Some(cdata) => match cdata.find("]]>") {
                    Some(close) => body.len() - cdata.len() + close + 3,
                    None => body.len(),
                },
                None => 0,
            };
            rest = match body[skip..].find(&end_tag) {
                Some(end) => &body[skip + end + end_tag.len()..],
                None => "",
            };
        }

        out.push_str(rest);
        out
    }

    fn item_blocks(xml: &str) -> Vec<&str> {
        let mut blocks = Vec::new();
        let mut rest = xml;

        while let Some(start) = Self::find_open_tag(rest, "item") {
            let body = &rest[start..];
            let end = body.find("</item>").unwrap_or(body.len());
            blocks.push(&body[..end]);
            rest = &body[end..];
        }

        blocks
    }

    /// Byte offset just past the `>` of the first `<tag>` or `<tag attr=...>`.
    fn find_open_tag(xml: &str, tag: &str) -> Option<usize> {
        let needle = format!("<{}", tag);
        let mut offset = 0;

        while let Some(pos) = xml[offset..].find(&needle) {
            let after = offset + pos + needle.len();
            match xml[after..].chars().next() {
                Some('>') => return Some(after + 1),
                Some(c) if c.is_whitespace() => {
                    let close = xml[after..].find('>')? + after;
                    if xml[..close].ends_with('/') {
                        offset = close + 1;
                        continue;
                    }
                    return Some(close + 1);
                }
                _ => offset = after,
            }
        }

        None
    }

    /// Text content of the first `tag` element, CDATA unwrapped and entities decoded.
    pub fn extract_xml_element(xml: &str, tag: &str) -> Option<String> {
        let start = Self::find_open_tag(xml, tag)?;
        let end_tag = format!("</{}>", tag);
        let end = xml[start..].find(&end_tag)? + start;

        let text = xml[start..end].trim();
        let text = text
            .strip_prefix("<![CDATA[")
            .and_then(|t| t.strip_suffix("]]>"))
            .unwrap_or(text);

        Some(html_escape::decode_html_entities(text.trim()).into_owned())
    }
}

#[async_trait]
impl FeedSource for Fetcher {
    async fn fetch(&self, feed: &FeedConfig) -> Result<Vec<RawEntry>, FetchError> {
        info!("Fetching feed: {} ({})", feed.name, feed.url);

        let transport = |source| FetchError::Transport {
            url: feed.url.clone(),
            source,
        };

        let response = self.client.get(&feed.url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: feed.url.clone(),
                status,
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        let entries = Self::parse_entries(&bytes).map_err(|source| FetchError::Parse {
            url: feed.url.clone(),
            source,
        })?;

        if entries.is_empty() {
            warn!("Feed '{}' returned no entries", feed.name);
        } else {
            info!("Fetched {} entries from feed '{}'", entries.len(), feed.name);
        }

        Ok(entries)
    }
}

/// Fetch every feed in order; a failing feed is logged and contributes nothing.
pub async fn fetch_all(source: &dyn FeedSource, feeds: &[FeedConfig]) -> Vec<RawEntry> {
    let mut entries = Vec::new();

    for feed in feeds {
        match source.fetch(feed).await {
            Ok(mut fetched) => entries.append(&mut fetched),
            Err(e) => warn!("Feed '{}' unavailable: {}", feed.name, e),
        }
    }

    entries
}
