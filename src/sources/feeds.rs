//! RSS 2.0 / Atom feed parsing and the news feed adapter.
//!
//! Feeds are parsed with `feed-rs` and reduced to a minimal entry shape
//! ([`FeedEntry`]). The YouTube creator adapter reuses the same parser for
//! channel feeds.

use super::{SourceContext, category, send_text};
use crate::config::FeedSource;
use crate::models::Record;
use crate::utils::{html_to_text, truncate_chars};
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::error::Error;
use tracing::{debug, error, info, instrument};

/// Body length kept for feed entries, in characters.
const FEED_BODY_CHARS: usize = 200;

static NAMED_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]{1,31});").expect("valid regex"));

/// A parsed feed, independent of the wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    /// Feed-level author (Atom only).
    pub author: Option<String>,
    pub entries: Vec<FeedEntry>,
}

/// One feed entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// Plain-text summary.
    pub summary: String,
    /// Publication time, falling back to the update time.
    pub published: Option<DateTime<Utc>>,
}

impl FeedEntry {
    /// Timestamp as written into records.
    pub fn timestamp(&self) -> String {
        self.published
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_default()
    }

    /// Whether the entry was published strictly after `cutoff`.
    ///
    /// Entries without a parseable date are never recent.
    pub fn is_after(&self, cutoff: DateTime<Utc>) -> bool {
        self.published.is_some_and(|dt| dt > cutoff)
    }
}

impl From<Entry> for FeedEntry {
    fn from(entry: Entry) -> Self {
        // Prefer the plain `<link>` / `rel="alternate"` over extra links
        // such as `<atom:link rel="standout">`.
        let link = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
            .or(entry.links.first())
            .map(|l| l.href.trim().to_string())
            .unwrap_or_default();
        let summary = entry
            .summary
            .map(|text| text.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .map(|html| html_to_text(&html))
            .unwrap_or_default();
        FeedEntry {
            title: entry
                .title
                .map(|t| t.content.trim().to_string())
                .unwrap_or_default(),
            link,
            summary,
            published: entry.published.or(entry.updated),
        }
    }
}

/// Rewrite HTML named entities as numeric character references.
///
/// XML only predefines five entities; feeds routinely carry `&nbsp;`,
/// `&eacute;` and friends outside CDATA. Names that are not HTML entities
/// either are escaped so they survive as literal text.
fn numeric_entities(xml: &str) -> Cow<'_, str> {
    NAMED_ENTITY.replace_all(xml, |caps: &Captures| {
        let whole = &caps[0];
        if matches!(&caps[1], "amp" | "lt" | "gt" | "quot" | "apos") {
            return whole.to_string();
        }
        let decoded = html_escape::decode_html_entities(whole);
        if decoded == whole {
            return format!("&amp;{}", &whole[1..]);
        }
        decoded.chars().map(|c| format!("&#{};", c as u32)).collect()
    })
}

/// Parse an RSS 2.0 or Atom document.
pub fn parse_feed(xml: &str) -> Result<ParsedFeed, Box<dyn Error>> {
    let xml = numeric_entities(xml);
    let feed = feed_rs::parser::parse(xml.as_bytes())?;
    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content.trim().to_string()),
        author: feed.authors.into_iter().next().map(|p| p.name),
        entries: feed.entries.into_iter().map(FeedEntry::from).collect(),
    })
}

/// Download and parse one feed.
pub(crate) async fn fetch_feed(ctx: &SourceContext, url: &str) -> Result<ParsedFeed, Box<dyn Error>> {
    let body = send_text(ctx.http.get(url)).await?;
    parse_feed(&body)
}

/// Map the recent head of a news feed to records.
pub fn news_records(
    feed: &ParsedFeed,
    source_name: &str,
    cutoff: DateTime<Utc>,
    max_entries: usize,
) -> Vec<Record> {
    feed.entries
        .iter()
        .take(max_entries)
        .filter(|entry| entry.is_after(cutoff))
        .filter_map(|entry| {
            Record::new(&entry.title, &entry.link, source_name, category::NEWS).map(|r| {
                r.with_body(truncate_chars(&entry.summary, FEED_BODY_CHARS))
                    .with_timestamp(entry.timestamp())
            })
        })
        .collect()
}

/// Fetch all configured news feeds.
///
/// A failing feed is logged and skipped; the others still contribute.
#[instrument(level = "info", skip_all)]
pub async fn fetch_news(ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
    let cutoff = ctx.yesterday();
    let max_entries = ctx.settings.thresholds.news_entries_per_feed;

    let per_feed: Vec<Vec<Record>> = stream::iter(ctx.settings.sources.news_feeds.iter())
        .then(|feed: &FeedSource| async move {
            match fetch_feed(ctx, &feed.url).await {
                Ok(parsed) => {
                    let records = news_records(&parsed, &feed.name, cutoff, max_entries);
                    info!(feed = %feed.name, count = records.len(), "Collected news entries");
                    records
                }
                Err(e) => {
                    error!(feed = %feed.name, url = %feed.url, error = %e, "News feed failed");
                    Vec::new()
                }
            }
        })
        .collect()
        .await;

    let records: Vec<Record> = per_feed.into_iter().flatten().collect();
    debug!(count = records.len(), "News feeds done");
    Ok(records)
}
