//! Static HTML page rendered from the latest digest document.
//!
//! The page is one self-contained file: a header with the date, a summary
//! panel, then one section of cards per non-empty category. A degraded
//! document gets a red summary panel so the failure is visible on the page.

use super::json::read_latest;
use crate::models::{DigestDocument, Record};
use crate::utils::truncate_chars;
use askama::Template;
use chrono::Local;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// Characters of a record body shown on its card.
const CARD_BODY_CHARS: usize = 150;

/// The digest page. Every interpolated value is HTML-escaped by the template.
#[derive(Template)]
#[template(path = "digest.html")]
pub struct DigestPage<'a> {
    date: &'a str,
    doc: &'a DigestDocument,
    updated_at: &'a str,
    degraded: bool,
    /// Error text shown in a degraded summary panel; empty otherwise.
    error: &'a str,
    sections: Vec<Section<'a>>,
}

struct Section<'a> {
    label: &'a str,
    cards: Vec<Card<'a>>,
}

struct Card<'a> {
    title: &'a str,
    url: &'a str,
    body: String,
    extra: &'a str,
    source: &'a str,
    /// Date part of the record timestamp.
    date: String,
}

impl<'a> From<&'a Record> for Card<'a> {
    fn from(record: &'a Record) -> Self {
        Card {
            title: &record.title,
            url: &record.url,
            body: truncate_chars(&record.body, CARD_BODY_CHARS),
            extra: record.extra.as_deref().unwrap_or_default(),
            source: &record.source_name,
            date: truncate_chars(&record.timestamp, 10),
        }
    }
}

impl<'a> DigestPage<'a> {
    pub fn new(doc: &'a DigestDocument, updated_at: &'a str) -> Self {
        let degraded = doc.is_degraded();
        let sections = doc
            .categories
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(label, records)| Section {
                label,
                cards: records.iter().map(Card::from).collect(),
            })
            .collect();
        DigestPage {
            date: &doc.date,
            doc,
            updated_at,
            degraded,
            error: doc.error.as_deref().filter(|_| degraded).unwrap_or_default(),
            sections,
        }
    }
}

/// Render `doc` as a complete HTML page.
pub fn render_page(doc: &DigestDocument, updated_at: &str) -> Result<String, askama::Error> {
    DigestPage::new(doc, updated_at).render()
}

/// Render `{data_dir}/latest.json` into `index.html` and a dated page.
///
/// Returns the paths written.
#[instrument(level = "info", skip_all, fields(data_dir = %data_dir.display(), docs_dir = %docs_dir.display()))]
pub async fn render_latest(data_dir: &Path, docs_dir: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let doc = read_latest(data_dir).await?;
    let updated_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let page = render_page(&doc, &updated_at)?;

    fs::create_dir_all(docs_dir).await?;
    let stem = if doc.date.is_empty() { "latest" } else { doc.date.as_str() };
    let paths = vec![
        docs_dir.join("index.html"),
        docs_dir.join(format!("digest_{stem}.html")),
    ];
    for path in &paths {
        fs::write(path, &page).await?;
        info!(path = %path.display(), degraded = doc.is_degraded(), "Wrote HTML page");
    }
    Ok(paths)
}
