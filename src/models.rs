//! Data models for collected items and the published digest.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Record`]: One normalized item, whatever provider it came from
//! - [`Categories`]: Ordered mapping from category label to records
//! - [`Analysis`]: The summary block written by the LLM
//! - [`DigestDocument`]: The structured output of one run
//!
//! Category labels are used both as display headings and as grouping keys,
//! so the same string must be used everywhere a category is referenced.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use crate::sources::{lenient_opt_string, lenient_string};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Reserved category holding raw records in a degraded document.
pub const FALLBACK_CATEGORY: &str = "Raw Data";

/// Marker prefixed to summaries that describe a degraded run.
pub const DEGRADED_MARKER: &str = "⚠️";

/// Summary used when no batch supplies an analysis block.
pub const DEFAULT_SUMMARY: &str = "Today's AI digest";

/// A single normalized item collected from a source.
///
/// Every source adapter maps its provider payload into this shape. The
/// `category` is the only grouping key used downstream; inside a
/// [`DigestDocument`] it is carried by the enclosing map key instead.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Record {
    /// Short display string.
    #[serde(deserialize_with = "lenient_string")]
    pub title: String,
    /// Free-text content, possibly empty.
    #[serde(alias = "content", deserialize_with = "lenient_string")]
    pub body: String,
    /// Provider-native date string; not normalized across sources.
    #[serde(alias = "date", deserialize_with = "lenient_string")]
    pub timestamp: String,
    /// Provider, account or channel label.
    #[serde(alias = "source", deserialize_with = "lenient_string")]
    pub source_name: String,
    /// Digest section this record belongs to.
    #[serde(
        skip_serializing_if = "String::is_empty",
        deserialize_with = "lenient_string"
    )]
    pub category: String,
    /// Link to the original item.
    #[serde(alias = "link", deserialize_with = "lenient_string")]
    pub url: String,
    /// Provider-specific metrics rendered as one display string.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub extra: Option<String>,
}

impl Record {
    /// Build a record, or `None` when the title is blank.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source_name: impl Into<String>,
        category: impl Into<String>,
    ) -> Option<Self> {
        let title = title.into();
        if title.trim().is_empty() {
            return None;
        }
        Some(Self {
            title,
            url: url.into(),
            source_name: source_name.into(),
            category: category.into(),
            ..Self::default()
        })
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        let extra = extra.into();
        self.extra = if extra.is_empty() { None } else { Some(extra) };
        self
    }

    /// Copy of this record without its category, as stored inside a digest.
    pub fn without_category(&self) -> Self {
        Self {
            category: String::new(),
            ..self.clone()
        }
    }
}

/// Ordered mapping from category label to records.
///
/// Insertion order is preserved on both serialization and deserialization,
/// which keeps the section order of the digest stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Categories(Vec<(String, Vec<Record>)>);

impl Categories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records to `label`, creating the category on first use.
    pub fn extend(&mut self, label: &str, records: impl IntoIterator<Item = Record>) {
        match self.0.iter_mut().find(|(name, _)| name == label) {
            Some((_, existing)) => existing.extend(records),
            None => self.0.push((label.to_string(), records.into_iter().collect())),
        }
    }

    pub fn push(&mut self, label: &str, record: Record) {
        self.extend(label, std::iter::once(record));
    }

    pub fn get(&self, label: &str) -> Option<&[Record]> {
        self.0
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, records)| records.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Record])> {
        self.0
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of records across all categories.
    pub fn total(&self) -> usize {
        self.0.iter().map(|(_, records)| records.len()).sum()
    }

    /// Cap every category at `max` records, keeping the earliest.
    pub fn truncate_each(&mut self, max: usize) {
        for (_, records) in &mut self.0 {
            records.truncate(max);
        }
    }

    /// Read a `{label: [record, ...]}` object produced by the model.
    ///
    /// Malformed entries are skipped instead of failing the whole value:
    /// non-array categories, items that are not records, and records with a
    /// blank title.
    pub fn from_value_lenient(value: &Value) -> Self {
        let mut categories = Self::new();
        let Some(object) = value.as_object() else {
            return categories;
        };
        for (label, items) in object {
            let Some(items) = items.as_array() else {
                continue;
            };
            let records = items
                .iter()
                .filter_map(|item| match serde_json::from_value::<Record>(item.clone()) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        debug!(%label, error = %e, "Skipping malformed record");
                        None
                    }
                })
                .filter(|record| !record.title.trim().is_empty())
                .map(|record| record.without_category());
            categories.extend(label, records);
        }
        categories
    }
}

impl Serialize for Categories {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, records) in &self.0 {
            map.serialize_entry(label, records)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Categories {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CategoriesVisitor;

        impl<'de> Visitor<'de> for CategoriesVisitor {
            type Value = Categories;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of category label to records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Categories, A::Error> {
                let mut categories = Categories::new();
                while let Some((label, records)) = access.next_entry::<String, Vec<Record>>()? {
                    categories.extend(&label, records);
                }
                Ok(categories)
            }
        }

        deserializer.deserialize_map(CategoriesVisitor)
    }
}

/// Summary block of the digest.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Analysis {
    pub summary: String,
    pub trends: Vec<String>,
}

impl Analysis {
    pub fn placeholder() -> Self {
        Self {
            summary: DEFAULT_SUMMARY.to_string(),
            trends: Vec::new(),
        }
    }
}

/// The structured output of one run.
///
/// Written once to a dated file and to `latest.json`. Degraded runs carry an
/// `error` and a single [`FALLBACK_CATEGORY`] of raw records.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DigestDocument {
    /// Run date in `YYYY-MM-DD` format.
    pub date: String,
    #[serde(default)]
    pub categories: Categories,
    #[serde(default)]
    pub analysis: Analysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DigestDocument {
    /// Maximum number of raw records kept in a degraded document.
    pub const FALLBACK_RECORD_LIMIT: usize = 5;

    /// Build a degraded document from raw records.
    pub fn fallback(date: &str, error: &str, summary: &str, records: &[Record]) -> Self {
        let mut categories = Categories::new();
        categories.extend(
            FALLBACK_CATEGORY,
            records
                .iter()
                .take(Self::FALLBACK_RECORD_LIMIT)
                .map(Record::without_category),
        );
        Self {
            date: date.to_string(),
            categories,
            analysis: Analysis {
                summary: summary.to_string(),
                trends: Vec::new(),
            },
            error: Some(error.to_string()),
        }
    }

    /// Whether the document describes a degraded run.
    pub fn is_degraded(&self) -> bool {
        self.error.is_some() || self.analysis.summary.contains(DEGRADED_MARKER)
    }
}
