//! HuggingFace Hub trending models.

use super::{SourceContext, category, lenient_string, lenient_u64, send_json};
use crate::models::Record;
use crate::utils::{format_score, group_thousands};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::error::Error;
use tracing::{info, instrument};

/// Tag prefixes that never describe a task.
const NON_TASK_PREFIXES: [&str; 3] = ["license:", "region:", "arxiv:"];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubModel {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub downloads: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub likes: u64,
    pub trending_score: Option<f64>,
    #[serde(deserialize_with = "tag_list")]
    pub tags: Vec<String>,
}

/// Tags as a list of strings; `null` and non-string entries are dropped.
fn tag_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(tags)) => tags
            .into_iter()
            .filter_map(|tag| match tag {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

impl HubModel {
    /// First tag that names a task, else `model`.
    pub fn task(&self) -> &str {
        self.tags
            .iter()
            .map(String::as_str)
            .find(|tag| !NON_TASK_PREFIXES.iter().any(|p| tag.starts_with(p)))
            .unwrap_or("model")
    }

    fn to_record(&self, timestamp: &str) -> Option<Record> {
        let score = format_score(self.trending_score.unwrap_or(0.0));
        Record::new(
            &self.id,
            format!("https://huggingface.co/{}", self.id),
            "HuggingFace",
            category::HUGGINGFACE_TRENDING,
        )
        .map(|r| {
            r.with_body(format!("{} | trending: {score}", self.task()))
                .with_timestamp(timestamp)
                .with_extra(format!(
                    "📥 {} downloads | ❤️ {} likes | 🔥 trending {score}",
                    group_thousands(self.downloads),
                    self.likes
                ))
        })
    }
}

/// Map a model listing into records. The listing must be a JSON array;
/// entries that are not objects or have no id are skipped.
pub fn model_records(
    listing: &Value,
    timestamp: &str,
    limit: usize,
) -> Result<Vec<Record>, Box<dyn Error>> {
    let Some(models) = listing.as_array() else {
        return Err("model listing is not a list".into());
    };
    Ok(models
        .iter()
        .take(limit)
        .filter(|m| m.is_object())
        .filter_map(|m| serde_json::from_value::<HubModel>(m.clone()).ok())
        .filter_map(|m| m.to_record(timestamp))
        .collect())
}

/// Top models by trending score.
#[instrument(level = "info", skip_all)]
pub async fn fetch_trending(ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
    let limit = ctx.settings.thresholds.listing_limit;
    let url = &ctx.settings.sources.endpoints.huggingface_models;
    let listing: Value = send_json(ctx.http.get(url).query(&[
        ("limit", limit.to_string().as_str()),
        ("sort", "trendingScore"),
    ]))
    .await?;

    let records = model_records(&listing, &ctx.today_iso(), limit)?;
    info!(count = records.len(), "Collected trending models");
    Ok(records)
}
