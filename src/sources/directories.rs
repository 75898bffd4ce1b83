//! Tool and skill directories: the Smithery MCP registry and AI skill lists.
//!
//! Skills come from the first of three places that returns anything:
//! Smithery (only with `SMITHERY_API_KEY`), skillsmp.com, then a GitHub
//! search for prompt collections.

use super::github::{search_records, search_repositories};
use super::{SourceContext, category, lenient_string, lenient_u64, send_json};
use crate::models::Record;
use crate::utils::{group_thousands, truncate_chars};
use serde::Deserialize;
use serde_json::Value;
use std::error::Error;
use tracing::{debug, info, instrument, warn};

const PROMPT_COLLECTION_QUERY: &str =
    "awesome-chatgpt-prompts awesome-prompts prompt-engineering stars:>1000";

const DESCRIPTION_CHARS: usize = 200;

/// One directory entry. Registries name the same things differently, so
/// every field is optional and read through the accessors below.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Listing {
    pub display_name: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub qualified_name: Option<String>,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub url: Option<String>,
    pub link: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub use_count: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub downloads: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub uses: u64,
    pub verified: Option<bool>,
}

fn first_non_empty<'a>(fields: &[&'a Option<String>]) -> Option<&'a str> {
    fields
        .iter()
        .filter_map(|f| f.as_deref())
        .map(str::trim)
        .find(|s| !s.is_empty())
}

impl Listing {
    fn qualified_name(&self) -> &str {
        self.qualified_name.as_deref().unwrap_or_default()
    }

    fn description_or(&self, default: &str) -> String {
        let desc = first_non_empty(&[&self.description]).unwrap_or(default);
        truncate_chars(desc, DESCRIPTION_CHARS)
    }

    fn usage_extra(&self) -> String {
        let uses = format!("🔥 {} uses", group_thousands(self.use_count));
        if self.verified == Some(true) {
            format!("{uses} | ✅ verified")
        } else {
            uses
        }
    }
}

/// Entries of a payload that is either a list or an object holding the list
/// under one of `keys`.
pub fn entries(data: &Value, keys: &[&str]) -> Vec<Listing> {
    let list = match data {
        Value::Array(items) => Some(items),
        Value::Object(map) => keys
            .iter()
            .filter_map(|k| map.get(*k).and_then(Value::as_array))
            .find(|items| !items.is_empty()),
        _ => None,
    };
    list.into_iter()
        .flatten()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

pub fn mcp_records(servers: &[Listing], timestamp: &str, limit: usize) -> Vec<Record> {
    servers
        .iter()
        .take(limit)
        .filter_map(|s| {
            let name = first_non_empty(&[&s.display_name, &s.qualified_name])?;
            let url = first_non_empty(&[&s.homepage])
                .map(str::to_string)
                .unwrap_or_else(|| format!("https://smithery.ai/server/{}", s.qualified_name()));
            Record::new(name, url, "Smithery.ai", category::MCP_TOOLS).map(|r| {
                r.with_body(s.description_or("MCP tool"))
                    .with_timestamp(timestamp)
                    .with_extra(s.usage_extra())
            })
        })
        .collect()
}

pub fn smithery_skill_records(skills: &[Listing], timestamp: &str, limit: usize) -> Vec<Record> {
    skills
        .iter()
        .take(limit)
        .filter_map(|s| {
            let name = first_non_empty(&[&s.display_name, &s.name, &s.qualified_name])?;
            let url = first_non_empty(&[&s.homepage])
                .map(str::to_string)
                .unwrap_or_else(|| format!("https://smithery.ai/skill/{}", s.qualified_name()));
            Record::new(name, url, "Smithery Skills", category::AI_SKILLS).map(|r| {
                r.with_body(s.description_or("AI Skill"))
                    .with_timestamp(timestamp)
                    .with_extra(s.usage_extra())
            })
        })
        .collect()
}

pub fn skillsmp_records(skills: &[Listing], timestamp: &str, limit: usize) -> Vec<Record> {
    skills
        .iter()
        .take(limit)
        .filter_map(|s| {
            let name = first_non_empty(&[&s.name, &s.title])?;
            let url = first_non_empty(&[&s.url, &s.link])
                .map(str::to_string)
                .unwrap_or_else(|| format!("https://skillsmp.com/skill/{}", s.id));
            let uses = if s.downloads > 0 { s.downloads } else { s.uses };
            Record::new(name, url, "SkillsMP", category::AI_SKILLS).map(|r| {
                r.with_body(s.description_or("AI Skill"))
                    .with_timestamp(timestamp)
                    .with_extra(format!("🔥 {} uses", group_thousands(uses)))
            })
        })
        .collect()
}

/// Most used servers of the Smithery MCP registry.
#[instrument(level = "info", skip_all)]
pub async fn fetch_mcp_tools(ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
    let limit = ctx.settings.thresholds.listing_limit;
    let url = format!("{}/servers", ctx.settings.sources.endpoints.smithery_registry);
    let data: Value = send_json(
        ctx.http
            .get(url)
            .query(&[("limit", limit.to_string())]),
    )
    .await?;

    let records = mcp_records(&entries(&data, &["servers"]), &ctx.today_iso(), limit);
    info!(count = records.len(), "Collected MCP tools");
    Ok(records)
}

async fn smithery_skills(
    ctx: &SourceContext,
    key: &str,
) -> Result<Vec<Record>, Box<dyn Error>> {
    let limit = ctx.settings.thresholds.listing_limit;
    let url = format!("{}/skills", ctx.settings.sources.endpoints.smithery_registry);
    let data: Value = send_json(
        ctx.http
            .get(url)
            .bearer_auth(key)
            .query(&[("limit", limit.to_string())]),
    )
    .await?;
    Ok(smithery_skill_records(
        &entries(&data, &["skills"]),
        &ctx.today_iso(),
        limit,
    ))
}

async fn skillsmp_skills(ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
    let limit = ctx.settings.thresholds.listing_limit;
    let data: Value = send_json(
        ctx.http
            .get(&ctx.settings.sources.endpoints.skillsmp_skills)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("limit", limit.to_string().as_str()), ("sort", "popular")]),
    )
    .await?;
    Ok(skillsmp_records(
        &entries(&data, &["skills", "data"]),
        &ctx.today_iso(),
        limit,
    ))
}

/// Popular AI skills from the first directory that answers.
#[instrument(level = "info", skip_all)]
pub async fn fetch_skills(ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
    match ctx.credentials.smithery.as_deref() {
        Some(key) => match smithery_skills(ctx, key).await {
            Ok(records) if !records.is_empty() => {
                info!(count = records.len(), provider = "smithery", "Collected skills");
                return Ok(records);
            }
            Ok(_) => warn!(provider = "smithery", "No skills returned"),
            Err(e) => warn!(provider = "smithery", error = %e, "Skill directory failed"),
        },
        None => debug!("SMITHERY_API_KEY not set, skipping Smithery skills"),
    }

    match skillsmp_skills(ctx).await {
        Ok(records) if !records.is_empty() => {
            info!(count = records.len(), provider = "skillsmp", "Collected skills");
            return Ok(records);
        }
        Ok(_) => warn!(provider = "skillsmp", "No skills returned"),
        Err(e) => warn!(provider = "skillsmp", error = %e, "Skill directory failed"),
    }

    let limit = ctx.settings.thresholds.listing_limit;
    let search = search_repositories(ctx, PROMPT_COLLECTION_QUERY, limit).await?;
    let records = search_records(
        &search,
        "GitHub Skills",
        category::AI_SKILLS,
        "AI skills project",
        &ctx.today_iso(),
        limit,
    );
    info!(count = records.len(), provider = "github", "Collected skills");
    Ok(records)
}
