//! GitHub trending repositories and agent projects.
//!
//! Trending lists have no official API. Each window walks the configured
//! endpoint templates in order (community trending mirrors first, GitHub
//! search last) and keeps the first endpoint that yields records. The
//! mirrors disagree on field names, so their items are read as untyped JSON.

use super::{SourceContext, category, send_json};
use crate::models::Record;
use crate::utils::{group_thousands, truncate_chars};
use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;
use std::error::Error;
use tracing::{info, instrument, warn};
use url::Url;

/// Description length kept for repositories, in characters.
const DESCRIPTION_CHARS: usize = 200;

const AGENT_QUERY: &str = "ai agent llm autonomous stars:>1000";

/// One trending window.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    /// Value of the `{period}` placeholder.
    pub period: &'static str,
    pub label: &'static str,
    pub min_stars: u32,
    /// Days before now used for `{pushed_after}`.
    pub lookback_days: i64,
}

pub const WINDOWS: [Window; 2] = [
    Window {
        period: "daily",
        label: "Trending Today",
        min_stars: 1000,
        lookback_days: 1,
    },
    Window {
        period: "weekly",
        label: "Trending This Week",
        min_stars: 500,
        lookback_days: 7,
    },
];

/// Repository as returned by the GitHub search API.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchRepo {
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: Option<String>,
    pub stargazers_count: u64,
    pub language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    pub items: Vec<SearchRepo>,
}

/// Substitute the window placeholders of an endpoint template.
pub fn fill_template(template: &str, window: &Window, pushed_after: &str) -> String {
    template
        .replace("{period}", window.period)
        .replace("{min_stars}", &window.min_stars.to_string())
        .replace("{pushed_after}", pushed_after)
}

/// First non-empty string among `keys`.
fn str_field<'a>(repo: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| repo.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// First non-zero count among `keys`; mirrors sometimes send `"1,234"`.
fn count_field(repo: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .filter_map(|k| repo.get(*k))
        .map(|v| match v {
            Value::Number(n) => n.as_u64().unwrap_or(0),
            Value::String(s) => s.trim().replace(',', "").parse().unwrap_or(0),
            _ => 0,
        })
        .find(|&n| n > 0)
        .unwrap_or(0)
}

/// Repository list of a payload: `items` for GitHub search, the array itself
/// for trending mirrors.
pub fn repositories(data: &Value) -> &[Value] {
    match data {
        Value::Object(map) => map
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        Value::Array(items) => items,
        _ => &[],
    }
}

/// Normalize one trending item, whatever endpoint it came from.
pub fn trending_record(repo: &Value, label: &str, timestamp: &str) -> Option<Record> {
    let (author, name) = match str_field(repo, &["full_name"]) {
        Some(full) => full.split_once('/').unwrap_or(("", full)),
        None => (
            str_field(repo, &["author", "username"]).unwrap_or_default(),
            str_field(repo, &["name", "reponame"]).unwrap_or_default(),
        ),
    };
    if author.is_empty() || name.is_empty() {
        return None;
    }

    let language = str_field(repo, &["language", "programmingLanguage"]).unwrap_or("Unknown");
    let body = match str_field(repo, &["description"]) {
        Some(desc) => truncate_chars(desc, DESCRIPTION_CHARS),
        None => format!("{language} project"),
    };
    let stars = count_field(repo, &["stars", "totalStars", "stargazers_count"]);
    let today = count_field(repo, &["starsSince", "starsToday"]);
    let extra = if today > 0 {
        format!(
            "⭐ {} | 🔥 +{} | 💻 {language}",
            group_thousands(stars),
            group_thousands(today)
        )
    } else {
        format!("⭐ {} | 💻 {language}", group_thousands(stars))
    };
    let url = str_field(repo, &["url", "html_url"])
        .map(str::to_string)
        .unwrap_or_else(|| format!("https://github.com/{author}/{name}"));
    let section = category::github_trending(label);

    Record::new(format!("{author}/{name}"), url, &section, &section).map(|r| {
        r.with_body(body)
            .with_timestamp(timestamp)
            .with_extra(extra)
    })
}

/// Map GitHub search results into records of one section.
pub(crate) fn search_records(
    search: &SearchResponse,
    source_name: &str,
    section: &str,
    default_body: &str,
    timestamp: &str,
    limit: usize,
) -> Vec<Record> {
    search
        .items
        .iter()
        .take(limit)
        .filter_map(|repo| {
            let body = repo
                .description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(default_body);
            let url = repo
                .html_url
                .clone()
                .unwrap_or_else(|| format!("https://github.com/{}", repo.full_name));
            let extra = format!(
                "⭐ {} | 💻 {}",
                group_thousands(repo.stargazers_count),
                repo.language.as_deref().unwrap_or("Unknown")
            );
            Record::new(&repo.full_name, url, source_name, section).map(|r| {
                r.with_body(truncate_chars(body, DESCRIPTION_CHARS))
                    .with_timestamp(timestamp)
                    .with_extra(extra)
            })
        })
        .collect()
}

/// Search repositories sorted by stars, `limit` per page.
pub(crate) async fn search_repositories(
    ctx: &SourceContext,
    query: &str,
    limit: usize,
) -> Result<SearchResponse, Box<dyn Error>> {
    let per_page = limit.to_string();
    let url = &ctx.settings.sources.endpoints.github_search;
    send_json(ctx.http.get(url).query(&[
        ("q", query),
        ("sort", "stars"),
        ("order", "desc"),
        ("per_page", per_page.as_str()),
    ]))
    .await
}

async fn try_endpoint(
    ctx: &SourceContext,
    url: &str,
    window: &Window,
) -> Result<Vec<Record>, Box<dyn Error>> {
    let url = Url::parse(url)?;
    let data: Value = send_json(ctx.http.get(url)).await?;
    let timestamp = ctx.today_iso();
    Ok(repositories(&data)
        .iter()
        .take(ctx.settings.thresholds.listing_limit)
        .filter_map(|repo| trending_record(repo, window.label, &timestamp))
        .collect())
}

/// Walk the endpoint chain for one window; empty when every endpoint fails.
#[instrument(level = "info", skip(ctx), fields(period = window.period))]
async fn fetch_window(ctx: &SourceContext, window: &Window) -> Vec<Record> {
    let pushed_after = (ctx.now - Duration::days(window.lookback_days))
        .format("%Y-%m-%d")
        .to_string();

    for template in &ctx.settings.sources.github_trending_endpoints {
        let url = fill_template(template, window, &pushed_after);
        match try_endpoint(ctx, &url, window).await {
            Ok(records) if !records.is_empty() => {
                info!(%url, count = records.len(), "Collected trending repositories");
                return records;
            }
            Ok(_) => warn!(%url, "Endpoint returned no usable repositories"),
            Err(e) => warn!(%url, error = %e, "Endpoint failed"),
        }
    }
    warn!(label = window.label, "All trending endpoints failed");
    Vec::new()
}

/// Trending repositories for today and for this week.
#[instrument(level = "info", skip_all)]
pub async fn fetch_trending(ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
    let mut records = Vec::new();
    for window in &WINDOWS {
        records.extend(fetch_window(ctx, window).await);
    }
    Ok(records)
}

/// Most starred autonomous agent repositories.
#[instrument(level = "info", skip_all)]
pub async fn fetch_agents(ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
    let limit = ctx.settings.thresholds.listing_limit;
    let search = search_repositories(ctx, AGENT_QUERY, limit).await?;
    let records = search_records(
        &search,
        "GitHub AI Agent",
        category::AGENT_PROJECTS,
        "AI agent project",
        &ctx.today_iso(),
        limit,
    );
    info!(count = records.len(), "Collected agent projects");
    Ok(records)
}
