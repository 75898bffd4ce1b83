//! Source adapters: fetch, filter and normalize items from each provider.
//!
//! Every adapter maps its provider's payload into [`Record`]s and returns
//! them; nothing is shared between adapters. Adapters that need a credential
//! return an empty list without touching the network when it is missing.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Credential | Filter |
//! |--------|--------|--------|------------|--------|
//! | News feeds | [`feeds`] | RSS / Atom | none | published in the last 24h, first 10 per feed |
//! | YouTube creators | [`youtube`] | Atom | none | published in the last 24h, first 3 per channel |
//! | YouTube trending | [`youtube`] | Data API v3 | `YOUTUBE_API_KEY` | views > 200k |
//! | Twitter search | [`twitter`] | twitterapi.io | `TWITTER_API_KEY` | views > 10k and heat > 1k |
//! | Twitter accounts | [`twitter`] | twitterapi.io | `TWITTER_API_KEY` | 5 latest per account |
//! | TikTok search | [`tiktok`] | RapidAPI | `RAPIDAPI_KEY` | plays > 100k, plays/followers > 3, 14 days |
//! | GitHub trending | [`github`] | fallback chain | none | first endpoint with results |
//! | GitHub agents | [`github`] | Search API | none | stars > 1000 |
//! | MCP tools | [`directories`] | Smithery registry | none | top 10 |
//! | AI skills | [`directories`] | fallback chain | `SMITHERY_API_KEY` (optional) | first endpoint with results |
//! | HuggingFace | [`huggingface`] | Hub API | none | top 10 |

use crate::config::Settings;
use crate::models::Record;
use chrono::{DateTime, Duration, Local, Utc};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::error::Error;
use std::time::Duration as StdDuration;

pub mod directories;
pub mod feeds;
pub mod github;
pub mod huggingface;
pub mod tiktok;
pub mod twitter;
pub mod youtube;

/// Browser-like user agent; several public endpoints reject bare clients.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; ai-daily-digest/0.1)";

/// Section labels. Each one is both the display heading and the grouping key.
pub mod category {
    pub const NEWS: &str = "News";
    pub const YOUTUBE_CREATORS: &str = "YouTube Creators";
    pub const YOUTUBE_TRENDING: &str = "YouTube Trending";
    pub const TWITTER_TRENDING: &str = "Twitter Trending";
    pub const COMPANY_UPDATES: &str = "Company Updates";
    pub const TIKTOK_TRENDING: &str = "TikTok Trending";
    pub const AGENT_PROJECTS: &str = "AI Agent Projects";
    pub const MCP_TOOLS: &str = "MCP Tools";
    pub const AI_SKILLS: &str = "AI Skills";
    pub const HUGGINGFACE_TRENDING: &str = "HuggingFace Trending";

    /// Label for a GitHub trending window, e.g. `GitHub Trending Today`.
    pub fn github_trending(window_label: &str) -> String {
        format!("GitHub {window_label}")
    }
}

/// API keys read from the environment. `None` disables the dependent source.
#[derive(Clone, Default)]
pub struct Credentials {
    pub llm: Option<String>,
    pub youtube: Option<String>,
    pub twitter: Option<String>,
    pub rapidapi: Option<String>,
    pub smithery: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("llm", &self.llm.is_some())
            .field("youtube", &self.youtube.is_some())
            .field("twitter", &self.twitter.is_some())
            .field("rapidapi", &self.rapidapi.is_some())
            .field("smithery", &self.smithery.is_some())
            .finish()
    }
}

/// Everything an adapter may read: HTTP client, credentials, settings, clock.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub http: reqwest::Client,
    pub credentials: Credentials,
    pub settings: Settings,
    /// Time reference of the run.
    pub now: DateTime<Local>,
}

impl SourceContext {
    pub fn new(
        credentials: Credentials,
        settings: Settings,
        now: DateTime<Local>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(settings.sources.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            credentials,
            settings,
            now,
        })
    }

    /// Rolling recency cutoff: 24 hours before the run started.
    pub fn yesterday(&self) -> DateTime<Utc> {
        self.now.with_timezone(&Utc) - Duration::days(1)
    }

    /// Timestamp used for listings that have no publication date.
    pub fn today_iso(&self) -> String {
        self.now.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

/// The adapters, in the order the collector runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    NewsFeeds,
    YoutubeCreators,
    YoutubeTrending,
    TwitterSearch,
    TwitterAccounts,
    TiktokSearch,
    GithubTrending,
    GithubAgents,
    McpTools,
    AiSkills,
    HuggingFace,
}

impl Source {
    pub const ALL: [Source; 11] = [
        Source::NewsFeeds,
        Source::YoutubeCreators,
        Source::YoutubeTrending,
        Source::TwitterSearch,
        Source::TwitterAccounts,
        Source::TiktokSearch,
        Source::GithubTrending,
        Source::GithubAgents,
        Source::McpTools,
        Source::AiSkills,
        Source::HuggingFace,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Source::NewsFeeds => "news_feeds",
            Source::YoutubeCreators => "youtube_creators",
            Source::YoutubeTrending => "youtube_trending",
            Source::TwitterSearch => "twitter_search",
            Source::TwitterAccounts => "twitter_accounts",
            Source::TiktokSearch => "tiktok_search",
            Source::GithubTrending => "github_trending",
            Source::GithubAgents => "github_agents",
            Source::McpTools => "mcp_tools",
            Source::AiSkills => "ai_skills",
            Source::HuggingFace => "huggingface",
        }
    }

    /// Run the adapter.
    pub async fn fetch(self, ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
        match self {
            Source::NewsFeeds => feeds::fetch_news(ctx).await,
            Source::YoutubeCreators => youtube::fetch_creators(ctx).await,
            Source::YoutubeTrending => youtube::fetch_trending(ctx).await,
            Source::TwitterSearch => twitter::fetch_search(ctx).await,
            Source::TwitterAccounts => twitter::fetch_accounts(ctx).await,
            Source::TiktokSearch => tiktok::fetch_search(ctx).await,
            Source::GithubTrending => github::fetch_trending(ctx).await,
            Source::GithubAgents => github::fetch_agents(ctx).await,
            Source::McpTools => directories::fetch_mcp_tools(ctx).await,
            Source::AiSkills => directories::fetch_skills(ctx).await,
            Source::HuggingFace => huggingface::fetch_trending(ctx).await,
        }
    }
}

/// Error for a non-success HTTP status.
#[derive(Debug)]
pub struct HttpStatusError {
    pub url: String,
    pub status: u16,
}

impl std::fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {} from {}", self.status, self.url)
    }
}

impl Error for HttpStatusError {}

/// Send a request and decode a JSON body, failing on non-success statuses.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
) -> Result<T, Box<dyn Error>> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Box::new(HttpStatusError {
            url: response.url().to_string(),
            status: status.as_u16(),
        }));
    }
    Ok(response.json::<T>().await?)
}

/// Send a request and return the body text, failing on non-success statuses.
pub(crate) async fn send_text(request: RequestBuilder) -> Result<String, Box<dyn Error>> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Box::new(HttpStatusError {
            url: response.url().to_string(),
            status: status.as_u16(),
        }));
    }
    Ok(response.text().await?)
}

/// Read a count that may be a number, a numeric string, or `null`.
pub(crate) fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().replace(',', "").parse().unwrap_or(0),
        _ => 0,
    })
}

/// Read a string that may be `null` or missing.
pub(crate) fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

/// Read an optional display string; numbers are kept as text.
pub(crate) fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    /// Context with no credentials and a fixed clock.
    pub fn context() -> SourceContext {
        context_with(Credentials::default(), Settings::default())
    }

    pub fn context_with(credentials: Credentials, settings: Settings) -> SourceContext {
        let now = Local.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        SourceContext::new(credentials, settings, now).unwrap()
    }
}
