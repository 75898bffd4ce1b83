//! Run settings: feed lists, filtering thresholds, caps and LLM parameters.
//!
//! Every value has a built-in default. An optional YAML file can override any
//! subset of them; missing keys keep their defaults.
//!
//! ```yaml
//! llm:
//!   model: Qwen/Qwen2.5-72B-Instruct
//! thresholds:
//!   youtube_min_views: 100000
//! digest:
//!   post_llm_category_cap: 8
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use tracing::info;

/// All tunable settings of a run.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub sources: SourceSettings,
    pub thresholds: Thresholds,
    pub digest: DigestSettings,
    pub llm: LlmSettings,
}

/// A named RSS or Atom feed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

impl FeedSource {
    fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// Which feeds, channels and accounts are polled.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceSettings {
    pub news_feeds: Vec<FeedSource>,
    pub youtube_channels: Vec<String>,
    pub twitter_accounts: Vec<String>,
    /// Search keyword used by the video and social search adapters.
    pub search_query: String,
    /// Trending repository endpoints, tried in order for each window.
    ///
    /// Placeholders: `{period}` (`daily`/`weekly`), `{min_stars}`,
    /// `{pushed_after}` (`YYYY-MM-DD`).
    pub github_trending_endpoints: Vec<String>,
    pub endpoints: Endpoints,
    /// Timeout for every source request, in seconds.
    pub timeout_secs: u64,
}

/// Base URLs of the provider APIs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Endpoints {
    /// Channel upload feeds, queried with `channel_id`.
    pub youtube_feeds: String,
    /// YouTube Data API v3 root (`/search`, `/videos`).
    pub youtube_api: String,
    /// twitterapi.io root (`/tweet/advanced_search`, `/user/last_tweets`).
    pub twitter_api: String,
    pub tiktok_search: String,
    pub github_search: String,
    pub huggingface_models: String,
    /// Smithery registry root (`/servers`, `/skills`).
    pub smithery_registry: String,
    pub skillsmp_skills: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            youtube_feeds: "https://www.youtube.com/feeds/videos.xml".to_string(),
            youtube_api: "https://www.googleapis.com/youtube/v3".to_string(),
            twitter_api: "https://api.twitterapi.io/twitter".to_string(),
            tiktok_search: "https://tiktok-api23.p.rapidapi.com/api/search/general".to_string(),
            github_search: "https://api.github.com/search/repositories".to_string(),
            huggingface_models: "https://huggingface.co/api/models".to_string(),
            smithery_registry: "https://registry.smithery.ai".to_string(),
            skillsmp_skills: "https://skillsmp.com/api/skills".to_string(),
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            news_feeds: vec![
                FeedSource::new(
                    "New York Times",
                    "https://www.nytimes.com/svc/collections/v1/publish/https://www.nytimes.com/spotlight/artificial-intelligence/rss.xml",
                ),
                FeedSource::new(
                    "TechCrunch",
                    "https://techcrunch.com/category/artificial-intelligence/feed/",
                ),
                FeedSource::new(
                    "The Verge",
                    "https://www.theverge.com/rss/ai-artificial-intelligence/index.xml",
                ),
            ],
            youtube_channels: vec![
                "UCNJ1Ymd5yFuUPtn21xtRbbw".to_string(),
                "UChpleBmo18P08aKCIgti38g".to_string(),
                "UCPjNBjflYl0-HQtUvOx0Ibw".to_string(),
            ],
            twitter_accounts: vec![
                "OpenAI".to_string(),
                "GoogleDeepMind".to_string(),
                "GoogleAIStudio".to_string(),
            ],
            search_query: "AI".to_string(),
            github_trending_endpoints: vec![
                "https://api.gitterapp.com/repositories?since={period}".to_string(),
                "https://gh-trending-api.herokuapp.com/repositories?since={period}".to_string(),
                "https://api.github.com/search/repositories?q=stars:>{min_stars}+pushed:>{pushed_after}&sort=stars&order=desc&per_page=10".to_string(),
            ],
            endpoints: Endpoints::default(),
            timeout_secs: 30,
        }
    }
}

/// Heat and recency thresholds deciding what counts as noise.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    /// Entries examined per news feed.
    pub news_entries_per_feed: usize,
    /// Entries examined per creator channel.
    pub entries_per_channel: usize,
    pub youtube_min_views: u64,
    pub twitter_min_views: u64,
    /// Minimum of `likes + 2 * retweets`.
    pub twitter_min_heat: u64,
    /// Most recent tweets kept per tracked account.
    pub tweets_per_account: usize,
    pub tiktok_min_plays: u64,
    /// Minimum of `plays / followers`.
    pub tiktok_min_play_ratio: f64,
    pub tiktok_window_days: i64,
    /// Items kept per listing (repositories, models, tools).
    pub listing_limit: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            news_entries_per_feed: 10,
            entries_per_channel: 3,
            youtube_min_views: 200_000,
            twitter_min_views: 10_000,
            twitter_min_heat: 1_000,
            tweets_per_account: 5,
            tiktok_min_plays: 100_000,
            tiktok_min_play_ratio: 3.0,
            tiktok_window_days: 14,
            listing_limit: 10,
        }
    }
}

/// Batching and capping of the digest.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DigestSettings {
    /// Records per category sent to the model.
    pub pre_llm_category_cap: usize,
    /// Records per request.
    pub batch_size: usize,
    /// Records per category in the published digest.
    pub post_llm_category_cap: usize,
    /// Body length sent to the model, in characters.
    pub prompt_body_chars: usize,
    /// Language the model translates into.
    pub target_language: String,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            pre_llm_category_cap: 15,
            batch_size: 15,
            post_llm_category_cap: 10,
            prompt_body_chars: 280,
            target_language: "Chinese".to_string(),
        }
    }
}

/// Chat completion parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.siliconflow.cn/v1".to_string(),
            model: "deepseek-ai/DeepSeek-V3".to_string(),
            max_tokens: 8192,
            temperature: 0.1,
            timeout_secs: 120,
        }
    }
}

impl Settings {
    /// Load settings from an optional YAML file.
    ///
    /// Without a path the built-in defaults are returned.
    pub async fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = tokio::fs::read_to_string(path).await?;
        let settings = Self::from_yaml(&text)?;
        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}
