//! Command-line interface definitions for the AI daily digest.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Credentials are read from the environment (or a `.env` file loaded at
//! startup) and may also be passed as flags.

use crate::sources::Credentials;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the AI daily digest.
///
/// # Examples
///
/// ```sh
/// # Full run with default directories
/// ai_daily_digest
///
/// # Custom directories and settings file
/// ai_daily_digest --data-dir ./data --docs-dir ./site --config digest.yaml
///
/// # Re-render the page from the existing latest.json
/// ai_daily_digest --render-only
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory for the digest JSON files
    #[arg(short, long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory for the rendered HTML pages
    #[arg(long, default_value = "docs")]
    pub docs_dir: PathBuf,

    /// Optional path to a YAML settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Do not render HTML after writing the digest
    #[arg(long, conflicts_with = "render_only")]
    pub skip_html: bool,

    /// Only render HTML from the existing latest.json
    #[arg(long)]
    pub render_only: bool,

    /// API key of the OpenAI-compatible LLM endpoint
    #[arg(long, env = "SILICONFLOW_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Model name, overrides the settings file
    #[arg(long, env = "SILICONFLOW_MODEL")]
    pub llm_model: Option<String>,

    /// Base URL of the LLM endpoint, overrides the settings file
    #[arg(long, env = "SILICONFLOW_BASE_URL")]
    pub llm_base_url: Option<String>,

    /// YouTube Data API key
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub youtube_api_key: Option<String>,

    /// twitterapi.io key
    #[arg(long, env = "TWITTER_API_KEY", hide_env_values = true)]
    pub twitter_api_key: Option<String>,

    /// RapidAPI key for TikTok search
    #[arg(long, env = "RAPIDAPI_KEY", hide_env_values = true)]
    pub rapidapi_key: Option<String>,

    /// Smithery registry key for skills
    #[arg(long, env = "SMITHERY_API_KEY", hide_env_values = true)]
    pub smithery_api_key: Option<String>,
}

/// Blank values count as unset.
fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Cli {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            llm: present(&self.llm_api_key),
            youtube: present(&self.youtube_api_key),
            twitter: present(&self.twitter_api_key),
            rapidapi: present(&self.rapidapi_key),
            smithery: present(&self.smithery_api_key),
        }
    }

    /// Model override, if any.
    pub fn model_override(&self) -> Option<String> {
        present(&self.llm_model)
    }

    /// Base URL override, if any.
    pub fn base_url_override(&self) -> Option<String> {
        present(&self.llm_base_url)
    }
}
