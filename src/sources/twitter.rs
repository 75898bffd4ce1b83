//! Twitter search and tracked-account timelines via twitterapi.io.

use super::{SourceContext, category, lenient_string, lenient_u64, send_json};
use crate::models::Record;
use crate::utils::truncate_chars;
use serde::Deserialize;
use std::error::Error;
use tracing::{debug, error, info, instrument};

/// Title length for tweets, in characters.
const TITLE_CHARS: usize = 100;

/// Prefix marking reshared content.
pub const RETWEET_MARKER: &str = "(RT) ";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    pub tweets: Vec<Tweet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TimelineResponse {
    pub data: TimelineData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TimelineData {
    pub tweets: Vec<Tweet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tweet {
    #[serde(deserialize_with = "lenient_string")]
    pub text: String,
    #[serde(deserialize_with = "lenient_string")]
    pub url: String,
    #[serde(deserialize_with = "lenient_string")]
    pub created_at: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub view_count: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub like_count: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub retweet_count: u64,
    #[serde(rename = "retweeted_tweet")]
    pub retweeted_tweet: Option<Box<Tweet>>,
}

impl Tweet {
    /// Engagement score: likes plus twice the retweets.
    pub fn heat(&self) -> u64 {
        self.like_count + self.retweet_count * 2
    }

    /// Timeline text; a retweet shows the original tweet's text.
    pub fn timeline_text(&self) -> String {
        match &self.retweeted_tweet {
            Some(original) => format!("{RETWEET_MARKER}{}", original.text),
            None => self.text.clone(),
        }
    }

    fn to_record(&self, text: String, source_name: &str, category: &str) -> Option<Record> {
        Record::new(truncate_chars(&text, TITLE_CHARS), &self.url, source_name, category)
            .map(|r| r.with_body(text).with_timestamp(&self.created_at))
    }
}

/// Keep tweets above both the view and the heat threshold.
pub fn search_records(search: &SearchResponse, min_views: u64, min_heat: u64) -> Vec<Record> {
    search
        .tweets
        .iter()
        .filter(|t| t.view_count > min_views && t.heat() > min_heat)
        .filter_map(|t| t.to_record(t.text.clone(), "Twitter", category::TWITTER_TRENDING))
        .collect()
}

/// Keep the latest `limit` tweets of an account, unconditionally.
pub fn account_records(timeline: &TimelineResponse, account: &str, limit: usize) -> Vec<Record> {
    timeline
        .data
        .tweets
        .iter()
        .take(limit)
        .filter_map(|t| t.to_record(t.timeline_text(), account, category::COMPANY_UPDATES))
        .collect()
}

/// Search top tweets and keep the hot ones.
#[instrument(level = "info", skip_all)]
pub async fn fetch_search(ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
    let Some(key) = ctx.credentials.twitter.as_deref() else {
        debug!("TWITTER_API_KEY not set; skipping");
        return Ok(Vec::new());
    };

    let url = format!("{}/tweet/advanced_search", ctx.settings.sources.endpoints.twitter_api);
    let search: SearchResponse = send_json(
        ctx.http
            .get(url)
            .header("x-api-key", key)
            .query(&[
                ("query", ctx.settings.sources.search_query.as_str()),
                ("queryType", "Top"),
            ]),
    )
    .await?;

    let t = &ctx.settings.thresholds;
    let records = search_records(&search, t.twitter_min_views, t.twitter_min_heat);
    info!(candidates = search.tweets.len(), count = records.len(), "Collected hot tweets");
    Ok(records)
}

/// Fetch the latest tweets of every tracked account.
#[instrument(level = "info", skip_all)]
pub async fn fetch_accounts(ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
    let Some(key) = ctx.credentials.twitter.as_deref() else {
        debug!("TWITTER_API_KEY not set; skipping");
        return Ok(Vec::new());
    };
    let limit = ctx.settings.thresholds.tweets_per_account;
    let url = format!("{}/user/last_tweets", ctx.settings.sources.endpoints.twitter_api);
    let mut records = Vec::new();

    for account in &ctx.settings.sources.twitter_accounts {
        let request = ctx
            .http
            .get(&url)
            .header("x-api-key", key)
            .query(&[("userName", account.as_str())]);
        match send_json::<TimelineResponse>(request).await {
            Ok(timeline) => {
                let found = account_records(&timeline, account, limit);
                info!(%account, count = found.len(), "Collected account tweets");
                records.extend(found);
            }
            Err(e) => error!(%account, error = %e, "Account timeline failed"),
        }
    }
    Ok(records)
}
