//! YouTube creator feeds and trending video search.
//!
//! Creator uploads come from the public channel Atom feeds and need no key.
//! Trending videos use the Data API v3 in two stages: a search for candidate
//! videos, then one statistics call for all candidate IDs.

use super::feeds::{ParsedFeed, fetch_feed};
use super::{SourceContext, category, send_json};
use crate::models::Record;
use crate::utils::{decode_entities, truncate_chars};
use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use tracing::{debug, error, info, instrument};

/// Description length kept for trending videos, in characters.
const DESCRIPTION_CHARS: usize = 150;

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub items: Option<Vec<SearchItem>>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchItem {
    pub id: SearchItemId,
    pub snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItemId {
    pub video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snippet {
    pub title: String,
    pub description: String,
    pub publish_time: String,
}

#[derive(Debug, Deserialize)]
pub struct VideosResponse {
    #[serde(default)]
    pub items: Vec<VideoStats>,
}

#[derive(Debug, Deserialize)]
pub struct VideoStats {
    pub id: String,
    #[serde(default)]
    pub statistics: Statistics,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Statistics {
    /// The API encodes counts as decimal strings.
    pub view_count: Option<String>,
}

/// Map a creator channel feed to records.
pub fn creator_records(feed: &ParsedFeed, cutoff: DateTime<Utc>, max_entries: usize) -> Vec<Record> {
    let channel = feed.author.as_deref().unwrap_or("YouTube");
    feed.entries
        .iter()
        .take(max_entries)
        .filter(|entry| entry.is_after(cutoff))
        .filter_map(|entry| {
            Record::new(&entry.title, &entry.link, channel, category::YOUTUBE_CREATORS)
                .map(|r| r.with_timestamp(entry.timestamp()))
        })
        .collect()
}

/// Fetch the latest uploads of every configured channel.
#[instrument(level = "info", skip_all)]
pub async fn fetch_creators(ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
    let cutoff = ctx.yesterday();
    let max_entries = ctx.settings.thresholds.entries_per_channel;
    let mut records = Vec::new();

    for channel_id in &ctx.settings.sources.youtube_channels {
        let url = format!(
            "{}?channel_id={channel_id}",
            ctx.settings.sources.endpoints.youtube_feeds
        );
        match fetch_feed(ctx, &url).await {
            Ok(feed) => {
                let found = creator_records(&feed, cutoff, max_entries);
                info!(
                    channel = feed.author.as_deref().unwrap_or(channel_id.as_str()),
                    count = found.len(),
                    "Collected creator uploads"
                );
                records.extend(found);
            }
            Err(e) => error!(%channel_id, error = %e, "Channel feed failed"),
        }
    }
    Ok(records)
}

/// Video IDs of the search results, in result order.
pub fn candidate_ids(search: &SearchResponse) -> Vec<String> {
    search
        .items
        .iter()
        .flatten()
        .filter_map(|item| item.id.video_id.clone())
        .collect()
}

/// Keep search results whose view count exceeds `min_views`.
pub fn trending_records(
    search: &SearchResponse,
    stats: &VideosResponse,
    min_views: u64,
) -> Vec<Record> {
    let views: HashMap<&str, u64> = stats
        .items
        .iter()
        .map(|v| {
            let count = v
                .statistics
                .view_count
                .as_deref()
                .and_then(|c| c.parse().ok())
                .unwrap_or(0);
            (v.id.as_str(), count)
        })
        .collect();

    search
        .items
        .iter()
        .flatten()
        .filter_map(|item| {
            let id = item.id.video_id.as_deref()?;
            if views.get(id).copied().unwrap_or(0) <= min_views {
                return None;
            }
            Record::new(
                decode_entities(&item.snippet.title),
                format!("https://youtube.com/watch?v={id}"),
                "YouTube",
                category::YOUTUBE_TRENDING,
            )
            .map(|r| {
                r.with_body(truncate_chars(
                    &decode_entities(&item.snippet.description),
                    DESCRIPTION_CHARS,
                ))
                .with_timestamp(&item.snippet.publish_time)
            })
        })
        .collect()
}

/// Search recent videos and keep the most viewed ones.
#[instrument(level = "info", skip_all)]
pub async fn fetch_trending(ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
    let Some(key) = ctx.credentials.youtube.as_deref() else {
        debug!("YOUTUBE_API_KEY not set; skipping");
        return Ok(Vec::new());
    };

    let published_after = ctx.yesterday().to_rfc3339_opts(SecondsFormat::Secs, true);
    let api = &ctx.settings.sources.endpoints.youtube_api;
    let search: SearchResponse = send_json(ctx.http.get(format!("{api}/search")).query(&[
        ("key", key),
        ("part", "snippet"),
        ("q", ctx.settings.sources.search_query.as_str()),
        ("order", "relevance"),
        ("maxResults", "10"),
        ("regionCode", "US"),
        ("type", "video"),
        ("publishedAfter", published_after.as_str()),
    ]))
    .await?;

    if search.items.is_none() {
        let message = search
            .error
            .map(|e| e.message)
            .unwrap_or_else(|| "search response has no items".to_string());
        return Err(message.into());
    }

    let ids = candidate_ids(&search);
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let stats: VideosResponse = send_json(ctx.http.get(format!("{api}/videos")).query(&[
        ("key", key),
        ("part", "statistics"),
        ("id", ids.iter().join(",").as_str()),
    ]))
    .await?;

    let min_views = ctx.settings.thresholds.youtube_min_views;
    let records = trending_records(&search, &stats, min_views);
    info!(candidates = ids.len(), count = records.len(), min_views, "Collected trending videos");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::sources::Credentials;
    use crate::sources::feeds::parse_feed;
    use crate::sources::test_support::context_with;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn search_fixture() -> SearchResponse {
        serde_json::from_value(json!({
            "items": [
                {"id": {"videoId": "hot"}, "snippet": {"title": "GPT &amp; friends", "description": "It&#39;s big", "publishTime": "2026-10-19T01:00:00Z"}},
                {"id": {"videoId": "cold"}, "snippet": {"title": "Quiet video", "description": "", "publishTime": "2026-10-19T02:00:00Z"}},
                {"id": {"videoId": "edge"}, "snippet": {"title": "Exactly threshold", "description": "", "publishTime": "2026-10-19T03:00:00Z"}},
                {"id": {"kind": "youtube#channel"}, "snippet": {"title": "A channel"}}
            ]
        }))
        .unwrap()
    }

    fn stats_fixture() -> VideosResponse {
        serde_json::from_value(json!({
            "items": [
                {"id": "hot", "statistics": {"viewCount": "250001"}},
                {"id": "cold", "statistics": {"viewCount": "12"}},
                {"id": "edge", "statistics": {"viewCount": "200000"}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_candidate_ids_skip_non_videos() {
        assert_eq!(candidate_ids(&search_fixture()), vec!["hot", "cold", "edge"]);
    }

    #[test]
    fn test_trending_keeps_only_views_above_threshold() {
        let records = trending_records(&search_fixture(), &stats_fixture(), 200_000);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.title, "GPT & friends");
        assert_eq!(r.body, "It's big");
        assert_eq!(r.url, "https://youtube.com/watch?v=hot");
        assert_eq!(r.category, category::YOUTUBE_TRENDING);
        assert_eq!(r.timestamp, "2026-10-19T01:00:00Z");
    }

    #[test]
    fn test_missing_stats_count_as_zero() {
        let stats = VideosResponse { items: vec![] };
        assert!(trending_records(&search_fixture(), &stats, 0).is_empty());
    }

    #[test]
    fn test_error_payload_has_no_items() {
        let search: SearchResponse = serde_json::from_value(json!({
            "error": {"code": 403, "message": "quota exceeded"}
        }))
        .unwrap();
        assert!(search.items.is_none());
        assert_eq!(search.error.unwrap().message, "quota exceeded");
    }

    #[test]
    fn test_creator_records_use_channel_author() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <author><name>AI Explained</name></author>
  <entry><title>One</title><link rel="alternate" href="https://www.youtube.com/watch?v=1"/><published>2026-10-19T05:00:00+00:00</published></entry>
  <entry><title>Two</title><link rel="alternate" href="https://www.youtube.com/watch?v=2"/><published>2026-10-19T04:00:00+00:00</published></entry>
  <entry><title>Three</title><link rel="alternate" href="https://www.youtube.com/watch?v=3"/><published>2026-10-19T03:00:00+00:00</published></entry>
  <entry><title>Four</title><link rel="alternate" href="https://www.youtube.com/watch?v=4"/><published>2026-10-19T02:00:00+00:00</published></entry>
</feed>"#;
        let feed = parse_feed(xml).unwrap();
        let cutoff = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let records = creator_records(&feed, cutoff, 3);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.source_name == "AI Explained"));
        assert!(records.iter().all(|r| r.body.is_empty()));
        assert_eq!(records[2].title, "Three");
    }

    fn api_context(server: &MockServer) -> SourceContext {
        let mut settings = Settings::default();
        settings.sources.endpoints.youtube_api = server.uri();
        let credentials = Credentials {
            youtube: Some("yt-key".to_string()),
            ..Credentials::default()
        };
        context_with(credentials, settings)
    }

    #[tokio::test]
    async fn test_trending_fetches_statistics_for_all_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("key", "yt-key"))
            .and(query_param("type", "video"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": {"videoId": "hot"}, "snippet": {"title": "Viral demo"}},
                    {"id": {"videoId": "cold"}, "snippet": {"title": "Niche talk"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .and(query_param("id", "hot,cold"))
            .and(query_param("part", "statistics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "hot", "statistics": {"viewCount": "900000"}},
                    {"id": "cold", "statistics": {"viewCount": "1500"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = fetch_trending(&api_context(&server)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Viral demo");
        assert_eq!(records[0].url, "https://youtube.com/watch?v=hot");
    }

    #[tokio::test]
    async fn test_trending_without_candidates_skips_statistics() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .expect(0)
            .mount(&server)
            .await;

        assert!(fetch_trending(&api_context(&server)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trending_quota_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"code": 403, "message": "quota exceeded"}
            })))
            .mount(&server)
            .await;

        let err = fetch_trending(&api_context(&server)).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }
}
