//! TikTok keyword search through a RapidAPI gateway.
//!
//! A video is kept when it is popular in absolute terms (play count), popular
//! relative to its author's audience (plays per follower), and recent.

use super::{SourceContext, category, lenient_string, lenient_u64, send_json};
use crate::models::Record;
use crate::utils::truncate_chars;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::error::Error;
use tracing::{debug, info, instrument};

const RAPIDAPI_HOST: &str = "tiktok-api23.p.rapidapi.com";

const TITLE_CHARS: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    pub data: Vec<SearchEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchEntry {
    pub item: VideoItem,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoItem {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub desc: String,
    /// Unix seconds.
    #[serde(deserialize_with = "lenient_u64")]
    pub create_time: u64,
    pub stats: VideoStats,
    pub author_stats: AuthorStats,
    pub author: Author,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoStats {
    #[serde(deserialize_with = "lenient_u64")]
    pub play_count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthorStats {
    #[serde(deserialize_with = "lenient_u64")]
    pub follower_count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Author {
    #[serde(deserialize_with = "lenient_string")]
    pub unique_id: String,
}

/// Filtering knobs for TikTok results.
#[derive(Debug, Clone, Copy)]
pub struct Filter {
    pub min_plays: u64,
    pub min_play_ratio: f64,
    /// Oldest accepted creation time.
    pub not_before: DateTime<Utc>,
}

impl VideoItem {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        if self.create_time == 0 {
            return None;
        }
        DateTime::from_timestamp(i64::try_from(self.create_time).ok()?, 0)
    }

    /// Plays per follower; an unknown or zero follower count counts as one.
    pub fn play_ratio(&self) -> f64 {
        self.stats.play_count as f64 / self.author_stats.follower_count.max(1) as f64
    }

    fn passes(&self, filter: &Filter) -> bool {
        self.stats.play_count > filter.min_plays
            && self.play_ratio() > filter.min_play_ratio
            && self.created_at().is_some_and(|t| t > filter.not_before)
    }
}

pub fn search_records(search: &SearchResponse, filter: &Filter) -> Vec<Record> {
    search
        .data
        .iter()
        .map(|entry| &entry.item)
        .filter(|item| item.passes(filter))
        .filter_map(|item| {
            let url = format!(
                "https://tiktok.com/@{}/video/{}",
                item.author.unique_id, item.id
            );
            let timestamp = item
                .created_at()
                .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
                .unwrap_or_default();
            Record::new(
                truncate_chars(&item.desc, TITLE_CHARS),
                url,
                "TikTok",
                category::TIKTOK_TRENDING,
            )
            .map(|r| r.with_body(&item.desc).with_timestamp(timestamp))
        })
        .collect()
}

/// Search TikTok and keep breakout videos.
#[instrument(level = "info", skip_all)]
pub async fn fetch_search(ctx: &SourceContext) -> Result<Vec<Record>, Box<dyn Error>> {
    let Some(key) = ctx.credentials.rapidapi.as_deref() else {
        debug!("RAPIDAPI_KEY not set; skipping");
        return Ok(Vec::new());
    };

    let search: SearchResponse = send_json(
        ctx.http
            .get(&ctx.settings.sources.endpoints.tiktok_search)
            .header("x-rapidapi-key", key)
            .header("x-rapidapi-host", RAPIDAPI_HOST)
            .query(&[
                ("keyword", ctx.settings.sources.search_query.as_str()),
                ("cursor", "0"),
            ]),
    )
    .await?;

    let t = &ctx.settings.thresholds;
    let filter = Filter {
        min_plays: t.tiktok_min_plays,
        min_play_ratio: t.tiktok_min_play_ratio,
        not_before: ctx.now.with_timezone(&Utc) - Duration::days(t.tiktok_window_days),
    };
    let records = search_records(&search, &filter);
    info!(candidates = search.data.len(), count = records.len(), "Collected TikTok videos");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn filter() -> Filter {
        Filter {
            min_plays: 100_000,
            min_play_ratio: 3.0,
            not_before: Utc.with_ymd_and_hms(2026, 10, 5, 12, 0, 0).unwrap(),
        }
    }

    fn entry(id: &str, plays: u64, followers: u64, created: i64) -> serde_json::Value {
        json!({"item": {
            "id": id,
            "desc": format!("video {id}"),
            "createTime": created,
            "stats": {"playCount": plays},
            "authorStats": {"followerCount": followers},
            "author": {"uniqueId": "creator"}
        }})
    }

    #[test]
    fn test_filters_plays_ratio_and_recency() {
        let recent = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap().timestamp();
        let stale = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap().timestamp();
        let search: SearchResponse = serde_json::from_value(json!({"data": [
            entry("breakout", 500_000, 10_000, recent),
            entry("big_account", 500_000, 400_000, recent),
            entry("small", 50_000, 10, recent),
            entry("old", 500_000, 10_000, stale),
            entry("no_followers", 200_000, 0, recent)
        ]}))
        .unwrap();

        let records = search_records(&search, &filter());
        let ids: Vec<_> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "https://tiktok.com/@creator/video/breakout",
                "https://tiktok.com/@creator/video/no_followers"
            ]
        );
        assert_eq!(records[0].timestamp, "2026-10-18T00:00:00");
        assert_eq!(records[0].category, category::TIKTOK_TRENDING);
    }

    #[test]
    fn test_missing_create_time_is_not_recent() {
        let search: SearchResponse =
            serde_json::from_value(json!({"data": [entry("x", 900_000, 1, 0)]})).unwrap();
        assert!(search_records(&search, &filter()).is_empty());
    }
}
