//! Batching and LLM reconciliation of collected records into a digest.
//!
//! Records are grouped by category (first-appearance order), capped per
//! category, flattened and cut into fixed-size batches. Each batch is sent
//! to the model on its own; replies go through [`repair_json_with_diagnostics`]
//! and are merged in batch order. A batch whose reply cannot be recovered is
//! skipped and kept aside for a debug dump.
//!
//! Two situations replace the digest with a degraded document of raw
//! records: no LLM credential, and a reconciliation-fatal failure (the
//! endpoint rejects the credential, or every batch request fails).

use crate::api::{AskAsync, LlmError};
use crate::config::DigestSettings;
use crate::models::{Analysis, Categories, DEGRADED_MARKER, DigestDocument, Record};
use crate::repair::repair_json_with_diagnostics;
use crate::utils::{looks_truncated, truncate_chars, truncate_for_log};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

/// Error stored in the document when no LLM credential is configured.
pub const MISSING_CREDENTIAL_ERROR: &str = "SILICONFLOW_API_KEY is not set; AI processing skipped";

/// Outcome of a reconciliation run.
#[derive(Debug)]
pub enum Reconciled {
    /// Nothing was collected; no document is produced.
    NoData,
    Digest {
        document: DigestDocument,
        failed_batches: Vec<FailedBatch>,
    },
}

/// A batch whose reply could not be turned into JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedBatch {
    /// One-based batch number.
    pub index: usize,
    pub raw: String,
    /// Per-stage repair errors.
    pub errors: Vec<(&'static str, String)>,
}

impl FailedBatch {
    /// Text written to the debug dump.
    pub fn dump(&self) -> String {
        let mut out = format!("batch {}\n\n", self.index);
        for (stage, error) in &self.errors {
            out.push_str(&format!("{stage}: {error}\n"));
        }
        out.push_str("\n--- raw response ---\n");
        out.push_str(&self.raw);
        out.push('\n');
        out
    }
}

/// Group records by category and keep at most `cap` per category.
///
/// Categories keep the order in which they first appear; within a category
/// the earliest records win. The groups are returned flattened.
pub fn group_and_cap(records: &[Record], cap: usize) -> Vec<Record> {
    let mut groups = Categories::new();
    for record in records {
        let full = groups
            .get(&record.category)
            .is_some_and(|existing| existing.len() >= cap);
        if !full {
            groups.push(&record.category, record.clone());
        }
    }
    groups
        .iter()
        .flat_map(|(_, records)| records.iter().cloned())
        .collect()
}

#[derive(Serialize)]
struct PromptRecord<'a> {
    title: &'a str,
    body: String,
    timestamp: &'a str,
    source_name: &'a str,
    category: &'a str,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    extra: Option<&'a str>,
}

/// Build the user prompt for one batch.
pub fn build_prompt(batch: &[Record], settings: &DigestSettings) -> Result<String, serde_json::Error> {
    let items: Vec<PromptRecord> = batch
        .iter()
        .map(|r| PromptRecord {
            title: &r.title,
            body: truncate_chars(&r.body, settings.prompt_body_chars),
            timestamp: &r.timestamp,
            source_name: &r.source_name,
            category: &r.category,
            url: &r.url,
            extra: r.extra.as_deref(),
        })
        .collect();
    let data = serde_json::to_string(&items)?;
    let language = &settings.target_language;

    Ok(format!(
        r#"Process the following AI news data and return ONLY valid JSON.

Input data:
{data}

Requirements:
1. Translate titles and bodies into {language}
2. Summarize each body in 60-80 {language} characters
3. Group records by their "category" value and use it unchanged as the category name
4. Keep the "extra" field exactly as given
5. Output JSON only, no commentary

Output format:
{{"categories":{{"CategoryName":[{{"title":"...","body":"...","url":"...","timestamp":"...","source_name":"...","extra":"..."}}]}},"analysis":{{"summary":"...","trends":["..."]}}}}
"#
    ))
}

/// Whether a reply looks cut off mid-document.
fn reply_truncated(raw: &str) -> bool {
    let body = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```");
    serde_json::from_str::<Value>(body)
        .err()
        .is_some_and(|e| looks_truncated(&e))
}

/// Merge one parsed batch. Values that are not objects contribute nothing.
fn merge_batch(value: &Value, categories: &mut Categories, analysis: &mut Option<Analysis>) {
    if !value.is_object() {
        warn!("Batch reply is not a JSON object; ignoring");
        return;
    }
    if let Some(batch_categories) = value.get("categories") {
        for (label, records) in Categories::from_value_lenient(batch_categories).iter() {
            categories.extend(label, records.iter().cloned());
        }
    }
    if analysis.is_none() {
        *analysis = value
            .get("analysis")
            .and_then(|a| serde_json::from_value::<Analysis>(a.clone()).ok());
    }
}

fn missing_credential(records: &[Record], date: &str) -> Reconciled {
    let summary = format!(
        "{DEGRADED_MARKER} SILICONFLOW_API_KEY is not configured; showing the first {} raw records",
        DigestDocument::FALLBACK_RECORD_LIMIT
    );
    Reconciled::Digest {
        document: DigestDocument::fallback(date, MISSING_CREDENTIAL_ERROR, &summary, records),
        failed_batches: Vec::new(),
    }
}

fn fatal(records: &[Record], date: &str, error: &LlmError) -> Reconciled {
    let summary = format!(
        "{DEGRADED_MARKER} AI processing failed; showing the first {} raw records. Error: {error}",
        DigestDocument::FALLBACK_RECORD_LIMIT
    );
    Reconciled::Digest {
        document: DigestDocument::fallback(
            date,
            &format!("AI processing failed: {error}"),
            &summary,
            records,
        ),
        failed_batches: Vec::new(),
    }
}

/// Reconcile collected records into a digest document for `date`.
///
/// `llm` is `None` when no credential is configured.
#[instrument(level = "info", skip_all, fields(records = records.len(), %date))]
pub async fn reconcile<A>(
    records: &[Record],
    llm: Option<&A>,
    settings: &DigestSettings,
    date: &str,
) -> Reconciled
where
    A: AskAsync<Response = String>,
{
    if records.is_empty() {
        warn!("No records collected; nothing to reconcile");
        return Reconciled::NoData;
    }
    let Some(llm) = llm else {
        error!("SILICONFLOW_API_KEY is not set; writing raw records instead of a digest");
        return missing_credential(records, date);
    };

    let selected = group_and_cap(records, settings.pre_llm_category_cap);
    let batches: Vec<&[Record]> = selected.chunks(settings.batch_size.max(1)).collect();
    info!(
        selected = selected.len(),
        dropped = records.len() - selected.len(),
        batches = batches.len(),
        "Starting batch reconciliation"
    );

    let mut categories = Categories::new();
    let mut analysis = None;
    let mut failed_batches = Vec::new();
    let mut request_failures = 0usize;
    let mut last_request_error = None;

    for (i, batch) in batches.iter().enumerate() {
        let index = i + 1;
        let prompt = match build_prompt(batch, settings) {
            Ok(prompt) => prompt,
            Err(e) => {
                error!(batch = index, error = %e, "Failed to serialize batch; skipping");
                continue;
            }
        };

        let raw = match llm.ask(&prompt).await {
            Ok(raw) => raw,
            Err(e) if e.is_fatal() => {
                error!(batch = index, error = %e, "LLM rejected the credential; aborting reconciliation");
                return fatal(records, date, &e);
            }
            Err(e) => {
                error!(batch = index, error = %e, "Batch request failed; skipping batch");
                request_failures += 1;
                last_request_error = Some(e);
                continue;
            }
        };

        match repair_json_with_diagnostics(&raw) {
            Ok(value) => {
                merge_batch(&value, &mut categories, &mut analysis);
                info!(batch = index, size = batch.len(), "Batch merged");
            }
            Err(failure) => {
                warn!(
                    batch = index,
                    truncated = reply_truncated(&raw),
                    error = %failure,
                    response_preview = %truncate_for_log(&raw, 100),
                    "Model reply is not recoverable JSON; skipping batch"
                );
                failed_batches.push(FailedBatch {
                    index,
                    raw,
                    errors: failure.attempts,
                });
            }
        }
    }

    if request_failures == batches.len() {
        if let Some(e) = last_request_error {
            error!(batches = batches.len(), "Every batch request failed");
            return fatal(records, date, &e);
        }
    }

    categories.truncate_each(settings.post_llm_category_cap);
    info!(
        categories = categories.len(),
        total = categories.total(),
        failed = failed_batches.len(),
        "Reconciliation complete"
    );

    Reconciled::Digest {
        document: DigestDocument {
            date: date.to_string(),
            categories,
            analysis: analysis.unwrap_or_else(Analysis::placeholder),
            error: None,
        },
        failed_batches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChatClient;
    use crate::models::FALLBACK_CATEGORY;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records the prompts it was sent.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl AskAsync for Scripted {
        type Response = String;

        async fn ask(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }

    fn record(title: &str, category: &str) -> Record {
        Record::new(title, format!("https://example.com/{title}"), "Example", category)
            .unwrap()
            .with_body(format!("{title} body"))
    }

    fn unwrap_digest(outcome: Reconciled) -> (DigestDocument, Vec<FailedBatch>) {
        match outcome {
            Reconciled::Digest {
                document,
                failed_batches,
            } => (document, failed_batches),
            Reconciled::NoData => panic!("expected a digest"),
        }
    }

    #[test]
    fn test_group_and_cap_keeps_first_appearance_order() {
        let mut records = Vec::new();
        records.push(record("t0", "trending"));
        records.extend((0..20).map(|i| record(&format!("n{i}"), "news")));
        records.push(record("t1", "trending"));

        let selected = group_and_cap(&records, 15);
        assert_eq!(selected.len(), 17);
        assert_eq!(selected[0].title, "t0");
        assert_eq!(selected[1].title, "t1");
        assert_eq!(selected[2].title, "n0");
        assert_eq!(selected.last().unwrap().title, "n14");
    }

    #[test]
    fn test_prompt_carries_language_and_truncated_body() {
        let settings = DigestSettings::default();
        let long = record("long", "news").with_body("x".repeat(1000)).with_extra("⭐ 5");
        let prompt = build_prompt(&[long], &settings).unwrap();
        assert!(prompt.contains("into Chinese"));
        assert!(prompt.contains(&"x".repeat(280)));
        assert!(!prompt.contains(&"x".repeat(281)));
        assert!(prompt.contains("\"extra\":\"⭐ 5\""));
        assert!(prompt.contains("\"category\":\"news\""));
    }

    #[tokio::test]
    async fn test_no_records_is_no_data() {
        let llm = Scripted::new(vec![]);
        let outcome = reconcile(&[], Some(&llm), &DigestSettings::default(), "2026-10-19").await;
        assert!(matches!(outcome, Reconciled::NoData));
        assert!(llm.prompts().is_empty());

        let outcome =
            reconcile::<ChatClient>(&[], None, &DigestSettings::default(), "2026-10-19").await;
        assert!(matches!(outcome, Reconciled::NoData));
    }

    #[tokio::test]
    async fn test_fenced_reply_with_trailing_comma_is_merged() {
        let records = vec![
            record("a", "news"),
            record("b", "news"),
            record("c", "trending"),
        ];
        let reply = "Here you go:\n```json\n{\"categories\": {\"news\": [{\"title\": \"A\"}, {\"title\": \"B\"}], \"trending\": [{\"title\": \"C\", \"extra\": \"⭐ 1\"},]}, \"analysis\": {\"summary\": \"ok\", \"trends\": [\"t\"]},}\n```";
        let llm = Scripted::new(vec![Ok(reply.to_string())]);

        let (doc, failed) = unwrap_digest(
            reconcile(&records, Some(&llm), &DigestSettings::default(), "2026-10-19").await,
        );

        assert_eq!(llm.prompts().len(), 1);
        assert!(failed.is_empty());
        assert!(doc.error.is_none());
        assert_eq!(doc.categories.get("news").unwrap().len(), 2);
        assert_eq!(doc.categories.get("trending").unwrap().len(), 1);
        assert_eq!(doc.categories.get("trending").unwrap()[0].extra.as_deref(), Some("⭐ 1"));
        assert_eq!(doc.analysis.summary, "ok");
        assert!(!doc.is_degraded());
    }

    #[tokio::test]
    async fn test_missing_credential_falls_back_to_raw_records() {
        let records: Vec<_> = (0..5).map(|i| record(&format!("r{i}"), "news")).collect();

        let (doc, failed) = unwrap_digest(
            reconcile::<ChatClient>(&records, None, &DigestSettings::default(), "2026-10-19").await,
        );

        assert!(failed.is_empty());
        assert!(doc.error.is_some());
        assert_eq!(doc.categories.len(), 1);
        let raw = doc.categories.get(FALLBACK_CATEGORY).unwrap();
        assert_eq!(raw.len(), 5);
        assert!(raw.iter().all(|r| r.category.is_empty()));
        assert!(doc.analysis.summary.contains("SILICONFLOW_API_KEY"));
        assert!(doc.analysis.summary.starts_with(DEGRADED_MARKER));
    }

    #[tokio::test]
    async fn test_partial_success_keeps_surviving_batches() {
        let mut settings = DigestSettings::default();
        settings.batch_size = 2;
        let records = vec![
            record("a", "news"),
            record("b", "news"),
            record("c", "news"),
            record("d", "tools"),
        ];
        let llm = Scripted::new(vec![
            Ok("this is not json at all".to_string()),
            Ok(r#"{"categories": {"news": [{"title": "C"}], "tools": [{"title": "D"}]}}"#.to_string()),
        ]);

        let (doc, failed) =
            unwrap_digest(reconcile(&records, Some(&llm), &settings, "2026-10-19").await);

        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].index, 1);
        assert_eq!(failed[0].errors.len(), 3);
        assert!(failed[0].dump().contains("this is not json at all"));
        assert!(doc.error.is_none());
        assert_eq!(doc.categories.get("news").unwrap()[0].title, "C");
        assert_eq!(doc.categories.get("tools").unwrap()[0].title, "D");
        assert_eq!(doc.analysis, Analysis::placeholder());
    }

    #[tokio::test]
    async fn test_post_cap_and_first_analysis_win() {
        let mut settings = DigestSettings::default();
        settings.batch_size = 1;
        let records = vec![record("a", "news"), record("b", "news")];
        let many: Vec<_> = (0..8).map(|i| format!(r#"{{"title": "n{i}"}}"#)).collect();
        let reply = |summary: &str| {
            format!(
                r#"{{"categories": {{"news": [{}]}}, "analysis": {{"summary": "{summary}"}}}}"#,
                many.join(",")
            )
        };
        let llm = Scripted::new(vec![Ok(reply("first")), Ok(reply("second"))]);

        let (doc, _) = unwrap_digest(reconcile(&records, Some(&llm), &settings, "2026-10-19").await);

        assert_eq!(doc.categories.get("news").unwrap().len(), 10);
        assert_eq!(doc.analysis.summary, "first");
    }

    #[tokio::test]
    async fn test_non_object_reply_contributes_nothing() {
        let records = vec![record("a", "news")];
        let llm = Scripted::new(vec![Ok("[1, 2, 3]".to_string())]);
        let (doc, failed) = unwrap_digest(
            reconcile(&records, Some(&llm), &DigestSettings::default(), "2026-10-19").await,
        );
        assert!(failed.is_empty());
        assert!(doc.categories.is_empty());
        assert!(doc.error.is_none());
    }

    #[tokio::test]
    async fn test_rejected_credential_is_fatal() {
        let records = vec![record("a", "news"), record("b", "news")];
        let llm = Scripted::new(vec![Err(LlmError::Unauthorized {
            status: 401,
            message: "invalid api key".to_string(),
        })]);

        let (doc, _) = unwrap_digest(
            reconcile(&records, Some(&llm), &DigestSettings::default(), "2026-10-19").await,
        );

        assert!(doc.error.as_deref().unwrap().contains("invalid api key"));
        assert!(doc.categories.get(FALLBACK_CATEGORY).is_some());
        assert!(doc.is_degraded());
    }

    #[tokio::test]
    async fn test_every_request_failing_is_fatal() {
        let mut settings = DigestSettings::default();
        settings.batch_size = 1;
        let records = vec![record("a", "news"), record("b", "news")];
        let unavailable = || LlmError::Api {
            status: 503,
            message: "overloaded".to_string(),
        };
        let llm = Scripted::new(vec![Err(unavailable()), Err(unavailable())]);

        let (doc, _) = unwrap_digest(reconcile(&records, Some(&llm), &settings, "2026-10-19").await);

        assert_eq!(llm.prompts().len(), 2);
        assert!(doc.error.as_deref().unwrap().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_single_request_failure_skips_only_that_batch() {
        let mut settings = DigestSettings::default();
        settings.batch_size = 1;
        let records = vec![record("a", "news"), record("b", "news")];
        let llm = Scripted::new(vec![
            Err(LlmError::Api {
                status: 500,
                message: "oops".to_string(),
            }),
            Ok(r#"{"categories": {"news": [{"title": "B"}]}}"#.to_string()),
        ]);

        let (doc, _) = unwrap_digest(reconcile(&records, Some(&llm), &settings, "2026-10-19").await);

        assert!(doc.error.is_none());
        assert_eq!(doc.categories.get("news").unwrap()[0].title, "B");
    }

    #[test]
    fn test_reply_truncated() {
        assert!(reply_truncated("```json\n{\"categories\": {\"news\": ["));
        assert!(!reply_truncated("nonsense"));
    }
}
