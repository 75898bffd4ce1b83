//! Best-effort extraction of a JSON value from free-form model output.
//!
//! Models are asked for pure JSON but regularly wrap it in prose or fenced
//! code blocks, leave trailing commas, or stop mid-document. Parsing runs as
//! an ordered chain of strategies, cheapest first:
//!
//! 1. Extract the first fenced block, if the text contains a fence
//! 2. Parse the text directly
//! 3. Drop trailing commas before `}` / `]` and parse again
//! 4. Parse the first balanced `{...}` / `[...]` span that is valid JSON
//!
//! The first strategy that yields a value wins.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use tracing::debug;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json|JSON)?\s*((?s:.*?))\s*```").expect("valid regex"));
static COMMA_BEFORE_BRACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*\}").expect("valid regex"));
static COMMA_BEFORE_BRACKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*\]").expect("valid regex"));

type Stage = fn(&str) -> Result<Value, String>;

const STAGES: [(&str, Stage); 3] = [
    ("direct", parse_direct),
    ("trailing_commas", parse_without_trailing_commas),
    ("balanced_span", parse_first_balanced_span),
];

/// Every strategy failed; carries one message per attempted stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairFailure {
    pub attempts: Vec<(&'static str, String)>,
}

impl fmt::Display for RepairFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no repair stage produced valid JSON")?;
        for (stage, error) in &self.attempts {
            write!(f, "; {stage}: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RepairFailure {}

/// Extract a JSON value from `text`, or `None` if every stage fails.
#[cfg(test)]
pub fn repair_json(text: &str) -> Option<Value> {
    repair_json_with_diagnostics(text).ok()
}

/// Extract a JSON value from `text`, reporting why each stage failed when
/// none succeeds.
pub fn repair_json_with_diagnostics(text: &str) -> Result<Value, RepairFailure> {
    let candidate = extract_fenced(text);
    let mut attempts = Vec::with_capacity(STAGES.len());

    for (name, stage) in STAGES {
        match stage(candidate) {
            Ok(value) => {
                debug!(stage = name, "Recovered JSON");
                return Ok(value);
            }
            Err(e) => attempts.push((name, e)),
        }
    }
    Err(RepairFailure { attempts })
}

/// Content of the first fenced block, or the trimmed text when there is none.
fn extract_fenced(text: &str) -> &str {
    let text = text.trim();
    if text.contains("```") {
        if let Some(inner) = FENCED_BLOCK.captures(text).and_then(|c| c.get(1)) {
            return inner.as_str().trim();
        }
    }
    text
}

fn parse_direct(text: &str) -> Result<Value, String> {
    serde_json::from_str(text).map_err(|e| e.to_string())
}

fn strip_trailing_commas(text: &str) -> String {
    let text = COMMA_BEFORE_BRACE.replace_all(text, "}");
    COMMA_BEFORE_BRACKET.replace_all(&text, "]").into_owned()
}

fn parse_without_trailing_commas(text: &str) -> Result<Value, String> {
    parse_direct(&strip_trailing_commas(text))
}

fn parse_first_balanced_span(text: &str) -> Result<Value, String> {
    let text = strip_trailing_commas(text);
    let mut stack: Vec<char> = Vec::new();
    let mut start = 0;
    let mut spans_tried = 0usize;
    let mut last_error = None;

    for (i, c) in text.char_indices() {
        match c {
            '{' | '[' => {
                if stack.is_empty() {
                    start = i;
                }
                stack.push(c);
            }
            '}' | ']' => {
                let opener = if c == '}' { '{' } else { '[' };
                // Unmatched closers are ignored.
                if stack.last() != Some(&opener) {
                    continue;
                }
                stack.pop();
                if stack.is_empty() {
                    spans_tried += 1;
                    match serde_json::from_str(&text[start..=i]) {
                        Ok(value) => return Ok(value),
                        Err(e) => last_error = Some(e.to_string()),
                    }
                }
            }
            _ => {}
        }
    }

    Err(match last_error {
        Some(e) => format!("{spans_tried} balanced span(s), none valid; last error: {e}"),
        None => format!("no balanced span found ({} unclosed)", stack.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_json_is_unchanged() {
        let text = r#"{"categories": {"News": []}, "analysis": {"summary": "s", "trends": []}}"#;
        assert_eq!(repair_json(text), serde_json::from_str(text).ok());
    }

    #[test]
    fn test_fenced_block_parses_like_plain_json() {
        let plain = r#"{"a": 1, "b": [true, null]}"#;
        let fenced = format!("Here is the JSON:\n```json\n{plain}\n```\nHope that helps.");
        assert_eq!(repair_json(&fenced), repair_json(plain));
        assert_eq!(repair_json(&fenced), Some(json!({"a": 1, "b": [true, null]})));
    }

    #[test]
    fn test_unlabeled_and_uppercase_fences() {
        assert_eq!(repair_json("```\n{\"a\": 1}\n```"), Some(json!({"a": 1})));
        assert_eq!(repair_json("```JSON\n[1, 2]\n```"), Some(json!([1, 2])));
    }

    #[test]
    fn test_trailing_commas_removed() {
        assert_eq!(repair_json(r#"{"a": 1,}"#), Some(json!({"a": 1})));
        assert_eq!(repair_json(r#"{"a": [1,2,],}"#), Some(json!({"a": [1, 2]})));
        assert_eq!(
            repair_json("{\"a\": [1,\n 2,\n ],\n}"),
            Some(json!({"a": [1, 2]}))
        );
    }

    #[test]
    fn test_embedded_object_in_prose() {
        assert_eq!(repair_json(r#"Output: {"a": 1} End."#), Some(json!({"a": 1})));
        assert_eq!(
            repair_json(r#"Sure! {"a": {"b": 2}} and that's all"#),
            Some(json!({"a": {"b": 2}}))
        );
    }

    #[test]
    fn test_first_valid_span_wins() {
        let text = r#"Notes {not json} then {"ok": true} and {"later": 1}"#;
        assert_eq!(repair_json(text), Some(json!({"ok": true})));
    }

    #[test]
    fn test_unmatched_closer_is_ignored() {
        let text = r#"oops ] then {"a": [1]} done"#;
        assert_eq!(repair_json(text), Some(json!({"a": [1]})));
    }

    #[test]
    fn test_fenced_block_with_trailing_comma() {
        let text = "```json\n{\"categories\": {\"News\": [{\"title\": \"x\"},]},}\n```";
        assert_eq!(
            repair_json(text),
            Some(json!({"categories": {"News": [{"title": "x"}]}}))
        );
    }

    #[test]
    fn test_truncated_output_fails() {
        let text = r#"{"categories": {"News": [{"title": "cut off"#;
        assert_eq!(repair_json(text), None);
    }

    #[test]
    fn test_truncated_output_recovers_inner_complete_span_only_if_balanced() {
        // The outer object never closes, so no top-level span completes.
        let text = r#"{"categories": {"News": [{"title": "a"}], "Other": [{"title": "#;
        assert_eq!(repair_json(text), None);
    }

    #[test]
    fn test_diagnostics_report_every_stage() {
        let failure = repair_json_with_diagnostics("no json here").unwrap_err();
        let stages: Vec<_> = failure.attempts.iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, vec!["direct", "trailing_commas", "balanced_span"]);
        assert!(failure.to_string().contains("balanced_span"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(repair_json(""), None);
        assert_eq!(repair_json("   \n"), None);
    }
}
