//! JSON output of the digest document.
//!
//! Every run writes the same pretty-printed document twice: once to a dated
//! archive file and once to `latest.json`, which the HTML renderer reads.
//!
//! ```text
//! data_dir/
//! ├── digest_2026-10-19.json
//! ├── latest.json
//! └── debug/
//!     └── batch_2026-10-19_2.txt
//! ```

use crate::models::DigestDocument;
use crate::reconcile::FailedBatch;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

pub const LATEST_FILE: &str = "latest.json";

/// Path of the dated archive file for `date`.
pub fn dated_path(data_dir: &Path, date: &str) -> PathBuf {
    data_dir.join(format!("digest_{date}.json"))
}

/// Write `document` to its dated file and to `latest.json`.
///
/// Non-ASCII text is written as-is. Returns the paths written.
#[instrument(level = "info", skip_all, fields(data_dir = %data_dir.display(), date = %document.date))]
pub async fn write_digest(
    document: &DigestDocument,
    data_dir: &Path,
) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(document)?;
    fs::create_dir_all(data_dir).await?;

    let paths = vec![dated_path(data_dir, &document.date), data_dir.join(LATEST_FILE)];
    for path in &paths {
        fs::write(path, &json).await?;
        info!(path = %path.display(), "Wrote digest JSON");
    }
    Ok(paths)
}

/// Write the raw reply and repair errors of an unrecoverable batch.
#[instrument(level = "info", skip_all, fields(batch = failed.index))]
pub async fn write_debug_dump(
    failed: &FailedBatch,
    data_dir: &Path,
    date: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let dir = data_dir.join("debug");
    fs::create_dir_all(&dir).await?;
    let path = dir.join(format!("batch_{date}_{}.txt", failed.index));
    fs::write(&path, failed.dump()).await?;
    info!(path = %path.display(), "Wrote batch debug dump");
    Ok(path)
}

/// Read the latest document back.
pub async fn read_latest(data_dir: &Path) -> Result<DigestDocument, Box<dyn Error>> {
    let text = fs::read_to_string(data_dir.join(LATEST_FILE)).await?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Analysis, Categories, Record};

    fn document() -> DigestDocument {
        let mut categories = Categories::new();
        categories.push(
            "新闻",
            Record::new("标题", "https://example.com", "来源", "")
                .unwrap()
                .with_extra("⭐ 1,000"),
        );
        DigestDocument {
            date: "2026-10-19".to_string(),
            categories,
            analysis: Analysis {
                summary: "今日摘要".to_string(),
                trends: vec!["agents".to_string()],
            },
            error: None,
        }
    }

    #[tokio::test]
    async fn test_write_digest_writes_dated_and_latest() {
        let dir = tempfile::tempdir().unwrap();
        let doc = document();

        let paths = write_digest(&doc, dir.path()).await.unwrap();
        assert_eq!(paths.len(), 2);

        let dated = std::fs::read_to_string(dir.path().join("digest_2026-10-19.json")).unwrap();
        let latest = std::fs::read_to_string(dir.path().join("latest.json")).unwrap();
        assert_eq!(dated, latest);
        assert!(latest.contains("今日摘要"));
        assert!(latest.contains('\n'));
        assert!(!latest.contains("\"error\""));

        assert_eq!(read_latest(dir.path()).await.unwrap(), doc);
    }

    #[tokio::test]
    async fn test_fallback_document_is_archived_too() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DigestDocument::fallback("2026-10-19", "no key", "⚠️ no key", &[]);
        write_digest(&doc, dir.path()).await.unwrap();
        assert!(dir.path().join("digest_2026-10-19.json").exists());
        let back = read_latest(dir.path()).await.unwrap();
        assert_eq!(back.error.as_deref(), Some("no key"));
    }

    #[tokio::test]
    async fn test_debug_dump_path_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let failed = FailedBatch {
            index: 3,
            raw: "{\"categories\": ".to_string(),
            errors: vec![("direct", "EOF while parsing".to_string())],
        };
        let path = write_debug_dump(&failed, dir.path(), "2026-10-19").await.unwrap();
        assert_eq!(path, dir.path().join("debug/batch_2026-10-19_3.txt"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("direct: EOF while parsing"));
        assert!(text.contains("{\"categories\": "));
    }

    #[tokio::test]
    async fn test_read_latest_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_latest(dir.path()).await.is_err());
    }
}
