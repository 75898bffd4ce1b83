//! Runs every source adapter in a fixed order and concatenates the records.
//!
//! Each adapter runs inside a failure boundary: an error is logged with the
//! source name and the run continues with the next adapter.

use crate::models::Record;
use crate::sources::{Source, SourceContext};
use std::error::Error;
use tracing::{error, info, instrument};

/// Append the outcome of one adapter to `records`, logging failures.
///
/// Returns the number of records added.
pub fn absorb(
    source: &str,
    outcome: Result<Vec<Record>, Box<dyn Error>>,
    records: &mut Vec<Record>,
) -> usize {
    match outcome {
        Ok(found) => {
            let count = found.len();
            info!(source, count, "Source finished");
            records.extend(found);
            count
        }
        Err(e) => {
            error!(source, error = %e, "Source failed; continuing");
            0
        }
    }
}

/// Collect records from all sources, one after another.
#[instrument(level = "info", skip_all)]
pub async fn collect_all(ctx: &SourceContext) -> Vec<Record> {
    let mut records = Vec::new();
    for source in Source::ALL {
        let outcome = source.fetch(ctx).await;
        absorb(source.name(), outcome, &mut records);
    }
    info!(total = records.len(), "Collection complete");
    records
}
