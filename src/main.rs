//! # AI Daily Digest
//!
//! A daily news pipeline that polls AI-related feeds and public APIs,
//! reconciles the collected items through an LLM (translation, summarizing,
//! grouping), and publishes the result as JSON and as a static HTML page.
//!
//! ## Features
//!
//! - Collects from news RSS feeds, YouTube, Twitter, TikTok, GitHub trending,
//!   MCP and skill directories, and the HuggingFace Hub
//! - Sends records in batches to an OpenAI-compatible chat completions API
//! - Recovers JSON from imperfect model output with a layered repair chain
//! - Writes `digest_{date}.json` and `latest.json`, then renders HTML
//! - Degrades to a raw-record document instead of failing the run
//!
//! ## Usage
//!
//! ```sh
//! SILICONFLOW_API_KEY=sk-... ai_daily_digest --data-dir ./data --docs-dir ./docs
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Collection**: Run every source adapter in a fixed order
//! 2. **Reconciliation**: Batch records through the LLM and merge the replies
//! 3. **Output**: Write the digest JSON and debug dumps
//! 4. **Rendering**: Build the HTML page from `latest.json`

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod collector;
mod config;
mod models;
mod outputs;
mod reconcile;
mod repair;
mod sources;
mod utils;

use api::ChatClient;
use cli::Cli;
use config::Settings;
use outputs::{html, json};
use reconcile::{Reconciled, reconcile};
use sources::SourceContext;
use utils::ensure_writable_dir;

#[tokio::main(flavor = "current_thread")]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // .env may carry RUST_LOG, so it is read before tracing starts
    let dotenv = dotenvy::dotenv();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("ai_daily_digest starting up");

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => debug!("No .env file"),
        Err(e) => warn!(error = %e, "Failed to read .env; continuing with the process environment"),
    }

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.data_dir, ?args.docs_dir, ?args.config, "Parsed CLI arguments");

    if args.render_only {
        let paths = html::render_latest(&args.data_dir, &args.docs_dir).await?;
        info!(pages = paths.len(), "Rendered HTML only");
        return Ok(());
    }

    // ---- Configuration errors are the only fatal ones ----
    let mut settings = match Settings::load(args.config.as_deref()).await {
        Ok(settings) => settings,
        Err(e) => {
            error!(path = ?args.config, error = %e, "Invalid settings file");
            return Err(e);
        }
    };
    if let Some(model) = args.model_override() {
        settings.llm.model = model;
    }
    if let Some(base_url) = args.base_url_override() {
        settings.llm.base_url = base_url;
    }

    if let Err(e) = ensure_writable_dir(&args.data_dir).await {
        error!(
            path = %args.data_dir.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let credentials = args.credentials();
    info!(?credentials, "Credentials available");

    let now = Local::now();
    let date = now.format("%Y-%m-%d").to_string();
    let client = credentials
        .llm
        .as_deref()
        .map(|key| ChatClient::new(key, &settings.llm))
        .transpose()?;
    if let Some(client) = &client {
        info!(model = client.model(), "LLM client ready");
    }

    // ---- Collect ----
    let ctx = SourceContext::new(credentials, settings.clone(), now)?;
    let records = collector::collect_all(&ctx).await;
    info!(count = records.len(), "Total records to reconcile");

    // ---- Reconcile and write ----
    match reconcile(&records, client.as_ref(), &settings.digest, &date).await {
        Reconciled::NoData => {
            warn!("No data collected; no digest written");
        }
        Reconciled::Digest {
            document,
            failed_batches,
        } => {
            if document.is_degraded() {
                warn!(error = ?document.error, "Writing degraded digest");
            }
            if let Err(e) = json::write_digest(&document, &args.data_dir).await {
                error!(error = %e, "Failed to write digest JSON");
            }
            for failed in &failed_batches {
                if let Err(e) = json::write_debug_dump(failed, &args.data_dir, &date).await {
                    error!(batch = failed.index, error = %e, "Failed to write debug dump");
                }
            }

            // ---- HTML ----
            if args.skip_html {
                info!("Skipping HTML rendering");
            } else if let Err(e) = html::render_latest(&args.data_dir, &args.docs_dir).await {
                error!(error = %e, "Failed to render HTML");
            }

            info!(
                categories = ?document.categories.labels().collect::<Vec<_>>(),
                records = document.categories.total(),
                failed_batches = failed_batches.len(),
                "Digest published"
            );
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
