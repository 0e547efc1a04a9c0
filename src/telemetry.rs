// src/telemetry.rs
//! Tracing subscriber and Prometheus textfile export.

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::state::write_atomic;

pub const DEFAULT_LOG_FILTER: &str = "rss_curator=info,warn";

/// Installs the global subscriber. `LOG_FORMAT=json` selects JSON lines.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if let Err(e) = res {
        eprintln!("tracing already initialized: {e}");
    }
}

/// One-time metrics registration so every series carries help text.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("curator_feeds_fetched_total", "Feeds fetched successfully.");
        describe_counter!("curator_feed_errors_total", "Feeds skipped after a fetch error.");
        describe_counter!(
            "curator_articles_classified_total",
            "New articles classified, by status."
        );
        describe_counter!(
            "curator_classify_errors_total",
            "Classification calls that failed; retried next run."
        );
        describe_counter!(
            "curator_articles_known_total",
            "In-window entries already classified."
        );
        describe_counter!(
            "curator_articles_out_of_window_total",
            "Entries dated outside the lookback window."
        );
        describe_counter!(
            "curator_articles_undated_total",
            "Entries without a parseable date."
        );
        describe_counter!("curator_digests_generated_total", "Digest syntheses requested.");
        describe_counter!(
            "curator_digests_reused_total",
            "Digests whose article set was unchanged."
        );
        describe_counter!("curator_digest_errors_total", "Digest syntheses that failed.");
        describe_counter!("curator_articles_pruned_total", "Articles removed by pruning.");
        describe_histogram!("curator_feed_parse_ms", "Feed XML parse time in milliseconds.");
        describe_gauge!("curator_last_run_ts", "Unix ts of the last pipeline run.");
    });
}

/// Installs the Prometheus recorder for this process.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("installing prometheus recorder")
}

/// Writes the exposition text where a node-exporter textfile collector can
/// pick it up.
pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    let body = handle.render();
    write_atomic(path, body.as_bytes())
        .with_context(|| format!("writing metrics to {}", path.display()))
}
