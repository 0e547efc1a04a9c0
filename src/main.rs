//! rss-curator: binary entrypoint
//! One invocation = one batch run, driven by an external scheduler.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use rss_curator::ingest::providers::http::HttpFeedSource;
use rss_curator::judge::openai::OpenAiJudge;
use rss_curator::state::cutoff;
use rss_curator::{render, telemetry, Config, Pipeline, PipelineConfig, Store};

#[derive(Debug, Parser)]
#[command(name = "rss-curator", version, about = "Classify, digest and render RSS/Atom feeds")]
struct Cli {
    /// TOML config file (falls back to $RSS_CURATOR_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dotenv file loaded before reading the environment.
    #[arg(long, env = "RSS_CURATOR_ENV_FILE")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Fetch, classify new articles, prune, refresh digests, save, render.
    Run,
    /// Re-render the site from the saved state only.
    Render,
    /// Print per-feed counts from the saved state.
    State,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load .env in local/dev; no-op when absent.
    match &cli.env_file {
        Some(p) => {
            if let Err(e) = dotenvy::from_path(p) {
                eprintln!("cannot load env file {}: {e}", p.display());
                return ExitCode::FAILURE;
            }
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }

    telemetry::init_tracing();

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(config = ?cfg, "configuration loaded");

    let res = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&cfg).await,
        Command::Render => render_only(&cfg),
        Command::State => print_state(&cfg),
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "run failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: &Config) -> Result<()> {
    let prometheus = match telemetry::install_recorder() {
        Ok(h) => Some(h),
        Err(e) => {
            warn!(error = ?e, "metrics disabled");
            None
        }
    };

    let source = HttpFeedSource::new(cfg.fetch_timeout_secs).context("building feed client")?;
    let judge = OpenAiJudge::new(
        cfg.openai_api_key.clone(),
        cfg.openai_base_url.clone(),
        cfg.ai_model.clone(),
        Duration::from_secs(cfg.judgment_timeout_secs),
    )
    .context("building judgment client")?;
    let pipeline = Pipeline::new(PipelineConfig::from(cfg), Arc::new(source), Arc::new(judge));

    let mut store = Store::load(&cfg.state_file).context("loading state")?;
    let report = pipeline
        .run(&mut store)
        .await
        .context("saving state; this run's classifications were not persisted")?;

    // Site and metrics are derived outputs; the state is already safe.
    if let Err(e) = render::write_site(&store, &cfg.site_dir, Utc::now(), cfg.days_lookback) {
        warn!(error = ?e, "site rendering failed");
    }
    if let Some(h) = &prometheus {
        if let Err(e) = telemetry::write_textfile(h, &cfg.metrics_path()) {
            warn!(error = ?e, "metrics export failed");
        }
    }

    println!("{report}");
    Ok(())
}

fn render_only(cfg: &Config) -> Result<()> {
    let store = Store::load(&cfg.state_file).context("loading state")?;
    let pages = render::write_site(&store, &cfg.site_dir, Utc::now(), cfg.days_lookback)?;
    println!("rendered {} feed pages to {}", pages.len(), cfg.site_dir.display());
    Ok(())
}

fn print_state(cfg: &Config) -> Result<()> {
    let store = Store::load(&cfg.state_file).context("loading state")?;
    let since = cutoff(Utc::now(), cfg.days_lookback);
    for url in store.feed_urls() {
        let all = store.articles(&url);
        let recent = store.recent_articles(&url, since).len();
        let digest = store.digest_articles(&url, since).len();
        println!(
            "{url}\t{}\tarticles={}\trecent={recent}\tdigest={digest}",
            store.feed_title(&url).unwrap_or("-"),
            all.len()
        );
    }
    Ok(())
}
