//! # Daily Collection Run — Binary Entrypoint
//! Boots tracing, loads the on-disk configs, and drives one Pipeline
//! Orchestrator pass (§4.9).
//!
//! ## Flags
//! - `--dry-run` — build tasks, print the plan, fetch nothing
//! - `--no-auto-disable` — skip the abort-heavy auto-disable pass
//! - `--no-rerun` — disable after auto-disabling (no second collection pass)
//! - `--date=YYYY-MM-DD` — override "now" for freshness/window calculations
//! - `--verbose` — `debug` log filter instead of `info`
//!
//! The actual web-fetching backend (the LLM-driven Fetch Executor) is
//! outside this crate's scope; this binary wires a stub that reports itself
//! unconfigured so the orchestration flow is exercised end to end.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use news_collector::config::app::AppConfig;
use news_collector::config::dedup_thresholds::DedupThresholdsConfig;
use news_collector::config::queries::QueriesConfig;
use news_collector::config::sources::SourcesConfig;
use news_collector::config::tag_synonyms::TagSynonymsConfig;
use news_collector::fetch::{FetchOpts, FetchOutcome};
use news_collector::history::HistoryStore;
use news_collector::orchestrator::{Orchestrator, PipelineConfigs, RunOptions};
use news_collector::Fetcher;
use std::sync::Arc;

struct UnconfiguredFetcher;

#[async_trait]
impl Fetcher for UnconfiguredFetcher {
    async fn execute_direct(&self, _url: &str, _prompt: &str, source: &str, _opts: &FetchOpts) -> FetchOutcome {
        FetchOutcome::failure(format!("no fetch backend configured for source {source}"))
    }

    async fn execute_search(&self, _query: &str, _prompt: &str, source: &str, _opts: &FetchOpts) -> FetchOutcome {
        FetchOutcome::failure(format!("no fetch backend configured for source {source}"))
    }
}

struct Cli {
    dry_run: bool,
    auto_disable: bool,
    rerun: bool,
    date_override: Option<chrono::DateTime<Utc>>,
    verbose: bool,
}

fn parse_cli(args: impl Iterator<Item = String>) -> Result<Cli> {
    let mut cli = Cli {
        dry_run: false,
        auto_disable: true,
        rerun: true,
        date_override: None,
        verbose: false,
    };
    for arg in args.skip(1) {
        if let Some(date) = arg.strip_prefix("--date=") {
            let naive = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("invalid --date value: {date}"))?;
            let naive_time = naive
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always valid");
            cli.date_override = Some(Utc.from_utc_datetime(&naive_time));
            continue;
        }
        match arg.as_str() {
            "--dry-run" => cli.dry_run = true,
            "--no-auto-disable" => cli.auto_disable = false,
            "--no-rerun" => cli.rerun = false,
            "--verbose" => cli.verbose = true,
            "--simple" => {}
            other => anyhow::bail!("unrecognized argument: {other}"),
        }
    }
    Ok(cli)
}

fn init_tracing(app: &AppConfig, verbose: bool) {
    use news_collector::config::app::LogFormat;
    let filter = if verbose { "debug" } else { app.logging.filter.as_str() };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match app.logging.format {
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
        LogFormat::Pretty => {
            let _ = builder.try_init();
        }
    }
}

/// §6: exit 0 on logical success (including partial tier-3 loss), exit 2 on
/// a fatal config/runtime error. `main` itself never returns `Err` — it
/// converts a fatal failure into a logged message plus `process::exit(2)`,
/// since the default Rust exit-on-`Err` convention (code 1) doesn't match
/// the spec's taxonomy.
#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(target: "orchestrator", error = %err, "fatal error, aborting run");
        eprintln!("fatal error: {err:#}");
        std::process::exit(2);
    }
}

async fn run() -> Result<()> {
    let cli = parse_cli(std::env::args())?;

    let app =
        AppConfig::load_from_file("config/app.json").unwrap_or_else(|_| AppConfig::default());
    init_tracing(&app, cli.verbose);

    let sources = SourcesConfig::load_from_file("config/sources.json")
        .context("loading config/sources.json")?;
    let queries =
        QueriesConfig::load_from_file("config/queries.json").context("loading config/queries.json")?;
    let dedup_thresholds = DedupThresholdsConfig::load_from_file("config/dedup_thresholds.json")
        .unwrap_or_else(|_| DedupThresholdsConfig::load_from_str("{}").expect("empty config parses"));
    let tag_synonyms = TagSynonymsConfig::load_from_file("config/tag_synonyms.json")
        .unwrap_or_default();

    let mut configs = PipelineConfigs {
        app,
        sources,
        queries,
        dedup_thresholds,
        tag_synonyms,
    };

    let history = match configs.app.history.backend {
        news_collector::config::app::HistoryBackend::Sqlite => {
            HistoryStore::open(&configs.app.history.path).context("opening history store")?
        }
        news_collector::config::app::HistoryBackend::Memory => {
            HistoryStore::open_in_memory().context("opening in-memory history store")?
        }
    };

    let mut orchestrator = Orchestrator::new(Arc::new(UnconfiguredFetcher), history);
    let options = RunOptions {
        dry_run: cli.dry_run,
        auto_disable: cli.auto_disable,
        rerun: cli.rerun,
        date_override: cli.date_override,
    };

    match orchestrator.run(&mut configs, options).await? {
        None => tracing::info!(target: "orchestrator", "dry run complete"),
        Some(report) => {
            tracing::info!(
                target: "orchestrator",
                collected = report.collection.all_articles().len(),
                kept = report.dedup.articles.len(),
                disabled = report.disabled_sources.len(),
                reran = report.reran,
                "collection run complete"
            );
        }
    }

    Ok(())
}
