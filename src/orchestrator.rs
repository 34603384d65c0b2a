//! # Pipeline Orchestrator (§4.9)
//! Ties every component into the single run flow: generate queries, collect,
//! auto-disable abort-heavy sources with an optional one-shot re-run,
//! deduplicate, persist `lastSuccessAt`, and purge expired history.

use crate::collector::{CollectionResult, Collector};
use crate::config::app::AppConfig;
use crate::config::dedup_thresholds::DedupThresholdsConfig;
use crate::config::queries::QueriesConfig;
use crate::config::sources::SourcesConfig;
use crate::config::tag_synonyms::TagSynonymsConfig;
use crate::dedup::{DedupOutput, Deduplicator};
use crate::fetch::Fetcher;
use crate::history::HistoryStore;
use crate::query_generator::{self, ScoredQuery, TitleCorpora};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Everything the orchestrator loads before a run.
pub struct PipelineConfigs {
    pub app: AppConfig,
    pub sources: SourcesConfig,
    pub queries: QueriesConfig,
    pub dedup_thresholds: DedupThresholdsConfig,
    pub tag_synonyms: TagSynonymsConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub dry_run: bool,
    pub auto_disable: bool,
    pub rerun: bool,
    /// `--date` override of "today"; `None` uses the real clock.
    pub date_override: Option<DateTime<Utc>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            auto_disable: true,
            rerun: true,
            date_override: None,
        }
    }
}

/// `last_success.json`: `{lastSuccessAt: ISO-timestamp}` (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LastSuccessState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_success_at: Option<DateTime<Utc>>,
}

fn load_last_success(path: &Path) -> Result<Option<DateTime<Utc>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading last-success state from {}", path.display()))?;
    let state: LastSuccessState =
        serde_json::from_str(&content).context("parsing last-success state JSON")?;
    Ok(state.last_success_at)
}

fn persist_last_success(path: &Path, at: DateTime<Utc>) -> Result<()> {
    let state = LastSuccessState {
        last_success_at: Some(at),
    };
    let json = serde_json::to_string_pretty(&state).context("serialising last-success state")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, json).with_context(|| format!("writing last-success state to {}", path.display()))
}

/// Outcome of a full orchestrator invocation, handed off to the (out of
/// scope) renderer.
pub struct OrchestratorReport {
    pub collection: CollectionResult,
    pub dedup: DedupOutput,
    pub disabled_sources: Vec<String>,
    pub reran: bool,
}

pub struct Orchestrator {
    pub fetcher: Arc<dyn Fetcher>,
    pub history: HistoryStore,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<dyn Fetcher>, history: HistoryStore) -> Self {
        Self { fetcher, history }
    }

    fn build_corpora(&self, window_start: DateTime<Utc>) -> Result<TitleCorpora> {
        let recent = self
            .history
            .find_by_date_range(window_start, None)?
            .into_iter()
            .map(|e| e.title)
            .collect();
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_else(Utc::now);
        let all_time = self
            .history
            .find_by_date_range(epoch, None)?
            .into_iter()
            .map(|e| e.title)
            .collect();
        Ok(TitleCorpora { recent, all_time })
    }

    fn allocate_queries(
        &self,
        sources: &SourcesConfig,
        queries: &QueriesConfig,
        ranked: &[ScoredQuery],
    ) -> HashMap<String, Vec<ScoredQuery>> {
        sources
            .enabled_sources()
            .map(|s| {
                (
                    s.id.clone(),
                    query_generator::allocate_for_source(ranked, queries.selection.max_per_source),
                )
            })
            .collect()
    }

    /// §4.9 steps 1-10. Fatal config/IO errors propagate as `Err`; logical
    /// failures (tier-3 loss, abort-heavy disables) are folded into the
    /// returned report and never surface as `Err`.
    pub async fn run(
        &mut self,
        configs: &mut PipelineConfigs,
        options: RunOptions,
    ) -> Result<Option<OrchestratorReport>> {
        let now = options.date_override.unwrap_or_else(Utc::now);
        let last_success_at = load_last_success(&configs.app.state_path)?;
        let window_start = crate::date_parser::window_start(last_success_at, now);

        let corpora = self.build_corpora(window_start)?;
        let ranked =
            query_generator::generate_queries(&configs.queries, &corpora, &configs.tag_synonyms);
        let allocated = self.allocate_queries(&configs.sources, &configs.queries, &ranked);

        let collector = Collector::new(Arc::clone(&self.fetcher), configs.sources.rate_control.clone());
        let tasks = collector.plan(&configs.sources, &allocated);

        if options.dry_run || configs.app.dry_run {
            tracing::info!(target: "orchestrator", task_count = tasks.len(), "dry run: built tasks, skipping fetch");
            return Ok(None);
        }

        let mut collection = collector.run(tasks).await;

        let mut disabled_sources = Vec::new();
        let mut reran = false;
        if options.auto_disable {
            let abort_heavy = collection.abort_heavy_source_ids();
            if !abort_heavy.is_empty() {
                tracing::warn!(target: "orchestrator", sources = ?abort_heavy, "disabling abort-heavy sources");
                configs.sources.persist_disabled(&abort_heavy)?;
                disabled_sources = abort_heavy;

                if options.rerun {
                    let ranked = query_generator::generate_queries(
                        &configs.queries,
                        &corpora,
                        &configs.tag_synonyms,
                    );
                    let allocated = self.allocate_queries(&configs.sources, &configs.queries, &ranked);
                    let collector =
                        Collector::new(Arc::clone(&self.fetcher), configs.sources.rate_control.clone());
                    let tasks = collector.plan(&configs.sources, &allocated);
                    collection = collector.run(tasks).await;
                    reran = true;
                }
            }
        }

        let deduplicator = Deduplicator::new(
            &self.history,
            &configs.dedup_thresholds,
            configs.app.url_normalization.to_options(),
            &configs.sources.sources,
        );
        let dedup = deduplicator.run(collection.all_articles(), window_start, now)?;

        persist_last_success(&configs.app.state_path, now)?;
        self.history.cleanup(Some(now - chrono::Duration::days(configs.app.history.retention_days)))?;

        Ok(Some(OrchestratorReport {
            collection,
            dedup,
            disabled_sources,
            reran,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::sources::{CollectMethod, RateControl, SourceConfig, Tier};
    use crate::fetch::{FetchOpts, FetchOutcome};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct StubFetcher;
    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn execute_direct(&self, _u: &str, _p: &str, _s: &str, _o: &FetchOpts) -> FetchOutcome {
            FetchOutcome::success(
                r#"{"articles": [{"title": "Hello world", "url": "https://example.com/a"}]}"#,
            )
        }
        async fn execute_search(&self, _q: &str, _p: &str, _s: &str, _o: &FetchOpts) -> FetchOutcome {
            FetchOutcome::failure("network unreachable")
        }
    }

    struct AbortHeavyFetcher;
    #[async_trait]
    impl Fetcher for AbortHeavyFetcher {
        async fn execute_direct(&self, _u: &str, _p: &str, _s: &str, _o: &FetchOpts) -> FetchOutcome {
            FetchOutcome::failure("agent process aborted by user")
        }
        async fn execute_search(&self, _q: &str, _p: &str, _s: &str, _o: &FetchOpts) -> FetchOutcome {
            FetchOutcome::failure("agent process aborted by user")
        }
    }

    fn base_configs(dir: &std::path::Path, tier: Tier) -> PipelineConfigs {
        let source = SourceConfig {
            id: "a".to_string(),
            name: "A".to_string(),
            tier,
            enabled: true,
            collect_method: CollectMethod::DirectFetch,
            url: Some("https://a.example.com".to_string()),
            query: None,
            accounts: Vec::new(),
            date_method: None,
            date_selector: None,
            date_pattern: None,
            max_articles: None,
            repair_eligible: false,
        };
        let mut sources = SourcesConfig::new(vec![source], RateControl::default());
        let sources_path = dir.join("sources.json");
        std::fs::write(&sources_path, serde_json::to_string(&sources).unwrap()).unwrap();
        sources = SourcesConfig::load_from_file(&sources_path).unwrap();

        let mut app = AppConfig::default();
        app.state_path = dir.join("state.json");

        PipelineConfigs {
            app,
            sources,
            queries: QueriesConfig::load_from_str(r#"{"query_groups": []}"#).unwrap(),
            dedup_thresholds: DedupThresholdsConfig::load_from_str("{}").unwrap(),
            tag_synonyms: TagSynonymsConfig::default(),
        }
    }

    #[tokio::test]
    async fn successful_run_persists_last_success_and_updates_history() {
        let dir = tempdir().unwrap();
        let mut configs = base_configs(dir.path(), Tier::One);
        let mut orchestrator =
            Orchestrator::new(Arc::new(StubFetcher), HistoryStore::open_in_memory().unwrap());

        let report = orchestrator
            .run(&mut configs, RunOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.dedup.articles.len(), 1);
        assert!(configs.app.state_path.exists());
        assert_eq!(orchestrator.history.get_stats().unwrap().total, 1);
    }

    #[tokio::test]
    async fn dry_run_builds_no_history_and_returns_none() {
        let dir = tempdir().unwrap();
        let mut configs = base_configs(dir.path(), Tier::One);
        let mut orchestrator =
            Orchestrator::new(Arc::new(StubFetcher), HistoryStore::open_in_memory().unwrap());
        let mut options = RunOptions::default();
        options.dry_run = true;

        let report = orchestrator.run(&mut configs, options).await.unwrap();
        assert!(report.is_none());
        assert!(!configs.app.state_path.exists());
    }

    #[tokio::test]
    async fn scenario_4_abort_heavy_source_disabled_and_rerun() {
        let dir = tempdir().unwrap();
        let mut configs = base_configs(dir.path(), Tier::One);
        let mut orchestrator =
            Orchestrator::new(Arc::new(AbortHeavyFetcher), HistoryStore::open_in_memory().unwrap());

        let report = orchestrator
            .run(&mut configs, RunOptions::default())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.disabled_sources, vec!["a".to_string()]);
        assert!(report.reran);
        assert!(!configs.sources.sources[0].enabled);

        let reloaded = SourcesConfig::load_from_file(dir.path().join("sources.json")).unwrap();
        assert!(!reloaded.sources[0].enabled);
    }
}
