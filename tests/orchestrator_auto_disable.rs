use async_trait::async_trait;
use news_collector::config::app::AppConfig;
use news_collector::config::dedup_thresholds::DedupThresholdsConfig;
use news_collector::config::queries::QueriesConfig;
use news_collector::config::sources::{CollectMethod, RateControl, SourceConfig, SourcesConfig, Tier};
use news_collector::config::tag_synonyms::TagSynonymsConfig;
use news_collector::fetch::{FetchOpts, FetchOutcome};
use news_collector::history::HistoryStore;
use news_collector::orchestrator::{Orchestrator, PipelineConfigs, RunOptions};
use news_collector::Fetcher;
use std::sync::Arc;

struct OneShotAbortThenSucceedFetcher;

#[async_trait]
impl Fetcher for OneShotAbortThenSucceedFetcher {
    async fn execute_direct(&self, _url: &str, _prompt: &str, source: &str, _opts: &FetchOpts) -> FetchOutcome {
        if source == "flaky" {
            FetchOutcome::failure("operation aborted by the runtime")
        } else {
            FetchOutcome::success(r#"{"articles": [{"title": "Steady news", "url": "https://steady.example.com/a"}]}"#)
        }
    }

    async fn execute_search(&self, _query: &str, _prompt: &str, _source: &str, _opts: &FetchOpts) -> FetchOutcome {
        FetchOutcome::failure("not used")
    }
}

fn source(id: &str) -> SourceConfig {
    SourceConfig {
        id: id.to_string(),
        name: id.to_string(),
        tier: Tier::One,
        enabled: true,
        collect_method: CollectMethod::DirectFetch,
        url: Some(format!("https://{id}.example.com")),
        query: None,
        accounts: Vec::new(),
        date_method: None,
        date_selector: None,
        date_pattern: None,
        max_articles: None,
        repair_eligible: false,
    }
}

#[tokio::test]
async fn re_run_drops_the_just_disabled_source_and_keeps_the_healthy_one() {
    let dir = tempfile::tempdir().unwrap();
    let sources_path = dir.path().join("sources.json");
    let sources = SourcesConfig::new(
        vec![source("flaky"), source("steady")],
        RateControl {
            default_max_retries: 3,
            default_retry_interval_secs: 0,
            ..RateControl::default()
        },
    );
    std::fs::write(&sources_path, serde_json::to_string(&sources).unwrap()).unwrap();
    let sources = SourcesConfig::load_from_file(&sources_path).unwrap();

    let mut app = AppConfig::default();
    app.state_path = dir.path().join("state.json");

    let mut configs = PipelineConfigs {
        app,
        sources,
        queries: QueriesConfig::load_from_str(r#"{"query_groups": []}"#).unwrap(),
        dedup_thresholds: DedupThresholdsConfig::load_from_str("{}").unwrap(),
        tag_synonyms: TagSynonymsConfig::default(),
    };

    let mut orchestrator = Orchestrator::new(
        Arc::new(OneShotAbortThenSucceedFetcher),
        HistoryStore::open_in_memory().unwrap(),
    );

    let report = orchestrator
        .run(&mut configs, RunOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.disabled_sources, vec!["flaky".to_string()]);
    assert!(report.reran);

    let kept_sources: Vec<_> = report
        .collection
        .outcomes
        .iter()
        .map(|o| o.source_id.clone())
        .collect();
    assert!(!kept_sources.contains(&"flaky".to_string()));
    assert!(kept_sources.contains(&"steady".to_string()));
    assert_eq!(report.dedup.articles.len(), 1);

    let reloaded = SourcesConfig::load_from_file(&sources_path).unwrap();
    assert!(!reloaded.sources.iter().find(|s| s.id == "flaky").unwrap().enabled);
    assert!(reloaded.sources.iter().find(|s| s.id == "steady").unwrap().enabled);
}
