//! # Collector (§4.7)
//! Builds per-source fetch tasks, runs them tier-serially with a bounded
//! concurrency within each tier, and aggregates per-source status.

use crate::config::sources::{CollectMethod, SourceConfig, SourcesConfig, Tier};
use crate::error::FetchError;
use crate::fetch::{extract_with_optional_repair, fetch_with_retry, FetchOpts, FetchTarget, Fetcher};
use crate::model::RawArticle;
use crate::query_generator::ScoredQuery;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Per-source fetch method, with the fields that method actually needs.
#[derive(Debug, Clone)]
pub enum TaskMethod {
    Direct { url: String },
    Search { query: String },
}

#[derive(Debug, Clone)]
pub struct Task {
    pub source_id: String,
    pub tier: Tier,
    pub method: TaskMethod,
    pub prompt: String,
    pub repair_eligible: bool,
    pub max_articles: Option<u32>,
}

fn direct_fetch_prompt(source: &SourceConfig) -> String {
    format!(
        "Fetch the latest articles from {} and return them as JSON.",
        source.name
    )
}

fn twitter_search_prompt(source: &SourceConfig) -> String {
    format!(
        "Search recent posts from {} and return matching articles as JSON.",
        source.name
    )
}

fn search_prompt(source: &SourceConfig) -> String {
    format!(
        "Search for recent articles matching the query and return them as JSON for {}.",
        source.name
    )
}

/// §4.7 task construction, per enabled source.
pub fn build_tasks(
    sources: &SourcesConfig,
    allocated_queries: &HashMap<String, Vec<ScoredQuery>>,
) -> Vec<Task> {
    sources
        .enabled_sources()
        .map(|source| {
            let method = match source.collect_method {
                CollectMethod::DirectFetch => TaskMethod::Direct {
                    url: source.url.clone().unwrap_or_default(),
                },
                CollectMethod::Search if !source.accounts.is_empty() => {
                    let accounts = source
                        .accounts
                        .iter()
                        .map(|a| format!("from:@{a}"))
                        .collect::<Vec<_>>()
                        .join(" OR ");
                    let keywords = allocated_queries
                        .get(&source.id)
                        .map(|qs| qs.iter().map(|q| q.text.clone()).collect::<Vec<_>>())
                        .unwrap_or_default();
                    let keyword_clause = if keywords.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", keywords.join(" OR "))
                    };
                    TaskMethod::Search {
                        query: format!("({accounts}){keyword_clause}"),
                    }
                }
                CollectMethod::Search => {
                    let keywords = allocated_queries
                        .get(&source.id)
                        .map(|qs| qs.iter().map(|q| q.text.clone()).collect::<Vec<_>>())
                        .unwrap_or_default();
                    let base = source.query.clone().unwrap_or_default();
                    let query = if keywords.is_empty() {
                        base
                    } else {
                        format!("{base} {}", keywords.join(" "))
                    };
                    TaskMethod::Search { query }
                }
            };

            let prompt = match (&source.collect_method, source.accounts.is_empty()) {
                (CollectMethod::DirectFetch, _) => direct_fetch_prompt(source),
                (CollectMethod::Search, false) => twitter_search_prompt(source),
                (CollectMethod::Search, true) => search_prompt(source),
            };

            Task {
                source_id: source.id.clone(),
                tier: source.tier,
                method,
                prompt,
                repair_eligible: source.repair_eligible,
                max_articles: source.max_articles,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source_id: String,
    pub tier: Tier,
    pub status: SourceStatus,
    pub articles: Vec<RawArticle>,
    pub error: Option<FetchError>,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionResult {
    pub outcomes: Vec<SourceOutcome>,
}

impl CollectionResult {
    pub fn all_articles(&self) -> Vec<RawArticle> {
        self.outcomes
            .iter()
            .flat_map(|o| o.articles.clone())
            .collect()
    }

    /// §4.9: sources whose error is an abort-heavy signal.
    pub fn abort_heavy_source_ids(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.error
                    .as_ref()
                    .filter(|e| e.is_abort_heavy_signal())
                    .map(|_| o.source_id.clone())
            })
            .collect()
    }
}

async fn run_task(
    fetcher: Arc<dyn Fetcher>,
    task: Task,
    timeout: std::time::Duration,
    retry_interval: std::time::Duration,
    max_retries: u32,
) -> SourceOutcome {
    let target = match &task.method {
        TaskMethod::Direct { url } => FetchTarget::Direct { url },
        TaskMethod::Search { query } => FetchTarget::Search { query },
    };

    let fetch_result = fetch_with_retry(
        fetcher.as_ref(),
        target,
        &task.prompt,
        &task.source_id,
        max_retries,
        timeout,
        retry_interval,
    )
    .await;

    let content = match fetch_result {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(target: "collector", source = %task.source_id, kind = ?err.kind, "source failed");
            return SourceOutcome {
                source_id: task.source_id,
                tier: task.tier,
                status: SourceStatus::Failed,
                articles: Vec::new(),
                error: Some(err),
            };
        }
    };

    let direct_url = match &task.method {
        TaskMethod::Direct { url } => Some(url.as_str()),
        TaskMethod::Search { .. } => None,
    };
    let opts = FetchOpts { timeout };
    let extracted = extract_with_optional_repair(
        &content,
        &task.source_id,
        task.repair_eligible,
        direct_url,
        fetcher.as_ref(),
        &opts,
    )
    .await;

    let mut articles = extracted.articles;
    if let Some(max) = task.max_articles {
        articles.truncate(max as usize);
    }

    let status = match (&extracted.error, articles.is_empty()) {
        (None, _) => SourceStatus::Success,
        (Some(_), false) => SourceStatus::Partial,
        (Some(_), true) => SourceStatus::Failed,
    };

    let error = extracted.error.map(|kind| {
        let mut e = FetchError::new(&task.source_id, 0, "parse error after extraction");
        e.kind = kind;
        e
    });

    SourceOutcome {
        source_id: task.source_id,
        tier: task.tier,
        status,
        articles,
        error,
    }
}

/// Runs Fetch Executor tasks across all enabled sources under a concurrency
/// bound, tier-serially (§4.7, §5). `dry_run` short-circuits before any
/// fetch is attempted.
pub struct Collector {
    pub fetcher: Arc<dyn Fetcher>,
    pub rate_control: crate::config::sources::RateControl,
    pub dry_run: bool,
}

impl Collector {
    pub fn new(fetcher: Arc<dyn Fetcher>, rate_control: crate::config::sources::RateControl) -> Self {
        Self {
            fetcher,
            rate_control,
            dry_run: false,
        }
    }

    /// Build tasks without contacting the Fetch Executor.
    pub fn plan(
        &self,
        sources: &SourcesConfig,
        allocated_queries: &HashMap<String, Vec<ScoredQuery>>,
    ) -> Vec<Task> {
        build_tasks(sources, allocated_queries)
    }

    /// Run the built tasks tier 1 -> tier 2 -> tier 3, bounded concurrency
    /// within each tier, all-settled semantics.
    pub async fn run(&self, tasks: Vec<Task>) -> CollectionResult {
        if self.dry_run {
            return CollectionResult::default();
        }

        let mut by_tier: HashMap<Tier, Vec<Task>> = HashMap::new();
        for task in tasks {
            by_tier.entry(task.tier).or_default().push(task);
        }

        let mut outcomes = Vec::new();
        for tier in [Tier::One, Tier::Two, Tier::Three] {
            let Some(tier_tasks) = by_tier.remove(&tier) else {
                continue;
            };
            let semaphore = Arc::new(Semaphore::new(self.rate_control.max_concurrency.max(1)));
            let mut handles = Vec::with_capacity(tier_tasks.len());
            for task in tier_tasks {
                let fetcher = Arc::clone(&self.fetcher);
                let sem = Arc::clone(&semaphore);
                let timeout = self.rate_control.timeout_for(&task.source_id);
                let retry_interval = self.rate_control.retry_interval_for(&task.source_id);
                let max_retries = self.rate_control.effective_max_retries(&task.source_id, task.tier);
                handles.push(tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.expect("semaphore closed");
                    run_task(fetcher, task, timeout, retry_interval, max_retries).await
                }));
            }
            for handle in handles {
                match handle.await {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(join_err) => {
                        tracing::error!(target: "collector", error = %join_err, "task panicked");
                    }
                }
            }
        }

        CollectionResult { outcomes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::sources::{CollectMethod as CM, RateControl, SourceConfig as SC};

    fn direct_source(id: &str, tier: Tier) -> SC {
        SC {
            id: id.to_string(),
            name: id.to_string(),
            tier,
            enabled: true,
            collect_method: CM::DirectFetch,
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

    #[test]
    fn builds_direct_fetch_task() {
        let cfg = SourcesConfig::new(vec![direct_source("a", Tier::One)], RateControl::default());
        let tasks = build_tasks(&cfg, &HashMap::new());
        assert_eq!(tasks.len(), 1);
        match &tasks[0].method {
            TaskMethod::Direct { url } => assert_eq!(url, "https://a.example.com"),
            _ => panic!("expected direct task"),
        }
    }

    #[test]
    fn builds_twitter_like_search_query() {
        let mut source = direct_source("tw", Tier::Two);
        source.collect_method = CM::Search;
        source.accounts = vec!["alice".to_string(), "bob".to_string()];
        source.url = None;
        let mut allocated = HashMap::new();
        allocated.insert(
            "tw".to_string(),
            vec![ScoredQuery {
                text: "llm".into(),
                group_id: "g".into(),
                weight: 1.0,
            }],
        );
        let cfg = SourcesConfig::new(vec![source], RateControl::default());
        let tasks = build_tasks(&cfg, &allocated);
        match &tasks[0].method {
            TaskMethod::Search { query } => {
                assert!(query.contains("from:@alice"));
                assert!(query.contains("from:@bob"));
                assert!(query.contains("llm"));
            }
            _ => panic!("expected search task"),
        }
    }

    #[test]
    fn disabled_sources_produce_no_task() {
        let mut source = direct_source("off", Tier::Three);
        source.enabled = false;
        let cfg = SourcesConfig::new(vec![source], RateControl::default());
        assert!(build_tasks(&cfg, &HashMap::new()).is_empty());
    }

    #[test]
    fn abort_heavy_detection_from_collection_result() {
        let mut err = FetchError::new("src-1", 3, "agent process aborted by user");
        err.retry_count = 3;
        let result = CollectionResult {
            outcomes: vec![SourceOutcome {
                source_id: "src-1".to_string(),
                tier: Tier::One,
                status: SourceStatus::Failed,
                articles: Vec::new(),
                error: Some(err),
            }],
        };
        assert_eq!(result.abort_heavy_source_ids(), vec!["src-1".to_string()]);
    }
}
