//! # Deduplicator (§4.8)
//! Sequential, input-order-preserving six-stage pipeline: URL normalise +
//! intra-batch dedupe, history exclusion, Layer-2 near-duplicate walk,
//! Layer-3 fuzzy walk, freshness classification, history update.

use crate::config::dedup_thresholds::DedupThresholdsConfig;
use crate::config::sources::SourceConfig;
use crate::date_parser::{self, DateInputs};
use crate::history::HistoryStore;
use crate::model::{FilteredArticle, HistoryEntry, RawArticle};
use crate::similarity;
use crate::url_normalize::{self, NormalizeOptions};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// §4.8 statistics, reported alongside the surviving articles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub total_input: usize,
    pub after_url_dedup: usize,
    pub after_history_dedup: usize,
    pub after_similarity_dedup: usize,
    pub fresh_count: usize,
}

pub struct DedupOutput {
    pub articles: Vec<FilteredArticle>,
    pub stats: DedupStats,
}

/// Look up a source's configuration by id; `None` falls back to
/// multi-layer date resolution and the `default` similarity category.
pub struct Deduplicator<'a> {
    pub history: &'a HistoryStore,
    pub thresholds: &'a DedupThresholdsConfig,
    pub url_options: NormalizeOptions,
    pub sources_by_id: HashMap<String, &'a SourceConfig>,
}

impl<'a> Deduplicator<'a> {
    pub fn new(
        history: &'a HistoryStore,
        thresholds: &'a DedupThresholdsConfig,
        url_options: NormalizeOptions,
        sources: &'a [SourceConfig],
    ) -> Self {
        Self {
            history,
            thresholds,
            url_options,
            sources_by_id: sources.iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    /// Run the full pipeline against one collected batch. `window_start` is
    /// the freshness window start derived from the orchestrator's
    /// `lastSuccessAt`; `now` stamps new history entries.
    pub fn run(
        &self,
        raw: Vec<RawArticle>,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DedupOutput> {
        let total_input = raw.len();

        // Stage 1: URL normalise + intra-batch dedupe.
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut stage1: Vec<FilteredArticle> = Vec::new();
        for article in raw {
            let normalized = url_normalize::normalize(&article.url, &self.url_options)
                .unwrap_or_else(|_| article.url.clone());
            if seen_urls.contains(&normalized) {
                continue;
            }
            seen_urls.insert(normalized.clone());
            stage1.push(FilteredArticle::from_raw(article, normalized));
        }
        let after_url_dedup = stage1.len();

        // Stage 2: history exclusion. Excluded articles are re-sightings of
        // an already-known URL, not newcomers — they still bump `last_seen_at`
        // on the existing history row (§4.8 step 2).
        let normalized_urls: Vec<String> = stage1.iter().map(|a| a.normalized_url.clone()).collect();
        let existing = self.history.find_existing_urls(&normalized_urls)?;
        let mut resighted: Vec<FilteredArticle> = Vec::new();
        let mut stage2: Vec<FilteredArticle> = Vec::new();
        for article in stage1 {
            if existing.contains(&article.normalized_url) {
                resighted.push(article);
            } else {
                stage2.push(article);
            }
        }
        let after_history_dedup = stage2.len();

        // Stage 3: Layer-2 intra-batch near-duplicate walk.
        let mut accepted_after_layer2: Vec<FilteredArticle> = Vec::new();
        for candidate in stage2 {
            let (same_domain_gte, cross_domain_gte) =
                self.thresholds.layer2_for_source(&candidate.source);
            let is_dup = accepted_after_layer2.iter().any(|accepted| {
                let same_domain =
                    url_normalize::is_same_domain(&candidate.url, &accepted.url);
                similarity::is_layer2_duplicate(
                    &candidate.title,
                    &accepted.title,
                    same_domain,
                    (same_domain_gte, cross_domain_gte),
                )
            });
            if !is_dup {
                accepted_after_layer2.push(candidate);
            }
        }

        // Stage 4: Layer-3 fuzzy walk.
        let mut accepted_after_layer3: Vec<FilteredArticle> = Vec::new();
        for candidate in accepted_after_layer2 {
            let category = similarity::detect_category(&candidate.source, &candidate.url);
            let threshold = self.thresholds.threshold_for_category(&category.0);

            let mut best_reason: Option<f64> = None;
            let is_dup = accepted_after_layer3.iter().any(|accepted| {
                let jaccard = similarity::title_jaccard(&candidate.title, &accepted.title);
                let edit = similarity::normalized_edit_distance(&candidate.title, &accepted.title);
                let score = jaccard + (1.0 - edit);
                if best_reason.map(|b| score > b).unwrap_or(true) {
                    best_reason = Some(score);
                }
                similarity::is_layer3_duplicate(&candidate.title, &accepted.title, threshold)
            });

            if is_dup {
                tracing::debug!(
                    target: "dedup",
                    source = %candidate.source,
                    reason_score = best_reason.unwrap_or(0.0),
                    "dropped as layer-3 fuzzy duplicate"
                );
                continue;
            }
            accepted_after_layer3.push(candidate);
        }
        let after_similarity_dedup = accepted_after_layer3.len();

        // Stage 5: freshness classification.
        let mut fresh_count = 0usize;
        let mut survivors: Vec<FilteredArticle> = Vec::new();
        for mut article in accepted_after_layer3 {
            let source_cfg = self.sources_by_id.get(&article.source).copied();
            let resolved = resolve_date(&article, source_cfg, now);
            let first_seen_at = self
                .history
                .find_by_normalized_url(&article.normalized_url)?
                .map(|e| e.first_seen_at);
            let freshness = date_parser::classify_freshness(&resolved, window_start, first_seen_at);

            article.is_fresh = freshness.is_fresh;
            article.date_confidence = freshness.confidence;
            article.date_source = freshness.source;
            article.resolved_date = freshness.resolved_date;
            article.freshness_priority = freshness.priority;

            let keep = freshness.is_fresh
                || matches!(freshness.confidence, crate::model::DateConfidence::Unknown);
            if keep {
                if freshness.is_fresh {
                    fresh_count += 1;
                }
                survivors.push(article);
            }
        }

        // Stage 6: history update. New survivors get a fresh row; re-sighted
        // URLs from Stage 2 only bump `last_seen_at` on their existing row
        // (`upsert`'s merge semantics leave `first_seen_at` and other
        // already-filled fields untouched).
        let entries: Vec<HistoryEntry> = survivors
            .iter()
            .map(|a| history_entry(a, now, a.resolved_date, a.date_confidence))
            .chain(
                resighted
                    .iter()
                    .map(|a| history_entry(a, now, None, crate::model::DateConfidence::Unknown)),
            )
            .collect();
        self.history.bulk_upsert(&entries)?;

        Ok(DedupOutput {
            articles: survivors,
            stats: DedupStats {
                total_input,
                after_url_dedup,
                after_history_dedup,
                after_similarity_dedup,
                fresh_count,
            },
        })
    }
}

/// Build the `HistoryEntry` a given article upserts as, shared between
/// brand-new survivors and Stage-2 re-sightings so both populate the same
/// fields from the same place.
fn history_entry(
    a: &FilteredArticle,
    now: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
    date_confidence: crate::model::DateConfidence,
) -> HistoryEntry {
    HistoryEntry {
        url: a.url.clone(),
        normalized_url: a.normalized_url.clone(),
        title: a.title.clone(),
        source: a.source.clone(),
        first_seen_at: now,
        last_seen_at: now,
        published_at,
        date_confidence,
        title_hash: Some(similarity::stable_title_hash(&a.title)),
        content_hash: None,
    }
}

/// §4.8 Stage 5, step 1-3: explicit `publishedAt` first, else dispatch by
/// the source's configured `dateMethod`, else multi-layer fallback.
fn resolve_date(
    article: &FilteredArticle,
    source_cfg: Option<&SourceConfig>,
    now: DateTime<Utc>,
) -> date_parser::ResolvedDate {
    if let Some(published) = article.published_at.as_deref() {
        if let Some(resolved) = date_parser::parse_explicit(published) {
            return resolved;
        }
    }

    let pattern_cfg = source_cfg.and_then(|s| s.date_pattern.as_deref());
    let override_pattern = pattern_cfg.and_then(|p| regex::Regex::new(p).ok());

    let inputs = DateInputs {
        published_at: article.published_at.as_deref(),
        url: Some(&article.url),
        date_meta_content: article.date_meta_content.as_deref(),
        url_pattern_override: override_pattern.as_ref(),
    };

    match source_cfg.and_then(|s| s.date_method) {
        Some(method) => {
            let method: date_parser::DateMethod = method.into();
            date_parser::resolve_by_method(method, &inputs, now)
        }
        None => date_parser::resolve_multi_layer(&inputs, now),
    }
}
