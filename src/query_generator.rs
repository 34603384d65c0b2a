//! # Query Generator (§4.5)
//! Scores configured query groups against a recent/all-time title corpus,
//! emits per-keyword and pairwise-combination queries, then selects a
//! bounded, source-diverse top set for the Collector to allocate.

use crate::config::queries::{QueriesConfig, QueryGroup, ScoringConfig};
use crate::config::tag_synonyms::TagSynonymsConfig;

/// A single weighted query carrying the group it was generated from (used
/// for the diversity constraint during per-source allocation).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredQuery {
    pub text: String,
    pub group_id: String,
    pub weight: f64,
}

/// Recent and all-time title corpora the scorer counts keyword matches
/// against. Empty corpora degrade gracefully (zero-safe ratios).
#[derive(Debug, Clone, Default)]
pub struct TitleCorpora {
    pub recent: Vec<String>,
    pub all_time: Vec<String>,
}

/// Count titles matching any keyword, expanding each keyword through the
/// tag-synonym map first so "llm" also counts a title mentioning "large
/// language model" (§4.5's tag-synonym input).
fn count_matches(keywords: &[String], titles: &[String], synonyms: &TagSynonymsConfig) -> usize {
    let expanded: Vec<String> = keywords.iter().flat_map(|kw| synonyms.expand(kw)).collect();
    titles
        .iter()
        .filter(|title| {
            let lower = title.to_lowercase();
            expanded.iter().any(|kw| lower.contains(&kw.to_lowercase()))
        })
        .count()
}

/// Map `ratio` (itself in `[0, 1]`, since it's already normalised by a max)
/// linearly into `[band.0, band.1]`.
fn map_into_band(ratio: f64, band: (f64, f64)) -> f64 {
    band.0 + ratio.clamp(0.0, 1.0) * (band.1 - band.0)
}

struct GroupScore {
    group: QueryGroup,
    final_weight: f64,
}

fn score_groups(
    groups: &[QueryGroup],
    corpora: &TitleCorpora,
    scoring: &ScoringConfig,
    synonyms: &TagSynonymsConfig,
) -> Vec<GroupScore> {
    let recent_counts: Vec<usize> = groups
        .iter()
        .map(|g| count_matches(&g.keywords, &corpora.recent, synonyms))
        .collect();
    let all_counts: Vec<usize> = groups
        .iter()
        .map(|g| count_matches(&g.keywords, &corpora.all_time, synonyms))
        .collect();

    let max_recent = recent_counts.iter().copied().max().unwrap_or(0).max(1);
    let max_all = all_counts.iter().copied().max().unwrap_or(0).max(1);

    groups
        .iter()
        .cloned()
        .zip(recent_counts)
        .zip(all_counts)
        .map(|((group, recent), all)| {
            let recency_ratio = recent as f64 / max_recent as f64;
            let frequency_ratio = all as f64 / max_all as f64;
            let recency_factor = map_into_band(recency_ratio, scoring.recency_band);
            let frequency_factor = map_into_band(frequency_ratio, scoring.frequency_band);
            let final_weight = group.weight * recency_factor * frequency_factor;
            GroupScore { group, final_weight }
        })
        .collect()
}

/// Emit one query per keyword, plus (if enabled) pairwise combinations
/// within a group capped at `maxCombinations`, at `finalWeight * 0.9`.
fn emit_queries(scored: &[GroupScore], cfg: &QueriesConfig) -> Vec<ScoredQuery> {
    let mut out = Vec::new();
    for gs in scored {
        for kw in &gs.group.keywords {
            out.push(ScoredQuery {
                text: kw.clone(),
                group_id: gs.group.id.clone(),
                weight: gs.final_weight,
            });
        }

        if cfg.combined_queries.enabled {
            let mut emitted = 0usize;
            'pairs: for i in 0..gs.group.keywords.len() {
                for j in (i + 1)..gs.group.keywords.len() {
                    if emitted >= cfg.combined_queries.max_combinations {
                        break 'pairs;
                    }
                    out.push(ScoredQuery {
                        text: format!("{} {}", gs.group.keywords[i], gs.group.keywords[j]),
                        group_id: gs.group.id.clone(),
                        weight: gs.final_weight * 0.9,
                    });
                    emitted += 1;
                }
            }
        }
    }
    out
}

/// Sort by weight descending and take the top `selection.topN`.
fn select_top_n(mut queries: Vec<ScoredQuery>, top_n: usize) -> Vec<ScoredQuery> {
    queries.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
    queries.truncate(top_n);
    queries
}

/// Full §4.5 generation + selection pipeline: score groups, emit queries,
/// keep the top N by weight.
pub fn generate_queries(
    cfg: &QueriesConfig,
    corpora: &TitleCorpora,
    synonyms: &TagSynonymsConfig,
) -> Vec<ScoredQuery> {
    let scored = score_groups(&cfg.query_groups, corpora, &cfg.scoring, synonyms);
    let emitted = emit_queries(&scored, cfg);
    select_top_n(emitted, cfg.selection.top_n)
}

/// Per-source allocation: walk the already-sorted top-N list and pick at
/// most `maxPerSource`, allowing at most one query per group (diversity).
pub fn allocate_for_source(ranked: &[ScoredQuery], max_per_source: usize) -> Vec<ScoredQuery> {
    let mut out = Vec::new();
    let mut seen_groups = std::collections::HashSet::new();
    for q in ranked {
        if out.len() >= max_per_source {
            break;
        }
        if seen_groups.contains(&q.group_id) {
            continue;
        }
        seen_groups.insert(q.group_id.clone());
        out.push(q.clone());
    }
    out
}
