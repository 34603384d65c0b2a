//! `queries.json`: query groups, combination policy, date restriction,
//! selection caps, consumed by the Query Generator (§4.5).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryGroup {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedQueriesConfig {
    pub enabled: bool,
    pub max_combinations: usize,
}

impl Default for CombinedQueriesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_combinations: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRestrictionConfig {
    pub enabled: bool,
    pub within_days: u32,
}

impl Default for DateRestrictionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            within_days: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub top_n: usize,
    pub max_per_source: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_n: 20,
            max_per_source: 3,
        }
    }
}

/// Linear-mapping bands the Query Generator stretches `recency_ratio` and
/// `frequency_ratio` into (§4.5). Defaults match the reference bands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub recency_band: (f64, f64),
    pub frequency_band: (f64, f64),
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recency_band: (0.5, 1.5),
            frequency_band: (0.8, 1.2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueriesConfig {
    pub query_groups: Vec<QueryGroup>,
    #[serde(default)]
    pub combined_queries: CombinedQueriesConfig,
    #[serde(default)]
    pub date_restriction: DateRestrictionConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl QueriesConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading queries config from {}", path.display()))?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("parsing queries config JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_queries_config() {
        let json = r#"{
            "query_groups": [
                {"id": "g1", "name": "AI", "keywords": ["llm", "transformer"], "weight": 1.0}
            ],
            "combined_queries": {"enabled": true, "max_combinations": 2},
            "date_restriction": {"enabled": true, "within_days": 3},
            "selection": {"top_n": 10, "max_per_source": 2}
        }"#;
        let cfg = QueriesConfig::load_from_str(json).unwrap();
        assert_eq!(cfg.query_groups.len(), 1);
        assert!(cfg.combined_queries.enabled);
        assert_eq!(cfg.selection.top_n, 10);
    }

    #[test]
    fn defaults_fill_in_absent_sections() {
        let json = r#"{"query_groups": []}"#;
        let cfg = QueriesConfig::load_from_str(json).unwrap();
        assert!(!cfg.combined_queries.enabled);
        assert_eq!(cfg.selection.max_per_source, 3);
    }
}
