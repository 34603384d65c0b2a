//! `dedup_thresholds.json`: per-category Layer-3 similarity cutoffs and
//! per-source Layer-2 same/cross-domain cutoffs (§4.4).

use crate::similarity::CategoryThreshold;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CategoryThresholdCfg {
    pub jaccard_gte: f64,
    pub levenshtein_lte: f64,
}

impl From<CategoryThresholdCfg> for CategoryThreshold {
    fn from(c: CategoryThresholdCfg) -> Self {
        CategoryThreshold {
            jaccard_gte: c.jaccard_gte,
            levenshtein_lte: c.levenshtein_lte,
        }
    }
}

fn default_category_threshold() -> CategoryThresholdCfg {
    CategoryThresholdCfg {
        jaccard_gte: 0.5,
        levenshtein_lte: 0.3,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Layer2Fallback {
    pub same_domain: f64,
    pub cross_domain: f64,
}

impl Default for Layer2Fallback {
    fn default() -> Self {
        Self {
            same_domain: 0.8,
            cross_domain: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupThresholdsConfig {
    /// category name ("default" always present after load) -> thresholds.
    #[serde(default)]
    pub categories: HashMap<String, CategoryThresholdCfg>,
    /// source id -> Layer-2 same/cross domain jaccard cutoffs.
    #[serde(default)]
    pub layer2_fallback: HashMap<String, Layer2Fallback>,
    #[serde(default)]
    pub layer2_default: Layer2Fallback,
}

impl DedupThresholdsConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading dedup thresholds config from {}", path.display()))?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self> {
        let mut cfg: Self =
            serde_json::from_str(content).context("parsing dedup thresholds config JSON")?;
        cfg.categories
            .entry("default".to_string())
            .or_insert_with(default_category_threshold);
        Ok(cfg)
    }

    pub fn threshold_for_category(&self, category: &str) -> CategoryThreshold {
        self.categories
            .get(category)
            .copied()
            .unwrap_or_else(default_category_threshold)
            .into()
    }

    pub fn layer2_for_source(&self, source_id: &str) -> (f64, f64) {
        let fb = self
            .layer2_fallback
            .get(source_id)
            .copied()
            .unwrap_or(self.layer2_default);
        (fb.same_domain, fb.cross_domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_category_when_absent() {
        let cfg = DedupThresholdsConfig::load_from_str("{}").unwrap();
        let t = cfg.threshold_for_category("news");
        assert_eq!(t.jaccard_gte, 0.5);
        assert_eq!(t.levenshtein_lte, 0.3);
    }

    #[test]
    fn loads_named_category_thresholds() {
        let json = r#"{
            "categories": {
                "blog": {"jaccard_gte": 0.6, "levenshtein_lte": 0.25}
            }
        }"#;
        let cfg = DedupThresholdsConfig::load_from_str(json).unwrap();
        let t = cfg.threshold_for_category("blog");
        assert_eq!(t.jaccard_gte, 0.6);
        // unspecified categories still fall back to the injected default
        let d = cfg.threshold_for_category("default");
        assert_eq!(d.jaccard_gte, 0.5);
    }

    #[test]
    fn layer2_per_source_overrides_default() {
        let json = r#"{
            "layer2_default": {"same_domain": 0.8, "cross_domain": 0.9},
            "layer2_fallback": {"x": {"same_domain": 0.7, "cross_domain": 0.95}}
        }"#;
        let cfg = DedupThresholdsConfig::load_from_str(json).unwrap();
        assert_eq!(cfg.layer2_for_source("x"), (0.7, 0.95));
        assert_eq!(cfg.layer2_for_source("y"), (0.8, 0.9));
    }
}
