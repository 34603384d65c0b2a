//! `sources.json`: source list, collect/date methods, rate control.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
}

impl Tier {
    pub fn as_u8(self) -> u8 {
        match self {
            Tier::One => 1,
            Tier::Two => 2,
            Tier::Three => 3,
        }
    }

    /// §4.6: minimum retry floor per tier (3/1/0).
    pub fn retry_floor(self) -> u32 {
        match self {
            Tier::One => 3,
            Tier::Two => 1,
            Tier::Three => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectMethod {
    DirectFetch,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateMethodCfg {
    HtmlMeta,
    HtmlParse,
    UrlParse,
    SearchResult,
    Api,
}

impl From<DateMethodCfg> for crate::date_parser::DateMethod {
    fn from(m: DateMethodCfg) -> Self {
        match m {
            DateMethodCfg::HtmlMeta => crate::date_parser::DateMethod::HtmlMeta,
            DateMethodCfg::HtmlParse => crate::date_parser::DateMethod::HtmlParse,
            DateMethodCfg::UrlParse => crate::date_parser::DateMethod::UrlParse,
            DateMethodCfg::SearchResult => crate::date_parser::DateMethod::SearchResult,
            DateMethodCfg::Api => crate::date_parser::DateMethod::Api,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub tier: Tier,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub collect_method: CollectMethod,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub date_method: Option<DateMethodCfg>,
    #[serde(default)]
    pub date_selector: Option<String>,
    #[serde(default)]
    pub date_pattern: Option<String>,
    #[serde(default)]
    pub max_articles: Option<u32>,
    /// Opt-in flag for the strict-JSON repair path (§4.6); a per-source
    /// configurable list, not a blanket behaviour.
    #[serde(default)]
    pub repair_eligible: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Three
    }
}

impl Default for CollectMethod {
    fn default() -> Self {
        CollectMethod::DirectFetch
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerSourceRateOverride {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry_interval_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateControl {
    pub max_concurrency: usize,
    pub default_timeout_secs: u64,
    pub default_retry_interval_secs: u64,
    pub default_max_retries: u32,
    #[serde(default)]
    pub per_source: HashMap<String, PerSourceRateOverride>,
}

impl Default for RateControl {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            default_timeout_secs: 30,
            default_retry_interval_secs: 5,
            default_max_retries: 0,
            per_source: HashMap::new(),
        }
    }
}

impl RateControl {
    pub fn timeout_for(&self, source_id: &str) -> std::time::Duration {
        let secs = self
            .per_source
            .get(source_id)
            .and_then(|o| o.timeout_secs)
            .unwrap_or(self.default_timeout_secs);
        std::time::Duration::from_secs(secs)
    }

    pub fn retry_interval_for(&self, source_id: &str) -> std::time::Duration {
        let secs = self
            .per_source
            .get(source_id)
            .and_then(|o| o.retry_interval_secs)
            .unwrap_or(self.default_retry_interval_secs);
        std::time::Duration::from_secs(secs)
    }

    pub fn configured_max_retries(&self, source_id: &str) -> u32 {
        self.per_source
            .get(source_id)
            .and_then(|o| o.max_retries)
            .unwrap_or(self.default_max_retries)
    }

    /// §4.6: effective retries are `max(configured, tier floor)`.
    pub fn effective_max_retries(&self, source_id: &str, tier: Tier) -> u32 {
        self.configured_max_retries(source_id).max(tier.retry_floor())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub rate_control: RateControl,

    #[serde(skip)]
    loaded_from: Option<PathBuf>,
}

impl SourcesConfig {
    pub fn new(sources: Vec<SourceConfig>, rate_control: RateControl) -> Self {
        Self {
            sources,
            rate_control,
            loaded_from: None,
        }
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading sources config from {}", path.display()))?;
        let mut cfg = Self::load_from_str(&content)?;
        cfg.loaded_from = Some(path.to_path_buf());
        Ok(cfg)
    }

    pub fn load_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("parsing sources config JSON")
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// §9: the one config mutation point, between the two collection phases
    /// of the auto-disable pass. Rewrites the backing file if one was used
    /// to load this config; otherwise mutates only in-memory (used in tests
    /// and dry-run paths that never persisted a path).
    pub fn persist_disabled(&mut self, ids: &[String]) -> Result<()> {
        for s in self.sources.iter_mut() {
            if ids.contains(&s.id) {
                s.enabled = false;
            }
        }
        if let Some(path) = self.loaded_from.clone() {
            let json = serde_json::to_string_pretty(self).context("serialising sources config")?;
            fs::write(&path, json)
                .with_context(|| format!("writing sources config to {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"{
            "sources": [
                {"id": "a", "name": "A", "tier": "1", "enabled": true, "collect_method": "direct_fetch", "url": "https://a.example.com"},
                {"id": "b", "name": "B", "tier": "3", "enabled": true, "collect_method": "search", "query": "rust news"}
            ],
            "rate_control": {
                "max_concurrency": 3,
                "default_timeout_secs": 20,
                "default_retry_interval_secs": 2,
                "default_max_retries": 0,
                "per_source": {"a": {"max_retries": 5}}
            }
        }"#
    }

    #[test]
    fn parses_sources_and_rate_control() {
        let cfg = SourcesConfig::load_from_str(sample()).unwrap();
        assert_eq!(cfg.sources.len(), 2);
        assert_eq!(cfg.rate_control.max_concurrency, 3);
        assert_eq!(cfg.rate_control.effective_max_retries("a", Tier::One), 5);
        // Tier floor (3) dominates an unconfigured, lower default for tier 1.
        assert_eq!(cfg.rate_control.effective_max_retries("b", Tier::One), 3);
        assert_eq!(cfg.rate_control.effective_max_retries("b", Tier::Three), 0);
    }

    #[test]
    fn persist_disabled_flips_enabled_in_memory() {
        let mut cfg = SourcesConfig::load_from_str(sample()).unwrap();
        cfg.persist_disabled(&["a".to_string()]).unwrap();
        assert!(!cfg.sources.iter().find(|s| s.id == "a").unwrap().enabled);
        assert!(cfg.sources.iter().find(|s| s.id == "b").unwrap().enabled);
    }

    #[test]
    fn persist_disabled_rewrites_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        fs::write(&path, sample()).unwrap();

        let mut cfg = SourcesConfig::load_from_file(&path).unwrap();
        cfg.persist_disabled(&["a".to_string()]).unwrap();

        let reloaded = SourcesConfig::load_from_file(&path).unwrap();
        assert!(!reloaded.sources.iter().find(|s| s.id == "a").unwrap().enabled);
    }
}
