//! `app.json`: agent/runtime settings, URL-normalisation overrides, the
//! history store location and retention, output directories, and the
//! logging knobs (§6, AMBIENT STACK §A.1/§A.3).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::url_normalize::NormalizeOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryBackend {
    Sqlite,
    Memory,
}

impl Default for HistoryBackend {
    fn default() -> Self {
        HistoryBackend::Sqlite
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySettings {
    #[serde(default)]
    pub backend: HistoryBackend,
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_history_path() -> PathBuf {
    PathBuf::from("data/history.sqlite3")
}

fn default_retention_days() -> i64 {
    crate::history::DEFAULT_RETENTION_DAYS
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::default(),
            path: default_history_path(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlNormalizationSettings {
    #[serde(default)]
    pub extra_remove_params: BTreeSet<String>,
    #[serde(default = "default_true")]
    pub strip_trailing_slash: bool,
}

fn default_true() -> bool {
    true
}

impl Default for UrlNormalizationSettings {
    fn default() -> Self {
        Self {
            extra_remove_params: BTreeSet::new(),
            strip_trailing_slash: true,
        }
    }
}

impl UrlNormalizationSettings {
    pub fn to_options(&self) -> NormalizeOptions {
        let mut opts = NormalizeOptions::default();
        opts.remove_params
            .extend(self.extra_remove_params.iter().cloned());
        opts.strip_trailing_slash = self.strip_trailing_slash;
        opts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Pretty
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default)]
    pub url_normalization: UrlNormalizationSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub output: OutputSettings,
    /// Path the Pipeline Orchestrator reads/writes `lastSuccessAt` to
    /// between runs; separate from the history store itself.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/state.json")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            history: HistorySettings::default(),
            url_normalization: UrlNormalizationSettings::default(),
            logging: LoggingSettings::default(),
            output: OutputSettings::default(),
            state_path: default_state_path(),
            dry_run: false,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading app config from {}", path.display()))?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("parsing app config JSON")
    }
}
