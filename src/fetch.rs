//! # Fetch Executor (§4.6)
//! Wraps the out-of-scope LLM-driven web fetcher behind a small async
//! contract, adds tiered retry with a fixed inter-attempt wait and a
//! per-attempt timeout, classifies failures, and extracts a JSON articles
//! payload out of free-form fetcher output.

use crate::error::{ErrorKind, FetchError};
use crate::model::RawArticle;
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;

/// Outcome of a single fetch attempt against the boundary.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub ok: bool,
    pub content: Option<String>,
    pub err: Option<String>,
}

impl FetchOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            ok: true,
            content: Some(content.into()),
            err: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            content: None,
            err: Some(message.into()),
        }
    }
}

/// Per-attempt options derived from `RateControl`.
#[derive(Debug, Clone, Copy)]
pub struct FetchOpts {
    pub timeout: Duration,
}

/// The abstracted fetcher boundary (§1, §6): the LLM-driven web fetcher
/// itself is out of scope, this is only the contract the Collector drives.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn execute_direct(
        &self,
        url: &str,
        prompt: &str,
        source: &str,
        opts: &FetchOpts,
    ) -> FetchOutcome;

    async fn execute_search(
        &self,
        query: &str,
        prompt: &str,
        source: &str,
        opts: &FetchOpts,
    ) -> FetchOutcome;
}

/// Direction a single task dispatches through, so the tiered-retry helper
/// and the strict-JSON repair path can re-issue the same shape of call.
pub enum FetchTarget<'a> {
    Direct { url: &'a str },
    Search { query: &'a str },
}

/// Run `target` against `fetcher` with tiered retry, a fixed wait between
/// attempts, and a per-attempt timeout. `max_retries` is the already-combined
/// `RateControl::effective_max_retries` figure (configured override floored
/// by tier); this function trusts it rather than re-deriving it. Returns the
/// last outcome and, on total failure, the classified error carrying the
/// actually-used retry count.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    target: FetchTarget<'_>,
    prompt: &str,
    source_id: &str,
    max_retries: u32,
    timeout: Duration,
    retry_interval: Duration,
) -> Result<String, FetchError> {
    let opts = FetchOpts { timeout };

    let mut last_message = String::from("no attempt made");
    for attempt in 0..=max_retries {
        let result = match &target {
            FetchTarget::Direct { url } => {
                tokio::time::timeout(timeout, fetcher.execute_direct(url, prompt, source_id, &opts))
                    .await
            }
            FetchTarget::Search { query } => {
                tokio::time::timeout(
                    timeout,
                    fetcher.execute_search(query, prompt, source_id, &opts),
                )
                .await
            }
        };
        match result {
            Ok(outcome) if outcome.ok => {
                return Ok(outcome.content.unwrap_or_default());
            }
            Ok(outcome) => {
                last_message = outcome.err.unwrap_or_else(|| "unknown fetch failure".to_string());
            }
            Err(_) => {
                last_message = "attempt aborted: timeout elapsed".to_string();
            }
        }

        tracing::warn!(
            target: "fetch",
            source = source_id,
            attempt,
            max_retries,
            message = %last_message,
            "fetch attempt failed"
        );

        if attempt < max_retries {
            tokio::time::sleep(retry_interval).await;
        }
    }

    Err(FetchError::new(source_id, max_retries, last_message))
}

// ---------------------------------------------------------------------
// JSON extraction (§4.6 Result shaping)
// ---------------------------------------------------------------------

static FENCED_JSON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap());
static FENCED_ANY_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*([\{\[].*?)\s*```").unwrap());

/// Candidate JSON substrings, in the order the Collector should try them.
fn json_candidates(content: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    for caps in FENCED_JSON_BLOCK.captures_iter(content) {
        candidates.push(caps[1].to_string());
    }
    for caps in FENCED_ANY_BLOCK.captures_iter(content) {
        candidates.push(caps[1].to_string());
    }

    let trimmed = content.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        candidates.push(trimmed.to_string());
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            candidates.push(trimmed[start..=end].to_string());
        }
    }

    candidates
}

/// Locate JSON in free-form fetcher output by trying each candidate
/// substring, in order, until one parses into an object carrying an
/// `articles` array or an array value directly.
pub fn extract_articles_json(content: &str) -> Option<Value> {
    for candidate in json_candidates(content) {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            if value.is_array() || value.get("articles").map(Value::is_array).unwrap_or(false) {
                return Some(value);
            }
        }
    }
    None
}

/// Normalise a parsed JSON value into `RawArticle`s: keep only entries with
/// non-empty `title` and `url`, coerce missing optional fields to absent,
/// stamp `source` and `collectedAt`.
pub fn normalize_articles(value: &Value, source: &str) -> Vec<RawArticle> {
    let now = Utc::now();
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => value
            .get("articles")
            .and_then(Value::as_array)
            .map(|a| a.iter().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| {
            let title = item.get("title").and_then(Value::as_str)?.trim();
            let url = item.get("url").and_then(Value::as_str)?.trim();
            if title.is_empty() || url.is_empty() {
                return None;
            }
            Some(RawArticle {
                url: url.to_string(),
                title: title.to_string(),
                summary: item
                    .get("summary")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string()),
                source: source.to_string(),
                collected_at: now,
                published_at: item
                    .get("publishedAt")
                    .or_else(|| item.get("published_at"))
                    .and_then(Value::as_str)
                    .map(|s| s.to_string()),
                date_meta_content: item
                    .get("dateMetaContent")
                    .or_else(|| item.get("date_meta_content"))
                    .and_then(Value::as_str)
                    .map(|s| s.to_string()),
            })
        })
        .collect()
}

/// `rawPreview` diagnostics: a whitespace-collapsed prefix, at most 120
/// characters, used when parsing fails entirely.
pub fn raw_preview(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(120).collect()
}

/// Result of the full extract-or-repair flow the Collector drives per task.
pub struct ExtractResult {
    pub articles: Vec<RawArticle>,
    pub error: Option<ErrorKind>,
    pub raw_preview: Option<String>,
}

/// Extract articles from `content`; if parsing fails and the source is
/// repair-eligible and the task used DirectFetch, issue exactly one
/// strict-JSON repair fetch and retry extraction against its output.
pub async fn extract_with_optional_repair(
    content: &str,
    source: &str,
    repair_eligible: bool,
    direct_fetch_url: Option<&str>,
    fetcher: &dyn Fetcher,
    opts: &FetchOpts,
) -> ExtractResult {
    if let Some(value) = extract_articles_json(content) {
        return ExtractResult {
            articles: normalize_articles(&value, source),
            error: None,
            raw_preview: None,
        };
    }

    if let (true, Some(url)) = (repair_eligible, direct_fetch_url) {
        let repair_prompt = format!(
            "Re-emit the following content as strict JSON with an \"articles\" array only, no prose, no markdown fences:\n\n{content}"
        );
        let outcome = fetcher
            .execute_direct(url, &repair_prompt, source, opts)
            .await;
        if outcome.ok {
            if let Some(repaired) = outcome.content.as_deref().and_then(extract_articles_json) {
                return ExtractResult {
                    articles: normalize_articles(&repaired, source),
                    error: None,
                    raw_preview: None,
                };
            }
        }
    }

    ExtractResult {
        articles: Vec::new(),
        error: Some(ErrorKind::Parse),
        raw_preview: Some(raw_preview(content)),
    }
}
