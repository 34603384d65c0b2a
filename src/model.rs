//! # Data Model
//! Shared types flowing through the collection+dedup pipeline: the raw
//! article a Fetch Executor produces, the filtered article a Deduplicator
//! emits, and the persistent history record in between.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Article as produced by a Fetch Executor, before dedup/freshness processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub source: String,
    pub collected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_meta_content: Option<String>,
}

/// Confidence in the resolved publication date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateConfidence {
    High,
    Medium,
    Low,
    Unknown,
}

/// Which layer produced the resolved date, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    PublishedAt,
    UrlDate,
    RelativeTime,
    FirstSeenAt,
    None,
}

/// Freshness-driven scheduling priority, derived from `DateSource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessPriority {
    High,
    Normal,
    Low,
}

impl DateSource {
    /// Priority mapping per §4.3: published_at/url_date/relative_time/first_seen_at
    /// map to high/normal/normal/low respectively; `None` is handled by callers
    /// (it is the conservative "keep on doubt" sentinel, not a real source).
    pub fn freshness_priority(self) -> FreshnessPriority {
        match self {
            DateSource::PublishedAt => FreshnessPriority::High,
            DateSource::UrlDate | DateSource::RelativeTime => FreshnessPriority::Normal,
            DateSource::FirstSeenAt => FreshnessPriority::Low,
            DateSource::None => FreshnessPriority::Low,
        }
    }
}

/// Output of the Deduplicator: a `RawArticle` enriched with normalisation,
/// freshness classification, and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredArticle {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub source: String,
    pub collected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_meta_content: Option<String>,

    pub normalized_url: String,
    pub is_fresh: bool,
    pub date_confidence: DateConfidence,
    pub date_source: DateSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_date: Option<DateTime<Utc>>,
    pub freshness_priority: FreshnessPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
}

impl FilteredArticle {
    pub fn from_raw(raw: RawArticle, normalized_url: String) -> Self {
        Self {
            url: raw.url,
            title: raw.title,
            summary: raw.summary,
            source: raw.source,
            collected_at: raw.collected_at,
            published_at: raw.published_at,
            date_meta_content: raw.date_meta_content,
            normalized_url,
            is_fresh: true,
            date_confidence: DateConfidence::Unknown,
            date_source: DateSource::None,
            resolved_date: None,
            freshness_priority: FreshnessPriority::Low,
            similarity_score: None,
        }
    }
}

/// Persistent record for a URL the system has already seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    pub normalized_url: String,
    pub title: String,
    pub source: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub date_confidence: DateConfidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}
