//! # Date Parser (§4.3)
//! Three-layer date extraction (explicit metadata → URL path → natural
//! language relative time) plus freshness-window comparison. Every layer is
//! a pure function of its input and an optional reference "now".

use crate::model::{DateConfidence, DateSource};
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

/// Result of a single date-resolution attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDate {
    pub date: Option<DateTime<Utc>>,
    pub confidence: DateConfidence,
    pub source: DateSource,
}

impl ResolvedDate {
    fn none() -> Self {
        Self {
            date: None,
            confidence: DateConfidence::Unknown,
            source: DateSource::FirstSeenAt,
        }
    }
}

/// Method used to extract a date, tied to `SourceConfig.dateMethod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateMethod {
    HtmlMeta,
    HtmlParse,
    UrlParse,
    SearchResult,
    Api,
}

// ---------------------------------------------------------------------
// Layer 1 — explicit metadata timestamp
// ---------------------------------------------------------------------

/// Parse an explicit timestamp string (RFC3339, or a small set of common
/// fallbacks). Success yields `confidence=high, source=published_at`.
pub fn parse_explicit(value: &str) -> Option<ResolvedDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ResolvedDate {
            date: Some(dt.with_timezone(&Utc)),
            confidence: DateConfidence::High,
            source: DateSource::PublishedAt,
        });
    }

    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%d",
    ];
    for fmt in FORMATS {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(ResolvedDate {
                date: Some(Utc.from_utc_datetime(&naive)),
                confidence: DateConfidence::High,
                source: DateSource::PublishedAt,
            });
        }
        if let Ok(naive_date) = chrono::NaiveDate::parse_from_str(trimmed, fmt) {
            let naive = naive_date.and_hms_opt(0, 0, 0).unwrap();
            return Some(ResolvedDate {
                date: Some(Utc.from_utc_datetime(&naive)),
                confidence: DateConfidence::High,
                source: DateSource::PublishedAt,
            });
        }
    }

    None
}

// ---------------------------------------------------------------------
// Layer 2 — URL path date patterns
// ---------------------------------------------------------------------

static URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"/(\d{4})[-/](\d{2})[-/](\d{2})/").unwrap(),
        Regex::new(r"[?&]date=(\d{4})[-/](\d{2})[-/](\d{2})").unwrap(),
        Regex::new(r"/articles?/(\d{4})(\d{2})(\d{2})").unwrap(),
    ]
});

/// Try the default (or caller-supplied override) URL date patterns in
/// order. Success yields midnight UTC, `confidence=medium, source=url_date`.
pub fn parse_url_date(url: &str, override_pattern: Option<&Regex>) -> Option<ResolvedDate> {
    let patterns: Vec<&Regex> = match override_pattern {
        Some(p) => vec![p],
        None => URL_PATTERNS.iter().collect(),
    };

    for pattern in patterns {
        if let Some(caps) = pattern.captures(url) {
            let year: i32 = caps.get(1)?.as_str().parse().ok()?;
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            let day: u32 = caps.get(3)?.as_str().parse().ok()?;
            if let Some(naive) = chrono::NaiveDate::from_ymd_opt(year, month, day) {
                let dt = Utc.from_utc_datetime(&naive.and_hms_opt(0, 0, 0).unwrap());
                return Some(ResolvedDate {
                    date: Some(dt),
                    confidence: DateConfidence::Medium,
                    source: DateSource::UrlDate,
                });
            }
        }
    }
    None
}

// ---------------------------------------------------------------------
// Layer 3 — natural-language relative time
// ---------------------------------------------------------------------

static RELATIVE_NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(秒|分|時間|日|週間|ヶ月|か月|seconds?|minutes?|hours?|days?|weeks?|months?)\s*(前|ago)")
        .unwrap()
});

fn unit_duration(unit: &str, n: i64) -> Option<Duration> {
    let u = unit.to_lowercase();
    Some(match u.as_str() {
        "秒" | "second" | "seconds" => Duration::seconds(n),
        "分" | "minute" | "minutes" => Duration::minutes(n),
        "時間" | "hour" | "hours" => Duration::hours(n),
        "日" | "day" | "days" => Duration::days(n),
        "週間" | "week" | "weeks" => Duration::weeks(n),
        "ヶ月" | "か月" | "month" | "months" => Duration::days(n * 30),
        _ => return None,
    })
}

/// Match the Japanese/English relative-time phrase table and compute a date
/// by subtracting from `reference` (defaults to now at the call site).
/// `confidence=low, source=relative_time`.
pub fn parse_relative(text: &str, reference: DateTime<Utc>) -> Option<ResolvedDate> {
    let lower = text.to_lowercase();

    if let Some(caps) = RELATIVE_NUMERIC.captures(text) {
        let n: i64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = caps.get(2)?.as_str();
        let dur = unit_duration(unit, n)?;
        return Some(ResolvedDate {
            date: Some(reference - dur),
            confidence: DateConfidence::Low,
            source: DateSource::RelativeTime,
        });
    }

    if lower.contains("昨日") || lower.contains("yesterday") {
        return Some(ResolvedDate {
            date: Some(reference - Duration::days(1)),
            confidence: DateConfidence::Low,
            source: DateSource::RelativeTime,
        });
    }
    if lower.contains("今日") || lower.contains("today") {
        return Some(ResolvedDate {
            date: Some(reference),
            confidence: DateConfidence::Low,
            source: DateSource::RelativeTime,
        });
    }
    if lower.contains("先週") || lower.contains("last week") {
        return Some(ResolvedDate {
            date: Some(reference - Duration::weeks(1)),
            confidence: DateConfidence::Low,
            source: DateSource::RelativeTime,
        });
    }

    None
}

// ---------------------------------------------------------------------
// Multi-layer and method-dispatched entry points
// ---------------------------------------------------------------------

/// Input bundle for the multi-layer / method-dispatched resolvers.
#[derive(Debug, Clone, Default)]
pub struct DateInputs<'a> {
    pub published_at: Option<&'a str>,
    pub url: Option<&'a str>,
    pub date_meta_content: Option<&'a str>,
    pub url_pattern_override: Option<&'a Regex>,
}

/// Run layers 1, 2, 3 in order; return the first that resolves. If every
/// layer fails, return the `{none, unknown, first_seen_at}` sentinel that
/// instructs the caller to fall back on history.
pub fn resolve_multi_layer(inputs: &DateInputs, reference: DateTime<Utc>) -> ResolvedDate {
    if let Some(p) = inputs.published_at {
        if let Some(r) = parse_explicit(p) {
            return r;
        }
    }
    if let Some(u) = inputs.url {
        if let Some(r) = parse_url_date(u, inputs.url_pattern_override) {
            return r;
        }
    }
    if let Some(m) = inputs.date_meta_content {
        if let Some(r) = parse_relative(m, reference) {
            return r;
        }
    }
    ResolvedDate::none()
}

/// Dispatch by `dateMethod`: `html_meta`/`api` → Layer 1 on meta content;
/// `url_parse` → Layer 2; `html_parse`/`search_result` → Layer 3 on
/// snippet/relative-time text.
pub fn resolve_by_method(
    method: DateMethod,
    inputs: &DateInputs,
    reference: DateTime<Utc>,
) -> ResolvedDate {
    match method {
        DateMethod::HtmlMeta | DateMethod::Api => inputs
            .date_meta_content
            .and_then(parse_explicit)
            .unwrap_or_else(ResolvedDate::none),
        DateMethod::UrlParse => inputs
            .url
            .and_then(|u| parse_url_date(u, inputs.url_pattern_override))
            .unwrap_or_else(ResolvedDate::none),
        DateMethod::HtmlParse | DateMethod::SearchResult => inputs
            .date_meta_content
            .and_then(|m| parse_relative(m, reference))
            .unwrap_or_else(ResolvedDate::none),
    }
}

// ---------------------------------------------------------------------
// Freshness window
// ---------------------------------------------------------------------

/// `windowStart(lastSuccessAt, now)` per §4.3: Monday gets a weekend
/// catch-up window, otherwise the normal 24h (or since-last-success) window.
pub fn window_start(last_success_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let seventy_two_hours_ago = now - Duration::hours(72);
    if now.weekday() == Weekday::Mon {
        match last_success_at {
            Some(last) => last.min(seventy_two_hours_ago),
            None => seventy_two_hours_ago,
        }
    } else {
        last_success_at.unwrap_or_else(|| now - Duration::hours(24))
    }
}

/// Outcome of freshness classification (§4.3, Stage 5 of §4.8).
#[derive(Debug, Clone, PartialEq)]
pub struct FreshnessResult {
    pub is_fresh: bool,
    pub confidence: DateConfidence,
    pub source: DateSource,
    pub priority: crate::model::FreshnessPriority,
    pub resolved_date: Option<DateTime<Utc>>,
}

/// Walk `published_at -> url_date -> relative_time -> first_seen_at`,
/// classify freshness against `window_start`. If every candidate is absent,
/// the conservative "keep on doubt" sentinel is returned.
pub fn classify_freshness(
    resolved: &ResolvedDate,
    window_start: DateTime<Utc>,
    first_seen_at: Option<DateTime<Utc>>,
) -> FreshnessResult {
    let (date, source) = match resolved.date {
        Some(d) => (Some(d), resolved.source),
        None => (first_seen_at, DateSource::FirstSeenAt),
    };

    match date {
        Some(d) => FreshnessResult {
            is_fresh: d >= window_start,
            confidence: resolved.confidence,
            source,
            priority: source.freshness_priority(),
            resolved_date: Some(d),
        },
        None => FreshnessResult {
            is_fresh: true,
            confidence: DateConfidence::Unknown,
            source: DateSource::None,
            priority: crate::model::FreshnessPriority::Low,
            resolved_date: None,
        },
    }
}
