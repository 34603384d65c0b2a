//! # Error Taxonomy
//! Classification used by the Fetch Executor and Collector (§7). This is a
//! plain data label, not a `std::error::Error` hierarchy — internal fallible
//! paths still return `anyhow::Result`; `ErrorKind` only tags the *meaning*
//! of a fetch failure so the Collector and Orchestrator can act on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Network,
    RateLimit,
    Parse,
    Unknown,
}

impl ErrorKind {
    /// Classify a raw error message by lowercase substring match, per §4.6.
    /// Order matters: timeout/abort phrases are checked before the more
    /// generic network substrings so "aborted by user" never falls through
    /// to `Network` via a stray "connect" mention.
    pub fn classify(message: &str) -> Self {
        let m = message.to_ascii_lowercase();
        if m.contains("timeout") || m.contains("abort") || m.contains("aborted by user") {
            ErrorKind::Timeout
        } else if m.contains("network") || m.contains("fetch") || m.contains("connect") {
            ErrorKind::Network
        } else if m.contains("rate") || m.contains("limit") || m.contains("429") {
            ErrorKind::RateLimit
        } else if m.contains("parse") || m.contains("json") {
            ErrorKind::Parse
        } else {
            ErrorKind::Unknown
        }
    }
}

/// A classified fetch failure, carrying enough context for the auto-disable
/// pass (§4.9) to recognise abort-heavy sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchError {
    pub source_id: String,
    pub kind: ErrorKind,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl FetchError {
    pub fn new(source_id: impl Into<String>, retry_count: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = ErrorKind::classify(&message);
        Self {
            source_id: source_id.into(),
            kind,
            retry_count,
            timestamp: Utc::now(),
            message,
        }
    }

    /// §4.9: a source is abort-heavy iff it produced an error with
    /// `retryCount >= 1` whose message contains any of a small phrase set.
    pub fn is_abort_heavy_signal(&self) -> bool {
        if self.retry_count < 1 {
            return false;
        }
        const PHRASES: [&str; 3] = [
            "aborted by user",
            "process aborted",
            "operation aborted",
        ];
        let m = self.message.to_ascii_lowercase();
        PHRASES.iter().any(|p| m.contains(p))
    }
}
