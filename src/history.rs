//! # History Store (§4.4)
//! Persistent, rusqlite-backed key-value-ish store keyed by normalised URL.
//! Single-writer, many-reader: `rusqlite` is opened in WAL journal mode so
//! the Deduplicator's batched lookups can proceed concurrently with writes.

use crate::model::{DateConfidence, HistoryEntry};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

/// Stats summary for `get_stats()`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStats {
    pub total: i64,
    pub min_first_seen_at: Option<DateTime<Utc>>,
    pub max_first_seen_at: Option<DateTime<Utc>>,
    pub per_source: Vec<(String, i64)>,
}

/// Default retention horizon for `cleanup()` when no explicit cutoff is given.
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Persistent history store. Wraps a single rusqlite connection behind a
/// mutex: writes are serialised, and SQLite's WAL mode lets readers proceed
/// without blocking on an in-flight write.
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

fn confidence_to_str(c: DateConfidence) -> &'static str {
    match c {
        DateConfidence::High => "high",
        DateConfidence::Medium => "medium",
        DateConfidence::Low => "low",
        DateConfidence::Unknown => "unknown",
    }
}

fn confidence_from_str(s: &str) -> DateConfidence {
    match s {
        "high" => DateConfidence::High,
        "medium" => DateConfidence::Medium,
        "low" => DateConfidence::Low,
        _ => DateConfidence::Unknown,
    }
}

fn ts_to_i64(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn ts_from_i64(v: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(v, 0).single().unwrap_or_else(Utc::now)
}

impl HistoryStore {
    /// Open (creating if absent) the history database at `path` and ensure
    /// the schema/indexes from §4.4 exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("opening history store at {}", path.as_ref().display()))?;
        Self::init(conn)
    }

    /// In-memory store, useful for tests and dry-run invocations.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory history store")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("enabling WAL journal mode")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL,
                normalized_url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                first_seen_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL,
                published_at INTEGER,
                date_confidence TEXT NOT NULL DEFAULT 'unknown',
                source TEXT NOT NULL,
                title_hash TEXT,
                content_hash TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_history_normalized_url ON history(normalized_url);
            CREATE INDEX IF NOT EXISTS idx_history_first_seen_at ON history(first_seen_at);
            CREATE INDEX IF NOT EXISTS idx_history_published_at ON history(published_at);
            CREATE INDEX IF NOT EXISTS idx_history_source ON history(source);
            CREATE INDEX IF NOT EXISTS idx_history_title_hash ON history(title_hash);
            "#,
        )
        .context("creating history schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<HistoryEntry> {
        let first_seen_at: i64 = row.get("first_seen_at")?;
        let last_seen_at: i64 = row.get("last_seen_at")?;
        let published_at: Option<i64> = row.get("published_at")?;
        let confidence: String = row.get("date_confidence")?;
        Ok(HistoryEntry {
            url: row.get("url")?,
            normalized_url: row.get("normalized_url")?,
            title: row.get("title")?,
            source: row.get("source")?,
            first_seen_at: ts_from_i64(first_seen_at),
            last_seen_at: ts_from_i64(last_seen_at),
            published_at: published_at.map(ts_from_i64),
            date_confidence: confidence_from_str(&confidence),
            title_hash: row.get("title_hash")?,
            content_hash: row.get("content_hash")?,
        })
    }

    pub fn find_by_normalized_url(&self, normalized_url: &str) -> Result<Option<HistoryEntry>> {
        let conn = self.conn.lock().expect("history mutex poisoned");
        conn.query_row(
            "SELECT * FROM history WHERE normalized_url = ?1",
            params![normalized_url],
            Self::row_to_entry,
        )
        .optional()
        .context("find_by_normalized_url")
    }

    /// Bulk existence test used by Layer 1b.
    pub fn find_existing_urls(&self, urls: &[String]) -> Result<HashSet<String>> {
        if urls.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.conn.lock().expect("history mutex poisoned");
        let placeholders = urls.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql =
            format!("SELECT normalized_url FROM history WHERE normalized_url IN ({placeholders})");
        let mut stmt = conn.prepare(&sql).context("prepare find_existing_urls")?;
        let bound: Vec<&dyn rusqlite::ToSql> =
            urls.iter().map(|u| u as &dyn rusqlite::ToSql).collect();
        let rows = stmt
            .query_map(bound.as_slice(), |row| row.get::<_, String>(0))
            .context("query find_existing_urls")?;
        let mut out = HashSet::new();
        for r in rows {
            out.insert(r?);
        }
        Ok(out)
    }

    pub fn find_by_title_hash(&self, hash: &str) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().expect("history mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT * FROM history WHERE title_hash = ?1")
            .context("prepare find_by_title_hash")?;
        let rows = stmt
            .query_map(params![hash], Self::row_to_entry)
            .context("query find_by_title_hash")?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Entries first-seen within `[since, until)`, descending `first_seen_at`.
    pub fn find_by_date_range(
        &self,
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().expect("history mutex poisoned");
        let since_i = ts_to_i64(since);
        let rows = match until {
            Some(u) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM history WHERE first_seen_at >= ?1 AND first_seen_at < ?2 ORDER BY first_seen_at DESC",
                )?;
                stmt.query_map(params![since_i, ts_to_i64(u)], Self::row_to_entry)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM history WHERE first_seen_at >= ?1 ORDER BY first_seen_at DESC",
                )?;
                stmt.query_map(params![since_i], Self::row_to_entry)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    /// Entries where `last_seen_at - first_seen_at >= min_gap_days`.
    pub fn find_potential_reposts(&self, min_gap_days: i64) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().expect("history mutex poisoned");
        let gap_secs = min_gap_days * 86_400;
        let mut stmt = conn.prepare(
            "SELECT * FROM history WHERE (last_seen_at - first_seen_at) >= ?1 ORDER BY first_seen_at DESC",
        )?;
        let out = stmt
            .query_map(params![gap_secs], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(out)
    }

    /// Insert if absent, else update `last_seen_at` always and fill
    /// `published_at`/`date_confidence`/hashes only when previously empty.
    /// `first_seen_at` is immutable after insert.
    pub fn upsert(&self, entry: &HistoryEntry) -> Result<()> {
        let conn = self.conn.lock().expect("history mutex poisoned");
        Self::upsert_locked(&conn, entry)
    }

    fn upsert_locked(conn: &Connection, entry: &HistoryEntry) -> Result<()> {
        let existing: Option<(i64, i64, Option<i64>, String, Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT first_seen_at, last_seen_at, published_at, date_confidence, title_hash, content_hash
                 FROM history WHERE normalized_url = ?1",
                params![entry.normalized_url],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()
            .context("upsert: existence check")?;

        match existing {
            None => {
                conn.execute(
                    "INSERT INTO history
                        (url, normalized_url, title, first_seen_at, last_seen_at,
                         published_at, date_confidence, source, title_hash, content_hash)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        entry.url,
                        entry.normalized_url,
                        entry.title,
                        ts_to_i64(entry.first_seen_at),
                        ts_to_i64(entry.last_seen_at),
                        entry.published_at.map(ts_to_i64),
                        confidence_to_str(entry.date_confidence),
                        entry.source,
                        entry.title_hash,
                        entry.content_hash,
                    ],
                )
                .context("upsert: insert")?;
            }
            Some((_first_seen, _last_seen, published_at, confidence, title_hash, content_hash)) => {
                let new_published_at = published_at.or_else(|| entry.published_at.map(ts_to_i64));
                let new_confidence = if confidence == "unknown" {
                    confidence_to_str(entry.date_confidence).to_string()
                } else {
                    confidence
                };
                let new_title_hash = title_hash.or_else(|| entry.title_hash.clone());
                let new_content_hash = content_hash.or_else(|| entry.content_hash.clone());

                conn.execute(
                    "UPDATE history SET
                        last_seen_at = ?1,
                        published_at = ?2,
                        date_confidence = ?3,
                        title_hash = ?4,
                        content_hash = ?5
                     WHERE normalized_url = ?6",
                    params![
                        ts_to_i64(entry.last_seen_at),
                        new_published_at,
                        new_confidence,
                        new_title_hash,
                        new_content_hash,
                        entry.normalized_url,
                    ],
                )
                .context("upsert: update")?;
            }
        }
        Ok(())
    }

    /// Atomic batch upsert (one transaction).
    pub fn bulk_upsert(&self, entries: &[HistoryEntry]) -> Result<()> {
        let mut conn = self.conn.lock().expect("history mutex poisoned");
        let tx = conn.transaction().context("bulk_upsert: begin transaction")?;
        for entry in entries {
            Self::upsert_locked(&tx, entry)?;
        }
        tx.commit().context("bulk_upsert: commit")?;
        Ok(())
    }

    /// Delete entries with `first_seen_at` before the cutoff (default: now
    /// minus `DEFAULT_RETENTION_DAYS`). Never purges by `last_seen_at`.
    pub fn cleanup(&self, before: Option<DateTime<Utc>>) -> Result<usize> {
        let cutoff =
            before.unwrap_or_else(|| Utc::now() - chrono::Duration::days(DEFAULT_RETENTION_DAYS));
        let conn = self.conn.lock().expect("history mutex poisoned");
        let changed = conn
            .execute(
                "DELETE FROM history WHERE first_seen_at < ?1",
                params![ts_to_i64(cutoff)],
            )
            .context("cleanup")?;
        Ok(changed)
    }

    pub fn get_stats(&self) -> Result<HistoryStats> {
        let conn = self.conn.lock().expect("history mutex poisoned");
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |r| r.get(0))?;
        let bounds: (Option<i64>, Option<i64>) = conn.query_row(
            "SELECT MIN(first_seen_at), MAX(first_seen_at) FROM history",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        let mut stmt = conn
            .prepare("SELECT source, COUNT(*) FROM history GROUP BY source ORDER BY source")
            .context("prepare per-source stats")?;
        let per_source = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(HistoryStats {
            total,
            min_first_seen_at: bounds.0.map(ts_from_i64),
            max_first_seen_at: bounds.1.map(ts_from_i64),
            per_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(norm_url: &str, first: DateTime<Utc>, last: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            url: norm_url.to_string(),
            normalized_url: norm_url.to_string(),
            title: "Example title".into(),
            source: "example".into(),
            first_seen_at: first,
            last_seen_at: last,
            published_at: None,
            date_confidence: DateConfidence::Unknown,
            title_hash: None,
            content_hash: None,
        }
    }

    #[test]
    fn upsert_then_find_round_trips() {
        let store = HistoryStore::open_in_memory().unwrap();
        let now = Utc::now();
        let e = entry("https://example.com/a", now, now);
        store.upsert(&e).unwrap();

        let found = store
            .find_by_normalized_url("https://example.com/a")
            .unwrap()
            .unwrap();
        assert_eq!(found.normalized_url, e.normalized_url);
        assert_eq!(found.title, e.title);
    }

    #[test]
    fn resighting_advances_last_seen_never_first_seen() {
        let store = HistoryStore::open_in_memory().unwrap();
        let first = Utc::now() - Duration::days(5);
        let e1 = entry("https://example.com/a", first, first);
        store.upsert(&e1).unwrap();

        let later = Utc::now();
        let e2 = entry("https://example.com/a", later, later);
        store.upsert(&e2).unwrap();

        let found = store
            .find_by_normalized_url("https://example.com/a")
            .unwrap()
            .unwrap();
        assert_eq!(found.first_seen_at.timestamp(), first.timestamp());
        assert_eq!(found.last_seen_at.timestamp(), later.timestamp());
    }

    #[test]
    fn merge_semantics_never_overwrite_filled_fields() {
        let store = HistoryStore::open_in_memory().unwrap();
        let now = Utc::now();
        let mut e1 = entry("https://example.com/a", now, now);
        e1.published_at = Some(now - Duration::days(1));
        e1.date_confidence = DateConfidence::High;
        store.upsert(&e1).unwrap();

        let mut e2 = entry("https://example.com/a", now, now + Duration::hours(1));
        e2.published_at = Some(now); // different value; must be ignored
        e2.date_confidence = DateConfidence::Low;
        store.upsert(&e2).unwrap();

        let found = store
            .find_by_normalized_url("https://example.com/a")
            .unwrap()
            .unwrap();
        assert_eq!(
            found.published_at.unwrap().timestamp(),
            (now - Duration::days(1)).timestamp()
        );
        assert_eq!(found.date_confidence, DateConfidence::High);
    }

    #[test]
    fn bulk_upsert_of_n_distinct_urls_yields_plus_n() {
        let store = HistoryStore::open_in_memory().unwrap();
        let now = Utc::now();
        let entries: Vec<HistoryEntry> = (0..5)
            .map(|i| entry(&format!("https://example.com/{i}"), now, now))
            .collect();
        store.bulk_upsert(&entries).unwrap();
        assert_eq!(store.get_stats().unwrap().total, 5);
    }

    #[test]
    fn find_existing_urls_bulk_lookup() {
        let store = HistoryStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .upsert(&entry("https://example.com/a", now, now))
            .unwrap();

        let existing = store
            .find_existing_urls(&[
                "https://example.com/a".to_string(),
                "https://example.com/b".to_string(),
            ])
            .unwrap();
        assert!(existing.contains("https://example.com/a"));
        assert!(!existing.contains("https://example.com/b"));
    }

    #[test]
    fn cleanup_purges_by_first_seen_at_only() {
        let store = HistoryStore::open_in_memory().unwrap();
        let old_first = Utc::now() - Duration::days(200);
        let recent_last = Utc::now();
        // Old first_seen_at but recently re-sighted: must still be purged,
        // because cleanup only looks at first_seen_at.
        store
            .upsert(&entry("https://example.com/old", old_first, recent_last))
            .unwrap();
        store
            .upsert(&entry("https://example.com/new", recent_last, recent_last))
            .unwrap();

        let removed = store.cleanup(Some(Utc::now() - Duration::days(90))).unwrap();
        assert_eq!(removed, 1);
        assert!(store
            .find_by_normalized_url("https://example.com/old")
            .unwrap()
            .is_none());
        assert!(store
            .find_by_normalized_url("https://example.com/new")
            .unwrap()
            .is_some());
    }

    #[test]
    fn find_potential_reposts_by_gap() {
        let store = HistoryStore::open_in_memory().unwrap();
        let first = Utc::now() - Duration::days(10);
        let last = Utc::now();
        store
            .upsert(&entry("https://example.com/repost", first, last))
            .unwrap();
        let reposts = store.find_potential_reposts(5).unwrap();
        assert_eq!(reposts.len(), 1);
        assert!(store.find_potential_reposts(20).unwrap().is_empty());
    }

    #[test]
    fn empty_bulk_lookup_returns_empty_set() {
        let store = HistoryStore::open_in_memory().unwrap();
        assert!(store.find_existing_urls(&[]).unwrap().is_empty());
    }
}
