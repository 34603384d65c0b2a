use chrono::{Duration, Utc};
use news_collector::history::HistoryStore;
use news_collector::model::{DateConfidence, HistoryEntry};

fn entry(url: &str, normalized_url: &str, title: &str, at: chrono::DateTime<Utc>) -> HistoryEntry {
    HistoryEntry {
        url: url.to_string(),
        normalized_url: normalized_url.to_string(),
        title: title.to_string(),
        source: "techcrunch".to_string(),
        first_seen_at: at,
        last_seen_at: at,
        published_at: None,
        date_confidence: DateConfidence::Unknown,
        title_hash: None,
        content_hash: None,
    }
}

#[test]
fn upsert_then_resighting_keeps_first_seen_and_bumps_last_seen() {
    let store = HistoryStore::open_in_memory().unwrap();
    let first = Utc::now() - Duration::days(3);
    store.upsert(&entry("https://a.example.com/x", "a.example.com/x", "Title", first)).unwrap();

    let resighted_at = Utc::now();
    store
        .upsert(&entry("https://a.example.com/x", "a.example.com/x", "Title", resighted_at))
        .unwrap();

    let fetched = store.find_by_normalized_url("a.example.com/x").unwrap().unwrap();
    assert_eq!(fetched.first_seen_at.timestamp(), first.timestamp());
    assert_eq!(fetched.last_seen_at.timestamp(), resighted_at.timestamp());
}

#[test]
fn find_existing_urls_reports_only_known_normalized_urls() {
    let store = HistoryStore::open_in_memory().unwrap();
    store
        .upsert(&entry("https://a.example.com/x", "a.example.com/x", "Title", Utc::now()))
        .unwrap();

    let found = store
        .find_existing_urls(&["a.example.com/x".to_string(), "b.example.com/y".to_string()])
        .unwrap();
    assert!(found.contains("a.example.com/x"));
    assert!(!found.contains("b.example.com/y"));
}

#[test]
fn bulk_upsert_inserts_many_rows_in_one_call() {
    let store = HistoryStore::open_in_memory().unwrap();
    let now = Utc::now();
    let entries = vec![
        entry("https://a.example.com/1", "a.example.com/1", "One", now),
        entry("https://a.example.com/2", "a.example.com/2", "Two", now),
    ];
    store.bulk_upsert(&entries).unwrap();

    let stats = store.get_stats().unwrap();
    assert_eq!(stats.total, 2);
}

#[test]
fn cleanup_removes_entries_older_than_the_cutoff() {
    let store = HistoryStore::open_in_memory().unwrap();
    let now = Utc::now();
    store
        .upsert(&entry("https://old.example.com/x", "old.example.com/x", "Old", now - Duration::days(120)))
        .unwrap();
    store
        .upsert(&entry("https://new.example.com/x", "new.example.com/x", "New", now))
        .unwrap();

    let removed = store.cleanup(Some(now - Duration::days(90))).unwrap();
    assert_eq!(removed, 1);
    assert!(store.find_by_normalized_url("old.example.com/x").unwrap().is_none());
    assert!(store.find_by_normalized_url("new.example.com/x").unwrap().is_some());
}

#[test]
fn find_by_date_range_respects_since_and_until() {
    let store = HistoryStore::open_in_memory().unwrap();
    let now = Utc::now();
    store
        .upsert(&entry("https://a.example.com/1", "a.example.com/1", "One", now - Duration::days(5)))
        .unwrap();
    store
        .upsert(&entry("https://a.example.com/2", "a.example.com/2", "Two", now))
        .unwrap();

    let recent = store.find_by_date_range(now - Duration::days(1), None).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].normalized_url, "a.example.com/2");
}
