// tests/state_store.rs
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fs;

use rss_curator::error::{StateCorruptionError, StatePersistError};
use rss_curator::state::records::{Article, ArticleStatus};
use rss_curator::Store;

const FEED: &str = "https://blog.example.org/rss";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
}

fn article(id: &str, published: DateTime<Utc>) -> Article {
    Article {
        id: id.to_string(),
        title: format!("Title {id}"),
        link: format!("https://blog.example.org/{id}"),
        summary: "<p>summary</p>".into(),
        published_date: published,
        status: ArticleStatus::Processed,
        processed_at: Some(now()),
    }
}

#[test]
fn missing_file_is_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::load(dir.path().join("absent.json")).unwrap();
    assert!(store.feed_urls().is_empty());
    assert!(!store.is_dirty());
}

#[test]
fn corrupt_file_falls_back_to_empty_and_is_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    fs::write(&path, "{ not json").unwrap();

    assert!(Store::try_load(&path).is_err());
    let store = Store::load(&path).unwrap();
    assert!(store.feed_urls().is_empty());

    let copies: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("state.json.corrupt-"))
        .collect();
    assert_eq!(copies.len(), 1);
    assert_eq!(fs::read_to_string(copies[0].path()).unwrap(), "{ not json");
}

#[test]
fn unreadable_file_is_an_error_and_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    fs::create_dir(&path).unwrap();

    assert!(matches!(
        Store::load(&path),
        Err(StateCorruptionError::Read { .. })
    ));
    assert!(path.is_dir());
    let copies = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(copies, 1);
}

#[test]
fn save_into_unwritable_location_keeps_store_dirty() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, "plain file").unwrap();
    let mut store = Store::empty(blocker.join("state.json"));
    store.upsert(FEED, article("a", now() - Duration::days(1)));

    assert!(matches!(store.save(), Err(StatePersistError::Io { .. })));
    assert!(store.is_dirty());
    assert_eq!(fs::read_to_string(&blocker).unwrap(), "plain file");
}

#[test]
fn save_then_load_then_save_is_byte_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let mut store = Store::load(&path).unwrap();
    store.set_feed_title(FEED, Some("Systems Blog"));
    store.upsert(FEED, article("a", now() - Duration::days(1)));
    store.upsert(FEED, article("b", now() - Duration::days(2)));
    store.save().unwrap();
    let first = fs::read(&path).unwrap();

    let mut reloaded = Store::load(&path).unwrap();
    assert_eq!(reloaded.articles(FEED).len(), 2);
    reloaded.save().unwrap();
    assert_eq!(first, fs::read(&path).unwrap());

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn unknown_fields_survive_a_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let doc = serde_json::json!({
        "version": 2,
        "last_updated": "2024-05-10T00:00:00Z",
        "operator_note": "keep me",
        "feeds": {
            FEED: {
                "title": "Systems Blog",
                "etag": "W/\"abc\"",
                "articles": {
                    "a": {
                        "title": "A",
                        "link": "https://blog.example.org/a",
                        "summary": "s",
                        "published_date": "2024-05-09T10:00:00Z",
                        "status": "digest",
                        "processed_at": "2024-05-09T11:00:00Z",
                        "score": 0.7
                    }
                },
                "digest": {
                    "batch_id": "x",
                    "article_ids": [],
                    "summary": "s",
                    "generated_at": "2024-05-09T12:00:00Z",
                    "model": "keep-me"
                }
            }
        }
    });
    fs::write(&path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

    let mut store = Store::load(&path).unwrap();
    assert_eq!(store.status_of(FEED, "a"), Some(ArticleStatus::Digest));
    store.save().unwrap();

    let saved: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(saved["operator_note"], "keep me");
    assert_eq!(saved["feeds"][FEED]["etag"], "W/\"abc\"");
    assert_eq!(saved["feeds"][FEED]["articles"]["a"]["score"], 0.7);
    assert_eq!(saved["feeds"][FEED]["digest"]["model"], "keep-me");
    assert_eq!(saved["last_updated"], "2024-05-10T00:00:00Z");
}

#[test]
fn prune_boundary_after_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let lookback = 7u32;
    let mut store = Store::load(&path).unwrap();
    store.upsert(FEED, article("expired", now() - Duration::days(i64::from(lookback) + 1)));
    store.upsert(FEED, article("kept", now() - Duration::days(i64::from(lookback) - 1)));

    assert_eq!(store.prune(now(), lookback), 1);
    store.save().unwrap();

    let reloaded = Store::load(&path).unwrap();
    assert!(!reloaded.contains(FEED, "expired"));
    assert!(reloaded.contains(FEED, "kept"));
}

#[test]
fn legacy_layout_is_migrated_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let doc = serde_json::json!({
        "feeds": {
            FEED: {
                "processed_ids": ["x", "y"],
                "entry_data": {
                    "x": {"title": "X", "link": "https://blog.example.org/x", "summary": "",
                          "date": "Thu, 09 May 2024 15:30:00 EDT", "status": "processed"},
                    "y": {"title": "Y", "link": "https://blog.example.org/y",
                          "date": "not a date", "status": "digest"}
                }
            }
        },
        "last_updated": "2024-05-09T20:00:00"
    });
    fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

    let mut store = Store::load(&path).unwrap();
    assert!(store.is_dirty());
    let x = store.article(FEED, "x").unwrap();
    assert_eq!(x.published_date, Utc.with_ymd_and_hms(2024, 5, 9, 19, 30, 0).unwrap());
    assert!(!store.contains(FEED, "y"));

    store.save().unwrap();
    let saved: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(saved["version"], 2);
    assert!(saved["feeds"][FEED].get("entry_data").is_none());
    assert_eq!(saved["feeds"][FEED]["articles"]["x"]["status"], "processed");
}

#[test]
fn read_views_sort_newest_first_and_filter_digest() {
    let mut store = Store::empty("unused.json");
    store.upsert(FEED, article("older", now() - Duration::days(3)));
    let mut d = article("digest", now() - Duration::days(1));
    d.status = ArticleStatus::Digest;
    store.upsert(FEED, d);
    store.upsert(FEED, article("stale", now() - Duration::days(9)));

    let since = rss_curator::state::cutoff(now(), 7);
    let ids: Vec<String> = store
        .recent_articles(FEED, since)
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec!["digest", "older"]);
    let digest: Vec<String> = store
        .digest_articles(FEED, since)
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(digest, vec!["digest"]);
    assert_eq!(store.get_known_ids(FEED).len(), 3);
}
