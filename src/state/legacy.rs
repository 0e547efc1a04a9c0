// src/state/legacy.rs
//! Migration of the older per-feed layout:
//! `{ processed_ids: [...], entry_data: { id: { title, link, summary, date, status, processed_at } }, digest: {...} }`
//! where `date` is whatever string the feed published.

use serde_json::{Map, Value};

use super::records::{ArticleRecord, ArticleStatus, FeedRecord};
use crate::dates::DateNormalizer;

/// Keys that only exist in the older layout and are not carried forward.
const LEGACY_KEYS: &[&str] = &["processed_ids", "last_entry_date", "entry_data", "digest"];

pub fn is_legacy(feed: &Value) -> bool {
    feed.get("entry_data").is_some() && feed.get("articles").is_none()
}

/// Outcome of migrating one feed.
#[derive(Debug)]
pub struct Migrated {
    pub record: FeedRecord,
    pub dropped: usize,
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

/// Entries without a parseable date or a known status cannot be placed in
/// the lookback window or trusted as classified, so they are dropped.
pub fn migrate(feed: Value, dates: &DateNormalizer) -> Migrated {
    let Value::Object(mut obj) = feed else {
        return Migrated {
            record: FeedRecord::default(),
            dropped: 0,
        };
    };

    let title = str_field(&obj, "feed_title")
        .or_else(|| str_field(&obj, "title"))
        .map(str::to_string);
    obj.remove("feed_title");
    obj.remove("title");

    let mut record = FeedRecord {
        title,
        ..FeedRecord::default()
    };
    let mut dropped = 0usize;

    if let Some(Value::Object(entries)) = obj.remove("entry_data") {
        for (id, entry) in entries {
            let Value::Object(entry) = entry else {
                dropped += 1;
                continue;
            };
            let status = str_field(&entry, "status").and_then(ArticleStatus::parse);
            let published = str_field(&entry, "date").and_then(|d| dates.parse(d).ok());
            let (Some(status), Some(published_date)) = (status, published) else {
                dropped += 1;
                continue;
            };
            let processed_at = str_field(&entry, "processed_at")
                .and_then(|p| dates.parse(p).ok());

            record.articles.insert(
                id,
                ArticleRecord {
                    title: str_field(&entry, "title").unwrap_or_default().to_string(),
                    link: str_field(&entry, "link").unwrap_or_default().to_string(),
                    summary: str_field(&entry, "summary").unwrap_or_default().to_string(),
                    published_date,
                    status,
                    processed_at,
                    extra: Map::new(),
                },
            );
        }
    }

    for key in LEGACY_KEYS {
        obj.remove(*key);
    }
    record.extra = obj;

    Migrated { record, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn migrates_classified_entries_and_drops_undated() {
        let legacy = json!({
            "processed_ids": ["a", "b", "c"],
            "last_entry_date": "Mon, 10 Apr 2023 17:00:00 PDT",
            "feed_title": "Example",
            "entry_data": {
                "a": {"title": "A", "link": "https://x/a", "summary": "s",
                      "date": "Mon, 10 Apr 2023 17:00:00 PDT", "status": "processed",
                      "processed_at": "2023-04-11T01:00:00"},
                "b": {"title": "B", "link": "https://x/b", "date": "garbage", "status": "digest"},
                "c": {"title": "C", "link": "https://x/c", "date": "2023-04-10"}
            },
            "digest": {"id": null, "content_hash": null, "article_ids": [], "last_updated": null}
        });
        assert!(is_legacy(&legacy));

        let m = migrate(legacy, &DateNormalizer::new());
        assert_eq!(m.dropped, 2);
        assert_eq!(m.record.title.as_deref(), Some("Example"));
        let a = &m.record.articles["a"];
        assert_eq!(a.status, ArticleStatus::Processed);
        assert_eq!(a.published_date.to_rfc3339(), "2023-04-11T00:00:00+00:00");
        assert!(a.processed_at.is_some());
        assert!(m.record.extra.is_empty());
    }
}
