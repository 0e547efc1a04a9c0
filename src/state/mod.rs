// src/state/mod.rs
//! Durable per-feed classification state.
//!
//! The store maps feed URL → feed record → article id → article record. It is
//! loaded once per run, mutated in memory, pruned, and saved once with
//! write-temp-then-rename. Status and `processed_at` of a known article never
//! change here: `upsert` on an existing id only refreshes its content fields.

pub mod legacy;
pub mod records;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dates::DateNormalizer;
use crate::error::{StateCorruptionError, StatePersistError};

pub use records::{Article, ArticleRecord, ArticleStatus, DigestRecord, FeedRecord, STATE_VERSION};

pub const DEFAULT_STATE_FILE: &str = "processed_state.json";

/// What `upsert` did with the incoming article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    /// Known id; title/link/summary changed at the source.
    Refreshed,
    Unchanged,
}

#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    feeds: BTreeMap<String, FeedRecord>,
    last_updated: Option<DateTime<Utc>>,
    extra: Map<String, Value>,
    dirty: bool,
}

/// Lookback cutoff: articles published before this instant are stale.
pub fn cutoff(now: DateTime<Utc>, lookback_days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(lookback_days))
}

impl Store {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            feeds: BTreeMap::new(),
            last_updated: None,
            extra: Map::new(),
            dirty: false,
        }
    }

    /// A missing file is an empty store, and a corrupt one is copied aside
    /// and replaced by an empty store with a warning. A file that exists but
    /// cannot be read is an error, so it is never overwritten by a later save.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StateCorruptionError> {
        let path = path.into();
        match Self::try_load(&path) {
            Ok(store) => Ok(store),
            Err(e @ StateCorruptionError::Read { .. }) => Err(e),
            Err(e) => {
                warn!(error = %e, "state file corrupt; starting from an empty store");
                quarantine(&path);
                Ok(Self::empty(path))
            }
        }
    }

    /// Strict variant of [`Store::load`]; a missing file is still `Ok`.
    pub fn try_load(path: &Path) -> Result<Self, StateCorruptionError> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no state file yet; starting empty");
                return Ok(Self::empty(path));
            }
            Err(source) => {
                return Err(StateCorruptionError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::decode(path, &text).map_err(|source| StateCorruptionError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    fn decode(path: &Path, text: &str) -> Result<Self, serde_json::Error> {
        let mut root: Map<String, Value> = serde_json::from_str(text)?;
        let feeds_raw: Map<String, Value> = match root.remove("feeds") {
            Some(v) => serde_json::from_value(v)?,
            None => Map::new(),
        };
        let last_updated = root
            .remove("last_updated")
            .and_then(|v| v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()))
            .map(|dt| dt.with_timezone(&Utc));
        let version = root
            .remove("version")
            .and_then(|v| v.as_u64())
            .unwrap_or(1);

        let dates = DateNormalizer::new();
        let mut dirty = version != u64::from(STATE_VERSION);
        let mut feeds = BTreeMap::new();
        for (url, raw) in feeds_raw {
            if legacy::is_legacy(&raw) {
                let migrated = legacy::migrate(raw, &dates);
                info!(
                    feed = %url,
                    kept = migrated.record.articles.len(),
                    dropped = migrated.dropped,
                    "migrated legacy feed state"
                );
                dirty = true;
                feeds.insert(url, migrated.record);
            } else {
                feeds.insert(url, serde_json::from_value::<FeedRecord>(raw)?);
            }
        }

        debug!(path = %path.display(), feeds = feeds.len(), "state loaded");
        Ok(Self {
            path: path.to_path_buf(),
            feeds,
            last_updated,
            extra: root,
            dirty,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Ids already classified for a feed.
    pub fn get_known_ids(&self, feed_url: &str) -> HashSet<String> {
        self.feeds
            .get(feed_url)
            .map(|f| f.articles.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, feed_url: &str, id: &str) -> bool {
        self.feeds
            .get(feed_url)
            .is_some_and(|f| f.articles.contains_key(id))
    }

    pub fn status_of(&self, feed_url: &str, id: &str) -> Option<ArticleStatus> {
        self.feeds
            .get(feed_url)
            .and_then(|f| f.articles.get(id))
            .map(|a| a.status)
    }

    pub fn article(&self, feed_url: &str, id: &str) -> Option<Article> {
        self.feeds
            .get(feed_url)
            .and_then(|f| f.articles.get(id))
            .map(|a| a.to_article(id))
    }

    /// Inserts a newly classified article, or refreshes the content fields of
    /// a known one. Classification fields of a known id are kept as stored.
    pub fn upsert(&mut self, feed_url: &str, article: Article) -> Upsert {
        let feed = self.feeds.entry(feed_url.to_string()).or_default();
        match feed.articles.get_mut(&article.id) {
            Some(existing) => {
                if existing.title == article.title
                    && existing.link == article.link
                    && existing.summary == article.summary
                {
                    return Upsert::Unchanged;
                }
                existing.title = article.title;
                existing.link = article.link;
                existing.summary = article.summary;
                self.dirty = true;
                Upsert::Refreshed
            }
            None => {
                let id = article.id.clone();
                feed.articles.insert(id, ArticleRecord::from(article));
                self.dirty = true;
                Upsert::Inserted
            }
        }
    }

    /// Records the feed title resolved from the source.
    pub fn set_feed_title(&mut self, feed_url: &str, title: Option<&str>) {
        let feed = self.feeds.entry(feed_url.to_string()).or_default();
        let title = title.map(str::trim).filter(|t| !t.is_empty());
        if let Some(t) = title {
            if feed.title.as_deref() != Some(t) {
                feed.title = Some(t.to_string());
                self.dirty = true;
            }
        }
    }

    /// Removes every article published before `now - lookback_days` across
    /// all feeds. Feeds left empty are kept so their title survives.
    pub fn prune(&mut self, now: DateTime<Utc>, lookback_days: u32) -> usize {
        let limit = cutoff(now, lookback_days);
        let mut removed = 0usize;
        for (url, feed) in self.feeds.iter_mut() {
            let before = feed.articles.len();
            feed.articles.retain(|_, a| a.published_date >= limit);
            let gone = before - feed.articles.len();
            if gone > 0 {
                debug!(feed = %url, removed = gone, "pruned stale articles");
            }
            removed += gone;
        }
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn feed_urls(&self) -> Vec<String> {
        self.feeds.keys().cloned().collect()
    }

    pub fn feed_title(&self, feed_url: &str) -> Option<&str> {
        self.feeds.get(feed_url).and_then(|f| f.title.as_deref())
    }

    pub fn articles(&self, feed_url: &str) -> Vec<Article> {
        self.feeds
            .get(feed_url)
            .map(|f| f.articles.iter().map(|(id, a)| a.to_article(id)).collect())
            .unwrap_or_default()
    }

    /// Articles published at or after `since`, newest first.
    pub fn recent_articles(&self, feed_url: &str, since: DateTime<Utc>) -> Vec<Article> {
        let mut out: Vec<Article> = self
            .articles(feed_url)
            .into_iter()
            .filter(|a| a.published_date >= since)
            .collect();
        out.sort_by(|a, b| {
            b.published_date
                .cmp(&a.published_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    /// Digest-status articles published at or after `since`, newest first.
    pub fn digest_articles(&self, feed_url: &str, since: DateTime<Utc>) -> Vec<Article> {
        self.recent_articles(feed_url, since)
            .into_iter()
            .filter(|a| a.status == ArticleStatus::Digest)
            .collect()
    }

    pub fn digest_record(&self, feed_url: &str) -> Option<&DigestRecord> {
        self.feeds.get(feed_url).and_then(|f| f.digest.as_ref())
    }

    pub fn set_digest_record(&mut self, feed_url: &str, record: DigestRecord) {
        let feed = self.feeds.entry(feed_url.to_string()).or_default();
        if feed.digest.as_ref() != Some(&record) {
            feed.digest = Some(record);
            self.dirty = true;
        }
    }

    /// Drops a digest whose article set has emptied out.
    pub fn clear_digest_record(&mut self, feed_url: &str) {
        if let Some(feed) = self.feeds.get_mut(feed_url) {
            if feed.digest.take().is_some() {
                self.dirty = true;
            }
        }
    }

    /// Atomically writes the whole store. `last_updated` only moves when the
    /// store changed, so an untouched load → save rewrites identical bytes.
    pub fn save(&mut self) -> Result<(), StatePersistError> {
        if self.dirty || self.last_updated.is_none() {
            self.last_updated = Some(Utc::now());
        }
        let doc = records::StateFileOut {
            version: STATE_VERSION,
            last_updated: self.last_updated,
            feeds: &self.feeds,
            extra: &self.extra,
        };
        let mut bytes = serde_json::to_vec_pretty(&doc)?;
        bytes.push(b'\n');
        write_atomic(&self.path, &bytes).map_err(|source| StatePersistError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.dirty = false;
        info!(path = %self.path.display(), feeds = self.feeds.len(), "state saved");
        Ok(())
    }
}

/// Write to a sibling temp file, fsync, then rename over the target.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)
}

/// Keep a copy of an unreadable state file next to it before it gets
/// overwritten by the next save.
fn quarantine(path: &Path) {
    if !path.exists() {
        return;
    }
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let aside = path.with_file_name(format!("{file_name}.corrupt-{stamp}"));
    match fs::copy(path, &aside) {
        Ok(_) => warn!(copy = %aside.display(), "corrupt state file preserved"),
        Err(e) => warn!(error = %e, "could not preserve corrupt state file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(id: &str, days_ago: i64, now: DateTime<Utc>) -> Article {
        Article {
            id: id.to_string(),
            title: format!("Title {id}"),
            link: format!("https://example.test/{id}"),
            summary: "summary".into(),
            published_date: now - Duration::days(days_ago),
            status: ArticleStatus::Digest,
            processed_at: Some(now),
        }
    }

    #[test]
    fn upsert_never_touches_classification_of_known_id() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut store = Store::empty("unused.json");
        assert_eq!(store.upsert("f", article("a", 1, now)), Upsert::Inserted);

        let mut again = article("a", 1, now);
        again.status = ArticleStatus::Processed;
        again.processed_at = Some(now + Duration::hours(5));
        assert_eq!(store.upsert("f", again.clone()), Upsert::Unchanged);

        again.title = "Retitled".into();
        assert_eq!(store.upsert("f", again), Upsert::Refreshed);

        let stored = store.article("f", "a").unwrap();
        assert_eq!(stored.title, "Retitled");
        assert_eq!(stored.status, ArticleStatus::Digest);
        assert_eq!(stored.processed_at, Some(now));
    }

    #[test]
    fn prune_keeps_boundary_and_empty_feed() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut store = Store::empty("unused.json");
        store.set_feed_title("f", Some("Feed"));
        store.upsert("f", article("old", 8, now));
        store.upsert("f", article("edge", 7, now));
        assert_eq!(store.prune(now, 7), 1);
        assert!(store.contains("f", "edge"));
        assert!(!store.contains("f", "old"));

        assert_eq!(store.prune(now + Duration::days(1), 7), 1);
        assert_eq!(store.feed_urls(), vec!["f".to_string()]);
        assert_eq!(store.feed_title("f"), Some("Feed"));
    }
}
