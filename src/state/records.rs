// src/state/records.rs
//! Typed records behind the state file. Unknown keys at every level land in
//! `extra` and are written back untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Classification outcome of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    /// Shown in full.
    Processed,
    /// Folded into the feed digest.
    Digest,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Processed => "processed",
            ArticleStatus::Digest => "digest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Some(ArticleStatus::Processed),
            "digest" => Some(ArticleStatus::Digest),
            _ => None,
        }
    }
}

/// An article as the rest of the crate sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published_date: DateTime<Utc>,
    pub status: ArticleStatus,
    pub processed_at: Option<DateTime<Utc>>,
}

/// On-disk form of an article; the id is the map key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub summary: String,
    pub published_date: DateTime<Utc>,
    pub status: ArticleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArticleRecord {
    pub fn to_article(&self, id: &str) -> Article {
        Article {
            id: id.to_string(),
            title: self.title.clone(),
            link: self.link.clone(),
            summary: self.summary.clone(),
            published_date: self.published_date,
            status: self.status,
            processed_at: self.processed_at,
        }
    }
}

impl From<Article> for ArticleRecord {
    fn from(a: Article) -> Self {
        Self {
            title: a.title,
            link: a.link,
            summary: a.summary,
            published_date: a.published_date,
            status: a.status,
            processed_at: a.processed_at,
            extra: Map::new(),
        }
    }
}

/// Last synthesized digest for a feed, keyed by the contributing id set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestRecord {
    pub batch_id: String,
    pub article_ids: Vec<String>,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub articles: BTreeMap<String, ArticleRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DigestRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub const STATE_VERSION: u32 = 2;

/// Whole-document form used when writing.
#[derive(Debug, Serialize)]
pub(crate) struct StateFileOut<'a> {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    pub feeds: &'a BTreeMap<String, FeedRecord>,
    #[serde(flatten)]
    pub extra: &'a Map<String, Value>,
}
