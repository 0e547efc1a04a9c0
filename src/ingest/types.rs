// src/ingest/types.rs
use async_trait::async_trait;

use crate::error::FetchError;

/// One item as the source published it; nothing normalized yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub id: Option<String>, // guid / atom:id / rdf:about
    pub title: String,
    pub link: String,
    pub summary: String,
    pub raw_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedFeed {
    pub title: Option<String>,
    pub entries: Vec<RawEntry>,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed, FetchError>;
    fn name(&self) -> &'static str;
}
