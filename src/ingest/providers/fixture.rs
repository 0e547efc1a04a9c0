// src/ingest/providers/fixture.rs
//! In-memory feed source for tests and offline runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::FetchError;
use crate::ingest::providers::http::parse_feed;
use crate::ingest::types::{FeedSource, FetchedFeed};

#[derive(Debug, Clone)]
enum Scripted {
    Feed(FetchedFeed),
    Status(u16),
}

/// Serves registered feeds by URL. Unregistered URLs fail with
/// [`FetchError::Unknown`].
#[derive(Default)]
pub struct FixtureSource {
    feeds: Mutex<HashMap<String, Scripted>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_feed(&self, url: &str, feed: FetchedFeed) {
        self.feeds
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Feed(feed));
    }

    /// Registers a feed from an XML document (same parser as the live source).
    pub fn set_xml(&self, url: &str, xml: &str) -> Result<(), FetchError> {
        let feed = parse_feed(xml)?;
        self.set_feed(url, feed);
        Ok(())
    }

    /// Makes every fetch of `url` fail with the given HTTP status.
    pub fn fail(&self, url: &str, status: u16) {
        self.feeds
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Status(status));
    }

    pub fn remove(&self, url: &str) {
        self.feeds.lock().unwrap().remove(url);
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl FeedSource for FixtureSource {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed, FetchError> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        let scripted = self.feeds.lock().unwrap().get(url).cloned();
        match scripted {
            Some(Scripted::Feed(feed)) => Ok(feed),
            Some(Scripted::Status(status)) => Err(FetchError::Status { status }),
            None => Err(FetchError::Unknown(url.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
