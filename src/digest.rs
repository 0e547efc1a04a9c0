// src/digest.rs
//! Digest Aggregator: one synthesis per feed over its digest-status
//! articles in the lookback window, cached by a hash of the id set.

use chrono::{DateTime, Utc};
use metrics::counter;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::AggregationError;
use crate::judge::{digest_content, summary_budget, with_timeout, JudgmentService};
use crate::state::records::{Article, DigestRecord};
use crate::state::{cutoff, Store};

/// Stable identifier of a set of article ids; order and duplicates ignored.
pub fn batch_id<S: AsRef<str>>(ids: &[S]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.dedup();
    let mut hasher = Sha256::new();
    for id in sorted {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// The digest set a feed currently has, with its batch id.
#[derive(Debug, Clone)]
pub struct DigestBatch {
    pub batch_id: String,
    pub articles: Vec<Article>,
}

impl DigestBatch {
    pub fn current(store: &Store, feed_url: &str, since: DateTime<Utc>) -> Option<Self> {
        let articles = store.digest_articles(feed_url, since);
        if articles.is_empty() {
            return None;
        }
        let ids: Vec<&str> = articles.iter().map(|a| a.id.as_str()).collect();
        Some(Self {
            batch_id: batch_id(&ids),
            articles,
        })
    }

    fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.articles.iter().map(|a| a.id.clone()).collect();
        ids.sort();
        ids
    }
}

#[derive(Debug)]
pub enum DigestOutcome {
    /// No digest articles in the window; nothing requested and any stored
    /// digest dropped.
    Empty,
    /// Stored synthesis still matches the current set.
    Reused(DigestRecord),
    Generated(DigestRecord),
    /// Synthesis failed; the previous record is untouched.
    Pending(AggregationError),
}

pub struct DigestAggregator {
    judge: Arc<dyn JudgmentService>,
    summary_max_tokens: u32,
    timeout: Duration,
}

impl DigestAggregator {
    pub fn new(judge: Arc<dyn JudgmentService>, summary_max_tokens: u32, timeout: Duration) -> Self {
        Self {
            judge,
            summary_max_tokens,
            timeout,
        }
    }

    pub async fn aggregate(
        &self,
        store: &mut Store,
        feed_url: &str,
        now: DateTime<Utc>,
        lookback_days: u32,
    ) -> DigestOutcome {
        let Some(batch) = DigestBatch::current(store, feed_url, cutoff(now, lookback_days)) else {
            debug!(feed = %feed_url, "no digest articles");
            store.clear_digest_record(feed_url);
            return DigestOutcome::Empty;
        };

        if let Some(prev) = store.digest_record(feed_url) {
            if prev.batch_id == batch.batch_id {
                counter!("curator_digests_reused_total").increment(1);
                debug!(feed = %feed_url, batch = %batch.batch_id, "digest unchanged");
                return DigestOutcome::Reused(prev.clone());
            }
        }

        let content = digest_content(&batch.articles);
        let budget = summary_budget(self.summary_max_tokens, batch.articles.len());
        let res = with_timeout(self.timeout, self.judge.summarize(&content, budget)).await;

        match res {
            Ok(summary) => {
                let record = DigestRecord {
                    batch_id: batch.batch_id.clone(),
                    article_ids: batch.sorted_ids(),
                    summary,
                    generated_at: now,
                    extra: store
                        .digest_record(feed_url)
                        .map(|prev| prev.extra.clone())
                        .unwrap_or_default(),
                };
                store.set_digest_record(feed_url, record.clone());
                counter!("curator_digests_generated_total").increment(1);
                info!(
                    feed = %feed_url,
                    batch = %record.batch_id,
                    articles = record.article_ids.len(),
                    "digest generated"
                );
                DigestOutcome::Generated(record)
            }
            Err(source) => {
                counter!("curator_digest_errors_total").increment(1);
                warn!(feed = %feed_url, error = %source, "digest pending");
                DigestOutcome::Pending(AggregationError {
                    feed_url: feed_url.to_string(),
                    source,
                })
            }
        }
    }
}
