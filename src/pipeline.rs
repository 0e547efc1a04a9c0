// src/pipeline.rs
//! Classification pipeline: fetch, diff against the store, classify only new
//! articles, merge, prune, refresh digests. One invocation = one run.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dates::DateNormalizer;
use crate::digest::{DigestAggregator, DigestOutcome};
use crate::error::{ClassificationError, FetchError, StatePersistError};
use crate::ingest::{article_id, clean_title};
use crate::ingest::types::{FeedSource, RawEntry};
use crate::judge::{classify_content, map_label, with_timeout, JudgmentService};
use crate::state::records::{Article, ArticleStatus};
use crate::state::{cutoff, Store};
use crate::telemetry::ensure_metrics_described;

/// The slice of [`Config`] the pipeline needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub feeds: Vec<String>,
    pub criteria: String,
    pub model: String,
    pub days_lookback: u32,
    pub summary_max_tokens: u32,
    pub classify_max_tokens: u32,
    pub judgment_timeout: Duration,
}

impl From<&Config> for PipelineConfig {
    fn from(c: &Config) -> Self {
        Self {
            feeds: c.rss_feeds.clone(),
            criteria: c.user_preference_criteria.clone(),
            model: c.ai_model.clone(),
            days_lookback: c.days_lookback,
            summary_max_tokens: c.summary_max_tokens,
            classify_max_tokens: c.classify_max_tokens,
            judgment_timeout: Duration::from_secs(c.judgment_timeout_secs),
        }
    }
}

/// Per-feed tallies from one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub entries_seen: usize,
    pub classified_processed: usize,
    pub classified_digest: usize,
    pub known: usize,
    pub out_of_window: usize,
    pub undated: usize,
    pub classify_failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub feeds_attempted: usize,
    pub feeds_succeeded: usize,
    pub feeds_failed: usize,
    pub entries_seen: usize,
    pub classified_processed: usize,
    pub classified_digest: usize,
    pub known: usize,
    pub out_of_window: usize,
    pub undated: usize,
    pub classify_failures: usize,
    pub pruned: usize,
    pub digests_generated: usize,
    pub digests_reused: usize,
    pub digests_pending: usize,
    pub digests_empty: usize,
}

impl RunReport {
    pub fn classified(&self) -> usize {
        self.classified_processed + self.classified_digest
    }

    fn absorb(&mut self, s: &FeedStats) {
        self.entries_seen += s.entries_seen;
        self.classified_processed += s.classified_processed;
        self.classified_digest += s.classified_digest;
        self.known += s.known;
        self.out_of_window += s.out_of_window;
        self.undated += s.undated;
        self.classify_failures += s.classify_failures;
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "feeds {}/{} ok ({} failed); entries {}: {} new ({} full, {} digest), {} known, \
             {} out of window, {} undated, {} classify failures; pruned {}; \
             digests {} generated, {} reused, {} pending, {} empty",
            self.feeds_succeeded,
            self.feeds_attempted,
            self.feeds_failed,
            self.entries_seen,
            self.classified(),
            self.classified_processed,
            self.classified_digest,
            self.known,
            self.out_of_window,
            self.undated,
            self.classify_failures,
            self.pruned,
            self.digests_generated,
            self.digests_reused,
            self.digests_pending,
            self.digests_empty,
        )
    }
}

pub struct Pipeline {
    cfg: PipelineConfig,
    source: Arc<dyn FeedSource>,
    judge: Arc<dyn JudgmentService>,
    dates: DateNormalizer,
}

impl Pipeline {
    pub fn new(
        cfg: PipelineConfig,
        source: Arc<dyn FeedSource>,
        judge: Arc<dyn JudgmentService>,
    ) -> Self {
        Self {
            cfg,
            source,
            judge,
            dates: DateNormalizer::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Fetches one feed and merges it into `store`. A fetch error leaves the
    /// store untouched; a judgment error only skips that article.
    pub async fn process_feed(
        &self,
        store: &mut Store,
        feed_url: &str,
        now: DateTime<Utc>,
    ) -> Result<FeedStats, FetchError> {
        let fetched = self.source.fetch(feed_url).await?;
        counter!("curator_feeds_fetched_total").increment(1);
        store.set_feed_title(feed_url, fetched.title.as_deref());

        let known = store.get_known_ids(feed_url);
        let since = cutoff(now, self.cfg.days_lookback);
        let mut seen: HashSet<String> = HashSet::new();
        let mut stats = FeedStats::default();

        for mut entry in fetched.entries {
            stats.entries_seen += 1;
            entry.title = clean_title(&entry.title);
            let id = article_id(&entry);
            if !seen.insert(id.clone()) {
                debug!(feed = %feed_url, article = %id, "duplicate entry in feed");
                continue;
            }

            let published = match self.dates.parse_opt(entry.raw_date.as_deref()) {
                Ok(dt) => dt,
                Err(e) => {
                    stats.undated += 1;
                    counter!("curator_articles_undated_total").increment(1);
                    debug!(feed = %feed_url, article = %id, error = %e, "entry has no usable date");
                    continue;
                }
            };
            if published < since || published > now {
                stats.out_of_window += 1;
                counter!("curator_articles_out_of_window_total").increment(1);
                continue;
            }

            if known.contains(&id) {
                stats.known += 1;
                counter!("curator_articles_known_total").increment(1);
                self.refresh_known(store, feed_url, &id, entry);
                continue;
            }

            match self.classify(feed_url, &id, &entry).await {
                Ok(status) => {
                    match status {
                        ArticleStatus::Processed => stats.classified_processed += 1,
                        ArticleStatus::Digest => stats.classified_digest += 1,
                    }
                    counter!("curator_articles_classified_total", "status" => status.as_str())
                        .increment(1);
                    debug!(feed = %feed_url, article = %id, title = %entry.title, status = status.as_str(), "classified");
                    store.upsert(
                        feed_url,
                        Article {
                            id,
                            title: entry.title,
                            link: entry.link,
                            summary: entry.summary,
                            published_date: published,
                            status,
                            processed_at: Some(now),
                        },
                    );
                }
                Err(e) => {
                    stats.classify_failures += 1;
                    counter!("curator_classify_errors_total").increment(1);
                    warn!(feed = %feed_url, article = %e.article_id, error = %e.source, "classification failed; will retry next run");
                }
            }
        }

        Ok(stats)
    }

    async fn classify(
        &self,
        feed_url: &str,
        id: &str,
        entry: &RawEntry,
    ) -> Result<ArticleStatus, ClassificationError> {
        let content = classify_content(&entry.title, &entry.summary, feed_url);
        let call = self.judge.classify(
            &content,
            &self.cfg.criteria,
            &self.cfg.model,
            self.cfg.classify_max_tokens,
        );
        with_timeout(self.cfg.judgment_timeout, call)
            .await
            .map(|label| map_label(&label))
            .map_err(|source| ClassificationError {
                article_id: id.to_string(),
                source,
            })
    }

    /// Content fields follow the source; classification stays as stored.
    fn refresh_known(&self, store: &mut Store, feed_url: &str, id: &str, entry: RawEntry) {
        if let Some(mut current) = store.article(feed_url, id) {
            current.title = entry.title;
            current.link = entry.link;
            current.summary = entry.summary;
            store.upsert(feed_url, current);
        }
    }

    /// Full run against an injected clock: every feed, then prune, then
    /// digests. Does not save.
    pub async fn run_at(&self, store: &mut Store, now: DateTime<Utc>) -> RunReport {
        ensure_metrics_described();
        let mut report = RunReport::default();

        for url in &self.cfg.feeds {
            report.feeds_attempted += 1;
            match self.process_feed(store, url, now).await {
                Ok(stats) => {
                    report.feeds_succeeded += 1;
                    info!(
                        feed = %url,
                        seen = stats.entries_seen,
                        new = stats.classified_processed + stats.classified_digest,
                        known = stats.known,
                        failures = stats.classify_failures,
                        "feed processed"
                    );
                    report.absorb(&stats);
                }
                Err(e) => {
                    report.feeds_failed += 1;
                    counter!("curator_feed_errors_total").increment(1);
                    warn!(feed = %url, source = self.source.name(), error = %e, "feed skipped");
                }
            }
        }

        report.pruned = store.prune(now, self.cfg.days_lookback);
        counter!("curator_articles_pruned_total").increment(report.pruned as u64);

        let aggregator = DigestAggregator::new(
            Arc::clone(&self.judge),
            self.cfg.summary_max_tokens,
            self.cfg.judgment_timeout,
        );
        for url in &self.cfg.feeds {
            match aggregator
                .aggregate(store, url, now, self.cfg.days_lookback)
                .await
            {
                DigestOutcome::Empty => report.digests_empty += 1,
                DigestOutcome::Reused(_) => report.digests_reused += 1,
                DigestOutcome::Generated(_) => report.digests_generated += 1,
                DigestOutcome::Pending(_) => report.digests_pending += 1,
            }
        }

        gauge!("curator_last_run_ts").set(now.timestamp() as f64);
        info!(report = %report, "run finished");
        report
    }

    /// Runs at the current time and persists the store once.
    pub async fn run(&self, store: &mut Store) -> Result<RunReport, StatePersistError> {
        let report = self.run_at(store, Utc::now()).await;
        store.save()?;
        Ok(report)
    }
}
