// src/judge/mod.rs
//! Judgment Service: one `classify` per new article, one `summarize` per
//! feed digest. Implementations: [`openai::OpenAiJudge`] (live) and
//! [`mock::MockJudge`] (scripted).

pub mod mock;
pub mod openai;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::error::JudgmentError;
use crate::ingest::{normalize_text, PROMPT_TEXT_CAP};
use crate::state::records::{Article, ArticleStatus};

/// Upper bound on the digest token budget, whatever the batch size.
pub const SUMMARY_TOKEN_CEILING: u32 = 4_096;

#[async_trait]
pub trait JudgmentService: Send + Sync {
    /// Returns the raw preference label for one article.
    async fn classify(
        &self,
        content: &str,
        criteria: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<String, JudgmentError>;

    /// Returns an HTML fragment covering the whole batch.
    async fn summarize(&self, batch_content: &str, max_tokens: u32)
        -> Result<String, JudgmentError>;

    fn name(&self) -> &'static str;
}

/// `FULL` (any case, optionally quoted or punctuated) is the only label that
/// shows an article in full. Everything else folds into the digest.
pub fn map_label(raw: &str) -> ArticleStatus {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
    if cleaned.eq_ignore_ascii_case("FULL") {
        ArticleStatus::Processed
    } else {
        ArticleStatus::Digest
    }
}

/// Bounds a judgment call; elapsed deadline becomes [`JudgmentError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, JudgmentError>
where
    F: Future<Output = Result<T, JudgmentError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(JudgmentError::Timeout {
            secs: limit.as_secs(),
        }),
    }
}

pub fn classify_system_prompt(criteria: &str) -> String {
    format!(
        "You are an assistant that helps determine article preferences. \
         Based on the title, summary, and source of an article, determine if it \
         should be shown in full or summarized based on these user preferences:\
         \n\n{criteria}\n\nRespond with either 'FULL' or 'SUMMARY' only."
    )
}

/// User prompt for one article. The summary is reduced to plain text.
pub fn classify_content(title: &str, summary: &str, feed_url: &str) -> String {
    let text = normalize_text(summary, PROMPT_TEXT_CAP);
    let source = url::Url::parse(feed_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .map(|host| format!("\nSource: {host}"))
        .unwrap_or_default();
    format!(
        "Title: {title}\n\nSummary: {text}{source}\n\n\
         Should this article be shown in full or summarized?"
    )
}

pub const SUMMARIZE_SYSTEM_PROMPT: &str = "You are an assistant that creates a consolidated \
summary of multiple articles. Your task is to identify key themes and important stories, and \
organize them into a readable digest. Each article title you mention should be a clickable link \
to the original article.";

pub fn digest_content(articles: &[Article]) -> String {
    let mut list = String::new();
    for (i, a) in articles.iter().enumerate() {
        list.push_str(&format!(
            "Article {}: {}\nLink: {}\nSummary: {}\n\n",
            i + 1,
            a.title,
            a.link,
            normalize_text(&a.summary, PROMPT_TEXT_CAP)
        ));
    }
    format!(
        "Here are {} articles that I want a brief overview of:\n\n{list}\n\
         Please create a consolidated summary that organizes these into themes and \
         highlights the most noteworthy stories. Format the response as a readable \
         digest with HTML. Each article title you mention should be wrapped in an \
         HTML link tag pointing to its original URL \
         (e.g., <a href='article_url'>Article Title</a>).",
        articles.len()
    )
}

/// Per-article budget times batch size, capped.
pub fn summary_budget(per_article: u32, count: usize) -> u32 {
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    per_article
        .saturating_mul(count)
        .min(SUMMARY_TOKEN_CEILING)
}
