// src/render.rs
//! Static site output: an index, one HTML page and one curated RSS feed per
//! source feed, and `feeds.json`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

use crate::digest::DigestBatch;
use crate::ingest::normalize_text;
use crate::state::records::{Article, ArticleStatus, DigestRecord};
use crate::state::{cutoff, write_atomic, Store};

/// Plain-text excerpt length shown under each full article.
const EXCERPT_CAP: usize = 600;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FeedEntry {
    pub url: String,
    pub title: String,
    pub page: String,
    /// Curated RSS 2.0 feed: full articles plus one digest item.
    pub rss: String,
    pub processed: usize,
    pub digest: usize,
    /// Stored synthesis matches the current digest set.
    pub digest_current: bool,
}

#[derive(Debug, Clone, Serialize)]
struct SiteIndex<'a> {
    generated_at: DateTime<Utc>,
    days_lookback: u32,
    feeds: &'a [FeedEntry],
}

/// File-name-safe, unique per URL.
pub fn feed_slug(url: &str) -> String {
    let readable: String = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .take(48)
        .collect();
    let hash = Sha256::digest(url.as_bytes());
    let mut suffix = String::with_capacity(8);
    for b in hash.iter().take(4) {
        let _ = write!(suffix, "{b:02x}");
    }
    format!("{}_{suffix}", readable.trim_matches('_'))
}

pub fn write_site(
    store: &Store,
    site_dir: &Path,
    now: DateTime<Utc>,
    lookback_days: u32,
) -> Result<Vec<FeedEntry>> {
    let since = cutoff(now, lookback_days);
    let mut entries = Vec::new();

    for url in store.feed_urls() {
        let title = store
            .feed_title(&url)
            .map(str::to_string)
            .unwrap_or_else(|| url.clone());
        let recent = store.recent_articles(&url, since);
        let full: Vec<&Article> = recent
            .iter()
            .filter(|a| a.status == ArticleStatus::Processed)
            .collect();
        let batch = DigestBatch::current(store, &url, since);
        let current = match (&batch, store.digest_record(&url)) {
            (Some(b), Some(rec)) if rec.batch_id == b.batch_id => Some(rec),
            _ => None,
        };
        let synthesis = current.map(|rec| rec.summary.as_str());

        let slug = feed_slug(&url);
        let entry = FeedEntry {
            page: format!("feed_{slug}.html"),
            rss: format!("feed_{slug}.xml"),
            processed: full.len(),
            digest: batch.as_ref().map_or(0, |b| b.articles.len()),
            digest_current: synthesis.is_some(),
            url: url.clone(),
            title: title.clone(),
        };

        let html = feed_page(&entry, &full, batch.as_ref(), synthesis, now);
        let path = site_dir.join(&entry.page);
        write_atomic(&path, html.as_bytes())
            .with_context(|| format!("writing {}", path.display()))?;

        let xml = feed_rss(&entry, &full, current, now)?;
        let xml_path = site_dir.join(&entry.rss);
        write_atomic(&xml_path, xml.as_bytes())
            .with_context(|| format!("writing {}", xml_path.display()))?;
        entries.push(entry);
    }

    let index = index_page(&entries, now, lookback_days);
    let index_path = site_dir.join("index.html");
    write_atomic(&index_path, index.as_bytes())
        .with_context(|| format!("writing {}", index_path.display()))?;

    let json = serde_json::to_vec_pretty(&SiteIndex {
        generated_at: now,
        days_lookback: lookback_days,
        feeds: &entries,
    })?;
    let json_path = site_dir.join("feeds.json");
    write_atomic(&json_path, &json).with_context(|| format!("writing {}", json_path.display()))?;

    info!(dir = %site_dir.display(), feeds = entries.len(), "site rendered");
    Ok(entries)
}

#[derive(Serialize)]
struct RssOut<'a> {
    #[serde(rename = "@version")]
    version: &'static str,
    channel: ChannelOut<'a>,
}

#[derive(Serialize)]
struct ChannelOut<'a> {
    title: &'a str,
    link: &'a str,
    description: String,
    #[serde(rename = "lastBuildDate")]
    last_build_date: String,
    #[serde(rename = "item")]
    items: Vec<ItemOut<'a>>,
}

#[derive(Serialize)]
struct ItemOut<'a> {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<&'a str>,
    guid: GuidOut,
    description: &'a str,
    #[serde(rename = "pubDate")]
    pub_date: String,
}

#[derive(Serialize)]
struct GuidOut {
    #[serde(rename = "@isPermaLink")]
    is_perma_link: bool,
    #[serde(rename = "$text")]
    value: String,
}

/// RSS 2.0 rendition of a feed page. The digest item only appears when its
/// synthesis matches the current digest set.
fn feed_rss(
    feed: &FeedEntry,
    full: &[&Article],
    digest: Option<&DigestRecord>,
    now: DateTime<Utc>,
) -> Result<String> {
    let mut items: Vec<ItemOut<'_>> = full
        .iter()
        .map(|a| ItemOut {
            title: a.title.clone(),
            link: Some(a.link.as_str()),
            guid: GuidOut {
                is_perma_link: false,
                value: a.id.clone(),
            },
            description: a.summary.as_str(),
            pub_date: a.published_date.to_rfc2822(),
        })
        .collect();
    if let Some(rec) = digest {
        let n = rec.article_ids.len();
        items.push(ItemOut {
            title: format!("Digest of {n} {}", if n == 1 { "article" } else { "articles" }),
            link: None,
            guid: GuidOut {
                is_perma_link: false,
                value: format!("digest-{}", rec.batch_id),
            },
            description: rec.summary.as_str(),
            pub_date: rec.generated_at.to_rfc2822(),
        });
    }

    let doc = RssOut {
        version: "2.0",
        channel: ChannelOut {
            title: &feed.title,
            link: &feed.url,
            description: format!("Curated from {}", feed.url),
            last_build_date: now.to_rfc2822(),
            items,
        },
    };
    let body = quick_xml::se::to_string_with_root("rss", &doc).context("serializing rss feed")?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
}

fn head(title: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{}</title>\n</head>\n<body>\n",
        text(title)
    )
}

fn index_page(feeds: &[FeedEntry], now: DateTime<Utc>, lookback_days: u32) -> String {
    let mut out = head("RSS Curator");
    let _ = writeln!(out, "<h1>RSS Curator</h1>");
    let _ = writeln!(
        out,
        "<p>Last {lookback_days} days, generated {}</p>\n<ul>",
        now.format("%Y-%m-%d %H:%M UTC")
    );
    for f in feeds {
        let _ = writeln!(
            out,
            "<li><a href=\"{}\">{}</a> ({} full, {} in digest) <a href=\"{}\">rss</a></li>",
            attr(&f.page),
            text(&f.title),
            f.processed,
            f.digest,
            attr(&f.rss)
        );
    }
    out.push_str("</ul>\n</body>\n</html>\n");
    out
}

fn feed_page(
    feed: &FeedEntry,
    full: &[&Article],
    batch: Option<&DigestBatch>,
    synthesis: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let mut out = head(&feed.title);
    let _ = writeln!(
        out,
        "<p><a href=\"index.html\">All feeds</a></p>\n<h1>{}</h1>\n<p><a href=\"{}\">{}</a></p>",
        text(&feed.title),
        attr(&feed.url),
        text(&feed.url)
    );

    for a in full {
        let _ = writeln!(
            out,
            "<article>\n<h2><a href=\"{}\">{}</a></h2>\n<p><time datetime=\"{}\">{}</time></p>\n<p>{}</p>\n</article>",
            attr(&a.link),
            text(&a.title),
            a.published_date.to_rfc3339(),
            a.published_date.format("%Y-%m-%d %H:%M UTC"),
            text(&normalize_text(&a.summary, EXCERPT_CAP))
        );
    }

    if let Some(b) = batch {
        out.push_str("<section class=\"digest\">\n<h2>Digest</h2>\n");
        match synthesis {
            Some(html) => {
                out.push_str(html);
                out.push('\n');
            }
            None => out.push_str("<p class=\"pending\">Digest pending.</p>\n"),
        }
        out.push_str("<ul>\n");
        for a in &b.articles {
            let _ = writeln!(
                out,
                "<li><a href=\"{}\">{}</a></li>",
                attr(&a.link),
                text(&a.title)
            );
        }
        out.push_str("</ul>\n</section>\n");
    }

    let _ = writeln!(
        out,
        "<footer>Generated {}</footer>\n</body>\n</html>",
        now.format("%Y-%m-%d %H:%M UTC")
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_safe_and_distinct() {
        let a = feed_slug("https://example.org/feed?a=1");
        let b = feed_slug("https://example.org/feed?a=2");
        assert_ne!(a, b);
        assert!(a.starts_with("example_org_feed_a_1_"));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}
