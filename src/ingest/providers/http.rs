// src/ingest/providers/http.rs
//! Live feed source: HTTP GET + RSS 2.0 / RSS 1.0 (RDF) / Atom parsing.

use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;

use crate::error::FetchError;
use crate::ingest::types::{FeedSource, FetchedFeed, RawEntry};
use crate::ingest::{clean_summary, clean_title};

/// Element text, ignoring attributes such as `type="html"` or `isPermaLink`.
#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "title", default)]
    titles: Vec<Text>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct Rdf {
    channel: Option<Channel>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

/// Names are matched on their local part, so a namespaced sibling such as
/// `media:title` lands in the same list as `title`; the first non-empty wins.
#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(rename = "@about", alias = "@rdf:about")]
    about: Option<String>,
    guid: Option<Text>,
    #[serde(rename = "title", default)]
    titles: Vec<Text>,
    #[serde(rename = "link", default)]
    links: Vec<Text>,
    #[serde(rename = "description", default)]
    descriptions: Vec<Text>,
    #[serde(rename = "encoded", alias = "content:encoded")]
    content_encoded: Option<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "date", alias = "dc:date")]
    dc_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    title: Option<Text>,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<String>,
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<Text>,
    content: Option<Text>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn first_text(items: Vec<Text>) -> Option<String> {
    items.into_iter().find_map(|t| non_empty(Some(t.value)))
}

impl RssItem {
    fn into_entry(self) -> RawEntry {
        let summary = first_text(self.descriptions)
            .or_else(|| non_empty(self.content_encoded.map(|t| t.value)))
            .unwrap_or_default();
        RawEntry {
            id: non_empty(self.guid.map(|g| g.value)).or_else(|| non_empty(self.about)),
            title: clean_title(&first_text(self.titles).unwrap_or_default()),
            link: first_text(self.links).unwrap_or_default(),
            summary: clean_summary(&summary),
            raw_date: non_empty(self.pub_date).or_else(|| non_empty(self.dc_date)),
        }
    }
}

impl AtomEntry {
    fn into_entry(self) -> RawEntry {
        let link = self
            .links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.links.first())
            .and_then(|l| l.href.clone())
            .unwrap_or_default();
        let summary = non_empty(self.summary.map(|t| t.value))
            .or_else(|| non_empty(self.content.map(|t| t.value)))
            .unwrap_or_default();
        RawEntry {
            id: non_empty(self.id),
            title: clean_title(&self.title.map(|t| t.value).unwrap_or_default()),
            link: link.trim().to_string(),
            summary: clean_summary(&summary),
            raw_date: non_empty(self.published).or_else(|| non_empty(self.updated)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Rss,
    Rdf,
    Atom,
}

fn detect(xml: &str) -> Option<Dialect> {
    // Earliest root marker wins; an RSS channel may embed atom:link.
    [
        ("<rss", Dialect::Rss),
        ("<rdf:RDF", Dialect::Rdf),
        ("<RDF", Dialect::Rdf),
        ("<feed", Dialect::Atom),
    ]
    .iter()
    .filter_map(|(marker, d)| xml.find(marker).map(|pos| (pos, *d)))
    .min_by_key(|(pos, _)| *pos)
    .map(|(_, d)| d)
}

/// Parses a feed document of any supported dialect.
pub fn parse_feed(xml: &str) -> Result<FetchedFeed, FetchError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let parse_err = |e: quick_xml::de::DeError| FetchError::Parse(e.to_string());

    let feed = match detect(&xml_clean) {
        Some(Dialect::Rss) => {
            let rss: Rss = from_str(&xml_clean).map_err(parse_err)?;
            FetchedFeed {
                title: first_text(rss.channel.titles).map(|t| clean_title(&t)),
                entries: rss.channel.items.into_iter().map(RssItem::into_entry).collect(),
            }
        }
        Some(Dialect::Rdf) => {
            let rdf: Rdf = from_str(&xml_clean).map_err(parse_err)?;
            FetchedFeed {
                title: rdf
                    .channel
                    .and_then(|c| first_text(c.titles))
                    .map(|t| clean_title(&t)),
                entries: rdf.items.into_iter().map(RssItem::into_entry).collect(),
            }
        }
        Some(Dialect::Atom) => {
            let atom: AtomFeed = from_str(&xml_clean).map_err(parse_err)?;
            FetchedFeed {
                title: non_empty(atom.title.map(|t| t.value)).map(|t| clean_title(&t)),
                entries: atom.entries.into_iter().map(AtomEntry::into_entry).collect(),
            }
        }
        None => return Err(FetchError::Parse("not an RSS or Atom document".into())),
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("curator_feed_parse_ms").record(ms);
    Ok(feed)
}

/// Entities that HTML feeds use but XML does not define.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rss-curator/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;
        parse_feed(&body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_channel_with_atom_link_is_rss() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom"><channel><title>T</title><atom:link href="x" rel="self"/><item><title>A</title><link>https://a</link></item></channel></rss>"#;
        assert_eq!(detect(xml), Some(Dialect::Rss));
        let feed = parse_feed(xml).unwrap();
        assert_eq!(feed.title.as_deref(), Some("T"));
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].id, None);
    }

    #[test]
    fn non_feed_document_is_a_parse_error() {
        assert!(matches!(
            parse_feed("<html><body>nope</body></html>"),
            Err(FetchError::Parse(_))
        ));
    }
}
