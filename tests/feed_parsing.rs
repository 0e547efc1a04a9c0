// tests/feed_parsing.rs
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use rss_curator::dates::DateNormalizer;
use rss_curator::error::FetchError;
use rss_curator::ingest::article_id;
use rss_curator::ingest::providers::fixture::FixtureSource;
use rss_curator::ingest::providers::http::parse_feed;
use rss_curator::ingest::types::FeedSource;
use rss_curator::judge::mock::MockJudge;
use rss_curator::{Pipeline, PipelineConfig, Store};

const RSS2: &str = include_str!("fixtures/rss2.xml");
const ATOM: &str = include_str!("fixtures/atom.xml");
const RDF: &str = include_str!("fixtures/rdf.xml");

#[test]
fn rss2_items_and_channel_title() {
    let feed = parse_feed(RSS2).unwrap();
    assert_eq!(feed.title.as_deref(), Some("Systems Blog"));
    assert_eq!(feed.entries.len(), 5);

    let first = &feed.entries[0];
    assert_eq!(first.id.as_deref(), Some("urn:blog:1"));
    assert_eq!(first.title, "Rust 1.78 released");
    assert_eq!(first.link, "https://blog.example.org/rust-1-78");
    assert!(first.summary.contains("<b>1.78</b>"));
    assert_eq!(first.raw_date.as_deref(), Some("Fri, 10 May 2024 08:00:00 GMT"));

    assert!(feed.entries[1].summary.contains("async closures is under review"));

    let cotw = &feed.entries[3];
    assert_eq!(cotw.id, None);
    assert!(cotw.summary.contains("tokio-console"));
    assert_eq!(article_id(cotw).len(), 32);

    assert_eq!(feed.entries[4].raw_date, None);
}

#[test]
fn atom_prefers_alternate_link_and_published_date() {
    let feed = parse_feed(ATOM).unwrap();
    assert_eq!(feed.title.as_deref(), Some("Kernel Digest"));
    assert_eq!(feed.entries.len(), 2);

    let uring = &feed.entries[0];
    assert_eq!(uring.id.as_deref(), Some("urn:kernel:io-uring"));
    assert_eq!(uring.title, "io_uring & you");
    assert_eq!(uring.link, "https://kernel.example.com/io-uring");
    assert_eq!(uring.raw_date.as_deref(), Some("2024-05-09T22:15:00+02:00"));
    assert_eq!(uring.summary, "A tour of the submission queue.");

    let sched = &feed.entries[1];
    assert_eq!(sched.link, "https://kernel.example.com/sched");
    assert_eq!(sched.raw_date.as_deref(), Some("2024-05-08T10:00:00Z"));
    assert_eq!(sched.summary, "<p>EEVDF in practice.</p>");
}

#[test]
fn rdf_items_are_siblings_of_the_channel() {
    let feed = parse_feed(RDF).unwrap();
    assert_eq!(feed.title.as_deref(), Some("RDF Weekly"));
    assert_eq!(feed.entries.len(), 1);
    let item = &feed.entries[0];
    assert_eq!(item.id.as_deref(), Some("https://weekly.example.net/issue-42"));
    assert_eq!(item.raw_date.as_deref(), Some("2024-05-09T10:00:00+02:00"));
    assert_eq!(
        DateNormalizer::new().parse_opt(item.raw_date.as_deref()).unwrap(),
        Utc.with_ymd_and_hms(2024, 5, 9, 8, 0, 0).unwrap()
    );
}

#[test]
fn malformed_xml_is_a_fetch_error() {
    let err = parse_feed("<rss><channel><item><title>x</item></channel>").unwrap_err();
    assert!(matches!(err, FetchError::Parse(_)));
}

#[tokio::test]
async fn fixture_source_counts_and_fails() {
    let source = FixtureSource::new();
    source.set_xml("https://a.example/rss", RSS2).unwrap();
    source.fail("https://b.example/rss", 500);

    assert!(source.fetch("https://a.example/rss").await.is_ok());
    assert!(matches!(
        source.fetch("https://b.example/rss").await,
        Err(FetchError::Status { status: 500 })
    ));
    assert!(matches!(
        source.fetch("https://c.example/rss").await,
        Err(FetchError::Unknown(_))
    ));
    assert_eq!(source.fetch_count("https://a.example/rss"), 1);
}

#[tokio::test]
async fn end_to_end_over_parsed_fixtures() {
    let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
    let blog = "https://blog.example.org/rss";
    let kernel = "https://kernel.example.com/atom.xml";
    let source = Arc::new(FixtureSource::new());
    source.set_xml(blog, RSS2).unwrap();
    source.set_xml(kernel, ATOM).unwrap();
    let judge = Arc::new(MockJudge::new());
    judge.label("Rust 1.78 released", "FULL");

    let cfg = PipelineConfig {
        feeds: vec![blog.to_string(), kernel.to_string()],
        criteria: "Rust releases in full".into(),
        model: "mock-model".into(),
        days_lookback: 7,
        summary_max_tokens: 150,
        classify_max_tokens: 10,
        judgment_timeout: Duration::from_secs(1),
    };
    let pipeline = Pipeline::new(cfg, source, judge.clone());
    let mut store = Store::empty("unused.json");
    let report = pipeline.run_at(&mut store, now).await;

    // blog: 3 in window, 1 ten days old, 1 undated; kernel: 2 in window.
    assert_eq!(report.entries_seen, 7);
    assert_eq!(report.classified(), 5);
    assert_eq!(report.classified_processed, 1);
    assert_eq!(report.out_of_window, 1);
    assert_eq!(report.undated, 1);
    assert_eq!(report.digests_generated, 2);
    assert_eq!(judge.summarize_calls(), 2);
    assert_eq!(store.feed_title(kernel), Some("Kernel Digest"));
    assert_eq!(store.articles(blog).len(), 3);
}
