// src/ingest/mod.rs
pub mod providers;
pub mod types;

use sha2::{Digest, Sha256};

use crate::ingest::types::RawEntry;

/// Longest summary kept in the state file.
pub const SUMMARY_STORE_CAP: usize = 4_000;
/// Longest plain-text excerpt sent to the judgment service.
pub const PROMPT_TEXT_CAP: usize = 1_500;

fn re_tags() -> &'static regex::Regex {
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap())
}

fn re_ws() -> &'static regex::Regex {
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap())
}

fn take_chars(s: &str, cap: usize) -> String {
    if s.chars().count() > cap {
        s.chars().take(cap).collect()
    } else {
        s.to_string()
    }
}

/// Plain text: entity decode, strip tags, ASCII quotes, collapse whitespace, cap length.
pub fn normalize_text(s: &str, cap: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    out = re_tags().replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    out = re_ws().replace_all(&out, " ").trim().to_string();

    take_chars(&out, cap)
}

/// Titles: decoded and single-line, punctuation untouched.
pub fn clean_title(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = re_tags().replace_all(&decoded, "");
    re_ws().replace_all(&stripped, " ").trim().to_string()
}

/// Summaries keep their markup for rendering; only trimmed and capped.
pub fn clean_summary(s: &str) -> String {
    take_chars(s.trim(), SUMMARY_STORE_CAP)
}

/// Stable article identity: the source's own id when present, else a hash
/// of title and link so the same logical article maps to the same id.
pub fn article_id(entry: &RawEntry) -> String {
    if let Some(id) = entry.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return id.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(clean_title(&entry.title).as_bytes());
    hasher.update(b"\n");
    hasher.update(entry.link.trim().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_markup_and_caps() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b></p>  ";
        assert_eq!(normalize_text(s, 100), "Hello, world");
        assert_eq!(normalize_text("abcdef", 3), "abc");
    }

    #[test]
    fn source_id_wins_over_hash() {
        let e = RawEntry {
            id: Some("  urn:x:1 ".into()),
            title: "T".into(),
            link: "https://a".into(),
            ..RawEntry::default()
        };
        assert_eq!(article_id(&e), "urn:x:1");
    }

    #[test]
    fn fallback_id_ignores_whitespace_noise() {
        let a = RawEntry {
            title: "Rust  1.80 released".into(),
            link: "https://blog.example/rust".into(),
            ..RawEntry::default()
        };
        let b = RawEntry {
            id: Some("   ".into()),
            title: " Rust 1.80 released\n".into(),
            link: "https://blog.example/rust ".into(),
            ..RawEntry::default()
        };
        assert_eq!(article_id(&a), article_id(&b));
        assert_eq!(article_id(&a).len(), 32);
    }
}
