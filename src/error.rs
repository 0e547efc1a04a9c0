// src/error.rs
//! Error taxonomy. Each type is recovered at a different boundary:
//! dates per entry, fetches per feed, judgments per article or per digest,
//! state load by falling back to an empty store. Only persistence and
//! configuration errors fail a run.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DateParseError {
    #[error("empty date string")]
    Empty,
    #[error("unrecognized date: {0:?}")]
    Unrecognized(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed returned HTTP {status}")]
    Status { status: u16 },
    #[error("feed parse error: {0}")]
    Parse(String),
    #[error("no feed registered for {0}")]
    Unknown(String),
}

/// Failure of a single Judgment Service call.
#[derive(Debug, Error)]
pub enum JudgmentError {
    #[error("judgment call timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("quota exceeded (HTTP 429)")]
    Quota,
    #[error("judgment service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("scripted failure: {0}")]
    Scripted(String),
}

#[derive(Debug, Error)]
#[error("classification of {article_id} failed: {source}")]
pub struct ClassificationError {
    pub article_id: String,
    #[source]
    pub source: JudgmentError,
}

#[derive(Debug, Error)]
#[error("digest for {feed_url} failed: {source}")]
pub struct AggregationError {
    pub feed_url: String,
    #[source]
    pub source: JudgmentError,
}

#[derive(Debug, Error)]
pub enum StateCorruptionError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum StatePersistError {
    #[error("encoding state: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),
    #[error("setting {key} must be a positive integer, got {value:?}")]
    NotPositive { key: &'static str, value: String },
    #[error("setting {0} is empty")]
    Empty(&'static str),
    #[error("config file {path}: {message}")]
    File { path: String, message: String },
}
