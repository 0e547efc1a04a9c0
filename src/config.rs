// src/config.rs
//! Immutable run configuration: defaults, then an optional TOML file, then
//! the process environment.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::judge::openai::DEFAULT_BASE_URL;
use crate::state::DEFAULT_STATE_FILE;

pub const ENV_CONFIG_PATH: &str = "RSS_CURATOR_CONFIG";
pub const DEFAULT_OUTPUT_DIR: &str = "processed_feeds";
pub const DEFAULT_SITE_DIR: &str = "docs";

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub openai_api_key: String,
    pub rss_feeds: Vec<String>,
    pub user_preference_criteria: String,
    pub days_lookback: u32,
    pub ai_model: String,
    pub summary_max_tokens: u32,
    pub output_dir: PathBuf,
    pub state_file: PathBuf,
    pub site_dir: PathBuf,
    pub openai_base_url: String,
    pub judgment_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub classify_max_tokens: u32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("openai_api_key", &"<redacted>")
            .field("rss_feeds", &self.rss_feeds)
            .field("user_preference_criteria", &self.user_preference_criteria)
            .field("days_lookback", &self.days_lookback)
            .field("ai_model", &self.ai_model)
            .field("summary_max_tokens", &self.summary_max_tokens)
            .field("output_dir", &self.output_dir)
            .field("state_file", &self.state_file)
            .field("site_dir", &self.site_dir)
            .field("openai_base_url", &self.openai_base_url)
            .field("judgment_timeout_secs", &self.judgment_timeout_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("classify_max_tokens", &self.classify_max_tokens)
            .finish()
    }
}

/// TOML file layout; every key optional, env wins over the file.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub openai_api_key: Option<String>,
    pub rss_feeds: Option<Vec<String>>,
    pub user_preference_criteria: Option<String>,
    pub days_lookback: Option<u32>,
    pub ai_model: Option<String>,
    pub summary_max_tokens: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub site_dir: Option<PathBuf>,
    pub openai_base_url: Option<String>,
    pub judgment_timeout_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub classify_max_tokens: Option<u32>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let file_err = |message: String| ConfigError::File {
            path: path.display().to_string(),
            message,
        };
        let text = fs::read_to_string(path).map_err(|e| file_err(e.to_string()))?;
        toml::from_str(&text).map_err(|e| file_err(e.to_string()))
    }
}

/// Splits a feed list on commas and newlines; blanks and repeats dropped.
pub fn split_feed_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split([',', '\n']) {
        let t = part.trim();
        if !t.is_empty() && !out.iter().any(|u| u == t) {
            out.push(t.to_string());
        }
    }
    out
}

struct Sources<'a, F: Fn(&str) -> Option<String>> {
    file: &'a FileConfig,
    env: F,
}

impl<'a, F: Fn(&str) -> Option<String>> Sources<'a, F> {
    fn env(&self, key: &str) -> Option<String> {
        (self.env)(key).filter(|v| !v.trim().is_empty())
    }

    fn text(&self, key: &'static str, file: &Option<String>) -> Result<String, ConfigError> {
        let v = self
            .env(key)
            .or_else(|| file.clone())
            .ok_or(ConfigError::Missing(key))?;
        let v = v.trim().to_string();
        if v.is_empty() {
            return Err(ConfigError::Empty(key));
        }
        Ok(v)
    }

    fn positive<N>(&self, key: &'static str, file: Option<N>) -> Result<Option<N>, ConfigError>
    where
        N: std::str::FromStr + PartialOrd + Default + Copy + fmt::Display,
    {
        let parsed = match self.env(key) {
            Some(raw) => match raw.trim().parse::<N>() {
                Ok(n) => Some(n),
                Err(_) => {
                    return Err(ConfigError::NotPositive {
                        key,
                        value: raw.trim().to_string(),
                    })
                }
            },
            None => file,
        };
        match parsed {
            Some(n) if n <= N::default() => Err(ConfigError::NotPositive {
                key,
                value: n.to_string(),
            }),
            other => Ok(other),
        }
    }
}

impl Config {
    /// Builds from a file layer and an environment lookup. Tests pass a map
    /// lookup instead of touching the process environment.
    pub fn from_sources<F>(file: &FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let src = Sources { file, env };

        let openai_api_key = src.text("OPENAI_API_KEY", &src.file.openai_api_key)?;
        let rss_feeds = match src.env("RSS_FEEDS") {
            Some(raw) => split_feed_list(&raw),
            None => {
                let listed = src
                    .file
                    .rss_feeds
                    .as_ref()
                    .ok_or(ConfigError::Missing("RSS_FEEDS"))?;
                // Split as one list so repeats across items collapse.
                split_feed_list(&listed.join("\n"))
            }
        };
        if rss_feeds.is_empty() {
            return Err(ConfigError::Empty("RSS_FEEDS"));
        }
        let user_preference_criteria =
            src.text("USER_PREFERENCE_CRITERIA", &src.file.user_preference_criteria)?;
        let days_lookback = src
            .positive("DAYS_LOOKBACK", src.file.days_lookback)?
            .ok_or(ConfigError::Missing("DAYS_LOOKBACK"))?;
        let ai_model = src.text("AI_MODEL", &src.file.ai_model)?;
        let summary_max_tokens = src
            .positive("SUMMARY_MAX_TOKENS", src.file.summary_max_tokens)?
            .ok_or(ConfigError::Missing("SUMMARY_MAX_TOKENS"))?;

        let output_dir = src
            .env("OUTPUT_DIR")
            .map(PathBuf::from)
            .or_else(|| src.file.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let state_file = src
            .env("STATE_FILE")
            .map(PathBuf::from)
            .or_else(|| src.file.state_file.clone())
            .unwrap_or_else(|| output_dir.join(DEFAULT_STATE_FILE));
        let site_dir = src
            .env("SITE_DIR")
            .map(PathBuf::from)
            .or_else(|| src.file.site_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SITE_DIR));
        let openai_base_url = src
            .env("OPENAI_BASE_URL")
            .or_else(|| src.file.openai_base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let judgment_timeout_secs = src
            .positive("JUDGMENT_TIMEOUT_SECS", src.file.judgment_timeout_secs)?
            .unwrap_or(30);
        let fetch_timeout_secs = src
            .positive("FETCH_TIMEOUT_SECS", src.file.fetch_timeout_secs)?
            .unwrap_or(20);
        let classify_max_tokens = src
            .positive("CLASSIFY_MAX_TOKENS", src.file.classify_max_tokens)?
            .unwrap_or(10);

        Ok(Self {
            openai_api_key,
            rss_feeds,
            user_preference_criteria,
            days_lookback,
            ai_model,
            summary_max_tokens,
            output_dir,
            state_file,
            site_dir,
            openai_base_url,
            judgment_timeout_secs,
            fetch_timeout_secs,
            classify_max_tokens,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_sources(&FileConfig::default(), |k| std::env::var(k).ok())
    }

    /// Explicit path, else `$RSS_CURATOR_CONFIG`, else environment only.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from));
        let file = match path {
            Some(p) => FileConfig::from_path(&p)?,
            None => FileConfig::default(),
        };
        Self::from_sources(&file, |k| std::env::var(k).ok())
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.output_dir.join("metrics.prom")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("OPENAI_API_KEY", "sk-test"),
        ("RSS_FEEDS", "https://a.example/rss, https://b.example/atom\nhttps://a.example/rss"),
        ("USER_PREFERENCE_CRITERIA", "Rust releases in full"),
        ("DAYS_LOOKBACK", "7"),
        ("AI_MODEL", "gpt-4o-mini"),
        ("SUMMARY_MAX_TOKENS", "150"),
    ];

    #[test]
    fn defaults_fill_optional_keys() {
        let cfg = Config::from_sources(&FileConfig::default(), lookup(BASE)).unwrap();
        assert_eq!(
            cfg.rss_feeds,
            vec!["https://a.example/rss", "https://b.example/atom"]
        );
        assert_eq!(cfg.output_dir, PathBuf::from("processed_feeds"));
        assert_eq!(
            cfg.state_file,
            PathBuf::from("processed_feeds").join("processed_state.json")
        );
        assert_eq!(cfg.judgment_timeout_secs, 30);
        assert_eq!(cfg.classify_max_tokens, 10);
        assert!(!format!("{cfg:?}").contains("sk-test"));
    }

    #[test]
    fn zero_lookback_is_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.retain(|(k, _)| *k != "DAYS_LOOKBACK");
        pairs.push(("DAYS_LOOKBACK", "0"));
        let err = Config::from_sources(&FileConfig::default(), lookup(&pairs)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotPositive {
                key: "DAYS_LOOKBACK",
                value: "0".into()
            }
        );
    }

    #[test]
    fn file_feed_list_dedups_across_items() {
        let file = FileConfig {
            rss_feeds: Some(vec![
                "https://a.example/rss".into(),
                "https://b.example/atom, https://a.example/rss".into(),
                " https://a.example/rss ".into(),
            ]),
            ..FileConfig::default()
        };
        let mut pairs = BASE.to_vec();
        pairs.retain(|(k, _)| *k != "RSS_FEEDS");
        let cfg = Config::from_sources(&file, lookup(&pairs)).unwrap();
        assert_eq!(
            cfg.rss_feeds,
            vec!["https://a.example/rss", "https://b.example/atom"]
        );
    }

    #[test]
    fn env_overrides_file() {
        let file = FileConfig {
            ai_model: Some("from-file".into()),
            site_dir: Some(PathBuf::from("public")),
            ..FileConfig::default()
        };
        let cfg = Config::from_sources(&file, lookup(BASE)).unwrap();
        assert_eq!(cfg.ai_model, "gpt-4o-mini");
        assert_eq!(cfg.site_dir, PathBuf::from("public"));
    }
}
