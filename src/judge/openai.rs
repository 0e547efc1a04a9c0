// src/judge/openai.rs
//! Live Judgment Service backed by the Chat Completions API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{classify_system_prompt, JudgmentService, SUMMARIZE_SYSTEM_PROMPT};
use crate::error::JudgmentError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiJudge {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Model used for digests; classification receives its model per call.
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
}

impl OpenAiJudge {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, JudgmentError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("rss-curator/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        })
    }

    async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, JudgmentError> {
        let req = Req {
            model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JudgmentError::Timeout {
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    JudgmentError::Transport(e)
                }
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(JudgmentError::Quota);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(JudgmentError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| JudgmentError::Malformed(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| JudgmentError::Malformed("response has no choices".into()))
    }
}

#[async_trait]
impl JudgmentService for OpenAiJudge {
    async fn classify(
        &self,
        content: &str,
        criteria: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<String, JudgmentError> {
        let system = classify_system_prompt(criteria);
        self.complete(model, &system, content, max_tokens).await
    }

    async fn summarize(
        &self,
        batch_content: &str,
        max_tokens: u32,
    ) -> Result<String, JudgmentError> {
        self.complete(&self.model, SUMMARIZE_SYSTEM_PROMPT, batch_content, max_tokens)
            .await
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
