// src/judge/mock.rs
//! Deterministic Judgment Service for tests and dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::JudgmentService;
use crate::error::JudgmentError;

#[derive(Debug, Clone)]
enum Reply {
    Label(String),
    Fail(String),
    Hang,
}

/// Answers `classify` by article title (read from the `Title:` line of the
/// prompt); unscripted titles get `SUMMARY`. `summarize` echoes a list of
/// the batch unless a fixed reply or a failure is scripted.
#[derive(Default)]
pub struct MockJudge {
    by_title: Mutex<HashMap<String, Reply>>,
    summary: Mutex<Option<Result<String, String>>>,
    classify_calls: AtomicUsize,
    summarize_calls: AtomicUsize,
    last_summary_budget: AtomicUsize,
}

impl MockJudge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&self, title: &str, label: &str) -> &Self {
        self.script(title, Reply::Label(label.to_string()))
    }

    pub fn fail(&self, title: &str, message: &str) -> &Self {
        self.script(title, Reply::Fail(message.to_string()))
    }

    /// The call never completes; only a caller-side timeout ends it.
    pub fn hang(&self, title: &str) -> &Self {
        self.script(title, Reply::Hang)
    }

    /// Removes any scripted reply for `title`.
    pub fn clear(&self, title: &str) -> &Self {
        self.by_title.lock().unwrap().remove(title);
        self
    }

    pub fn summary_reply(&self, text: &str) {
        *self.summary.lock().unwrap() = Some(Ok(text.to_string()));
    }

    pub fn summary_failure(&self, message: &str) {
        *self.summary.lock().unwrap() = Some(Err(message.to_string()));
    }

    pub fn clear_summary(&self) {
        *self.summary.lock().unwrap() = None;
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    pub fn summarize_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }

    pub fn last_summary_budget(&self) -> usize {
        self.last_summary_budget.load(Ordering::SeqCst)
    }

    fn script(&self, title: &str, reply: Reply) -> &Self {
        self.by_title
            .lock()
            .unwrap()
            .insert(title.to_string(), reply);
        self
    }
}

fn title_of(content: &str) -> &str {
    content
        .lines()
        .next()
        .and_then(|l| l.strip_prefix("Title: "))
        .unwrap_or_default()
}

#[async_trait]
impl JudgmentService for MockJudge {
    async fn classify(
        &self,
        content: &str,
        _criteria: &str,
        _model: &str,
        _max_tokens: u32,
    ) -> Result<String, JudgmentError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.by_title.lock().unwrap().get(title_of(content)).cloned();
        match reply {
            Some(Reply::Label(l)) => Ok(l),
            Some(Reply::Fail(m)) => Err(JudgmentError::Scripted(m)),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Err(JudgmentError::Scripted("hang elapsed".into()))
            }
            None => Ok("SUMMARY".into()),
        }
    }

    async fn summarize(
        &self,
        batch_content: &str,
        max_tokens: u32,
    ) -> Result<String, JudgmentError> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        self.last_summary_budget
            .store(max_tokens as usize, Ordering::SeqCst);
        let scripted = self.summary.lock().unwrap().clone();
        match scripted {
            Some(Ok(text)) => Ok(text),
            Some(Err(m)) => Err(JudgmentError::Scripted(m)),
            None => {
                let items: String = batch_content
                    .lines()
                    .filter_map(|l| l.split_once(": ").filter(|(k, _)| k.starts_with("Article ")))
                    .map(|(_, title)| format!("<li>{title}</li>"))
                    .collect();
                Ok(format!("<h3>Mock Digest Summary</h3><ul>{items}</ul>"))
            }
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::classify_content;

    #[tokio::test]
    async fn scripted_by_title() {
        let judge = MockJudge::new();
        judge.label("A", "FULL").fail("C", "boom");
        let a = classify_content("A", "x", "https://e.org/feed");
        let b = classify_content("B", "x", "https://e.org/feed");
        let c = classify_content("C", "x", "https://e.org/feed");
        assert_eq!(judge.classify(&a, "", "m", 10).await.unwrap(), "FULL");
        assert_eq!(judge.classify(&b, "", "m", 10).await.unwrap(), "SUMMARY");
        assert!(judge.classify(&c, "", "m", 10).await.is_err());
        assert_eq!(judge.classify_calls(), 3);
    }
}
