//! The external generative-summarization backend. Exactly one blocking
//! network call per report run, so it carries the only timeout/retry policy
//! in the synthesizer.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::config::SummarizerConfig;

/// One retry on top of the first attempt.
const MAX_ATTEMPTS: usize = 2;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Sends the prompt and returns the raw response text.
    async fn summarize(&self, prompt: &str) -> Result<String>;
}

/// Talks to an OpenAI-compatible chat-completions endpoint.
pub struct HttpSummarizer {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("AI_API_KEY is not set, cannot call the summarization service")?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            client,
        })
    }

    async fn send(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.2
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!(
                "summarization call failed with status {}",
                response.status()
            );
        }

        let json: Value = response.json().await?;
        extract_chat_text(&json).context("summarization response missing text content")
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String> {
        let mut last_error = anyhow!("summarization was never attempted");
        for attempt in 1..=MAX_ATTEMPTS {
            match self.send(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("Summarization attempt {attempt} failed {e:?}");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

fn extract_chat_text(json: &Value) -> Option<String> {
    let choices = json.get("choices").and_then(Value::as_array)?;
    let first = choices.first()?;
    let content = first.get("message")?.get("content")?;
    match content {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => {
            let mut chunks = Vec::new();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    chunks.push(text.to_string());
                }
            }
            if chunks.is_empty() {
                None
            } else {
                Some(chunks.join("\n"))
            }
        }
        _ => None,
    }
}
