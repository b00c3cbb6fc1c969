//! Chat completion provider abstraction and OpenAI-compatible client.
//!
//! The [`Completion`] trait mirrors [`Embedder`](crate::embedding::Embedder):
//! one injected handle per deployment, substitutable in tests. The
//! concrete client speaks the OpenAI `/chat/completions` wire format,
//! which also covers compatible vendors (DeepSeek, local servers) via
//! `completion.base_url`.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::error::PipelineError;

/// One message in a completion prompt.
///
/// Unlike the persisted [`Message`](crate::models::Message), prompt
/// messages may carry the `system` role used for instructions and
/// context injection.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        PromptMessage {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn new(role: &str, content: impl Into<String>) -> Self {
        PromptMessage {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Generates an answer from an ordered message list.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, PipelineError>;
}

/// Completion client for OpenAI-compatible chat APIs.
pub struct OpenAiCompletion {
    model: String,
    temperature: f32,
    base_url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiCompletion {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// `Configuration` when `OPENAI_API_KEY` is not set.
    pub fn new(config: &CompletionConfig) -> Result<Self, PipelineError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            PipelineError::Configuration("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Completion for OpenAiCompletion {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, PipelineError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| PipelineError::Completion(e.to_string()))?;
                        return parse_completion_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(PipelineError::Completion(format!(
                            "completion API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client errors (auth, content filter) are not retried
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::Completion(format!(
                        "completion API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(PipelineError::Completion(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| PipelineError::Completion("completion failed after retries".into())))
    }
}

/// Parse `choices[0].message.content` from the chat completions response.
fn parse_completion_response(json: &serde_json::Value) -> Result<String, PipelineError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.pointer("/message/content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            PipelineError::Completion(
                "invalid completion response: missing choices[0].message.content".into(),
            )
        })
}
