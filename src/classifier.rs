//! Classification: chat-backend strategy with heuristic fallback.
//!
//! The backend is an explicit dependency chosen at construction. With no
//! backend configured the heuristic strategy is the only one — a first-class
//! mode, not an exception path. Backend failures of any kind (transport,
//! timeout, unparseable output) degrade to the heuristic; nothing is raised
//! to the caller.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ClassifierConfig;
use crate::heuristics;
use crate::models::{ClassificationResult, IngestionEnvelope};
use crate::normalize::normalize;
use crate::prompts::build_prompt;

pub struct Classifier {
    backend: Option<ChatBackend>,
}

impl Classifier {
    /// Build from config. Fails only on configuration errors; a `disabled`
    /// provider yields a heuristic-only classifier.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        if !config.is_enabled() {
            return Ok(Self { backend: None });
        }
        Ok(Self {
            backend: Some(ChatBackend::new(config)?),
        })
    }

    /// Heuristic-only classifier, independent of any configuration.
    pub fn heuristic_only() -> Self {
        Self { backend: None }
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Classify an envelope. Always returns a normalized result.
    pub async fn classify(&self, envelope: &IngestionEnvelope) -> ClassificationResult {
        if let Some(backend) = &self.backend {
            let prompt = build_prompt(envelope);
            match backend.complete(prompt.system, &prompt.user).await {
                Ok(body) => match extract_json(&body) {
                    Some(raw) => return normalize(&raw),
                    None => {
                        warn!(
                            source_id = %envelope.source_id,
                            "backend returned unparseable output, falling back to heuristics"
                        );
                    }
                },
                Err(e) => {
                    warn!(
                        source_id = %envelope.source_id,
                        error = %e,
                        "backend request failed, falling back to heuristics"
                    );
                }
            }
        } else {
            debug!("no backend configured, using heuristics");
        }

        heuristics::classify(&envelope.text, envelope.metadata.sender_role)
    }
}

/// OpenAI-compatible chat completions client (OpenAI, Ollama, and friends).
struct ChatBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl ChatBackend {
    fn new(config: &ClassifierConfig) -> Result<Self> {
        let Some(model) = config.model.clone() else {
            bail!("classifier.model required when provider is enabled");
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            temperature: config.temperature,
            // Optional: local OpenAI-compatible servers accept keyless requests
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
        })
    }

    /// One bounded-timeout request, no retries — the failure mode is the
    /// heuristic fallback, not an error.
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("chat backend error {}: {}", status, body);
        }

        let json: Value = response.json().await?;
        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("chat backend response missing message content"))?;

        Ok(content.to_string())
    }
}

/// Locate a JSON payload in free-form model output.
///
/// Attempted in order, first success wins: (1) the whole body; (2) the span
/// from the first opening bracket to the last matching closing bracket;
/// (3) give up.
pub fn extract_json(body: &str) -> Option<Value> {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let open = trimmed.find(['{', '['])?;
    let close_char = if trimmed.as_bytes()[open] == b'{' {
        '}'
    } else {
        ']'
    };
    let close = trimmed.rfind(close_char)?;
    if close <= open {
        return None;
    }

    serde_json::from_str::<Value>(&trimmed[open..=close]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_whole_body() {
        let v = extract_json(r#"{"category": "deadline"}"#).unwrap();
        assert_eq!(v["category"], "deadline");
    }

    #[test]
    fn test_extract_fenced_snippet() {
        let body = "Here is the result:\n```json\n{\"category\": \"link\", \"importance_score\": 5}\n```\nHope this helps!";
        let v = extract_json(body).unwrap();
        assert_eq!(v["category"], "link");
    }

    #[test]
    fn test_extract_array() {
        let v = extract_json("prefix [1, 2, 3] suffix").unwrap();
        assert_eq!(v[2], 3);
    }

    #[test]
    fn test_extract_nested_object_uses_last_bracket() {
        let body = "result: {\"a\": {\"b\": 1}} done";
        let v = extract_json(body).unwrap();
        assert_eq!(v["a"]["b"], 1);
    }

    #[test]
    fn test_extract_failure() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("broken { \"a\": ").is_none());
        assert!(extract_json("").is_none());
    }

    #[tokio::test]
    async fn test_heuristic_only_mode() {
        let classifier = Classifier::heuristic_only();
        assert!(!classifier.has_backend());

        let envelope = IngestionEnvelope {
            text: "Сдать отчёт до 20.05.2024".to_string(),
            source_type: crate::models::SourceType::Telegram,
            source_id: "1".to_string(),
            metadata: Default::default(),
        };
        let result = classifier.classify(&envelope).await;
        assert_eq!(result.category, crate::models::Category::Deadline);
    }
}
