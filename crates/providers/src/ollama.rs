//! Native Ollama provider implementation.
//!
//! Talks to the `/api/chat` endpoint of a local Ollama server. Needs no API
//! key. Usage comes from `prompt_eval_count`/`eval_count`; latency from
//! `total_duration` (nanoseconds).

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, warn};
use tutoria_core::error::ProviderError;
use tutoria_core::message::{ChatMessage, Role};
use tutoria_core::provider::{ChatCompletion, CompletionOptions, ProviderGateway, Usage};

/// A local Ollama chat backend.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn to_api_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ProviderGateway for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: CompletionOptions,
    ) -> Result<ChatCompletion, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);

        let body = serde_json::json!({
            "model": model,
            "messages": Self::to_api_messages(messages),
            "stream": false,
            "options": { "temperature": options.temperature },
        });

        debug!(model, url = %url, "Sending Ollama chat request");
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(format!(
                        "Não foi possível contactar o Ollama local: {e}"
                    ))
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Ollama returned error");
            return Err(ProviderError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let raw: serde_json::Value =
            response.json().await.map_err(|e| ProviderError::Api {
                status_code: 200,
                message: format!("Failed to parse Ollama response: {e}"),
            })?;
        let measured_ms = started.elapsed().as_millis() as u64;

        let parsed: OllamaResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::Api {
                status_code: 200,
                message: format!("Unexpected Ollama response shape: {e}"),
            })?;

        // Prefer the server-reported duration; fall back to our own clock.
        let latency_ms = if parsed.total_duration > 0 {
            parsed.total_duration / 1_000_000
        } else {
            measured_ms
        };

        let content = parsed
            .message
            .and_then(|m| m.content)
            .or(parsed.response)
            .unwrap_or_default();

        Ok(ChatCompletion {
            content,
            model: parsed.model.unwrap_or_else(|| model.to_string()),
            usage: Usage {
                input_tokens: parsed.prompt_eval_count,
                output_tokens: parsed.eval_count,
                latency_ms,
            },
            raw,
        })
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

// --- Wire types (internal) ---

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<OllamaMessage>,
    /// Legacy generate endpoint field, kept as a fallback.
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    /// Nanoseconds.
    #[serde(default)]
    total_duration: u64,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: Option<String>,
}
