//! ProviderGateway trait — the abstraction over LLM backends.
//!
//! A gateway knows how to send a conversation to a chat-completion backend
//! and normalize the reply (content, resolved model, usage, latency).
//!
//! Implementations: OpenAI-compatible HTTP, native Ollama, deterministic fake.

use crate::error::ProviderError;
use crate::message::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-request options for a provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    1.0
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// Normalized token usage and timing for one provider call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A complete chat response from a provider backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    /// The generated answer text.
    pub content: String,

    /// Which model actually responded (may differ from requested).
    pub model: String,

    /// Normalized usage statistics.
    pub usage: Usage,

    /// Provider-specific raw metadata, kept opaque for the audit trail.
    pub raw: serde_json::Value,
}

/// The core provider gateway trait.
///
/// Every backend implements this; the orchestrator calls `chat_completion`
/// without knowing which backend is configured. All backends map HTTP 429 to
/// [`ProviderError::RateLimited`], auth failures to
/// [`ProviderError::AuthenticationFailed`], and missing configuration to
/// [`ProviderError::NotConfigured`].
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// A human-readable name for this backend (e.g. "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a conversation and get a normalized completion back.
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: CompletionOptions,
    ) -> std::result::Result<ChatCompletion, ProviderError>;

    /// Health check — can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = CompletionOptions::default();
        assert!((opts.temperature - 1.0).abs() < f32::EPSILON);
        assert!(opts.max_tokens.is_none());
    }

    #[test]
    fn usage_totals() {
        let usage = Usage {
            input_tokens: 200,
            output_tokens: 150,
            latency_ms: 42,
        };
        assert_eq!(usage.total_tokens(), 350);
    }

    #[test]
    fn completion_serializes() {
        let completion = ChatCompletion {
            content: "Bom trabalho!".into(),
            model: "gpt-5-mini".into(),
            usage: Usage::default(),
            raw: serde_json::json!({"fake": true}),
        };
        let json = serde_json::to_string(&completion).unwrap();
        assert!(json.contains("gpt-5-mini"));
        assert!(json.contains("fake"));
    }
}
