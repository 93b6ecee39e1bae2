//! Deterministic fake provider for offline and test execution.
//!
//! Echoes a truncated version of the last message instead of calling a
//! network service, with fixed usage numbers. Keeps a call counter so tests
//! can assert how many live calls a turn would have made.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tutoria_core::error::ProviderError;
use tutoria_core::message::ChatMessage;
use tutoria_core::provider::{ChatCompletion, CompletionOptions, ProviderGateway, Usage};

/// Maximum number of prompt characters echoed back.
const ECHO_LIMIT: usize = 200;

/// A provider that never touches the network.
pub struct FakeProvider {
    calls: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handle to the shared call counter.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Number of completions served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn echo(messages: &[ChatMessage]) -> String {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let truncated: String = last.chars().take(ECHO_LIMIT).collect();
        format!(
            "[Resposta simulada] Ainda não estamos ligados ao serviço real de IA. \
             Resumo do pedido: {truncated}"
        )
    }
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderGateway for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        model: &str,
        _options: CompletionOptions,
    ) -> Result<ChatCompletion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChatCompletion {
            content: Self::echo(messages),
            model: model.to_string(),
            usage: Usage {
                input_tokens: 200,
                output_tokens: 200,
                latency_ms: 0,
            },
            raw: serde_json::json!({"fake": true}),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_truncated_prompt() {
        let provider = FakeProvider::new();
        let long_prompt = "a".repeat(500);
        let completion = provider
            .chat_completion(
                &[ChatMessage::user(long_prompt)],
                "gpt-5-mini",
                CompletionOptions::default(),
            )
            .await
            .unwrap();

        assert!(completion.content.starts_with("[Resposta simulada]"));
        assert!(completion.content.len() < 400);
        assert_eq!(completion.model, "gpt-5-mini");
        assert_eq!(completion.usage.total_tokens(), 400);
    }

    #[tokio::test]
    async fn counts_calls() {
        let provider = FakeProvider::new();
        assert_eq!(provider.call_count(), 0);
        for _ in 0..3 {
            provider
                .chat_completion(
                    &[ChatMessage::user("olá")],
                    "gpt-5-nano",
                    CompletionOptions::default(),
                )
                .await
                .unwrap();
        }
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn empty_conversation_still_replies() {
        let provider = FakeProvider::new();
        let completion = provider
            .chat_completion(&[], "gpt-5-nano", CompletionOptions::default())
            .await
            .unwrap();
        assert!(completion.content.contains("Resumo do pedido:"));
    }
}
