//! Scripted provider for end-to-end pipeline tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tutoria_core::error::ProviderError;
use tutoria_core::message::ChatMessage;
use tutoria_core::provider::{ChatCompletion, CompletionOptions, ProviderGateway, Usage};

/// Returns queued replies in order; an exhausted script fails the call.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderGateway for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat_completion(
        &self,
        _messages: &[ChatMessage],
        model: &str,
        _options: CompletionOptions,
    ) -> Result<ChatCompletion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .replies
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(Err(ProviderError::Network("guião esgotado".to_string())));
        next.map(|content| ChatCompletion {
            content,
            model: model.to_string(),
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
                latency_ms: 5,
            },
            raw: json!({"scripted": true}),
        })
    }
}
