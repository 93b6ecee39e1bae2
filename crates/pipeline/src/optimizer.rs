//! Prompt optimization pre-pass.
//!
//! One cheap-tier provider call rewrites the raw query, classifies the
//! pedagogical intent, and may suggest a model tier. The reply is parsed by
//! prefix scanning; anything unparsable degrades to defaults instead of
//! failing the turn.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use tutoria_core::error::Result;
use tutoria_core::message::ChatMessage;
use tutoria_core::persona::{Persona, intent};
use tutoria_core::provider::{CompletionOptions, ProviderGateway};

const SYSTEM_PROMPT: &str = "Atua como assistente pedagógico MEM. Analisa o pedido do utilizador, \
     sugere melhorias ao prompt para foco educativo, classifica a intenção pedagógica \
     e recomenda modelo (nano, mini, normal) considerando profundidade necessária. \
     Responde em linhas com os prefixos intent:, model: e prompt:.";

/// What the optimizer concluded about a raw query.
#[derive(Debug, Clone)]
pub struct OptimizerResult {
    pub optimized_prompt: String,
    pub intent: String,
    pub suggested_model: Option<String>,
    /// Raw provider payload plus the model that produced it, kept for audit.
    pub trace: Value,
}

/// Rewrites and classifies the raw query with one cheap provider call.
pub struct PromptOptimizer {
    provider: Arc<dyn ProviderGateway>,
    model: String,
}

impl PromptOptimizer {
    pub fn new(provider: Arc<dyn ProviderGateway>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub async fn optimize(
        &self,
        raw_query: &str,
        persona: Persona,
        context: &Value,
    ) -> Result<OptimizerResult> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Persona: {persona}. Contexto: {context}. Pedido original: {raw_query}"
            )),
        ];
        let completion = self
            .provider
            .chat_completion(&messages, &self.model, CompletionOptions::default())
            .await?;

        let parsed = parse_reply(&completion.content);
        debug!(
            intent = %parsed.intent,
            suggested = parsed.suggested_model.as_deref().unwrap_or("-"),
            "optimizer reply parsed"
        );

        let mut trace = completion.raw;
        if let Some(object) = trace.as_object_mut() {
            object.insert("model".to_string(), Value::String(completion.model));
        }
        Ok(OptimizerResult {
            optimized_prompt: parsed.optimized_prompt,
            intent: parsed.intent,
            suggested_model: parsed.suggested_model,
            trace,
        })
    }
}

struct ParsedReply {
    optimized_prompt: String,
    intent: String,
    suggested_model: Option<String>,
}

/// Prefix-scan the optimizer reply.
///
/// Case-insensitive `intent:` / `model:` / `prompt:` lines win; `optimized
/// prompt:` is accepted as a synonym. With no parsable lines the whole reply
/// becomes the prompt and the intent stays `general`.
fn parse_reply(content: &str) -> ParsedReply {
    let mut parsed = ParsedReply {
        optimized_prompt: content.to_string(),
        intent: intent::GENERAL.to_string(),
        suggested_model: None,
    };
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let lower = line.to_lowercase();
        if let Some(rest) = strip_labeled(line, &lower, "intent:") {
            if !rest.is_empty() {
                parsed.intent = rest.to_string();
            }
        } else if let Some(rest) = strip_labeled(line, &lower, "optimized prompt:")
            .or_else(|| strip_labeled(line, &lower, "prompt:"))
        {
            if !rest.is_empty() {
                parsed.optimized_prompt = rest.to_string();
            }
        } else if let Some(rest) = strip_labeled(line, &lower, "model:")
            && !rest.is_empty()
        {
            parsed.suggested_model = Some(rest.to_string());
        }
    }
    parsed
}

fn strip_labeled<'a>(line: &'a str, lower: &str, label: &str) -> Option<&'a str> {
    lower
        .starts_with(label)
        .then(|| line[label.len()..].trim())
}
