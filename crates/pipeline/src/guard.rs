//! Response guard: post-generation safety check.
//!
//! A cheap-tier provider call judges the draft answer against the school's
//! pedagogical policy and replies in JSON. In fake mode there is no judge to
//! call, so everything is allowed with a marker rationale.

use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;
use tutoria_core::error::Result;
use tutoria_core::message::ChatMessage;
use tutoria_core::persona::Persona;
use tutoria_core::provider::{CompletionOptions, ProviderGateway};

const SYSTEM_PROMPT: &str = "És um guardião de segurança pedagógica. Analisa a resposta proposta e indica se \
     cumpre princípios MEM (respeito, cooperação, estímulo à autonomia) e políticas escolares. \
     Responde em JSON com campos allow (bool) e rationale (string curta).";

/// Max rationale length kept from an unparsable guard reply.
const RATIONALE_LIMIT: usize = 200;

/// The guard's verdict on one draft answer.
#[derive(Debug, Clone)]
pub struct GuardVerdict {
    pub allow: bool,
    pub rationale: String,
    /// Full decision payload persisted with the response log.
    pub decision: Value,
}

/// Safety judge for draft answers.
pub struct ResponseGuard {
    provider: Arc<dyn ProviderGateway>,
    model: String,
    /// Strict mode treats an unparsable judge reply as a rejection.
    strict: bool,
    fake_mode: bool,
}

impl ResponseGuard {
    pub fn new(
        provider: Arc<dyn ProviderGateway>,
        model: impl Into<String>,
        strict: bool,
        fake_mode: bool,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            strict,
            fake_mode,
        }
    }

    pub async fn check(
        &self,
        candidate: &str,
        persona: Persona,
        intent_label: &str,
    ) -> Result<GuardVerdict> {
        if self.fake_mode {
            return Ok(GuardVerdict {
                allow: true,
                rationale: "fake-mode".to_string(),
                decision: json!({
                    "allow": true,
                    "rationale": "fake-mode",
                    "model": self.model,
                }),
            });
        }

        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Persona: {persona}. Intenção: {intent_label}. Resposta proposta: {candidate}"
            )),
        ];
        let completion = self
            .provider
            .chat_completion(&messages, &self.model, CompletionOptions::default())
            .await?;

        let content = completion.content.trim();
        match serde_json::from_str::<Value>(strip_code_fences(content)) {
            Ok(mut decision) if decision.is_object() => {
                let allow = decision["allow"].as_bool().unwrap_or(false);
                let rationale = decision["rationale"].as_str().unwrap_or("").to_string();
                if let Some(object) = decision.as_object_mut()
                    && !object.contains_key("model")
                {
                    object.insert("model".to_string(), json!(completion.model));
                }
                Ok(GuardVerdict {
                    allow,
                    rationale,
                    decision,
                })
            }
            _ => {
                warn!(model = %completion.model, strict = self.strict, "guard reply was not JSON");
                let allow = !self.strict;
                let rationale: String = content.chars().take(RATIONALE_LIMIT).collect();
                Ok(GuardVerdict {
                    allow,
                    rationale: rationale.clone(),
                    decision: json!({
                        "allow": allow,
                        "rationale": rationale,
                        "model": completion.model,
                        "malformed": true,
                    }),
                })
            }
        }
    }
}

/// Tolerate judges that wrap the JSON in a Markdown code fence.
fn strip_code_fences(content: &str) -> &str {
    let content = content.trim();
    let Some(inner) = content.strip_prefix("```") else {
        return content;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim_start().strip_suffix("```").unwrap_or(inner).trim()
}
