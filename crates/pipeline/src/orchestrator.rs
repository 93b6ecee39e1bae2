//! The turn state machine.
//!
//! Order of stages for one turn: session, context, optimizer, router, cache
//! probe, quota gate, audit row, provider call, guard, persistence, usage
//! registration, cache fill. A cache hit completes the turn right after the
//! probe — no quota is consumed and the provider is never called for the
//! main answer.

use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tutoria_config::AppConfig;
use tutoria_context::{ClassRef, ContextBroker, ContextRequest, SchoolDirectory};
use tutoria_core::audit::{
    AuditStore, CompletionStats, NewSession, RequestDraft, ResponseDraft, Session,
};
use tutoria_core::error::{PipelineError, Result};
use tutoria_core::message::ChatMessage;
use tutoria_core::persona::Persona;
use tutoria_core::provider::{CompletionOptions, ProviderGateway, Usage};
use tutoria_core::user::UserRef;

use crate::cache::{CachedResponse, InMemoryCache, ResponseCache, cache_key};
use crate::guard::ResponseGuard;
use crate::optimizer::{OptimizerResult, PromptOptimizer};
use crate::prompt::PromptBuilder;
use crate::quota::QuotaManager;
use crate::router::ModelRouter;

/// Token budget a turn is charged against before the provider call.
const PROJECTED_TOKENS: u32 = 600;
/// How many history entries ride along as conversation messages.
const HISTORY_WINDOW: usize = 6;

/// One turn as received from the API surface.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user: UserRef,
    pub persona: Persona,
    pub origin_app: String,
    pub raw_query: String,
    pub class: Option<ClassRef>,
    /// Resume this session; a fresh one is created when absent or not owned
    /// by the caller.
    pub session_id: Option<Uuid>,
    /// Free-form caller extras ("history", "context_descriptor", ...).
    pub extras: Map<String, Value>,
    pub use_cache: bool,
}

/// What a successful turn hands back.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response_text: String,
    pub model_used: String,
    pub session_id: Uuid,
    pub request_id: i64,
    pub intent: String,
    pub cached: bool,
    pub usage: Option<Usage>,
}

/// Wires the pipeline stages together and runs turns.
pub struct Orchestrator {
    provider: Arc<dyn ProviderGateway>,
    store: Arc<dyn AuditStore>,
    broker: ContextBroker,
    cache: Arc<dyn ResponseCache>,
    router: ModelRouter,
    optimizer: PromptOptimizer,
    guard: ResponseGuard,
    quotas: QuotaManager,
    prompts: PromptBuilder,
}

impl Orchestrator {
    /// Assemble the full pipeline from configuration.
    pub fn new(
        config: &AppConfig,
        provider: Arc<dyn ProviderGateway>,
        store: Arc<dyn AuditStore>,
        directory: Arc<dyn SchoolDirectory>,
    ) -> Self {
        let cache: Arc<dyn ResponseCache> = Arc::new(InMemoryCache::new(
            std::time::Duration::from_secs(config.limits.cache_ttl_secs),
        ));
        Self::with_cache(config, provider, store, directory, cache)
    }

    /// Assemble the pipeline with a caller-supplied cache backend.
    pub fn with_cache(
        config: &AppConfig,
        provider: Arc<dyn ProviderGateway>,
        store: Arc<dyn AuditStore>,
        directory: Arc<dyn SchoolDirectory>,
        cache: Arc<dyn ResponseCache>,
    ) -> Self {
        let open_model_pool = config.provider.name == "ollama";
        Self {
            broker: ContextBroker::new(directory),
            router: ModelRouter::new(config.models.clone(), open_model_pool),
            optimizer: PromptOptimizer::new(
                Arc::clone(&provider),
                config.models.optimizer_model.clone(),
            ),
            guard: ResponseGuard::new(
                Arc::clone(&provider),
                config.models.guard_model.clone(),
                config.guard.strict,
                config.provider.fake_mode,
            ),
            quotas: QuotaManager::new(Arc::clone(&store), config.limits.clone()),
            prompts: PromptBuilder::new(config.pedagogy.clone()),
            cache,
            provider,
            store,
        }
    }

    /// Run one full turn.
    pub async fn handle_turn(&self, turn: TurnRequest) -> Result<TurnOutcome> {
        if turn.raw_query.trim().is_empty() {
            return Err(PipelineError::MissingInput);
        }

        let session = self.resolve_session(&turn).await?;
        let context = self
            .broker
            .build_context(&ContextRequest {
                user: &turn.user,
                persona: turn.persona,
                class: turn.class.as_ref(),
                origin_app: Some(turn.origin_app.as_str()),
                extras: turn.extras.clone(),
                raw_query: &turn.raw_query,
            })
            .await;

        let optimization = self
            .optimizer
            .optimize(&turn.raw_query, turn.persona, &context.payload)
            .await?;
        let selected_model = self.router.select_model(
            turn.persona,
            &optimization.intent,
            optimization.suggested_model.as_deref(),
        );
        info!(
            intent = %optimization.intent,
            suggested = optimization.suggested_model.as_deref().unwrap_or("-"),
            selected = %selected_model,
            persona = %turn.persona,
            "model routed"
        );

        let key = cache_key(
            turn.persona,
            &optimization.intent,
            &optimization.optimized_prompt,
            &context.payload,
        );
        if turn.use_cache
            && let Some(hit) = self.cache.get(&key).await
        {
            return self
                .complete_from_cache(&turn, &session, &optimization, &context.payload, &selected_model, hit)
                .await;
        }

        let projected_cost = self.router.estimate_cost(&selected_model, PROJECTED_TOKENS);
        let quota = self
            .quotas
            .ensure_within_limits(
                turn.user.id,
                turn.persona,
                turn.class.as_ref().map(|c| c.id),
                projected_cost,
            )
            .await?;

        let request_id = self
            .store
            .create_request(self.request_draft(&turn, &session, &optimization, &context.payload))
            .await?;

        let messages = self.build_messages(&turn, &optimization, &context.payload);
        let completion = match self
            .provider
            .chat_completion(&messages, &selected_model, CompletionOptions::default())
            .await
        {
            Ok(completion) => completion,
            Err(err) => {
                self.store.mark_request_errored(request_id).await?;
                return Err(err.into());
            }
        };

        let verdict = match self
            .guard
            .check(&completion.content, turn.persona, &optimization.intent)
            .await
        {
            Ok(verdict) => verdict,
            Err(err) => {
                self.store.mark_request_errored(request_id).await?;
                return Err(err);
            }
        };
        if !verdict.allow {
            warn!(request_id, rationale = %verdict.rationale, "guard rejected the answer");
            self.store.mark_request_errored(request_id).await?;
            let rationale = if verdict.rationale.is_empty() {
                "Resposta bloqueada.".to_string()
            } else {
                verdict.rationale
            };
            return Err(PipelineError::UnsafeContent(rationale));
        }

        let cost = self
            .router
            .estimate_cost(&selected_model, completion.usage.total_tokens());
        self.store
            .mark_request_completed(
                request_id,
                CompletionStats {
                    resolved_model: completion.model.clone(),
                    input_tokens: completion.usage.input_tokens,
                    output_tokens: completion.usage.output_tokens,
                    cost,
                    latency_ms: completion.usage.latency_ms,
                },
            )
            .await?;
        self.store
            .create_response_log(ResponseDraft {
                request_id,
                response_text: completion.content.clone(),
                model_metadata: completion.raw.clone(),
                guardrail_decision: verdict.decision.clone(),
                cache_hit: false,
            })
            .await?;
        self.quotas.register_usage(&quota, cost).await?;

        if turn.use_cache {
            self.cache
                .set(
                    key,
                    CachedResponse {
                        response_text: completion.content.clone(),
                        guardrail_decision: verdict.decision,
                    },
                )
                .await;
        }
        self.store.touch_session(session.session_id).await?;

        Ok(TurnOutcome {
            response_text: completion.content,
            model_used: completion.model,
            session_id: session.session_id,
            request_id,
            intent: optimization.intent,
            cached: false,
            usage: Some(completion.usage),
        })
    }

    /// Serve a turn from the cache: audit row and response log still happen,
    /// but quota and provider are skipped and nothing is charged.
    async fn complete_from_cache(
        &self,
        turn: &TurnRequest,
        session: &Session,
        optimization: &OptimizerResult,
        context: &Value,
        selected_model: &str,
        hit: CachedResponse,
    ) -> Result<TurnOutcome> {
        debug!(session_id = %session.session_id, "cache hit");
        let request_id = self
            .store
            .create_request(self.request_draft(turn, session, optimization, context))
            .await?;
        self.store
            .mark_request_completed(request_id, CompletionStats::cached(selected_model))
            .await?;
        self.store
            .create_response_log(ResponseDraft {
                request_id,
                response_text: hit.response_text.clone(),
                model_metadata: json!({"source": "cache"}),
                guardrail_decision: hit.guardrail_decision,
                cache_hit: true,
            })
            .await?;
        self.store.touch_session(session.session_id).await?;

        Ok(TurnOutcome {
            response_text: hit.response_text,
            model_used: selected_model.to_string(),
            session_id: session.session_id,
            request_id,
            intent: optimization.intent.clone(),
            cached: true,
            usage: None,
        })
    }

    /// Reuse the caller's session when it exists and is theirs; otherwise
    /// start a fresh one seeded with the extras (minus the conversation
    /// history, which is re-sent every turn anyway).
    async fn resolve_session(&self, turn: &TurnRequest) -> Result<Session> {
        if let Some(session_id) = turn.session_id
            && let Some(session) = self.store.find_session(session_id, turn.user.id).await?
        {
            return Ok(session);
        }

        let mut payload = turn.extras.clone();
        payload.remove("history");
        let descriptor = payload
            .get("context_descriptor")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let session = self
            .store
            .create_session(NewSession {
                user_id: turn.user.id,
                persona: turn.persona,
                origin_app: turn.origin_app.clone(),
                class_id: turn.class.as_ref().map(|c| c.id),
                context_descriptor: descriptor,
                context_payload: Value::Object(payload),
            })
            .await?;
        debug!(session_id = %session.session_id, "session created");
        Ok(session)
    }

    fn request_draft(
        &self,
        turn: &TurnRequest,
        session: &Session,
        optimization: &OptimizerResult,
        context: &Value,
    ) -> RequestDraft {
        RequestDraft {
            session_id: session.session_id,
            user_id: turn.user.id,
            persona: turn.persona,
            origin_app: turn.origin_app.clone(),
            raw_query: turn.raw_query.clone(),
            optimized_prompt: optimization.optimized_prompt.clone(),
            optimizer_trace: optimization.trace.clone(),
            intent_label: optimization.intent.clone(),
            suggested_model: optimization.suggested_model.clone().unwrap_or_default(),
            context_snapshot: context.clone(),
        }
    }

    fn build_messages(
        &self,
        turn: &TurnRequest,
        optimization: &OptimizerResult,
        context: &Value,
    ) -> Vec<ChatMessage> {
        let system_prompt = self.prompts.build_system_prompt(turn.persona, context);
        let mut messages = vec![ChatMessage::system(system_prompt)];
        messages.extend(conversation_messages(&turn.extras));
        messages.push(ChatMessage::user(optimization.optimized_prompt.clone()));
        messages
    }
}

/// The last few history entries as chat messages. Entries with unknown roles
/// or empty content are skipped.
fn conversation_messages(extras: &Map<String, Value>) -> Vec<ChatMessage> {
    let Some(history) = extras.get("history").and_then(Value::as_array) else {
        return Vec::new();
    };
    history
        .iter()
        .rev()
        .take(HISTORY_WINDOW)
        .rev()
        .filter_map(|entry| {
            let content = entry["content"].as_str().filter(|c| !c.is_empty())?;
            match entry["role"].as_str() {
                Some("assistant") => Some(ChatMessage::assistant(content)),
                Some("user") => Some(ChatMessage::user(content)),
                _ => None,
            }
        })
        .collect()
}
