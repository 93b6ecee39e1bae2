//! HTTP API v1 — the assistant surface the school platform talks to.
//!
//! Endpoints:
//!
//! - `POST /v1/assistant`           — Run one assistant turn
//! - `POST /v1/assistant/feedback`  — Record end-user feedback on a response
//! - `GET  /v1/sessions/{id}`       — Session descriptor plus its audit rows
//!
//! Authentication happens upstream (the platform fronts this service); the
//! caller's identity arrives in `x-user-id`, `x-user-role` and `x-user-name`
//! headers.

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use tutoria_context::ClassRef;
use tutoria_core::audit::{AuditStore, Feedback};
use tutoria_core::error::PipelineError;
use tutoria_core::persona::Persona;
use tutoria_core::provider::Usage;
use tutoria_core::user::UserRef;
use tutoria_pipeline::{Orchestrator, TurnRequest};

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn AuditStore>,
}

pub type SharedApiState = Arc<ApiV1State>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/assistant", post(assistant_handler))
        .route("/assistant/feedback", post(feedback_handler))
        .route("/sessions/{session_id}", get(session_detail_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct AssistantRequest {
    /// The user's message. `query` is accepted as an alias.
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default = "default_origin_app")]
    origin_app: String,
    /// Class the turn happens in; name and year come from the caller, who
    /// already holds the class record.
    #[serde(default)]
    class_id: Option<i64>,
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    academic_year: Option<String>,
    /// Existing session to resume (omit to start fresh).
    #[serde(default)]
    session_id: Option<Uuid>,
    /// Prior turns as `{role, content}` objects, newest last.
    #[serde(default)]
    history: Vec<Value>,
    #[serde(default)]
    extras: Map<String, Value>,
    #[serde(default)]
    context_descriptor: Option<String>,
    #[serde(default)]
    source_element: Option<String>,
    #[serde(default = "default_true_fn")]
    use_cache: bool,
}

fn default_origin_app() -> String {
    "portal".into()
}

fn default_true_fn() -> bool {
    true
}

#[derive(Serialize)]
struct AssistantResponse {
    response: String,
    model: String,
    meta: AssistantMeta,
    session_id: Uuid,
    request_id: i64,
}

#[derive(Serialize)]
struct AssistantMeta {
    intent: String,
    cached: bool,
    session_id: Uuid,
    request_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct FeedbackRequest {
    request_id: i64,
    feedback: String,
}

#[derive(Serialize)]
struct FeedbackResponse {
    ok: bool,
}

#[derive(Serialize)]
struct SessionDetailResponse {
    session_id: Uuid,
    origin_app: String,
    context_descriptor: String,
    last_interaction_at: String,
    requests: Vec<SessionRequestDto>,
}

#[derive(Serialize)]
struct SessionRequestDto {
    id: i64,
    raw_query: String,
    optimized_prompt: String,
    intent_label: String,
    resolved_model: String,
    response_text: Option<String>,
    created_at: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &'static str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code,
        }),
    )
}

// ── Identity ──────────────────────────────────────────────────────────────

/// Pull the authenticated caller out of the trusted identity headers.
fn identity_from_headers(headers: &HeaderMap) -> Result<UserRef, ApiError> {
    let id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());
    let role = headers.get("x-user-role").and_then(|v| v.to_str().ok());

    match (id, role) {
        (Some(id), Some(role)) => {
            let name = headers
                .get("x-user-name")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            Ok(UserRef::new(id, name, role))
        }
        _ => Err(api_error(
            StatusCode::UNAUTHORIZED,
            "Identidade em falta.",
            "unauthorized",
        )),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn assistant_handler(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    Json(payload): Json<AssistantRequest>,
) -> Result<Json<AssistantResponse>, ApiError> {
    let user = identity_from_headers(&headers)?;
    let persona = Persona::from_platform_role(&user.role);

    let message = payload
        .message
        .or(payload.query)
        .unwrap_or_default();
    if message.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Mensagem não fornecida.",
            "missing_message",
        ));
    }

    let class = payload.class_id.map(|id| ClassRef {
        id,
        name: payload.class_name.clone().unwrap_or_default(),
        academic_year: payload.academic_year.clone().unwrap_or_default(),
    });

    let mut extras = payload.extras;
    extras
        .entry("history".to_string())
        .or_insert_with(|| Value::Array(payload.history));
    if let Some(descriptor) = payload.context_descriptor {
        extras
            .entry("context_descriptor".to_string())
            .or_insert(Value::String(descriptor));
    }
    if let Some(element) = payload.source_element {
        extras
            .entry("source_element".to_string())
            .or_insert(Value::String(element));
    }

    info!(
        user_id = user.id,
        persona = %persona,
        origin = %payload.origin_app,
        "v1/assistant turn"
    );

    let outcome = state
        .orchestrator
        .handle_turn(TurnRequest {
            user,
            persona,
            origin_app: payload.origin_app,
            raw_query: message,
            class,
            session_id: payload.session_id,
            extras,
            use_cache: payload.use_cache,
        })
        .await
        .map_err(pipeline_error_response)?;

    Ok(Json(AssistantResponse {
        response: outcome.response_text,
        model: outcome.model_used.clone(),
        meta: AssistantMeta {
            intent: outcome.intent,
            cached: outcome.cached,
            session_id: outcome.session_id,
            request_id: outcome.request_id,
            usage: outcome.usage,
        },
        session_id: outcome.session_id,
        request_id: outcome.request_id,
    }))
}

/// Map pipeline failures to the stable `{error, code}` payload the platform
/// front-end keys on.
fn pipeline_error_response(err: PipelineError) -> ApiError {
    let code = err.code();
    let status = match code {
        "missing_message" | "service" => StatusCode::BAD_REQUEST,
        "rate_limit" => StatusCode::TOO_MANY_REQUESTS,
        "quota" => StatusCode::PAYMENT_REQUIRED,
        "guardrail" => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "erro inesperado no assistente");
        return api_error(status, "Erro inesperado.", code);
    }
    api_error(status, err.to_string(), code)
}

async fn feedback_handler(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let user = identity_from_headers(&headers)?;

    let Some(feedback) = Feedback::parse(&payload.feedback) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Feedback inválido.",
            "invalid",
        ));
    };

    let recorded = state
        .store
        .set_feedback(payload.request_id, user.id, feedback)
        .await
        .map_err(|e| {
            error!(error = %e, "falha ao registar feedback");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Erro inesperado.",
                "unknown",
            )
        })?;

    if !recorded {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            "Pedido sem resposta associada.",
            "not_found",
        ));
    }

    Ok(Json(FeedbackResponse { ok: true }))
}

async fn session_detail_handler(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionDetailResponse>, ApiError> {
    let user = identity_from_headers(&headers)?;

    let not_found = || {
        api_error(
            StatusCode::NOT_FOUND,
            "Sessão não encontrada.",
            "not_found",
        )
    };

    let session = state
        .store
        .find_session(session_id, user.id)
        .await
        .map_err(|e| {
            error!(error = %e, "falha ao carregar sessão");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Erro inesperado.",
                "unknown",
            )
        })?
        .ok_or_else(not_found)?;

    let requests = state
        .store
        .requests_for_session(session_id)
        .await
        .map_err(|e| {
            error!(error = %e, "falha ao listar pedidos da sessão");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Erro inesperado.",
                "unknown",
            )
        })?;

    Ok(Json(SessionDetailResponse {
        session_id: session.session_id,
        origin_app: session.origin_app,
        context_descriptor: session.context_descriptor,
        last_interaction_at: session.last_interaction_at.to_rfc3339(),
        requests: requests
            .into_iter()
            .map(|(req, log)| SessionRequestDto {
                id: req.id,
                raw_query: req.raw_query,
                optimized_prompt: req.optimized_prompt,
                intent_label: req.intent_label,
                resolved_model: req.resolved_model,
                response_text: log.map(|l| l.response_text),
                created_at: req.created_at.to_rfc3339(),
            })
            .collect(),
    }))
}
