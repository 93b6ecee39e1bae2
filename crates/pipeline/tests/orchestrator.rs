//! End-to-end pipeline tests over an in-memory audit store, the fixture
//! school directory, and fake or scripted providers.

mod support;

use serde_json::Map;
use std::sync::Arc;
use support::ScriptedProvider;
use tutoria_config::AppConfig;
use tutoria_context::{ClassRef, FixtureDirectory};
use tutoria_core::audit::{AuditStore, Feedback, QuotaKey, QuotaLimits, RequestStatus};
use tutoria_core::error::ProviderError;
use tutoria_core::persona::Persona;
use tutoria_core::provider::ProviderGateway;
use tutoria_core::user::UserRef;
use tutoria_pipeline::{Orchestrator, TurnRequest};
use tutoria_providers::FakeProvider;
use tutoria_store::SqliteAuditStore;

const GUARD_ALLOW: &str = r#"{"allow": true, "rationale": "tom adequado"}"#;

async fn testbed(
    config: &AppConfig,
    provider: Arc<dyn ProviderGateway>,
) -> (Orchestrator, Arc<SqliteAuditStore>) {
    let store = Arc::new(SqliteAuditStore::new("sqlite::memory:").await.unwrap());
    let directory = Arc::new(FixtureDirectory::sample());
    let orchestrator = Orchestrator::new(
        config,
        provider,
        Arc::clone(&store) as Arc<dyn AuditStore>,
        directory,
    );
    (orchestrator, store)
}

fn class_4a() -> ClassRef {
    ClassRef {
        id: 1,
        name: "4.º A".to_string(),
        academic_year: "2025/2026".to_string(),
    }
}

fn student_turn(query: &str) -> TurnRequest {
    TurnRequest {
        user: UserRef::new(1, "Mariana Silva", "aluno"),
        persona: Persona::Student,
        origin_app: "diario".to_string(),
        raw_query: query.to_string(),
        class: Some(class_4a()),
        session_id: None,
        extras: Map::new(),
        use_cache: true,
    }
}

#[tokio::test]
async fn fake_turn_leaves_one_completed_request_with_log() {
    let config = AppConfig::default();
    let (orchestrator, store) = testbed(&config, Arc::new(FakeProvider::new())).await;

    let outcome = orchestrator
        .handle_turn(student_turn("como treinar a tabuada do 7?"))
        .await
        .unwrap();

    assert!(!outcome.cached);
    assert!(outcome.response_text.starts_with("[Resposta simulada]"));
    assert_eq!(outcome.model_used, "gpt-5-mini");

    let entries = store.requests_for_session(outcome.session_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    let (request, log) = &entries[0];
    assert_eq!(request.id, outcome.request_id);
    assert_eq!(request.status, RequestStatus::Completed);
    assert_eq!(request.raw_query, "como treinar a tabuada do 7?");
    assert_eq!(request.intent_label, "general");
    let log = log.as_ref().unwrap();
    assert!(!log.cache_hit);
    assert_eq!(log.guardrail_decision["rationale"], "fake-mode");

    // The owner can attach feedback to the logged response.
    assert!(store
        .set_feedback(outcome.request_id, 1, Feedback::Helpful)
        .await
        .unwrap());
}

#[tokio::test]
async fn blank_query_is_rejected_before_any_stage() {
    let config = AppConfig::default();
    let (orchestrator, _store) = testbed(&config, Arc::new(FakeProvider::new())).await;

    let err = orchestrator.handle_turn(student_turn("   ")).await.unwrap_err();
    assert_eq!(err.code(), "missing_message");
}

#[tokio::test]
async fn cache_hit_skips_provider_and_quota() {
    let config = AppConfig::default();
    let fake = FakeProvider::new();
    let counter = fake.call_counter();
    let (orchestrator, store) = testbed(&config, Arc::new(fake)).await;

    let first = orchestrator
        .handle_turn(student_turn("como treinar a tabuada do 7?"))
        .await
        .unwrap();
    // Optimizer call plus the main completion.
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);

    let mut repeat = student_turn("como treinar a tabuada do 7?");
    repeat.session_id = Some(first.session_id);
    let second = orchestrator.handle_turn(repeat).await.unwrap();

    assert!(second.cached);
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.response_text, first.response_text);
    assert!(second.usage.is_none());
    // Only the optimizer ran for the second turn.
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 3);

    let entries = store.requests_for_session(first.session_id).await.unwrap();
    assert_eq!(entries.len(), 2);
    let (cached_request, cached_log) = &entries[1];
    assert_eq!(cached_request.status, RequestStatus::Completed);
    assert_eq!(cached_request.input_tokens, 0);
    assert_eq!(cached_request.cost_estimate, 0.0);
    assert!(cached_log.as_ref().unwrap().cache_hit);

    // Only the live turn consumed quota.
    let quota = store
        .get_or_create_quota(
            &QuotaKey::for_user(1, Some(1)),
            chrono::Utc::now().date_naive(),
            QuotaLimits {
                max_requests: 12,
                max_cost: 1.5,
            },
        )
        .await
        .unwrap();
    assert_eq!(quota.requests_made, 1);
}

#[tokio::test]
async fn request_ceiling_stops_the_second_turn() {
    let mut config = AppConfig::default();
    config.limits.daily_requests.insert("student".to_string(), 1);
    let (orchestrator, store) = testbed(&config, Arc::new(FakeProvider::new())).await;

    let mut first = student_turn("pergunta um");
    first.use_cache = false;
    let outcome = orchestrator.handle_turn(first).await.unwrap();

    let mut second = student_turn("pergunta dois");
    second.use_cache = false;
    let err = orchestrator.handle_turn(second).await.unwrap_err();
    assert_eq!(err.code(), "rate_limit");

    // The refused turn never reached the audit row stage.
    let entries = store.requests_for_session(outcome.session_id).await.unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn cost_ceiling_stops_the_second_turn() {
    let mut config = AppConfig::default();
    // First turn fits (projected 600 mini-tier tokens = 0.00054); its actual
    // usage (400 tokens = 0.00036) pushes the second projection past the cap.
    config.limits.max_daily_cost = 0.0006;
    let (orchestrator, _store) = testbed(&config, Arc::new(FakeProvider::new())).await;

    let mut first = student_turn("pergunta um");
    first.use_cache = false;
    orchestrator.handle_turn(first).await.unwrap();

    let mut second = student_turn("pergunta dois");
    second.use_cache = false;
    let err = orchestrator.handle_turn(second).await.unwrap_err();
    assert_eq!(err.code(), "quota");
}

#[tokio::test]
async fn guard_denial_marks_the_request_errored() {
    let mut config = AppConfig::default();
    config.provider.fake_mode = false;
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok("intent: feedback_curto\nprompt: Dá feedback sobre o texto.".to_string()),
        Ok("Resposta dura e seca.".to_string()),
        Ok(r#"{"allow": false, "rationale": "tom inadequado"}"#.to_string()),
    ]));
    let (orchestrator, store) = testbed(&config, provider).await;

    let session = store
        .create_session(tutoria_core::audit::NewSession {
            user_id: 1,
            persona: Persona::Student,
            origin_app: "diario".to_string(),
            class_id: Some(1),
            context_descriptor: String::new(),
            context_payload: serde_json::json!({}),
        })
        .await
        .unwrap();

    let mut turn = student_turn("dá feedback ao meu texto");
    turn.session_id = Some(session.session_id);
    turn.use_cache = false;
    let err = orchestrator.handle_turn(turn).await.unwrap_err();
    assert_eq!(err.code(), "guardrail");
    assert!(err.to_string().contains("tom inadequado"));

    let entries = store.requests_for_session(session.session_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0.status, RequestStatus::Errored);
    assert!(entries[0].1.is_none());
}

#[tokio::test]
async fn optimizer_intent_routes_to_the_capable_tier() {
    let mut config = AppConfig::default();
    config.provider.fake_mode = false;
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok("intent: planeamento_prolongado\nmodel: normal\nprompt: Elabora um plano de estudo semanal.".to_string()),
        Ok("Plano semanal: segunda leitura, terça tabuadas.".to_string()),
        Ok(GUARD_ALLOW.to_string()),
    ]));
    let (orchestrator, store) = testbed(&config, provider).await;

    let outcome = orchestrator
        .handle_turn(student_turn("preciso de um plano de estudo"))
        .await
        .unwrap();

    assert_eq!(outcome.model_used, "gpt-5");
    assert_eq!(outcome.intent, "planeamento_prolongado");

    let request = store.get_request(outcome.request_id).await.unwrap().unwrap();
    assert_eq!(request.intent_label, "planeamento_prolongado");
    assert_eq!(request.suggested_model, "normal");
    assert_eq!(request.resolved_model, "gpt-5");
    assert_eq!(request.optimized_prompt, "Elabora um plano de estudo semanal.");
    assert_eq!(request.status, RequestStatus::Completed);
}

#[tokio::test]
async fn provider_failure_marks_the_request_errored() {
    let mut config = AppConfig::default();
    config.provider.fake_mode = false;
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok("prompt: Pergunta simples.".to_string()),
        Err(ProviderError::Timeout("30s".to_string())),
    ]));
    let (orchestrator, store) = testbed(&config, provider).await;

    let session = store
        .create_session(tutoria_core::audit::NewSession {
            user_id: 1,
            persona: Persona::Student,
            origin_app: "diario".to_string(),
            class_id: Some(1),
            context_descriptor: String::new(),
            context_payload: serde_json::json!({}),
        })
        .await
        .unwrap();

    let mut turn = student_turn("pergunta qualquer");
    turn.session_id = Some(session.session_id);
    turn.use_cache = false;
    let err = orchestrator.handle_turn(turn).await.unwrap_err();
    assert_eq!(err.code(), "service");

    let entries = store.requests_for_session(session.session_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0.status, RequestStatus::Errored);
}

#[tokio::test]
async fn unknown_session_id_starts_a_fresh_session() {
    let config = AppConfig::default();
    let (orchestrator, _store) = testbed(&config, Arc::new(FakeProvider::new())).await;

    let mut turn = student_turn("olá");
    turn.session_id = Some(uuid::Uuid::new_v4());
    let outcome = orchestrator.handle_turn(turn.clone()).await.unwrap();
    assert_ne!(Some(outcome.session_id), turn.session_id);
}

#[tokio::test]
async fn consecutive_turns_share_a_session() {
    let config = AppConfig::default();
    let (orchestrator, store) = testbed(&config, Arc::new(FakeProvider::new())).await;

    let first = orchestrator.handle_turn(student_turn("pergunta um")).await.unwrap();

    let mut follow_up = student_turn("pergunta dois");
    follow_up.session_id = Some(first.session_id);
    follow_up.use_cache = false;
    let second = orchestrator.handle_turn(follow_up).await.unwrap();

    assert_eq!(second.session_id, first.session_id);
    let entries = store.requests_for_session(first.session_id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|(r, _)| r.status == RequestStatus::Completed));
}
