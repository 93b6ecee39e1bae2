//! HTTP API gateway for TutorIA.
//!
//! Exposes the assistant, feedback and session-detail endpoints consumed by
//! the school platform, plus a health check for monitoring.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

pub use api_v1::{ApiV1State, SharedApiState};

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - Request body size limit (1 MB)
/// - CORS restricted to the platform origin
/// - HTTP trace logging
pub fn build_router(state: SharedApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static("x-user-id"),
            axum::http::HeaderName::from_static("x-user-role"),
            axum::http::HeaderName::from_static("x-user-name"),
        ])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// The pipeline and store are prebuilt by the caller; the gateway only owns
/// the HTTP surface.
pub async fn start(
    config: &tutoria_config::AppConfig,
    state: SharedApiState,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    use tutoria_config::AppConfig;
    use tutoria_context::FixtureDirectory;
    use tutoria_pipeline::Orchestrator;
    use tutoria_providers::FakeProvider;
    use tutoria_store::SqliteAuditStore;

    async fn test_state() -> SharedApiState {
        let config = AppConfig::default();
        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(
            SqliteAuditStore::new("sqlite::memory:")
                .await
                .expect("in-memory store"),
        );
        let directory = Arc::new(FixtureDirectory::sample());
        let orchestrator = Arc::new(Orchestrator::new(
            &config,
            provider,
            store.clone(),
            directory,
        ));
        Arc::new(ApiV1State {
            orchestrator,
            store,
        })
    }

    fn assistant_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/assistant")
            .header("content-type", "application/json")
            .header("x-user-id", "1")
            .header("x-user-role", "aluno")
            .header("x-user-name", "Mariana Silva")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state().await);

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn assistant_turn_round_trips() {
        let app = build_router(test_state().await);

        let req = assistant_request(serde_json::json!({
            "message": "Como estudar a tabuada do 7?",
            "origin_app": "diario",
        }));
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(
            body["response"]
                .as_str()
                .is_some_and(|s| s.contains("Resposta simulada"))
        );
        assert!(body["session_id"].is_string());
        assert!(body["request_id"].is_i64());
        assert_eq!(body["meta"]["cached"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn missing_message_is_a_400() {
        let app = build_router(test_state().await);

        let req = assistant_request(serde_json::json!({ "message": "   " }));
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], serde_json::json!("missing_message"));
    }

    #[tokio::test]
    async fn missing_identity_is_a_401() {
        let app = build_router(test_state().await);

        let req = Request::builder()
            .method("POST")
            .uri("/v1/assistant")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "message": "olá" }).to_string(),
            ))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_feedback_label_is_rejected() {
        let app = build_router(test_state().await);

        let req = Request::builder()
            .method("POST")
            .uri("/v1/assistant/feedback")
            .header("content-type", "application/json")
            .header("x-user-id", "1")
            .header("x-user-role", "aluno")
            .body(Body::from(
                serde_json::json!({ "request_id": 1, "feedback": "great" }).to_string(),
            ))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn feedback_for_unknown_request_is_a_404() {
        let app = build_router(test_state().await);

        let req = Request::builder()
            .method("POST")
            .uri("/v1/assistant/feedback")
            .header("content-type", "application/json")
            .header("x-user-id", "1")
            .header("x-user-role", "aluno")
            .body(Body::from(
                serde_json::json!({ "request_id": 999, "feedback": "helpful" }).to_string(),
            ))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_detail_lists_the_turn() {
        let state = test_state().await;
        let app = build_router(state.clone());

        let req = assistant_request(serde_json::json!({
            "message": "Preciso de ajuda com a divisão.",
        }));
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let session_id = body["session_id"].as_str().unwrap().to_string();

        let req = Request::builder()
            .uri(format!("/v1/sessions/{session_id}"))
            .header("x-user-id", "1")
            .header("x-user-role", "aluno")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let requests = body["requests"].as_array().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0]["response_text"].is_string());
    }

    #[tokio::test]
    async fn foreign_session_is_a_404() {
        let app = build_router(test_state().await);

        let req = Request::builder()
            .uri(format!("/v1/sessions/{}", uuid::Uuid::new_v4()))
            .header("x-user-id", "1")
            .header("x-user-role", "aluno")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
