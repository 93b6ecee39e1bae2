//! `tutoria ask` — Run one assistant turn against the built-in demo data.
//!
//! Useful for trying the pipeline offline: with `fake_mode` on (the default)
//! no network call is made and the turn still exercises context assembly,
//! routing, quotas and the audit trail.

use std::sync::Arc;

use serde_json::Map;
use tutoria_config::AppConfig;
use tutoria_context::{ClassRef, FixtureDirectory};
use tutoria_core::persona::Persona;
use tutoria_core::user::UserRef;
use tutoria_pipeline::{Orchestrator, TurnRequest};
use tutoria_store::SqliteAuditStore;

pub async fn run(
    message: String,
    role: String,
    user_id: i64,
    name: String,
    class_id: Option<i64>,
    session: Option<uuid::Uuid>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let provider = tutoria_providers::build_from_config(&config)
        .map_err(|e| format!("Provider unavailable: {e}"))?;
    let store = Arc::new(SqliteAuditStore::new(&config.store.database).await?);
    let directory = Arc::new(FixtureDirectory::sample());
    let orchestrator = Orchestrator::new(&config, provider, store, directory);

    let persona = Persona::from_platform_role(&role);
    let class = class_id.map(|id| ClassRef {
        id,
        name: String::new(),
        academic_year: String::new(),
    });

    let outcome = orchestrator
        .handle_turn(TurnRequest {
            user: UserRef::new(user_id, name, role),
            persona,
            origin_app: "cli".into(),
            raw_query: message,
            class,
            session_id: session,
            extras: Map::new(),
            use_cache: true,
        })
        .await?;

    println!("{}\n", outcome.response_text);
    println!("  model:      {}", outcome.model_used);
    println!("  intent:     {}", outcome.intent);
    println!("  cached:     {}", outcome.cached);
    println!("  session_id: {}", outcome.session_id);
    println!("  request_id: {}", outcome.request_id);
    if let Some(usage) = outcome.usage {
        println!(
            "  tokens:     {} in / {} out ({} ms)",
            usage.input_tokens, usage.output_tokens, usage.latency_ms
        );
    }

    Ok(())
}
