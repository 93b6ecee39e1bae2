//! `tutoria serve` — Start the HTTP API server.

use std::sync::Arc;

use tutoria_config::AppConfig;
use tutoria_context::FixtureDirectory;
use tutoria_gateway::ApiV1State;
use tutoria_pipeline::Orchestrator;
use tutoria_store::SqliteAuditStore;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let provider = tutoria_providers::build_from_config(&config)
        .map_err(|e| format!("Provider unavailable: {e}"))?;
    let store = Arc::new(SqliteAuditStore::new(&config.store.database).await?);
    // TODO: swap the fixture for the platform directory client once its API
    // is published.
    let directory = Arc::new(FixtureDirectory::sample());
    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        provider,
        store.clone(),
        directory,
    ));

    println!("🎓 TutorIA Gateway");
    println!(
        "   Listening: {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!("   Provider:  {}", config.provider.name);
    println!("   Fake mode: {}", config.provider.fake_mode);

    let state = Arc::new(ApiV1State {
        orchestrator,
        store,
    });
    tutoria_gateway::start(&config, state).await?;

    Ok(())
}
