//! `tutoria doctor` — Diagnose configuration and provider health.

use tutoria_config::AppConfig;
use tutoria_store::SqliteAuditStore;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 TutorIA Doctor — System Diagnostics");
    println!("======================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file — run `tutoria onboard` (defaults apply)");
    }

    match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");

            if config.provider.fake_mode {
                println!("  ✅ Fake mode on — no API key needed");
            } else if config.has_api_key() {
                println!("  ✅ API key configured");
            } else if config.provider.name == "ollama" {
                println!("  ✅ Ollama backend — no API key needed");
            } else {
                println!("  ⚠️  No API key configured — set OPENAI_API_KEY or turn fake_mode on");
                issues += 1;
            }

            match SqliteAuditStore::new(&config.store.database).await {
                Ok(_) => println!("  ✅ Store reachable ({})", config.store.database),
                Err(e) => {
                    println!("  ❌ Store unreachable: {e}");
                    issues += 1;
                }
            }

            match tutoria_providers::build_from_config(&config) {
                Ok(provider) => match provider.health_check().await {
                    Ok(true) => println!("  ✅ Provider '{}' healthy", provider.name()),
                    Ok(false) => {
                        println!("  ⚠️  Provider '{}' not responding", provider.name());
                        issues += 1;
                    }
                    Err(e) => {
                        println!("  ❌ Provider health check failed: {e}");
                        issues += 1;
                    }
                },
                Err(e) => {
                    println!("  ❌ Provider unavailable: {e}");
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
