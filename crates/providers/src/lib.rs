//! Provider gateway implementations for Tutoria.
//!
//! All backends implement the `tutoria_core::ProviderGateway` trait.
//! `build_from_config` selects the backend from configuration; fake mode
//! always wins so offline and test runs never touch the network.

pub mod fake;
pub mod ollama;
pub mod openai_compat;

pub use fake::FakeProvider;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use tutoria_config::AppConfig;
use tutoria_core::{ProviderError, ProviderGateway};

/// Build the configured provider gateway.
///
/// Fails with [`ProviderError::NotConfigured`] when a live OpenAI-compatible
/// backend is selected without an API key.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn ProviderGateway>, ProviderError> {
    if config.provider.fake_mode {
        return Ok(Arc::new(FakeProvider::new()));
    }

    match config.provider.name.as_str() {
        "ollama" => {
            let base = config
                .provider
                .api_base
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".into());
            Ok(Arc::new(OllamaProvider::new(
                base,
                config.provider.timeout_secs,
            )))
        }
        _ => {
            let api_key = config.provider.api_key.clone().ok_or_else(|| {
                ProviderError::NotConfigured(
                    "Nenhuma chave API fornecida para o serviço de IA.".into(),
                )
            })?;
            let base = config
                .provider
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".into());
            Ok(Arc::new(OpenAiCompatProvider::new(
                &config.provider.name,
                base,
                api_key,
                config.provider.timeout_secs,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_mode_wins() {
        let config = AppConfig::default();
        assert!(config.provider.fake_mode);
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "fake");
    }

    #[test]
    fn live_openai_requires_key() {
        let mut config = AppConfig::default();
        config.provider.fake_mode = false;
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn ollama_needs_no_key() {
        let mut config = AppConfig::default();
        config.provider.fake_mode = false;
        config.provider.name = "ollama".into();
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn openai_with_key_builds() {
        let mut config = AppConfig::default();
        config.provider.fake_mode = false;
        config.provider.api_key = Some("sk-test".into());
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
