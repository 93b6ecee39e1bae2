//! Model routing and cost estimation.
//!
//! Decides which concrete model serves a turn, starting from the optimizer's
//! suggestion and falling back through persona overrides and intent
//! heuristics to the persona default.

use tracing::debug;
use tutoria_config::ModelConfig;
use tutoria_core::persona::{Persona, intent};

/// Resolves the concrete model for a turn.
pub struct ModelRouter {
    models: ModelConfig,
    /// Self-hosted pools accept any model name, so a concrete suggestion
    /// without a price entry is still honored.
    open_model_pool: bool,
}

impl ModelRouter {
    pub fn new(models: ModelConfig, open_model_pool: bool) -> Self {
        Self {
            models,
            open_model_pool,
        }
    }

    /// Pick the model for a turn.
    ///
    /// Precedence: a usable optimizer suggestion (tier keyword or a concrete
    /// model the pricing table knows), then the persona override table, then
    /// intent heuristics, then the persona default.
    pub fn select_model(&self, persona: Persona, intent_label: &str, suggestion: Option<&str>) -> String {
        if let Some(raw) = suggestion {
            let raw = raw.trim();
            if let Some(mapped) = self.models.resolve_tier(raw) {
                return mapped.to_string();
            }
            if !raw.is_empty()
                && (self.models.costs_per_1k.contains_key(raw) || self.open_model_pool)
            {
                return raw.to_string();
            }
            debug!(suggestion = raw, "suggestion ignored, no price entry");
        }

        if let Some(model) = self.models.by_persona.get(persona.as_str())
            && !model.is_empty()
        {
            return model.clone();
        }

        match intent_label {
            intent::PLANEAMENTO_PROLONGADO | intent::ANALISE_DADOS | intent::CONSELHO_COMPLEXO => {
                self.models.tier_normal.clone()
            }
            intent::FEEDBACK_CURTO | intent::ORIENTACAO_IMEDIATA => self.models.tier_mini.clone(),
            _ if persona == Persona::Student => self.models.tier_mini.clone(),
            _ => self.models.tier_nano.clone(),
        }
    }

    /// Projected cost of `tokens` tokens on `model`, in the configured
    /// currency. Unknown models use the flat default price.
    pub fn estimate_cost(&self, model: &str, tokens: u32) -> f64 {
        let per_1k = self
            .models
            .costs_per_1k
            .get(model)
            .copied()
            .unwrap_or(ModelConfig::DEFAULT_PRICE_PER_1K);
        per_1k * f64::from(tokens) / 1000.0
    }
}
