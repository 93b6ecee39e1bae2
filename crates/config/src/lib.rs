//! Configuration loading, validation, and management for Tutoria.
//!
//! Loads configuration from `~/.tutoria/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.tutoria/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider backend settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Model tier table, pricing, and routing overrides
    #[serde(default)]
    pub models: ModelConfig,

    /// Quota ceilings and cache behavior
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Response guard settings
    #[serde(default)]
    pub guard: GuardConfig,

    /// Pedagogical prompt framing
    #[serde(default)]
    pub pedagogy: PedagogyConfig,

    /// Audit store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Which chat-completion backend to call and how.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend name: "openai" (any OpenAI-compatible endpoint) or "ollama".
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// API key. Ollama and fake mode need none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// Model used when the router resolves nothing more specific.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// HTTP timeout for provider calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Deterministic fake mode: echo a truncated prompt instead of calling
    /// any network service. On by default so a fresh checkout works offline.
    #[serde(default = "default_true")]
    pub fake_mode: bool,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-5".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_key: None,
            api_base: None,
            default_model: default_model(),
            timeout_secs: default_timeout_secs(),
            fake_mode: true,
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_key", &redact(&self.api_key))
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .field("timeout_secs", &self.timeout_secs)
            .field("fake_mode", &self.fake_mode)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("models", &self.models)
            .field("limits", &self.limits)
            .field("guard", &self.guard)
            .field("pedagogy", &self.pedagogy)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .finish()
    }
}

/// Model tier table, per-1000-token prices, and persona overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Cheapest tier — optimizer/guard calls and the staff default.
    #[serde(default = "default_tier_nano")]
    pub tier_nano: String,

    /// Mid tier — short-form intents and the student default.
    #[serde(default = "default_tier_mini")]
    pub tier_mini: String,

    /// Most capable tier — long-range planning and data analysis.
    #[serde(default = "default_tier_normal")]
    pub tier_normal: String,

    /// Price per 1000 tokens, keyed by model id. Unknown models fall back to
    /// [`ModelConfig::DEFAULT_PRICE_PER_1K`].
    #[serde(default = "default_model_costs")]
    pub costs_per_1k: HashMap<String, f64>,

    /// Per-persona model overrides (persona name → model id).
    #[serde(default)]
    pub by_persona: HashMap<String, String>,

    /// Model used for the optimizer pre-pass.
    #[serde(default = "default_tier_nano")]
    pub optimizer_model: String,

    /// Model used for the response guard.
    #[serde(default = "default_tier_nano")]
    pub guard_model: String,
}

fn default_tier_nano() -> String {
    "gpt-5-nano".into()
}
fn default_tier_mini() -> String {
    "gpt-5-mini".into()
}
fn default_tier_normal() -> String {
    "gpt-5".into()
}

fn default_model_costs() -> HashMap<String, f64> {
    HashMap::from([
        ("gpt-5-nano".into(), 0.00015),
        ("gpt-5-mini".into(), 0.00090),
        ("gpt-5".into(), 0.00300),
    ])
}

impl ModelConfig {
    /// Price per 1000 tokens applied to models missing from the table.
    pub const DEFAULT_PRICE_PER_1K: f64 = 0.001;

    /// Resolve a tier keyword (nano/mini/normal) to its configured model id.
    pub fn resolve_tier(&self, keyword: &str) -> Option<&str> {
        match keyword {
            "nano" => Some(self.tier_nano.as_str()),
            "mini" => Some(self.tier_mini.as_str()),
            "normal" => Some(self.tier_normal.as_str()),
            _ => None,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            tier_nano: default_tier_nano(),
            tier_mini: default_tier_mini(),
            tier_normal: default_tier_normal(),
            costs_per_1k: default_model_costs(),
            by_persona: HashMap::new(),
            optimizer_model: default_tier_nano(),
            guard_model: default_tier_nano(),
        }
    }
}

/// Quota ceilings and response-cache behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Max requests per day keyed by persona name.
    #[serde(default = "default_rate_limits")]
    pub daily_requests: HashMap<String, u32>,

    /// Fallback daily request ceiling for personas missing from the table.
    #[serde(default = "default_fallback_requests")]
    pub fallback_daily_requests: u32,

    /// Daily cost ceiling applied when a quota row is lazily created.
    #[serde(default = "default_max_daily_cost")]
    pub max_daily_cost: f64,

    /// Response cache entry lifetime.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_rate_limits() -> HashMap<String, u32> {
    HashMap::from([
        ("student".into(), 12),
        ("teacher".into(), 24),
        ("guardian".into(), 6),
        ("admin".into(), 60),
    ])
}
fn default_fallback_requests() -> u32 {
    10
}
fn default_max_daily_cost() -> f64 {
    1.5
}
fn default_cache_ttl_secs() -> u64 {
    3600
}

impl LimitsConfig {
    /// Daily request ceiling for a persona.
    pub fn daily_requests_for(&self, persona: &str) -> u32 {
        self.daily_requests
            .get(persona)
            .copied()
            .unwrap_or(self.fallback_daily_requests)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            daily_requests: default_rate_limits(),
            fallback_daily_requests: default_fallback_requests(),
            max_daily_cost: default_max_daily_cost(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Response guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Strict mode treats a malformed guard reply as a policy violation.
    /// Relaxed mode lets malformed replies through.
    #[serde(default = "default_true")]
    pub strict: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// Pedagogical framing injected into the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PedagogyConfig {
    /// Ask the model to keep replies in European Portuguese.
    #[serde(default = "default_true")]
    pub enforce_pt: bool,

    /// Append the pedagogical-model guidelines block to the system prompt.
    #[serde(default)]
    pub guidelines_enabled: bool,

    /// Override for the guidelines block; a built-in text is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidelines: Option<String>,
}

impl Default for PedagogyConfig {
    fn default() -> Self {
        Self {
            enforce_pt: true,
            guidelines_enabled: false,
            guidelines: None,
        }
    }
}

/// Audit store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path or URL. `sqlite::memory:` for ephemeral runs.
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "sqlite://tutoria.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8480
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tutoria/config.toml).
    ///
    /// Environment variable overrides (highest priority):
    /// - `AI_SERVICE_PROVIDER` — backend name
    /// - `OPENAI_API_KEY` / `TUTORIA_API_KEY` — provider key
    /// - `OPENAI_API_BASE` — provider base URL
    /// - `AI_FAKE_RESPONSES` — "true"/"false"
    /// - `TUTORIA_DB` — store database URL
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(name) = std::env::var("AI_SERVICE_PROVIDER") {
            config.provider.name = name.to_lowercase();
        }
        if config.provider.api_key.is_none() {
            config.provider.api_key = std::env::var("TUTORIA_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }
        if let Ok(base) = std::env::var("OPENAI_API_BASE") {
            config.provider.api_base = Some(base);
        }
        if let Ok(fake) = std::env::var("AI_FAKE_RESPONSES") {
            config.provider.fake_mode =
                matches!(fake.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(db) = std::env::var("TUTORIA_DB") {
            config.store.database = db;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tutoria")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.timeout_secs must be > 0".into(),
            ));
        }
        if self.limits.max_daily_cost < 0.0 {
            return Err(ConfigError::ValidationError(
                "limits.max_daily_cost must not be negative".into(),
            ));
        }
        if let Some((model, price)) = self
            .models
            .costs_per_1k
            .iter()
            .find(|(_, price)| **price < 0.0)
        {
            return Err(ConfigError::ValidationError(format!(
                "models.costs_per_1k[{model}] must not be negative (got {price})"
            )));
        }
        Ok(())
    }

    /// Whether a live provider call is possible without fake mode.
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard`-style output).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            models: ModelConfig::default(),
            limits: LimitsConfig::default(),
            guard: GuardConfig::default(),
            pedagogy: PedagogyConfig::default(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider.name, "openai");
        assert!(config.provider.fake_mode);
        assert_eq!(config.models.tier_normal, "gpt-5");
        assert_eq!(config.limits.daily_requests_for("student"), 12);
        assert_eq!(config.limits.daily_requests_for("staff"), 10);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.name, config.provider.name);
        assert_eq!(parsed.limits.cache_ttl_secs, config.limits.cache_ttl_secs);
        assert_eq!(parsed.models.tier_mini, config.models.tier_mini);
    }

    #[test]
    fn tier_resolution() {
        let models = ModelConfig::default();
        assert_eq!(models.resolve_tier("nano"), Some("gpt-5-nano"));
        assert_eq!(models.resolve_tier("mini"), Some("gpt-5-mini"));
        assert_eq!(models.resolve_tier("normal"), Some("gpt-5"));
        assert_eq!(models.resolve_tier("gpt-5-mini"), None);
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.provider.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_price_rejected() {
        let mut config = AppConfig::default();
        config.models.costs_per_1k.insert("weird".into(), -0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().gateway.port, 8480);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
[provider]
name = "ollama"
api_base = "http://localhost:11434"
fake_mode = false

[limits]
max_daily_cost = 0.75
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider.name, "ollama");
        assert!(!config.provider.fake_mode);
        assert!((config.limits.max_daily_cost - 0.75).abs() < 1e-9);
        // Untouched sections keep defaults
        assert_eq!(config.models.optimizer_model, "gpt-5-nano");
        assert_eq!(config.limits.daily_requests_for("teacher"), 24);
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-super-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-5-nano"));
        assert!(toml_str.contains("8480"));
    }
}
