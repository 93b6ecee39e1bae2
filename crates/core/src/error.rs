//! Error types for the Tutoria domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; `PipelineError` is the
//! caller-facing taxonomy that the orchestrator surfaces.

use thiserror::Error;

/// The top-level error type for a pipeline turn.
///
/// Every variant maps to a stable machine-readable code at the API boundary
/// (see [`PipelineError::code`]).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The caller supplied no message — rejected before any stage runs.
    #[error("Mensagem não fornecida.")]
    MissingInput,

    /// Daily request-count ceiling reached for the caller's quota scope.
    #[error("Limite diário de pedidos de IA atingido.")]
    RateLimitExceeded,

    /// Daily cost ceiling reached for the caller's quota scope.
    #[error("Limite de custo diário atingido para IA.")]
    QuotaExceeded,

    /// The response guard rejected the draft answer.
    #[error("Resposta bloqueada pelo guardião: {0}")]
    UnsafeContent(String),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable machine-readable error code surfaced to API callers.
    ///
    /// Provider-side throttling (HTTP 429) shares the `rate_limit` code with
    /// the quota manager's own request ceiling; all other provider failures
    /// (including misconfiguration) surface as `service`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingInput => "missing_message",
            Self::RateLimitExceeded => "rate_limit",
            Self::QuotaExceeded => "quota",
            Self::UnsafeContent(_) => "guardrail",
            Self::Provider(ProviderError::RateLimited { .. }) => "rate_limit",
            Self::Provider(_) => "service",
            Self::Store(_) | Self::Serialization(_) | Self::Internal(_) => "unknown",
        }
    }
}

/// Result type alias using our pipeline error.
pub type Result<T> = std::result::Result<T, PipelineError>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Failure of an optional collaborator sub-fetch during context assembly.
///
/// The Context Broker maps these to absent sections rather than propagating
/// them — optional context degrades, it never aborts a turn.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_codes() {
        assert_eq!(PipelineError::MissingInput.code(), "missing_message");
        assert_eq!(PipelineError::RateLimitExceeded.code(), "rate_limit");
        assert_eq!(PipelineError::QuotaExceeded.code(), "quota");
        assert_eq!(
            PipelineError::UnsafeContent("bloqueada".into()).code(),
            "guardrail"
        );
        assert_eq!(
            PipelineError::Provider(ProviderError::NotConfigured("no key".into())).code(),
            "service"
        );
        assert_eq!(
            PipelineError::Provider(ProviderError::RateLimited {
                retry_after_secs: 5
            })
            .code(),
            "rate_limit"
        );
        assert_eq!(PipelineError::Internal("boom".into()).code(), "unknown");
    }

    #[test]
    fn provider_error_displays_status() {
        let err = PipelineError::Provider(ProviderError::Api {
            status_code: 503,
            message: "upstream busy".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("upstream busy"));
    }

    #[test]
    fn store_error_converts() {
        let err: PipelineError = StoreError::QueryFailed("bad sql".into()).into();
        assert_eq!(err.code(), "unknown");
        assert!(err.to_string().contains("bad sql"));
    }
}
