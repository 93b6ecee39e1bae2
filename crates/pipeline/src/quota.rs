//! Quota gate over the persisted daily usage ledger.
//!
//! The pre-flight check reads (or lazily creates) today's ledger row and
//! rejects the turn before any paid call happens. Registration after the
//! provider call goes through the store's conditional increment, so parallel
//! turns cannot jointly pass the ceiling.

use chrono::Utc;
use std::sync::Arc;
use tracing::warn;
use tutoria_core::audit::{AuditStore, QuotaKey, QuotaLimits, UsageQuota};
use tutoria_core::error::{PipelineError, Result};
use tutoria_core::persona::Persona;
use tutoria_config::LimitsConfig;

/// Pre-flight quota checks and post-turn usage registration.
pub struct QuotaManager {
    store: Arc<dyn AuditStore>,
    limits: LimitsConfig,
}

impl QuotaManager {
    pub fn new(store: Arc<dyn AuditStore>, limits: LimitsConfig) -> Self {
        Self { store, limits }
    }

    /// Reject the turn when today's ledger row is already at a ceiling.
    ///
    /// Returns the row so the caller can register actual usage on it later.
    pub async fn ensure_within_limits(
        &self,
        user_id: i64,
        persona: Persona,
        class_id: Option<i64>,
        projected_cost: f64,
    ) -> Result<UsageQuota> {
        let key = QuotaKey::for_user(user_id, class_id);
        let defaults = QuotaLimits {
            max_requests: self.limits.daily_requests_for(persona.as_str()),
            max_cost: self.limits.max_daily_cost,
        };
        let quota = self
            .store
            .get_or_create_quota(&key, Utc::now().date_naive(), defaults)
            .await?;

        if quota.request_ceiling_reached() {
            return Err(PipelineError::RateLimitExceeded);
        }
        if quota.cost_ceiling_exceeded(projected_cost) {
            return Err(PipelineError::QuotaExceeded);
        }
        Ok(quota)
    }

    /// Record actual usage on the ledger row resolved by the pre-flight
    /// check. A `false` means a concurrent turn consumed the last slot.
    pub async fn register_usage(&self, quota: &UsageQuota, cost: f64) -> Result<bool> {
        let registered = self.store.register_usage(quota.id, cost).await?;
        if !registered {
            warn!(
                quota_id = quota.id,
                "usage not registered, ceiling consumed concurrently"
            );
        }
        Ok(registered)
    }
}
