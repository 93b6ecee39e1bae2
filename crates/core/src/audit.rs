//! Audit trail entities and the `AuditStore` trait.
//!
//! Every turn leaves a durable trace: the owning session, one request row
//! per turn (created pending before the provider call so in-flight and
//! failed calls remain auditable), a response log once a guard-approved
//! answer exists, and a daily usage-quota ledger row per scope.

use crate::error::StoreError;
use crate::persona::Persona;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a request row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Completed,
    Errored,
    Skipped,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "errored" => Some(Self::Errored),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// End-user feedback on a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Helpful,
    Neutral,
    NotHelpful,
}

impl Feedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Helpful => "helpful",
            Self::Neutral => "neutral",
            Self::NotHelpful => "not_helpful",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "helpful" => Some(Self::Helpful),
            "neutral" => Some(Self::Neutral),
            "not_helpful" => Some(Self::NotHelpful),
            _ => None,
        }
    }
}

/// Anchor for a multi-turn conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: i64,
    pub persona: Persona,
    /// Which surface of the platform started the session ("blog", "pit", ...).
    pub origin_app: String,
    pub class_id: Option<i64>,
    /// Short free-text descriptor of the active context ("PIT 2.º período").
    pub context_descriptor: String,
    /// Opaque payload the Context Broker can rebuild the context from.
    pub context_payload: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_interaction_at: DateTime<Utc>,
}

/// Fields needed to create a session on a first turn.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub persona: Persona,
    pub origin_app: String,
    pub class_id: Option<i64>,
    pub context_descriptor: String,
    pub context_payload: serde_json::Value,
}

/// One audit row per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: i64,
    pub session_id: Uuid,
    pub user_id: i64,
    pub persona: Persona,
    pub origin_app: String,
    pub raw_query: String,
    pub optimized_prompt: String,
    /// Structured diagnostic payload from the optimizer call.
    pub optimizer_trace: serde_json::Value,
    pub intent_label: String,
    /// Model the optimizer suggested (may be empty).
    pub suggested_model: String,
    /// Model the router actually resolved; set on completion.
    pub resolved_model: String,
    /// Serialized context snapshot used for this turn.
    pub context_snapshot: serde_json::Value,
    pub status: RequestStatus,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_estimate: f64,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields known before the provider call; the rest is filled on completion.
#[derive(Debug, Clone)]
pub struct RequestDraft {
    pub session_id: Uuid,
    pub user_id: i64,
    pub persona: Persona,
    pub origin_app: String,
    pub raw_query: String,
    pub optimized_prompt: String,
    pub optimizer_trace: serde_json::Value,
    pub intent_label: String,
    pub suggested_model: String,
    pub context_snapshot: serde_json::Value,
}

/// Completion data recorded when a turn succeeds.
#[derive(Debug, Clone)]
pub struct CompletionStats {
    pub resolved_model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: f64,
    pub latency_ms: u64,
}

impl CompletionStats {
    /// Stats for a cache hit: zero cost, zero latency, zero tokens.
    pub fn cached(resolved_model: impl Into<String>) -> Self {
        Self {
            resolved_model: resolved_model.into(),
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            latency_ms: 0,
        }
    }
}

/// One-to-one with a completed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseLog {
    pub request_id: i64,
    pub response_text: String,
    /// Opaque provider metadata (raw completion payload or cache marker).
    pub model_metadata: serde_json::Value,
    /// The guardrail verdict recorded for this answer.
    pub guardrail_decision: serde_json::Value,
    pub cache_hit: bool,
    pub user_feedback: Option<Feedback>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create a response log.
#[derive(Debug, Clone)]
pub struct ResponseDraft {
    pub request_id: i64,
    pub response_text: String,
    pub model_metadata: serde_json::Value,
    pub guardrail_decision: serde_json::Value,
    pub cache_hit: bool,
}

/// The entity a usage ceiling applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaScope {
    User,
    Class,
}

impl QuotaScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Class => "class",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "class" => Some(Self::Class),
            _ => None,
        }
    }
}

/// Identifies the ledger row a usage registration lands on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaKey {
    pub scope: QuotaScope,
    pub user_id: Option<i64>,
    pub class_id: Option<i64>,
}

impl QuotaKey {
    pub fn for_user(user_id: i64, class_id: Option<i64>) -> Self {
        Self {
            scope: QuotaScope::User,
            user_id: Some(user_id),
            class_id,
        }
    }
}

/// Configured ceilings applied when a quota row is lazily created.
#[derive(Debug, Clone, Copy)]
pub struct QuotaLimits {
    pub max_requests: u32,
    pub max_cost: f64,
}

/// A daily usage-quota ledger row.
///
/// Counters are monotonically non-decreasing within a period; a new day gets
/// a fresh row instead of resetting the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageQuota {
    pub id: i64,
    pub scope: QuotaScope,
    pub user_id: Option<i64>,
    pub class_id: Option<i64>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub max_requests: u32,
    pub max_cost: f64,
    pub requests_made: u32,
    pub cost_accumulated: f64,
}

impl UsageQuota {
    /// Whether another request would exceed the request-count ceiling.
    pub fn request_ceiling_reached(&self) -> bool {
        self.max_requests > 0 && self.requests_made >= self.max_requests
    }

    /// Whether adding `projected_cost` would exceed the cost ceiling.
    pub fn cost_ceiling_exceeded(&self, projected_cost: f64) -> bool {
        self.max_cost > 0.0 && self.cost_accumulated + projected_cost > self.max_cost
    }
}

/// Persistence boundary for the audit trail and the quota ledger.
///
/// Implementations back this with a shared relational store so multiple
/// service instances observe the same counters.
#[async_trait]
pub trait AuditStore: Send + Sync {
    // --- Sessions ---
    async fn create_session(&self, new: NewSession) -> std::result::Result<Session, StoreError>;
    async fn find_session(
        &self,
        session_id: Uuid,
        user_id: i64,
    ) -> std::result::Result<Option<Session>, StoreError>;
    /// Bump `last_interaction_at`; called on every turn.
    async fn touch_session(&self, session_id: Uuid) -> std::result::Result<(), StoreError>;

    // --- Requests ---
    async fn create_request(&self, draft: RequestDraft) -> std::result::Result<i64, StoreError>;
    async fn get_request(
        &self,
        id: i64,
    ) -> std::result::Result<Option<RequestRecord>, StoreError>;
    async fn mark_request_completed(
        &self,
        id: i64,
        stats: CompletionStats,
    ) -> std::result::Result<(), StoreError>;
    async fn mark_request_errored(&self, id: i64) -> std::result::Result<(), StoreError>;
    /// Requests (with their response logs, if any) for a session, oldest first.
    async fn requests_for_session(
        &self,
        session_id: Uuid,
    ) -> std::result::Result<Vec<(RequestRecord, Option<ResponseLog>)>, StoreError>;

    // --- Response logs ---
    async fn create_response_log(
        &self,
        draft: ResponseDraft,
    ) -> std::result::Result<(), StoreError>;
    async fn response_log_for(
        &self,
        request_id: i64,
    ) -> std::result::Result<Option<ResponseLog>, StoreError>;
    /// Record end-user feedback. Returns false when the request has no
    /// response log or belongs to another user. Idempotent.
    async fn set_feedback(
        &self,
        request_id: i64,
        user_id: i64,
        feedback: Feedback,
    ) -> std::result::Result<bool, StoreError>;

    // --- Usage quotas ---
    /// Resolve or lazily create the quota row for (key, day).
    async fn get_or_create_quota(
        &self,
        key: &QuotaKey,
        day: NaiveDate,
        defaults: QuotaLimits,
    ) -> std::result::Result<UsageQuota, StoreError>;
    /// Atomically increment both counters. The increment is conditional on
    /// the request ceiling not being consumed already — returns false when
    /// the row was not updated, so concurrent turns cannot jointly overshoot.
    async fn register_usage(
        &self,
        quota_id: i64,
        cost: f64,
    ) -> std::result::Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Completed,
            RequestStatus::Errored,
            RequestStatus::Skipped,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("bogus"), None);
    }

    #[test]
    fn feedback_round_trip() {
        assert_eq!(Feedback::parse("helpful"), Some(Feedback::Helpful));
        assert_eq!(Feedback::parse("not_helpful"), Some(Feedback::NotHelpful));
        assert_eq!(Feedback::parse("great"), None);
        assert_eq!(Feedback::NotHelpful.as_str(), "not_helpful");
    }

    #[test]
    fn quota_ceilings() {
        let quota = UsageQuota {
            id: 1,
            scope: QuotaScope::User,
            user_id: Some(1),
            class_id: None,
            period_start: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            max_requests: 2,
            max_cost: 0.05,
            requests_made: 1,
            cost_accumulated: 0.02,
        };
        assert!(!quota.request_ceiling_reached());
        assert!(quota.cost_ceiling_exceeded(0.04));
        assert!(!quota.cost_ceiling_exceeded(0.02));

        let full = UsageQuota {
            requests_made: 2,
            ..quota
        };
        assert!(full.request_ceiling_reached());
    }

    #[test]
    fn unlimited_quota_never_trips() {
        let quota = UsageQuota {
            id: 1,
            scope: QuotaScope::User,
            user_id: Some(1),
            class_id: None,
            period_start: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            max_requests: 0,
            max_cost: 0.0,
            requests_made: 10_000,
            cost_accumulated: 999.0,
        };
        assert!(!quota.request_ceiling_reached());
        assert!(!quota.cost_ceiling_exceeded(1.0));
    }

    #[test]
    fn cached_stats_are_zeroed() {
        let stats = CompletionStats::cached("gpt-5-mini");
        assert_eq!(stats.cost, 0.0);
        assert_eq!(stats.latency_ms, 0);
        assert_eq!(stats.input_tokens, 0);
        assert_eq!(stats.resolved_model, "gpt-5-mini");
    }
}
