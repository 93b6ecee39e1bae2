//! SQLite persistence for the Tutoria audit trail.
//!
//! One database holds four tables:
//! - `ai_sessions` — conversation anchors
//! - `ai_requests` — one row per turn, created pending before the provider call
//! - `ai_response_logs` — one row per guard-approved answer (or cache hit)
//! - `usage_quotas` — daily per-scope ledger rows with conditional increments

pub mod sqlite;

pub use sqlite::SqliteAuditStore;
