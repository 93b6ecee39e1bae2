//! # Tutoria Core
//!
//! Domain types, traits, and error definitions for the Tutoria AI request
//! orchestration pipeline. This crate has **zero framework dependencies** —
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem boundary is defined as a trait here. Implementations live
//! in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with fake/in-memory implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod audit;
pub mod error;
pub mod message;
pub mod persona;
pub mod provider;
pub mod user;

// Re-export key types at crate root for ergonomics
pub use audit::{
    AuditStore, CompletionStats, Feedback, NewSession, QuotaKey, QuotaLimits, QuotaScope,
    RequestDraft, RequestRecord, RequestStatus, ResponseDraft, ResponseLog, Session, UsageQuota,
};
pub use error::{PipelineError, ProviderError, Result, SourceError, StoreError};
pub use message::{ChatMessage, Role};
pub use persona::{Persona, intent};
pub use provider::{ChatCompletion, CompletionOptions, ProviderGateway, Usage};
pub use user::UserRef;
