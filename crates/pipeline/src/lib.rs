//! Request orchestration for the Tutoria AI pipeline.
//!
//! The [`Orchestrator`] runs one turn end to end: context assembly, prompt
//! optimization, model routing, cache probe, quota gate, provider call,
//! guard check, and audit persistence. Each stage also stands alone for
//! direct use and testing.

pub mod cache;
pub mod guard;
pub mod optimizer;
pub mod orchestrator;
pub mod prompt;
pub mod quota;
pub mod router;

pub use cache::{CachedResponse, InMemoryCache, ResponseCache, cache_key};
pub use guard::{GuardVerdict, ResponseGuard};
pub use optimizer::{OptimizerResult, PromptOptimizer};
pub use orchestrator::{Orchestrator, TurnOutcome, TurnRequest};
pub use prompt::PromptBuilder;
pub use quota::QuotaManager;
pub use router::ModelRouter;
