//! Context assembly for the Tutoria AI request pipeline.
//!
//! The broker turns one caller + persona + optional class into a JSON
//! context payload. Source data comes through the read-only
//! [`SchoolDirectory`] trait; [`FixtureDirectory`] is the in-memory
//! implementation used by tests and the CLI demo mode.

pub mod broker;
pub mod directory;
pub mod fixture;

pub use broker::{ContextBroker, ContextPayload, ContextRequest};
pub use directory::{
    ClassAggregate, ClassCounts, ClassRef, ChecklistProgress, CouncilNote, FocusArea,
    LearnerSnapshot, PendingItem, PlanStatus, ProjectSummary, RosterEntry, SchoolDirectory,
    TemplateStrength,
};
pub use fixture::FixtureDirectory;
