//! Caller identity summary.
//!
//! User and role management live in a collaborator subsystem; the pipeline
//! only needs this compact reference for context assembly and audit rows.

use serde::{Deserialize, Serialize};

/// A reference to the authenticated caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
    pub name: String,
    /// Platform role string (e.g. "aluno", "professor").
    pub role: String,
}

impl UserRef {
    pub fn new(id: i64, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            role: role.into(),
        }
    }
}
