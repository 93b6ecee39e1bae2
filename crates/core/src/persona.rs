//! Personas and intent labels.
//!
//! A persona is the caller's pedagogical role; it drives system-prompt tone,
//! default model tier, and quota ceilings. Intent labels are free-form
//! strings produced by the prompt optimizer — the well-known ones are listed
//! in [`intent`].

use serde::{Deserialize, Serialize};

/// The caller's pedagogical role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Student,
    Teacher,
    Guardian,
    Staff,
    Admin,
}

impl Persona {
    /// Map a platform role string to a persona.
    ///
    /// The school platform stores roles in Portuguese; anything unknown falls
    /// back to `Staff`.
    pub fn from_platform_role(role: &str) -> Self {
        match role {
            "aluno" | "student" => Self::Student,
            "professor" | "teacher" => Self::Teacher,
            "encarregado" | "guardian" => Self::Guardian,
            "admin" => Self::Admin,
            _ => Self::Staff,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Guardian => "guardian",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known intent labels emitted by the prompt optimizer.
///
/// The classifier is free-form; routing only special-cases these.
pub mod intent {
    /// Default when the optimizer reply carries no parsable intent line.
    pub const GENERAL: &str = "general";

    // High-effort intents — routed to the most capable tier.
    pub const PLANEAMENTO_PROLONGADO: &str = "planeamento_prolongado";
    pub const ANALISE_DADOS: &str = "analise_dados";
    pub const CONSELHO_COMPLEXO: &str = "conselho_complexo";

    // Short-form intents — routed to the mid tier.
    pub const FEEDBACK_CURTO: &str = "feedback_curto";
    pub const ORIENTACAO_IMEDIATA: &str = "orientacao_imediata";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_role_mapping() {
        assert_eq!(Persona::from_platform_role("aluno"), Persona::Student);
        assert_eq!(Persona::from_platform_role("professor"), Persona::Teacher);
        assert_eq!(
            Persona::from_platform_role("encarregado"),
            Persona::Guardian
        );
        assert_eq!(Persona::from_platform_role("admin"), Persona::Admin);
        assert_eq!(Persona::from_platform_role("auxiliar"), Persona::Staff);
    }

    #[test]
    fn serde_lowercase() {
        let json = serde_json::to_string(&Persona::Student).unwrap();
        assert_eq!(json, "\"student\"");
        let parsed: Persona = serde_json::from_str("\"teacher\"").unwrap();
        assert_eq!(parsed, Persona::Teacher);
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(Persona::Guardian.to_string(), "guardian");
    }
}
