//! Read-only interface to the school platform data.
//!
//! The pipeline never writes through this boundary. Every method is
//! best-effort from the broker's point of view: an `Err` collapses into an
//! absent section of the context payload, never into a failed turn.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tutoria_core::SourceError;

/// A class the caller belongs to or teaches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassRef {
    pub id: i64,
    pub name: String,
    pub academic_year: String,
}

/// One student as seen on a class roster, with their checklist standing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: i64,
    pub name: String,
    pub checklist_average: f64,
    pub checklist_best: f64,
}

/// Condensed pedagogical picture of one learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerSnapshot {
    pub summary: String,
    pub strengths: String,
    pub needs: String,
    pub competencies: Vec<String>,
    pub last_checklist_update: Option<NaiveDate>,
}

/// Status of the learner's current individual work plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStatus {
    pub period: String,
    pub status: String,
    pub objectives: String,
}

/// A checklist item the learner has not yet completed or validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingItem {
    pub item: String,
    pub code: String,
    pub status: String,
    pub order: i64,
}

/// Progress against one checklist template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistProgress {
    pub template: String,
    pub percent_complete: f64,
    pub last_updated: Option<DateTime<Utc>>,
    pub pending_items: Vec<PendingItem>,
}

/// Average completion for one template across a whole class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateStrength {
    pub template: String,
    pub average_percent: f64,
}

/// Class-wide checklist rollup for the teacher persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassAggregate {
    pub overall_percent: f64,
    pub top_pending: Vec<String>,
    pub template_strengths: Vec<TemplateStrength>,
}

/// A recent decision recorded by the class council.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilNote {
    pub summary: String,
    pub category: String,
    pub status: String,
}

/// A project the learner takes part in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub title: String,
    pub state: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// An active pedagogical focus a teacher registered for a class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusArea {
    pub focus_text: String,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
}

/// Roster and activity counts for a class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassCounts {
    pub students: i64,
    pub active_projects: i64,
    pub submitted_plans: i64,
}

/// Read-only view over the school platform consumed by the context broker.
#[async_trait]
pub trait SchoolDirectory: Send + Sync {
    async fn learner_snapshot(
        &self,
        student_id: i64,
        class_id: Option<i64>,
    ) -> Result<Option<LearnerSnapshot>, SourceError>;

    async fn plan_status(
        &self,
        student_id: i64,
        class_id: Option<i64>,
    ) -> Result<Option<PlanStatus>, SourceError>;

    async fn checklist_progress(
        &self,
        student_id: i64,
        class_id: Option<i64>,
    ) -> Result<Vec<ChecklistProgress>, SourceError>;

    async fn class_checklist_aggregate(
        &self,
        class_id: i64,
    ) -> Result<Option<ClassAggregate>, SourceError>;

    async fn recent_council_decisions(
        &self,
        class_id: i64,
        limit: usize,
    ) -> Result<Vec<CouncilNote>, SourceError>;

    async fn recent_projects(
        &self,
        student_id: i64,
        class_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ProjectSummary>, SourceError>;

    async fn teacher_focus_areas(
        &self,
        teacher_id: i64,
        class_id: Option<i64>,
    ) -> Result<Vec<FocusArea>, SourceError>;

    async fn teacher_classes(&self, teacher_id: i64) -> Result<Vec<ClassRef>, SourceError>;

    async fn class_roster(&self, class_id: i64) -> Result<Vec<RosterEntry>, SourceError>;

    async fn class_overview_counts(&self, class_id: i64) -> Result<ClassCounts, SourceError>;
}
