//! In-memory `SchoolDirectory` backed by fixed data.
//!
//! Backs the test suite and the CLI demo mode. Individual lookups can be
//! told to fail so best-effort behavior in the broker is exercisable.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use tutoria_core::SourceError;

use crate::directory::{
    ClassAggregate, ClassCounts, ClassRef, ChecklistProgress, CouncilNote, FocusArea,
    LearnerSnapshot, PendingItem, PlanStatus, ProjectSummary, RosterEntry, SchoolDirectory,
    TemplateStrength,
};

type StudentKey = (i64, Option<i64>);

/// Fixed-data directory for tests and demos.
#[derive(Default)]
pub struct FixtureDirectory {
    snapshots: HashMap<StudentKey, LearnerSnapshot>,
    plans: HashMap<StudentKey, PlanStatus>,
    checklists: HashMap<StudentKey, Vec<ChecklistProgress>>,
    aggregates: HashMap<i64, ClassAggregate>,
    council: HashMap<i64, Vec<CouncilNote>>,
    projects: HashMap<StudentKey, Vec<ProjectSummary>>,
    focus_areas: HashMap<StudentKey, Vec<FocusArea>>,
    classes_by_teacher: HashMap<i64, Vec<ClassRef>>,
    rosters: HashMap<i64, Vec<RosterEntry>>,
    counts: HashMap<i64, ClassCounts>,
    failing: HashSet<&'static str>,
}

impl FixtureDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small populated school: one class, one teacher, three students.
    pub fn sample() -> Self {
        let mut directory = Self::new();
        let class = ClassRef {
            id: 1,
            name: "4.º A".to_string(),
            academic_year: "2025/2026".to_string(),
        };
        directory.add_teacher_class(100, class.clone());
        directory.set_roster(
            1,
            vec![
                RosterEntry {
                    id: 1,
                    name: "Mariana Silva".to_string(),
                    checklist_average: 62.5,
                    checklist_best: 80.0,
                },
                RosterEntry {
                    id: 2,
                    name: "Tomás Ferreira".to_string(),
                    checklist_average: 41.0,
                    checklist_best: 55.0,
                },
                RosterEntry {
                    id: 3,
                    name: "Beatriz Costa".to_string(),
                    checklist_average: 78.0,
                    checklist_best: 92.0,
                },
            ],
        );
        directory.set_counts(
            1,
            ClassCounts {
                students: 3,
                active_projects: 2,
                submitted_plans: 3,
            },
        );
        directory.set_snapshot(
            1,
            Some(1),
            LearnerSnapshot {
                summary: "Progresso consistente em leitura e escrita.".to_string(),
                strengths: "Leitura expressiva, trabalho em grupo.".to_string(),
                needs: "Tabuadas do 7 e do 8.".to_string(),
                competencies: vec!["comunicação".to_string(), "cooperação".to_string()],
                last_checklist_update: NaiveDate::from_ymd_opt(2026, 2, 10),
            },
        );
        directory.set_plan(
            1,
            Some(1),
            PlanStatus {
                period: "2.º período".to_string(),
                status: "active".to_string(),
                objectives: "Terminar o texto livre e rever a tabuada do 7.".to_string(),
            },
        );
        directory.set_checklists(
            1,
            Some(1),
            vec![
                ChecklistProgress {
                    template: "Matemática 4.º ano".to_string(),
                    percent_complete: 65.0,
                    last_updated: Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).single(),
                    pending_items: vec![
                        PendingItem {
                            item: "Tabuada do 7".to_string(),
                            code: "MAT-4.12".to_string(),
                            status: "IN_PROGRESS".to_string(),
                            order: 12,
                        },
                        PendingItem {
                            item: "Divisão com resto".to_string(),
                            code: "MAT-4.15".to_string(),
                            status: "NOT_STARTED".to_string(),
                            order: 15,
                        },
                    ],
                },
                ChecklistProgress {
                    template: "Português 4.º ano".to_string(),
                    percent_complete: 80.0,
                    last_updated: Utc.with_ymd_and_hms(2026, 2, 8, 14, 30, 0).single(),
                    pending_items: vec![PendingItem {
                        item: "Texto argumentativo".to_string(),
                        code: "PT-4.09".to_string(),
                        status: "IN_PROGRESS".to_string(),
                        order: 9,
                    }],
                },
            ],
        );
        directory.set_aggregate(
            1,
            ClassAggregate {
                overall_percent: 58.2,
                top_pending: vec![
                    "Tabuada do 7".to_string(),
                    "Texto argumentativo".to_string(),
                ],
                template_strengths: vec![
                    TemplateStrength {
                        template: "Português 4.º ano".to_string(),
                        average_percent: 71.4,
                    },
                    TemplateStrength {
                        template: "Matemática 4.º ano".to_string(),
                        average_percent: 52.9,
                    },
                ],
            },
        );
        directory.set_council(
            1,
            vec![CouncilNote {
                summary: "Reorganizar os cantinhos de leitura".to_string(),
                category: "organização".to_string(),
                status: "approved".to_string(),
            }],
        );
        directory.set_projects(
            1,
            Some(1),
            vec![ProjectSummary {
                title: "Jornal da turma".to_string(),
                state: "ACTIVE".to_string(),
                updated_at: Utc.with_ymd_and_hms(2026, 2, 9, 11, 0, 0).single(),
            }],
        );
        directory.set_focus_areas(
            100,
            Some(1),
            vec![FocusArea {
                focus_text: "Reforçar cálculo mental no grupo do Tomás".to_string(),
                priority: 1,
                created_at: Utc.with_ymd_and_hms(2026, 1, 20, 8, 0, 0).single().unwrap_or_else(Utc::now),
            }],
        );
        directory
    }

    /// Make the named lookup return `SourceError` from now on.
    pub fn fail_on(&mut self, method: &'static str) {
        self.failing.insert(method);
    }

    pub fn set_snapshot(&mut self, student: i64, class: Option<i64>, snapshot: LearnerSnapshot) {
        self.snapshots.insert((student, class), snapshot);
    }

    pub fn set_plan(&mut self, student: i64, class: Option<i64>, plan: PlanStatus) {
        self.plans.insert((student, class), plan);
    }

    pub fn set_checklists(
        &mut self,
        student: i64,
        class: Option<i64>,
        progress: Vec<ChecklistProgress>,
    ) {
        self.checklists.insert((student, class), progress);
    }

    pub fn set_aggregate(&mut self, class: i64, aggregate: ClassAggregate) {
        self.aggregates.insert(class, aggregate);
    }

    pub fn set_council(&mut self, class: i64, notes: Vec<CouncilNote>) {
        self.council.insert(class, notes);
    }

    pub fn set_projects(&mut self, student: i64, class: Option<i64>, projects: Vec<ProjectSummary>) {
        self.projects.insert((student, class), projects);
    }

    pub fn set_focus_areas(&mut self, teacher: i64, class: Option<i64>, areas: Vec<FocusArea>) {
        self.focus_areas.insert((teacher, class), areas);
    }

    pub fn add_teacher_class(&mut self, teacher: i64, class: ClassRef) {
        self.classes_by_teacher.entry(teacher).or_default().push(class);
    }

    pub fn set_roster(&mut self, class: i64, roster: Vec<RosterEntry>) {
        self.rosters.insert(class, roster);
    }

    pub fn set_counts(&mut self, class: i64, counts: ClassCounts) {
        self.counts.insert(class, counts);
    }

    fn check(&self, method: &'static str) -> Result<(), SourceError> {
        if self.failing.contains(method) {
            return Err(SourceError::Unavailable(method.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SchoolDirectory for FixtureDirectory {
    async fn learner_snapshot(
        &self,
        student_id: i64,
        class_id: Option<i64>,
    ) -> Result<Option<LearnerSnapshot>, SourceError> {
        self.check("learner_snapshot")?;
        Ok(self.snapshots.get(&(student_id, class_id)).cloned())
    }

    async fn plan_status(
        &self,
        student_id: i64,
        class_id: Option<i64>,
    ) -> Result<Option<PlanStatus>, SourceError> {
        self.check("plan_status")?;
        Ok(self.plans.get(&(student_id, class_id)).cloned())
    }

    async fn checklist_progress(
        &self,
        student_id: i64,
        class_id: Option<i64>,
    ) -> Result<Vec<ChecklistProgress>, SourceError> {
        self.check("checklist_progress")?;
        Ok(self
            .checklists
            .get(&(student_id, class_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn class_checklist_aggregate(
        &self,
        class_id: i64,
    ) -> Result<Option<ClassAggregate>, SourceError> {
        self.check("class_checklist_aggregate")?;
        Ok(self.aggregates.get(&class_id).cloned())
    }

    async fn recent_council_decisions(
        &self,
        class_id: i64,
        limit: usize,
    ) -> Result<Vec<CouncilNote>, SourceError> {
        self.check("recent_council_decisions")?;
        let mut notes = self.council.get(&class_id).cloned().unwrap_or_default();
        notes.truncate(limit);
        Ok(notes)
    }

    async fn recent_projects(
        &self,
        student_id: i64,
        class_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ProjectSummary>, SourceError> {
        self.check("recent_projects")?;
        let mut projects = self
            .projects
            .get(&(student_id, class_id))
            .cloned()
            .unwrap_or_default();
        projects.truncate(limit);
        Ok(projects)
    }

    async fn teacher_focus_areas(
        &self,
        teacher_id: i64,
        class_id: Option<i64>,
    ) -> Result<Vec<FocusArea>, SourceError> {
        self.check("teacher_focus_areas")?;
        Ok(self
            .focus_areas
            .get(&(teacher_id, class_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn teacher_classes(&self, teacher_id: i64) -> Result<Vec<ClassRef>, SourceError> {
        self.check("teacher_classes")?;
        Ok(self
            .classes_by_teacher
            .get(&teacher_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn class_roster(&self, class_id: i64) -> Result<Vec<RosterEntry>, SourceError> {
        self.check("class_roster")?;
        Ok(self.rosters.get(&class_id).cloned().unwrap_or_default())
    }

    async fn class_overview_counts(&self, class_id: i64) -> Result<ClassCounts, SourceError> {
        self.check("class_overview_counts")?;
        Ok(self.counts.get(&class_id).cloned().unwrap_or_default())
    }
}
