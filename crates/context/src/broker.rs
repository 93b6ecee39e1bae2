//! Context broker: assembles the pedagogical payload for one turn.
//!
//! The broker asks the [`SchoolDirectory`] for everything it might need and
//! folds the answers into a single JSON object keyed by section. Lookups are
//! best-effort: a failing collaborator drops its section and the turn goes on
//! with less context.

use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;
use tutoria_core::{Persona, SourceError, UserRef};

use crate::directory::{ClassRef, ChecklistProgress, RosterEntry, SchoolDirectory};

const COUNCIL_LIMIT: usize = 5;
const PROJECT_LIMIT: usize = 3;
const FOCUS_LIMIT: usize = 2;

/// Minimum Jaro-Winkler similarity for a query token to hit a roster name.
const NAME_MATCH_THRESHOLD: f64 = 0.85;
/// Query tokens shorter than this never participate in name matching.
const NAME_TOKEN_MIN_LEN: usize = 3;

/// Everything the broker needs to know about one turn.
pub struct ContextRequest<'a> {
    pub user: &'a UserRef,
    pub persona: Persona,
    pub class: Option<&'a ClassRef>,
    pub origin_app: Option<&'a str>,
    pub extras: Map<String, Value>,
    pub raw_query: &'a str,
}

/// The assembled context for one turn.
#[derive(Debug, Clone)]
pub struct ContextPayload {
    pub payload: Value,
}

impl ContextPayload {
    pub fn section(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Builds the per-turn context payload from directory lookups.
pub struct ContextBroker {
    directory: Arc<dyn SchoolDirectory>,
}

impl ContextBroker {
    pub fn new(directory: Arc<dyn SchoolDirectory>) -> Self {
        Self { directory }
    }

    pub async fn build_context(&self, request: &ContextRequest<'_>) -> ContextPayload {
        let mut context = Map::new();
        context.insert(
            "user".to_string(),
            json!({
                "id": request.user.id,
                "name": request.user.name,
                "role": request.user.role,
            }),
        );
        context.insert("persona".to_string(), json!(request.persona.as_str()));
        context.insert("origin_app".to_string(), json!(request.origin_app));
        context.insert("extras".to_string(), Value::Object(request.extras.clone()));

        if let Some(class) = request.class {
            context.insert(
                "class".to_string(),
                json!({
                    "id": class.id,
                    "name": class.name,
                    "year": class.academic_year,
                }),
            );
            context.insert(
                "class_overview".to_string(),
                self.class_overview(class.id).await,
            );
        }

        match request.persona {
            Persona::Student => {
                context.insert(
                    "learner_profile".to_string(),
                    self.learner_profile(request.user.id, request.class).await,
                );
            }
            Persona::Teacher => {
                self.teacher_sections(&mut context, request).await;
            }
            _ => {}
        }

        ContextPayload {
            payload: Value::Object(context),
        }
    }

    async fn class_overview(&self, class_id: i64) -> Value {
        let counts = soften(
            self.directory.class_overview_counts(class_id).await,
            "class_overview_counts",
        )
        .unwrap_or_default();
        let peers = soften(self.directory.class_roster(class_id).await, "class_roster")
            .unwrap_or_default();
        json!({
            "students": counts.students,
            "active_projects": counts.active_projects,
            "submitted_plans": counts.submitted_plans,
            "peers": peers,
        })
    }

    async fn learner_profile(&self, student_id: i64, class: Option<&ClassRef>) -> Value {
        let class_id = class.map(|c| c.id);
        let grade_level = class.and_then(|c| extract_grade_level(&c.name));
        let age_hint = grade_level.and_then(estimate_age);

        let snapshot = soften(
            self.directory.learner_snapshot(student_id, class_id).await,
            "learner_snapshot",
        )
        .flatten();
        let plan = soften(
            self.directory.plan_status(student_id, class_id).await,
            "plan_status",
        )
        .flatten();
        let checklists = soften(
            self.directory.checklist_progress(student_id, class_id).await,
            "checklist_progress",
        )
        .unwrap_or_default();
        let focus = checklist_focus(&checklists);
        let projects = soften(
            self.directory
                .recent_projects(student_id, class_id, PROJECT_LIMIT)
                .await,
            "recent_projects",
        )
        .unwrap_or_default();
        let council = match class_id {
            Some(id) => soften(
                self.directory.recent_council_decisions(id, COUNCIL_LIMIT).await,
                "recent_council_decisions",
            )
            .unwrap_or_default(),
            None => Vec::new(),
        };

        json!({
            "grade_level": grade_level,
            "age_hint": age_hint,
            "learner_snapshot": snapshot,
            "plan": plan,
            "checklists": checklists,
            "checklist_focus": focus,
            "recent_projects": projects,
            "council_notes": council,
        })
    }

    async fn teacher_sections(&self, context: &mut Map<String, Value>, request: &ContextRequest<'_>) {
        let class_id = request.class.map(|c| c.id);
        let focus = soften(
            self.directory
                .teacher_focus_areas(request.user.id, class_id)
                .await,
            "teacher_focus_areas",
        )
        .unwrap_or_default();
        context.insert("focus_areas".to_string(), json!(focus));

        if let Some(id) = class_id {
            if let Some(aggregate) = soften(
                self.directory.class_checklist_aggregate(id).await,
                "class_checklist_aggregate",
            )
            .flatten()
            {
                context.insert("class_aggregate".to_string(), json!(aggregate));
            }
            let roster = soften(self.directory.class_roster(id).await, "class_roster")
                .unwrap_or_default();
            if let Some(student) = match_student(&roster, request.raw_query) {
                context.insert("student_brief".to_string(), self.student_brief(student, id).await);
            }
        } else {
            // No class selected: list the candidates so the prompt can ask
            // the teacher to pick one.
            let classes = soften(
                self.directory.teacher_classes(request.user.id).await,
                "teacher_classes",
            )
            .unwrap_or_default();
            if classes.len() > 1 {
                context.insert(
                    "disambiguation".to_string(),
                    json!({
                        "type": "class",
                        "options": classes
                            .iter()
                            .map(|c| json!({"id": c.id, "name": c.name}))
                            .collect::<Vec<_>>(),
                    }),
                );
            }
        }
    }

    async fn student_brief(&self, student: &RosterEntry, class_id: i64) -> Value {
        let snapshot = soften(
            self.directory
                .learner_snapshot(student.id, Some(class_id))
                .await,
            "learner_snapshot",
        )
        .flatten();
        json!({
            "student": {"id": student.id, "name": student.name},
            "checklist_average": student.checklist_average,
            "checklist_best": student.checklist_best,
            "snapshot": snapshot,
        })
    }
}

/// Collapse a collaborator error into `None`, logging that the section is
/// missing.
fn soften<T>(result: Result<T, SourceError>, section: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(section, error = %err, "secção de contexto indisponível");
            None
        }
    }
}

/// Grade parsed from a class name like `4.º A` or `7º B`.
fn extract_grade_level(class_name: &str) -> Option<u8> {
    let ordinal = class_name.find('º')?;
    let digits: String = class_name[..ordinal]
        .chars()
        .rev()
        .skip_while(|c| *c == '.')
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    let grade: u8 = digits.chars().rev().collect::<String>().parse().ok()?;
    (1..=12).contains(&grade).then_some(grade)
}

/// Approximate age for Portuguese basic-education grades.
fn estimate_age(grade_level: u8) -> Option<u8> {
    (1..=9).contains(&grade_level).then(|| grade_level + 5)
}

/// The one or two pending checklist items the turn should spotlight.
///
/// Items from templates closest to completion come first; a second pick
/// prefers a different template so the focus spans subjects.
fn checklist_focus(checklists: &[ChecklistProgress]) -> Vec<Value> {
    let mut candidates: Vec<(&ChecklistProgress, &crate::directory::PendingItem)> = checklists
        .iter()
        .flat_map(|progress| progress.pending_items.iter().map(move |item| (progress, item)))
        .collect();
    candidates.sort_by(|a, b| {
        b.0.percent_complete
            .partial_cmp(&a.0.percent_complete)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.order.cmp(&b.1.order))
    });

    let mut focus = Vec::new();
    let mut seen_templates: Vec<&str> = Vec::new();
    for (progress, item) in &candidates {
        if focus.len() == 1 && seen_templates.contains(&progress.template.as_str()) {
            continue;
        }
        focus.push(json!({
            "template": progress.template,
            "item": item.item,
            "code": item.code,
            "percent_complete": progress.percent_complete,
        }));
        seen_templates.push(progress.template.as_str());
        if focus.len() >= FOCUS_LIMIT {
            return focus;
        }
    }
    if focus.len() < FOCUS_LIMIT {
        // Fall back to same-template items when there is nothing else.
        for (progress, item) in &candidates {
            let already = focus.iter().any(|entry| entry.get("code") == Some(&json!(item.code)));
            if already {
                continue;
            }
            focus.push(json!({
                "template": progress.template,
                "item": item.item,
                "code": item.code,
                "percent_complete": progress.percent_complete,
            }));
            if focus.len() >= FOCUS_LIMIT {
                break;
            }
        }
    }
    focus
}

/// The roster student the query unambiguously names, if any.
fn match_student<'a>(roster: &'a [RosterEntry], raw_query: &str) -> Option<&'a RosterEntry> {
    let query_tokens: Vec<String> = raw_query
        .split(|c: char| !c.is_alphabetic())
        .filter(|token| token.chars().count() >= NAME_TOKEN_MIN_LEN)
        .map(str::to_lowercase)
        .collect();
    if query_tokens.is_empty() {
        return None;
    }

    let mut matched: Vec<&RosterEntry> = Vec::new();
    for entry in roster {
        let hit = entry.name.split_whitespace().any(|name_token| {
            let name_token = name_token.to_lowercase();
            query_tokens
                .iter()
                .any(|qt| strsim::jaro_winkler(qt, &name_token) >= NAME_MATCH_THRESHOLD)
        });
        if hit {
            matched.push(entry);
        }
    }
    // Ambiguous hits mean the query names a surname several students share,
    // or nothing at all. Only a unique match earns a brief.
    match matched.as_slice() {
        [only] => Some(only),
        _ => None,
    }
}
