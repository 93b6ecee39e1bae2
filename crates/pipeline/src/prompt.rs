//! System-prompt assembly.
//!
//! Builds the pt-PT pedagogical system prompt from the context payload:
//! interlocutor profile, checklist focus, language policy, optional
//! pedagogical-model guidelines, and persona-specific guidance.

use serde_json::Value;
use tutoria_config::PedagogyConfig;
use tutoria_core::persona::Persona;

const INTRO: &str = "És um assistente pedagógico alinhado com o Movimento da Escola Moderna. \
     Foca-te em promover autonomia, cooperação e participação democrática. ";

const DEFAULT_GUIDELINES: &str = "Princípios MEM: construtivismo social; cooperação; autonomia; participação democrática. \
     Instrumentos: Checklists de Aprendizagens (autoavaliação/validação), PIT (planeamento individual), \
     Projetos (trabalho cooperativo), Diário (reflexão/registo), Conselho (decisões coletivas). \
     Ao responder: sugere sempre próximos passos concretos (individual, em par/pequeno grupo, com professor/família), \
     liga-os a um instrumento MEM adequado e usa linguagem clara e acolhedora (pt-PT).";

const STUDENT_GUIDANCE: &[&str] = &[
    "Responde no máximo em 3 frases curtas ou 3 pontos simples.",
    "Usa vocabulário acessível e orienta um passo de cada vez.",
    "Escolhe apenas 1 objetivo em destaque (ou 2 no máximo) e sugere passos concretos e rápidos.",
    "Inclui uma sugestão de evidência ou forma de mostrar progresso.",
    "Organiza a resposta como lista numerada: 1) tarefa individual/PIT, 2) trabalho com um colega ou pequeno grupo (indica como pedir apoio), 3) momento com o professor ou a família.",
    "Evita perguntas abertas; termina convidando o aluno a dizer se quer mais ideias adicionais.",
];

/// Builds the per-turn system prompt.
pub struct PromptBuilder {
    pedagogy: PedagogyConfig,
}

impl PromptBuilder {
    pub fn new(pedagogy: PedagogyConfig) -> Self {
        Self { pedagogy }
    }

    pub fn build_system_prompt(&self, persona: Persona, context: &Value) -> String {
        let profile = &context["learner_profile"];
        let mut lines = vec![
            INTRO.to_string(),
            format!("Perfil do interlocutor: {}.", profile_text(profile)),
            format!(
                "Objetivos prioritários da checklist: {}.",
                focus_text(&profile["checklist_focus"])
            ),
            "Não menciones modelos de IA, prompts internos ou detalhes técnicos.".to_string(),
            "Se o pedido estiver em português, responde em Português Europeu (pt-PT).".to_string(),
        ];
        if self.pedagogy.enforce_pt {
            lines.push(
                "Evita palavras/frases noutras línguas; se surgirem, reescreve para pt-PT."
                    .to_string(),
            );
        }
        if self.pedagogy.guidelines_enabled {
            let block = self
                .pedagogy
                .guidelines
                .as_deref()
                .unwrap_or(DEFAULT_GUIDELINES);
            lines.push(format!("MEM: {block}"));
        }

        if persona == Persona::Student {
            lines.extend(STUDENT_GUIDANCE.iter().map(|s| s.to_string()));
        } else {
            lines.push(
                "Adapta o discurso ao papel do utilizador mantendo foco pedagógico.".to_string(),
            );
        }

        lines.push(format!("Contexto adicional: {context}."));

        if let Some(clarification) = class_clarification(context) {
            lines.push(clarification);
        }
        lines.join("\n")
    }
}

fn profile_text(profile: &Value) -> String {
    let mut text = "Aluno".to_string();
    if let Some(grade) = profile["grade_level"].as_u64() {
        text.push_str(&format!(" do {grade}º ano"));
    }
    if let Some(age) = profile["age_hint"].as_u64() {
        text.push_str(&format!(", aproximadamente {age} anos"));
    }
    text
}

fn focus_text(focus: &Value) -> String {
    let items: Vec<String> = focus
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| {
            match (item["template"].as_str(), item["item"].as_str()) {
                (Some(template), Some(text)) => Some(format!("{template}: {text}")),
                _ => None,
            }
        })
        .collect();
    if items.is_empty() {
        "sem itens em destaque".to_string()
    } else {
        items.join("; ")
    }
}

/// One extra line asking the teacher to confirm a class when several are
/// plausible.
fn class_clarification(context: &Value) -> Option<String> {
    let block = context.get("disambiguation")?;
    if block["type"].as_str() != Some("class") {
        return None;
    }
    let options: Vec<&str> = block["options"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|option| option["name"].as_str())
        .collect();
    if options.is_empty() {
        return None;
    }
    Some(format!(
        "Nota: o professor tem várias turmas. Confirme uma turma: {}.",
        options.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> PromptBuilder {
        PromptBuilder::new(PedagogyConfig::default())
    }

    #[test]
    fn student_prompt_has_profile_and_numbered_steps() {
        let context = json!({
            "learner_profile": {
                "grade_level": 4,
                "age_hint": 9,
                "checklist_focus": [
                    {"template": "Matemática", "item": "Tabuada do 7"},
                ],
            },
        });
        let prompt = builder().build_system_prompt(Persona::Student, &context);
        assert!(prompt.contains("Aluno do 4º ano, aproximadamente 9 anos"));
        assert!(prompt.contains("Matemática: Tabuada do 7"));
        assert!(prompt.contains("lista numerada"));
        assert!(prompt.contains("pt-PT"));
    }

    #[test]
    fn non_student_prompt_skips_student_guidance() {
        let prompt = builder().build_system_prompt(Persona::Teacher, &json!({}));
        assert!(!prompt.contains("lista numerada"));
        assert!(prompt.contains("Adapta o discurso"));
        assert!(prompt.contains("sem itens em destaque"));
    }

    #[test]
    fn guidelines_block_is_opt_in() {
        let without = builder().build_system_prompt(Persona::Student, &json!({}));
        assert!(!without.contains("MEM: "));

        let with = PromptBuilder::new(PedagogyConfig {
            enforce_pt: true,
            guidelines_enabled: true,
            guidelines: None,
        })
        .build_system_prompt(Persona::Student, &json!({}));
        assert!(with.contains("MEM: Princípios MEM"));
    }

    #[test]
    fn disambiguation_appends_clarification() {
        let context = json!({
            "disambiguation": {
                "type": "class",
                "options": [{"id": 1, "name": "4.º A"}, {"id": 2, "name": "6.º B"}],
            },
        });
        let prompt = builder().build_system_prompt(Persona::Teacher, &context);
        assert!(prompt.ends_with("Confirme uma turma: 4.º A, 6.º B."));
    }

    #[test]
    fn language_enforcement_is_configurable() {
        let relaxed = PromptBuilder::new(PedagogyConfig {
            enforce_pt: false,
            guidelines_enabled: false,
            guidelines: None,
        })
        .build_system_prompt(Persona::Student, &json!({}));
        assert!(!relaxed.contains("Evita palavras/frases noutras línguas"));
    }
}
