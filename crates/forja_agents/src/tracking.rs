//! Work-item content built from the formal requirements.
//!
//! Titles, tags, HTML bodies and the story-point estimate used when the
//! agents create PBIs and tasks in the issue tracker.

use forja_clients::{IssueTracker, NewWorkItem, WorkItem, WorkItemQuery, WorkItemType, AI_TAG};
use forja_core::FormalRequirements;
use tracing::info;

use crate::services::soft;

/// Upper text-length bounds (exclusive) for each story-point value.
const STORY_POINT_THRESHOLDS: [(usize, u32); 6] = [
    (100, 1),
    (200, 2),
    (350, 3),
    (500, 5),
    (700, 8),
    (1000, 13),
];

/// Largest estimate, for anything longer than the last threshold.
const MAX_STORY_POINTS: u32 = 21;

/// Objective characters kept in a PBI title.
const TITLE_OBJECTIVE_CHARS: usize = 80;

/// Estimate story points from the length of the objective, inputs and outputs.
pub fn estimate_story_points(record: &FormalRequirements) -> u32 {
    let length = record.objetivo_funcional.chars().count()
        + record.entradas_esperadas.chars().count()
        + record.salidas_esperadas.chars().count();
    STORY_POINT_THRESHOLDS
        .iter()
        .find(|(bound, _)| length < *bound)
        .map_or(MAX_STORY_POINTS, |(_, points)| *points)
}

pub fn pbi_title(record: &FormalRequirements) -> String {
    let objective: String = record
        .objetivo_funcional
        .trim()
        .chars()
        .take(TITLE_OBJECTIVE_CHARS)
        .collect();
    format!("[{}] {}", AI_TAG, objective)
}

pub fn implementation_task_title(record: &FormalRequirements) -> String {
    format!("[{}] Implementar {}", AI_TAG, record.nombre_funcion.trim())
}

pub fn testing_task_title(record: &FormalRequirements) -> String {
    format!("[{}] Crear unit tests para {}", AI_TAG, record.nombre_funcion.trim())
}

/// First word of the language label, e.g. `Python` for `Python 3.12`.
pub fn language_tag(record: &FormalRequirements) -> String {
    record
        .lenguaje_version
        .split_whitespace()
        .next()
        .unwrap_or("Python")
        .to_string()
}

/// Short title used for pull requests and merge commits.
pub fn display_title(record: Option<&FormalRequirements>, fallback: &str) -> String {
    match record {
        Some(r) if !r.objetivo_funcional.trim().is_empty() => {
            r.objetivo_funcional.trim().chars().take(60).collect()
        }
        _ => fallback.to_string(),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn pbi_description_html(record: &FormalRequirements) -> String {
    format!(
        "<h3>Objetivo funcional</h3><p>{}</p>\
         <h3>Detalles técnicos</h3><ul>\
         <li><b>Lenguaje:</b> {}</li>\
         <li><b>Función:</b> {}</li>\
         <li><b>Entradas:</b> {}</li>\
         <li><b>Salidas:</b> {}</li></ul>\
         <p><i>Generado automáticamente por el sistema multiagente.</i></p>",
        escape(&record.objetivo_funcional),
        escape(&record.lenguaje_version),
        escape(&record.nombre_funcion),
        escape(&record.entradas_esperadas),
        escape(&record.salidas_esperadas),
    )
}

pub fn acceptance_criteria_html(record: &FormalRequirements) -> String {
    let mut items: Vec<String> = record
        .casos_de_prueba
        .iter()
        .map(|case| {
            format!(
                "<li>Entrada <code>{}</code> devuelve <code>{}</code></li>",
                escape(&case.input.to_string()),
                escape(&case.expected.to_string())
            )
        })
        .collect();
    items.push("<li>Los tests unitarios generados pasan</li>".to_string());
    items.push("<li>El análisis de calidad no reporta issues bloqueantes</li>".to_string());
    format!("<ul>{}</ul>", items.join(""))
}

/// Which child task of a PBI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Implementation,
    Testing,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Implementation => "Implementation",
            TaskKind::Testing => "Testing",
        }
    }

    pub fn title(&self, record: &FormalRequirements) -> String {
        match self {
            TaskKind::Implementation => implementation_task_title(record),
            TaskKind::Testing => testing_task_title(record),
        }
    }

    fn description_html(&self, record: &FormalRequirements) -> String {
        let body = match self {
            TaskKind::Implementation => format!(
                "<p>Implementar la función <b>{}</b> en {}.</p><p>{}</p>",
                escape(&record.nombre_funcion),
                escape(&record.lenguaje_version),
                escape(&record.objetivo_funcional)
            ),
            TaskKind::Testing => format!(
                "<p>Generar y ejecutar los tests unitarios de <b>{}</b>.</p><p>Casos definidos: {}</p>",
                escape(&record.nombre_funcion),
                record.casos_de_prueba.len()
            ),
        };
        format!("{}<p><i>Generado automáticamente por el sistema multiagente.</i></p>", body)
    }

    pub fn new_item(&self, record: &FormalRequirements, parent_id: u64) -> NewWorkItem {
        NewWorkItem::new(WorkItemType::Task, self.title(record))
            .with_description(self.description_html(record))
            .with_parent(parent_id)
            .with_remaining_work(4)
            .with_tag(AI_TAG)
            .with_tag(self.as_str())
            .with_tag(language_tag(record))
    }
}

pub fn new_pbi(record: &FormalRequirements, story_points: u32) -> NewWorkItem {
    NewWorkItem::new(WorkItemType::ProductBacklogItem, pbi_title(record))
        .with_description(pbi_description_html(record))
        .with_acceptance_criteria(acceptance_criteria_html(record))
        .with_story_points(story_points)
        .with_priority(2)
        .with_tag(AI_TAG)
        .with_tag("Multiagente")
        .with_tag(language_tag(record))
}

/// Find an AI-tagged PBI with the same title, or create one.
pub async fn find_or_create_pbi(
    tracker: &dyn IssueTracker,
    record: &FormalRequirements,
    story_points: u32,
) -> Option<WorkItem> {
    let title = pbi_title(record);
    let query = WorkItemQuery::title_contains(title.clone())
        .of_type(WorkItemType::ProductBacklogItem)
        .tagged(AI_TAG)
        .limit(5);
    if let Some(existing) = soft("search work items", tracker.search_work_items(&query))
        .await
        .and_then(|found| found.into_iter().find(|w| w.has_tag(AI_TAG) && w.title() == title))
    {
        info!("Reusing PBI #{} ({})", existing.id, existing.title());
        return Some(existing);
    }

    let created = soft("create PBI", tracker.create_work_item(&new_pbi(record, story_points))).await?;
    info!("Created PBI #{}: {}", created.id, title);
    Some(created)
}

/// Find the AI-tagged child task of `parent_id` with the expected title, or create it.
pub async fn find_or_create_task(
    tracker: &dyn IssueTracker,
    record: &FormalRequirements,
    parent_id: u64,
    kind: TaskKind,
) -> Option<WorkItem> {
    let title = kind.title(record);
    if let Some(existing) = soft("list child work items", tracker.get_child_work_items(parent_id))
        .await
        .and_then(|children| {
            children
                .into_iter()
                .find(|w| w.has_tag(AI_TAG) && w.title() == title)
        })
    {
        info!("Reusing {} task #{}", kind.as_str(), existing.id);
        return Some(existing);
    }

    let created = soft("create task", tracker.create_work_item(&kind.new_item(record, parent_id))).await?;
    info!("Created {} task #{} under PBI #{}", kind.as_str(), created.id, parent_id);
    Some(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forja_core::TestCase;
    use serde_json::json;

    fn record(objective: &str) -> FormalRequirements {
        FormalRequirements::from_json(
            &json!({
                "objetivo_funcional": objective,
                "lenguaje_version": "Python 3.12",
                "nombre_funcion": "sumar",
                "entradas_esperadas": "a, b",
                "salidas_esperadas": "suma",
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_story_points_thresholds() {
        assert_eq!(estimate_story_points(&record("x")), 1);
        assert_eq!(estimate_story_points(&record(&"x".repeat(150))), 2);
        assert_eq!(estimate_story_points(&record(&"x".repeat(300))), 3);
        assert_eq!(estimate_story_points(&record(&"x".repeat(450))), 5);
        assert_eq!(estimate_story_points(&record(&"x".repeat(650))), 8);
        assert_eq!(estimate_story_points(&record(&"x".repeat(900))), 13);
        assert_eq!(estimate_story_points(&record(&"x".repeat(1200))), 21);
    }

    #[test]
    fn test_titles_and_tags() {
        let long = record(&"Sumar ".repeat(30));
        let title = pbi_title(&long);
        assert!(title.starts_with("[AI-Generated] Sumar"));
        assert_eq!(title.chars().count(), "[AI-Generated] ".len() + 80);

        let r = record("Sumar dos números");
        assert_eq!(implementation_task_title(&r), "[AI-Generated] Implementar sumar");
        assert_eq!(testing_task_title(&r), "[AI-Generated] Crear unit tests para sumar");
        assert_eq!(language_tag(&r), "Python");
        assert_eq!(display_title(Some(&r), "sumar"), "Sumar dos números");
        assert_eq!(display_title(None, "sumar"), "sumar");
    }

    #[test]
    fn test_html_bodies() {
        let mut r = record("Comparar a < b");
        r.casos_de_prueba.push(TestCase {
            input: json!([1, 2]),
            expected: json!(true),
        });
        assert!(pbi_description_html(&r).contains("Comparar a &lt; b"));
        let criteria = acceptance_criteria_html(&r);
        assert!(criteria.contains("<code>[1,2]</code> devuelve <code>true</code>"));

        let pbi = new_pbi(&r, 3);
        assert_eq!(pbi.tags, vec!["AI-Generated", "Multiagente", "Python"]);
        assert_eq!(pbi.priority, Some(2));
        assert_eq!(pbi.story_points, Some(3));

        let task = TaskKind::Testing.new_item(&r, 9);
        assert_eq!(task.parent_id, Some(9));
        assert!(task.tags.contains(&"Testing".to_string()));
        assert!(task.description.contains("Casos definidos: 1"));
    }
}
