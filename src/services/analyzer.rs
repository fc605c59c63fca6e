use std::collections::HashMap;

use sqlx::{Row, SqlitePool};

use crate::config::FallbackConcept;
use crate::services::analysis_provider::{
    AnalysisService, IncorrectResponse, ProficiencyLevel,
};
use crate::services::concept_graph::{self, Concept, DifficultyLevel};

/// A concept inferred to be poorly understood from incorrect responses,
/// together with the collaborator's qualitative rating and recommendations.
#[derive(Debug, Clone)]
pub struct WeakConcept {
    pub concept: Concept,
    pub proficiency_level: ProficiencyLevel,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone)]
struct IncorrectRow {
    question_id: String,
    question: String,
    selected_answer: String,
    correct_answer: String,
}

#[derive(Debug, Clone)]
struct MappingRow {
    question_id: String,
    concept: Concept,
    weight: f64,
}

/// Maps a completed attempt's incorrect responses to an ordered weak-concept
/// list.
///
/// The collaborator call is best-effort: any failure or malformed payload
/// degrades to the concepts already mapped to the incorrect questions (with a
/// generic per-assessment concept standing in for unmapped questions), then to
/// the deployment-configured fallback list, then to an empty set. Degradation
/// is logged and never surfaced to the caller as an error.
pub async fn analyze_attempt(
    pool: &SqlitePool,
    analysis: &AnalysisService,
    fallback: &[FallbackConcept],
    attempt_id: &str,
) -> Result<Vec<WeakConcept>, sqlx::Error> {
    let incorrect = load_incorrect_responses(pool, attempt_id).await?;
    tracing::info!(attempt = attempt_id, count = incorrect.len(), "found incorrect responses");

    if incorrect.is_empty() {
        return Ok(Vec::new());
    }

    let triples: Vec<IncorrectResponse> = incorrect
        .iter()
        .map(|row| IncorrectResponse {
            question: row.question.clone(),
            selected_answer: row.selected_answer.clone(),
            correct_answer: row.correct_answer.clone(),
        })
        .collect();

    match analysis.analyze_responses(&triples).await {
        Ok(report) if !report.weak_concepts.is_empty() => {
            let mut ordered = report.weak_concepts;
            apply_suggested_order(&mut ordered, &report.learning_path_order);

            let mut out = Vec::with_capacity(ordered.len());
            for reported in ordered {
                let name = concept_graph::normalize_name(&reported.concept);
                if name.is_empty() {
                    continue;
                }
                let concept = concept_graph::get_or_create(
                    pool,
                    &name,
                    &format!("Learning materials for {name}"),
                    DifficultyLevel::Beginner,
                )
                .await?;
                out.push(WeakConcept {
                    concept,
                    proficiency_level: reported.proficiency_level,
                    recommendations: reported.recommendations,
                });
            }
            if !out.is_empty() {
                return Ok(out);
            }
            tracing::warn!(attempt = attempt_id, "analysis returned only blank concepts, degrading");
            mapped_concept_fallback(pool, fallback, attempt_id, &incorrect).await
        }
        Ok(_) => {
            tracing::warn!(attempt = attempt_id, "analysis returned no weak concepts, degrading");
            mapped_concept_fallback(pool, fallback, attempt_id, &incorrect).await
        }
        Err(err) => {
            tracing::warn!(attempt = attempt_id, error = %err, "analysis collaborator failed, degrading");
            mapped_concept_fallback(pool, fallback, attempt_id, &incorrect).await
        }
    }
}

/// Orders reported concepts by the collaborator's suggested learning order,
/// keeping unlisted concepts after the listed ones in their reported order.
fn apply_suggested_order(
    concepts: &mut Vec<crate::services::analysis_provider::ReportedConcept>,
    suggested: &[String],
) {
    if suggested.is_empty() {
        return;
    }
    let rank: HashMap<String, usize> = suggested
        .iter()
        .enumerate()
        .map(|(i, name)| (concept_graph::normalize_name(name).to_lowercase(), i))
        .collect();
    concepts.sort_by_key(|c| {
        rank.get(&concept_graph::normalize_name(&c.concept).to_lowercase())
            .copied()
            .unwrap_or(usize::MAX)
    });
}

/// The no-collaborator path: concepts already linked to the incorrect
/// questions, rated from the mapping weights.
async fn mapped_concept_fallback(
    pool: &SqlitePool,
    fallback: &[FallbackConcept],
    attempt_id: &str,
    incorrect: &[IncorrectRow],
) -> Result<Vec<WeakConcept>, sqlx::Error> {
    let question_ids: Vec<String> = incorrect.iter().map(|r| r.question_id.clone()).collect();
    let mappings = load_concept_mappings(pool, &question_ids).await?;

    // Weights grouped per concept, first-seen order preserved.
    let mut grouped: Vec<(Concept, Vec<f64>)> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    for mapping in &mappings {
        match slots.get(&mapping.concept.id) {
            Some(&slot) => grouped[slot].1.push(mapping.weight),
            None => {
                slots.insert(mapping.concept.id.clone(), grouped.len());
                grouped.push((mapping.concept.clone(), vec![mapping.weight]));
            }
        }
    }

    // Questions with no mapping at all fall back to one generic concept
    // derived from the assessment title.
    let mapped_questions: std::collections::HashSet<&str> =
        mappings.iter().map(|m| m.question_id.as_str()).collect();
    let has_unmapped = incorrect
        .iter()
        .any(|r| !mapped_questions.contains(r.question_id.as_str()));
    if has_unmapped {
        let title = load_assessment_title(pool, attempt_id)
            .await?
            .filter(|t| !t.trim().is_empty());
        if let Some(title) = title {
            let concept = concept_graph::get_or_create(
                pool,
                &title,
                &format!("Learning materials for {title}"),
                DifficultyLevel::Beginner,
            )
            .await?;
            match slots.get(&concept.id) {
                Some(&slot) => grouped[slot].1.push(1.0),
                None => {
                    slots.insert(concept.id.clone(), grouped.len());
                    grouped.push((concept, vec![1.0]));
                }
            }
        }
    }

    let mut out = Vec::with_capacity(grouped.len());
    for (concept, weights) in grouped {
        let estimate = aggregate_mapping_scores(&weights);
        out.push(WeakConcept {
            concept,
            proficiency_level: level_from_estimate(estimate),
            recommendations: Vec::new(),
        });
    }

    if out.is_empty() && !fallback.is_empty() {
        tracing::warn!(attempt = attempt_id, "no concepts resolved, using configured fallback");
        for entry in fallback {
            let concept = concept_graph::get_or_create(
                pool,
                &entry.name,
                &entry.description,
                DifficultyLevel::Beginner,
            )
            .await?;
            out.push(WeakConcept {
                concept,
                proficiency_level: ProficiencyLevel::Medium,
                recommendations: Vec::new(),
            });
        }
    }

    Ok(out)
}

/// Proficiency estimate from the mapping weights of missed questions: the
/// heavier the missed mappings, the lower the estimate.
pub fn aggregate_mapping_scores(weights: &[f64]) -> f64 {
    if weights.is_empty() {
        return 0.5;
    }
    let mean = weights.iter().sum::<f64>() / weights.len() as f64;
    (1.0 - mean).clamp(0.0, 1.0)
}

pub fn level_from_estimate(estimate: f64) -> ProficiencyLevel {
    if estimate < 0.45 {
        ProficiencyLevel::Low
    } else if estimate < 0.75 {
        ProficiencyLevel::Medium
    } else {
        ProficiencyLevel::High
    }
}

async fn load_incorrect_responses(
    pool: &SqlitePool,
    attempt_id: &str,
) -> Result<Vec<IncorrectRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT
            q."id" AS "question_id",
            q."text" AS "question",
            COALESCE(sel."text", '') AS "selected_answer",
            COALESCE((
                SELECT o."text" FROM "question_options" o
                WHERE o."question_id" = q."id" AND o."is_correct" = 1
                LIMIT 1
            ), '') AS "correct_answer"
        FROM "user_responses" r
        JOIN "questions" q ON q."id" = r."question_id"
        LEFT JOIN "question_options" sel ON sel."id" = r."selected_option_id"
        WHERE r."attempt_id" = ? AND r."is_correct" = 0
        "#,
    )
    .bind(attempt_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| IncorrectRow {
            question_id: row.try_get("question_id").unwrap_or_default(),
            question: row.try_get("question").unwrap_or_default(),
            selected_answer: row.try_get("selected_answer").unwrap_or_default(),
            correct_answer: row.try_get("correct_answer").unwrap_or_default(),
        })
        .collect())
}

async fn load_concept_mappings(
    pool: &SqlitePool,
    question_ids: &[String],
) -> Result<Vec<MappingRow>, sqlx::Error> {
    if question_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
        r#"
        SELECT m."question_id", m."weight", c."id", c."name", c."description", c."difficulty_level"
        FROM "question_concept_mappings" m
        JOIN "concepts" c ON c."id" = m."concept_id"
        WHERE m."question_id" IN (
        "#,
    );
    {
        let mut sep = qb.separated(", ");
        for id in question_ids {
            sep.push_bind(id);
        }
        sep.push_unseparated(")");
    }
    let rows = qb.build().fetch_all(pool).await?;

    Ok(rows
        .into_iter()
        .map(|row| MappingRow {
            question_id: row.try_get("question_id").unwrap_or_default(),
            weight: row.try_get::<f64, _>("weight").unwrap_or(1.0),
            concept: concept_graph::map_concept_row(&row),
        })
        .collect())
}

async fn load_assessment_title(
    pool: &SqlitePool,
    attempt_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT a."title"
        FROM "assessment_attempts" t
        JOIN "assessments" a ON a."id" = t."assessment_id"
        WHERE t."id" = ?
        LIMIT 1
        "#,
    )
    .bind(attempt_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.and_then(|row| row.try_get::<String, _>("title").ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::analysis_provider::ReportedConcept;

    #[test]
    fn test_aggregate_mapping_scores() {
        assert!((aggregate_mapping_scores(&[]) - 0.5).abs() < f64::EPSILON);
        assert!((aggregate_mapping_scores(&[1.0]) - 0.0).abs() < f64::EPSILON);
        assert!((aggregate_mapping_scores(&[0.2, 0.4]) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_level_from_estimate() {
        assert_eq!(level_from_estimate(0.0), ProficiencyLevel::Low);
        assert_eq!(level_from_estimate(0.5), ProficiencyLevel::Medium);
        assert_eq!(level_from_estimate(0.9), ProficiencyLevel::High);
    }

    #[test]
    fn test_apply_suggested_order() {
        let mut concepts = vec![
            reported("Trees"),
            reported("Pointers"),
            reported("Recursion"),
        ];
        let suggested = vec!["pointers".to_string(), "recursion".to_string()];
        apply_suggested_order(&mut concepts, &suggested);
        let names: Vec<&str> = concepts.iter().map(|c| c.concept.as_str()).collect();
        assert_eq!(names, vec!["Pointers", "Recursion", "Trees"]);
    }

    fn reported(name: &str) -> ReportedConcept {
        ReportedConcept {
            concept: name.to_string(),
            proficiency_level: ProficiencyLevel::Low,
            recommendations: Vec::new(),
        }
    }
}
