use sqlx::SqlitePool;

use crate::services::analysis_provider::ProficiencyLevel;
use crate::services::analyzer::WeakConcept;
use crate::services::concept_graph::{self, Concept};

pub const WEAK_THRESHOLD: f64 = 0.7;

const LOW_SCORE: f64 = 0.3;
const MEDIUM_SCORE: f64 = 0.6;
const HIGH_SCORE: f64 = 0.9;

/// Fixed qualitative-to-numeric table. Tunable constants, never user input.
pub fn score_for_level(level: ProficiencyLevel) -> f64 {
    match level {
        ProficiencyLevel::Low => LOW_SCORE,
        ProficiencyLevel::Medium => MEDIUM_SCORE,
        ProficiencyLevel::High => HIGH_SCORE,
    }
}

/// Upserts one proficiency row per (user, concept). The new score overwrites
/// the old unconditionally; repeated assessments on the same concept keep no
/// history. Concepts absent from the input are left untouched.
pub async fn update_proficiency(
    pool: &SqlitePool,
    user_id: &str,
    weak_concepts: &[WeakConcept],
) -> Result<(), sqlx::Error> {
    for weak in weak_concepts {
        upsert_score(
            pool,
            user_id,
            &weak.concept.id,
            score_for_level(weak.proficiency_level),
        )
        .await?;
    }
    Ok(())
}

pub async fn upsert_score(
    pool: &SqlitePool,
    user_id: &str,
    concept_id: &str,
    score: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "user_concept_proficiency" ("user_id","concept_id","score","updated_at")
        VALUES (?,?,?,datetime('now'))
        ON CONFLICT ("user_id","concept_id")
        DO UPDATE SET "score" = excluded."score", "updated_at" = excluded."updated_at"
        "#,
    )
    .bind(user_id)
    .bind(concept_id)
    .bind(score.clamp(0.0, 1.0))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_score(
    pool: &SqlitePool,
    user_id: &str,
    concept_id: &str,
) -> Result<Option<f64>, sqlx::Error> {
    sqlx::query_scalar(
        r#"SELECT "score" FROM "user_concept_proficiency" WHERE "user_id" = ? AND "concept_id" = ?"#,
    )
    .bind(user_id)
    .bind(concept_id)
    .fetch_optional(pool)
    .await
}

/// Concepts where the user's tracked proficiency sits below the threshold.
pub async fn get_weak_concepts(
    pool: &SqlitePool,
    user_id: &str,
    threshold: f64,
) -> Result<Vec<Concept>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT c."id", c."name", c."description", c."difficulty_level"
        FROM "user_concept_proficiency" p
        JOIN "concepts" c ON c."id" = p."concept_id"
        WHERE p."user_id" = ? AND p."score" < ?
        ORDER BY p."score" ASC
        "#,
    )
    .bind(user_id)
    .bind(threshold)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(concept_graph::map_concept_row).collect())
}
