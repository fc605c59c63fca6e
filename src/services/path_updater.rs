use std::collections::HashSet;

use sqlx::{Row, SqlitePool};

use crate::config::FallbackConcept;
use crate::services::analysis_provider::AnalysisService;
use crate::services::analyzer::{self, WeakConcept};
use crate::services::path_builder::{
    self, generate_content_id, now_iso, BuildError, LearningPath,
};
use crate::services::proficiency;

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("missing required field: {0}")]
    Validation(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("attempt has no resolvable course scope")]
    MissingScope,
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
struct AttemptContext {
    scope: Option<String>,
    course_title: String,
}

/// Entry point for the assessment-completion workflow: analyzes the attempt,
/// refreshes proficiency, and either merges the new weak concepts into the
/// user's active path for the attempt's course scope or builds a fresh path.
///
/// Merging is idempotent over the concept set: a concept already present in
/// the path is never re-added, whatever its latest proficiency, so running the
/// same input twice adds nothing. The collaborator call happens before any
/// write begins.
pub async fn update_path(
    pool: &SqlitePool,
    analysis: &AnalysisService,
    fallback: &[FallbackConcept],
    user_id: &str,
    attempt_id: &str,
    learning_style: &str,
) -> Result<LearningPath, UpdateError> {
    if user_id.trim().is_empty() {
        return Err(UpdateError::Validation("user"));
    }
    if learning_style.trim().is_empty() {
        return Err(UpdateError::Validation("learning_style"));
    }
    if attempt_id.trim().is_empty() {
        return Err(UpdateError::Validation("attempt"));
    }

    let context = load_attempt_context(pool, attempt_id, user_id).await?;

    let weak_concepts = analyzer::analyze_attempt(pool, analysis, fallback, attempt_id).await?;
    tracing::info!(attempt = attempt_id, count = weak_concepts.len(), "analyzed weak concepts");

    proficiency::update_proficiency(pool, user_id, &weak_concepts).await?;

    let scope = context.scope.as_deref();
    match path_builder::load_active_path(pool, user_id, scope).await? {
        Some(existing) => {
            merge_into_path(pool, existing, &weak_concepts, learning_style).await
        }
        None => {
            let title = format!("Learning Path: {}", context.course_title);
            Ok(path_builder::build_path(
                pool,
                user_id,
                scope,
                &title,
                &weak_concepts,
                learning_style,
            )
            .await?)
        }
    }
}

/// Appends genuinely new concepts after the existing tail. Order values start
/// at max+1 and skip anything already taken, so a stale read can waste numbers
/// but never produce a duplicate.
async fn merge_into_path(
    pool: &SqlitePool,
    existing: LearningPath,
    weak_concepts: &[WeakConcept],
    learning_style: &str,
) -> Result<LearningPath, UpdateError> {
    let present: HashSet<&str> = existing
        .nodes
        .iter()
        .map(|n| n.concept_id.as_str())
        .collect();

    let new_concepts: Vec<&WeakConcept> = weak_concepts
        .iter()
        .filter(|w| !present.contains(w.concept.id.as_str()))
        .collect();

    if new_concepts.is_empty() {
        tracing::info!(path = %existing.id, "no new concepts to merge");
        return Ok(existing);
    }

    let mut used_orders: HashSet<i64> = existing.nodes.iter().map(|n| n.order).collect();
    let max_order = used_orders.iter().copied().max().unwrap_or(-1);
    let content_type = path_builder::content_type_for_style(learning_style);
    let now = now_iso();

    let mut tx = pool.begin().await?;
    let mut next_order = max_order + 1;
    for weak in &new_concepts {
        while used_orders.contains(&next_order) {
            next_order += 1;
        }
        let node_id = uuid::Uuid::new_v4().to_string();
        let content_id = generate_content_id(&weak.concept.id, content_type);

        sqlx::query(
            r#"
            INSERT INTO "learning_path_nodes"
                ("id","learning_path_id","concept_id","order","content_type","content_id","completed","created_at")
            VALUES (?,?,?,?,?,?,0,?)
            "#,
        )
        .bind(&node_id)
        .bind(&existing.id)
        .bind(&weak.concept.id)
        .bind(next_order)
        .bind(content_type.as_str())
        .bind(&content_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tracing::info!(path = %existing.id, concept = %weak.concept.name, order = next_order, "merged path node");
        used_orders.insert(next_order);
        next_order += 1;
    }

    sqlx::query(r#"UPDATE "learning_paths" SET "updated_at" = ? WHERE "id" = ?"#)
        .bind(&now)
        .bind(&existing.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let scope = existing.course_content_id.as_deref();
    path_builder::load_active_path(pool, &existing.user_id, scope)
        .await?
        .ok_or(UpdateError::NotFound("learning path"))
}

/// Stamps `completed_at` on the attempt; a no-op for an already-completed one
/// (the completion timestamp transition is the only mutation an attempt sees).
pub async fn mark_attempt_completed(
    pool: &SqlitePool,
    attempt_id: &str,
    user_id: &str,
) -> Result<(), UpdateError> {
    let result = sqlx::query(
        r#"
        UPDATE "assessment_attempts" SET "completed_at" = ?
        WHERE "id" = ? AND "user_id" = ? AND "completed_at" IS NULL
        "#,
    )
    .bind(now_iso())
    .bind(attempt_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Either missing or already completed; distinguish for the caller.
        let exists: Option<i64> = sqlx::query_scalar(
            r#"SELECT 1 FROM "assessment_attempts" WHERE "id" = ? AND "user_id" = ?"#,
        )
        .bind(attempt_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        if exists.is_none() {
            return Err(UpdateError::NotFound("assessment attempt"));
        }
    }
    Ok(())
}

async fn load_attempt_context(
    pool: &SqlitePool,
    attempt_id: &str,
    user_id: &str,
) -> Result<AttemptContext, UpdateError> {
    let attempt = sqlx::query(
        r#"
        SELECT "assessment_id" FROM "assessment_attempts"
        WHERE "id" = ? AND "user_id" = ?
        LIMIT 1
        "#,
    )
    .bind(attempt_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some(attempt) = attempt else {
        return Err(UpdateError::NotFound("assessment attempt"));
    };
    let assessment_id: String = attempt.try_get("assessment_id").unwrap_or_default();

    let assessment = sqlx::query(
        r#"
        SELECT "title","course_content_id","course_content_title"
        FROM "assessments" WHERE "id" = ?
        LIMIT 1
        "#,
    )
    .bind(&assessment_id)
    .fetch_optional(pool)
    .await?;

    let Some(assessment) = assessment else {
        return Err(UpdateError::MissingScope);
    };

    let title: String = assessment.try_get("title").unwrap_or_default();
    let course_title = assessment
        .try_get::<Option<String>, _>("course_content_title")
        .ok()
        .flatten()
        .filter(|t| !t.is_empty())
        .unwrap_or(title);

    Ok(AttemptContext {
        scope: assessment
            .try_get::<Option<String>, _>("course_content_id")
            .ok()
            .flatten(),
        course_title,
    })
}
