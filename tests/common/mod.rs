#![allow(dead_code)]

use sqlx::SqlitePool;
use tempfile::TempDir;

use skillpath_backend::db;

pub async fn setup_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let pool = db::connect(&temp_dir.path().join("test.db"))
        .await
        .expect("failed to open sqlite pool");
    db::init_schema(&pool).await.expect("failed to apply schema");
    (temp_dir, pool)
}

pub async fn seed_assessment(
    pool: &SqlitePool,
    id: &str,
    title: &str,
    course_content_id: Option<&str>,
) {
    sqlx::query(
        r#"
        INSERT INTO "assessments" ("id","title","course_content_id","course_content_title")
        VALUES (?,?,?,?)
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(course_content_id)
    .bind(title)
    .execute(pool)
    .await
    .expect("seed assessment");
}

/// A question with one wrong and one right option.
pub async fn seed_question(pool: &SqlitePool, id: &str, assessment_id: &str, text: &str) {
    sqlx::query(r#"INSERT INTO "questions" ("id","assessment_id","text") VALUES (?,?,?)"#)
        .bind(id)
        .bind(assessment_id)
        .bind(text)
        .execute(pool)
        .await
        .expect("seed question");

    for (suffix, option_text, is_correct) in [("wrong", "incorrect answer", 0), ("right", "correct answer", 1)] {
        sqlx::query(
            r#"INSERT INTO "question_options" ("id","question_id","text","is_correct") VALUES (?,?,?,?)"#,
        )
        .bind(format!("{id}-{suffix}"))
        .bind(id)
        .bind(option_text)
        .bind(is_correct)
        .execute(pool)
        .await
        .expect("seed option");
    }
}

pub async fn seed_attempt(pool: &SqlitePool, id: &str, user_id: &str, assessment_id: &str) {
    sqlx::query(
        r#"
        INSERT INTO "assessment_attempts" ("id","user_id","assessment_id","score","passed")
        VALUES (?,?,?,0,0)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(assessment_id)
    .execute(pool)
    .await
    .expect("seed attempt");
}

pub async fn seed_incorrect_response(pool: &SqlitePool, attempt_id: &str, question_id: &str) {
    sqlx::query(
        r#"
        INSERT INTO "user_responses" ("id","attempt_id","question_id","selected_option_id","is_correct","points_awarded")
        VALUES (?,?,?,?,0,0)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(attempt_id)
    .bind(question_id)
    .bind(format!("{question_id}-wrong"))
    .execute(pool)
    .await
    .expect("seed response");
}

/// Canned collaborator reply for the given (name, level) pairs, ordered as
/// given.
pub fn analysis_reply(concepts: &[(&str, &str)]) -> String {
    let weak: Vec<serde_json::Value> = concepts
        .iter()
        .map(|(name, level)| {
            serde_json::json!({
                "concept": name,
                "proficiency_level": level,
                "recommendations": [format!("Review {name}")]
            })
        })
        .collect();
    let order: Vec<&str> = concepts.iter().map(|(name, _)| *name).collect();
    serde_json::json!({ "weak_concepts": weak, "learning_path_order": order }).to_string()
}

pub async fn count_active_paths(pool: &SqlitePool, user_id: &str, scope: Option<&str>) -> i64 {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM "learning_paths"
        WHERE "user_id" = ? AND "course_content_id" IS ? AND "is_active" = 1
        "#,
    )
    .bind(user_id)
    .bind(scope)
    .fetch_one(pool)
    .await
    .expect("count active paths")
}

pub async fn count_nodes(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "learning_path_nodes""#)
        .fetch_one(pool)
        .await
        .expect("count nodes")
}
