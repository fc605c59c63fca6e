mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use sqlx::SqlitePool;
use tower::ServiceExt;

use skillpath_backend::create_app;
use skillpath_backend::services::analysis_provider::AnalysisService;
use skillpath_backend::services::concept_graph::{self, DifficultyLevel};
use skillpath_backend::state::AppState;

use common::*;

fn app(pool: SqlitePool, analysis: AnalysisService) -> Router {
    create_app(AppState::new(pool, analysis, Vec::new()))
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn health_reports_ok() {
    let (_tmp, pool) = setup_pool().await;
    let app = app(pool, AnalysisService::mock(None));

    let (status, body) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["uptimeSeconds"].is_u64());
}

#[tokio::test]
async fn active_path_requires_user() {
    let (_tmp, pool) = setup_pool().await;
    let app = app(pool, AnalysisService::mock(None));

    let (status, body) = send(&app, "GET", "/api/learning-path").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn active_path_missing_is_404() {
    let (_tmp, pool) = setup_pool().await;
    let app = app(pool, AnalysisService::mock(None));

    let (status, body) = send(&app, "GET", "/api/learning-path?user=u1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn assessment_completion_flow_over_http() {
    let (_tmp, pool) = setup_pool().await;
    seed_assessment(&pool, "as-1", "Rust Basics", Some("course-1")).await;
    seed_question(&pool, "q1", "as-1", "What does ownership mean?").await;
    seed_attempt(&pool, "at-1", "u1", "as-1").await;
    seed_incorrect_response(&pool, "at-1", "q1").await;

    let reply = analysis_reply(&[("Ownership", "low")]);
    let app = app(pool.clone(), AnalysisService::mock(Some(&reply)));

    let (status, body) = send(
        &app,
        "POST",
        "/api/assessments/at-1/complete?user=u1&learningStyle=visual",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let path = &body["data"]["learningPath"];
    assert_eq!(path["isActive"], true);
    assert_eq!(path["courseContentId"], "course-1");
    let nodes = path["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["conceptName"], "Ownership");
    assert_eq!(nodes[0]["contentType"], "video");
    let node_id = nodes[0]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/api/learning-path?user=u1&course=course-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], path["id"]);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/learning-path/nodes/{node_id}/complete?user=u1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["node"]["completed"], true);

    // Completion records mastery for the node's concept.
    let concept = concept_graph::find_by_name(&pool, "Ownership")
        .await
        .unwrap()
        .unwrap();
    let score: f64 = sqlx::query_scalar(
        r#"SELECT "score" FROM "user_concept_proficiency" WHERE "user_id" = 'u1' AND "concept_id" = ?"#,
    )
    .bind(&concept.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!((score - 0.9).abs() < f64::EPSILON);
}

#[tokio::test]
async fn assessment_completion_requires_learning_style() {
    let (_tmp, pool) = setup_pool().await;
    let app = app(pool, AnalysisService::mock(None));

    let (status, body) = send(&app, "POST", "/api/assessments/at-1/complete?user=u1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_attempt_is_404() {
    let (_tmp, pool) = setup_pool().await;
    let app = app(pool, AnalysisService::mock(None));

    let (status, body) = send(
        &app,
        "POST",
        "/api/assessments/missing/complete?user=u1&learningStyle=visual",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn circular_prerequisites_surface_as_422() {
    let (_tmp, pool) = setup_pool().await;
    seed_assessment(&pool, "as-1", "Rust Basics", Some("course-1")).await;
    seed_question(&pool, "q1", "as-1", "What does ownership mean?").await;
    seed_attempt(&pool, "at-1", "u1", "as-1").await;
    seed_incorrect_response(&pool, "at-1", "q1").await;

    let first = concept_graph::get_or_create(&pool, "Loops", "", DifficultyLevel::Beginner)
        .await
        .unwrap();
    let second = concept_graph::get_or_create(&pool, "Arrays", "", DifficultyLevel::Beginner)
        .await
        .unwrap();
    concept_graph::add_prerequisite(&pool, &first.id, &second.id)
        .await
        .unwrap();
    concept_graph::add_prerequisite(&pool, &second.id, &first.id)
        .await
        .unwrap();

    let reply = analysis_reply(&[("Loops", "low"), ("Arrays", "low")]);
    let app = app(pool.clone(), AnalysisService::mock(Some(&reply)));

    let (status, body) = send(
        &app,
        "POST",
        "/api/assessments/at-1/complete?user=u1&learningStyle=reading",
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "CIRCULAR_DEPENDENCY");
    assert_eq!(count_nodes(&pool).await, 0);
}

#[tokio::test]
async fn node_content_degrades_to_503_when_collaborator_is_down() {
    let (_tmp, pool) = setup_pool().await;
    seed_assessment(&pool, "as-1", "Rust Basics", Some("course-1")).await;
    seed_question(&pool, "q1", "as-1", "What does ownership mean?").await;
    seed_attempt(&pool, "at-1", "u1", "as-1").await;
    seed_incorrect_response(&pool, "at-1", "q1").await;

    let reply = analysis_reply(&[("Ownership", "low")]);
    let app_up = app(pool.clone(), AnalysisService::mock(Some(&reply)));
    let (status, body) = send(
        &app_up,
        "POST",
        "/api/assessments/at-1/complete?user=u1&learningStyle=reading",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let node_id = body["data"]["learningPath"]["nodes"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let app_down = app(pool, AnalysisService::mock(None));
    let (status, body) = send(
        &app_down,
        "GET",
        &format!("/api/learning-path/nodes/{node_id}/content?user=u1"),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn node_content_served_from_collaborator() {
    let (_tmp, pool) = setup_pool().await;
    seed_assessment(&pool, "as-1", "Rust Basics", Some("course-1")).await;
    seed_question(&pool, "q1", "as-1", "What does ownership mean?").await;
    seed_attempt(&pool, "at-1", "u1", "as-1").await;
    seed_incorrect_response(&pool, "at-1", "q1").await;

    let reply = analysis_reply(&[("Ownership", "low")]);
    let app_setup = app(pool.clone(), AnalysisService::mock(Some(&reply)));
    let (status, body) = send(
        &app_setup,
        "POST",
        "/api/assessments/at-1/complete?user=u1&learningStyle=reading",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let node_id = body["data"]["learningPath"]["nodes"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let app_content = app(pool, AnalysisService::mock(Some("# Ownership\n\nBorrowing rules.")));
    let (status, body) = send(
        &app_content,
        "GET",
        &format!("/api/learning-path/nodes/{node_id}/content?user=u1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["contentType"], "text");
    assert_eq!(body["data"]["conceptName"], "Ownership");
    assert!(body["data"]["content"]
        .as_str()
        .unwrap()
        .contains("Borrowing rules"));
}
