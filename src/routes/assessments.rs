use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::response::AppError;
use crate::routes::SuccessResponse;
use crate::services::path_builder::LearningPath;
use crate::services::path_updater;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CompleteAssessmentQuery {
    user: Option<String>,
    learning_style: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletedAssessment {
    message: &'static str,
    learning_path: LearningPath,
}

/// Marks the attempt complete, then builds or updates the learning path for
/// the attempt's course scope.
pub(crate) async fn complete(
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
    Query(query): Query<CompleteAssessmentQuery>,
) -> Response {
    let Some(user) = query.user.filter(|u| !u.trim().is_empty()) else {
        return AppError::validation("missing required field: user").into_response();
    };
    let Some(learning_style) = query.learning_style.filter(|s| !s.trim().is_empty()) else {
        return AppError::validation("missing required field: learningStyle").into_response();
    };

    if let Err(err) = path_updater::mark_attempt_completed(state.pool(), &attempt_id, &user).await {
        return AppError::from(err).into_response();
    }

    match path_updater::update_path(
        state.pool(),
        state.analysis(),
        state.fallback_concepts(),
        &user,
        &attempt_id,
        &learning_style,
    )
    .await
    {
        Ok(learning_path) => Json(SuccessResponse::new(CompletedAssessment {
            message: "Assessment completed and learning path updated",
            learning_path,
        }))
        .into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}
