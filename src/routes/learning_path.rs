use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::response::AppError;
use crate::routes::SuccessResponse;
use crate::services::analysis_provider::ProficiencyLevel;
use crate::services::path_builder::{self, PathNode};
use crate::services::{content_generator, proficiency};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ActivePathQuery {
    user: Option<String>,
    course: Option<String>,
}

pub(crate) async fn get_active(
    State(state): State<AppState>,
    Query(query): Query<ActivePathQuery>,
) -> Response {
    let Some(user) = query.user.filter(|u| !u.trim().is_empty()) else {
        return AppError::validation("missing required field: user").into_response();
    };

    match path_builder::load_active_path(state.pool(), &user, query.course.as_deref()).await {
        Ok(Some(path)) => Json(SuccessResponse::new(path)).into_response(),
        Ok(None) => AppError::not_found("no active learning path found").into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserQuery {
    user: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletedNode {
    message: &'static str,
    node: PathNode,
}

/// Flips `completed` and records mastery-level proficiency for the node's
/// concept.
pub(crate) async fn complete_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Response {
    let Some(user) = query.user.filter(|u| !u.trim().is_empty()) else {
        return AppError::validation("missing required field: user").into_response();
    };

    let detail = match path_builder::mark_node_completed(state.pool(), &node_id, &user).await {
        Ok(Some(detail)) => detail,
        Ok(None) => return AppError::not_found("learning node not found").into_response(),
        Err(err) => return AppError::from(err).into_response(),
    };

    if let Err(err) = proficiency::upsert_score(
        state.pool(),
        &user,
        &detail.concept.id,
        proficiency::score_for_level(ProficiencyLevel::High),
    )
    .await
    {
        return AppError::from(err).into_response();
    }

    Json(SuccessResponse::new(CompletedNode {
        message: "Learning node completed successfully",
        node: detail.node,
    }))
    .into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeContent {
    node_id: String,
    concept_name: String,
    content_type: path_builder::ContentType,
    content: String,
}

pub(crate) async fn node_content(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Response {
    let Some(user) = query.user.filter(|u| !u.trim().is_empty()) else {
        return AppError::validation("missing required field: user").into_response();
    };

    let detail = match path_builder::load_node_detail(state.pool(), &node_id, &user).await {
        Ok(Some(detail)) => detail,
        Ok(None) => return AppError::not_found("learning node not found").into_response(),
        Err(err) => return AppError::from(err).into_response(),
    };

    match content_generator::generate_content(
        state.analysis(),
        &detail.concept,
        detail.node.content_type,
    )
    .await
    {
        Ok(content) => Json(SuccessResponse::new(NodeContent {
            node_id: detail.node.id,
            concept_name: detail.concept.name,
            content_type: detail.node.content_type,
            content,
        }))
        .into_response(),
        Err(err) => {
            tracing::warn!(node = %node_id, error = %err, "content generation failed");
            AppError::service_unavailable("content generation unavailable").into_response()
        }
    }
}
