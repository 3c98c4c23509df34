use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::post,
    Json, Router,
};

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::orchestrator::{
        AdjudicatePayload, AssignRequest, ReopenPayload, ReviewPayload, SentenceCreate,
        SentenceOrchestrator, SubmitOutcome, SubmitPayload,
    },
};

use super::error_response;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<serde_json::Value>)>;

pub fn router() -> Router {
    Router::new()
        .route("/project/:project_id", post(create))
        .route("/:sentence_id/assign", post(assign))
        .route("/:sentence_id/submit", post(submit))
        .route("/:sentence_id/review", post(review))
        .route("/:sentence_id/adjudicate", post(adjudicate))
        .route("/:sentence_id/accept", post(accept))
        .route("/:sentence_id/reopen", post(reopen))
}

async fn create(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(project_id): Path<i64>,
    Json(payload): Json<SentenceCreate>,
) -> ApiResult<serde_json::Value> {
    let sentence = SentenceOrchestrator::new(state)
        .create(&actor, project_id, payload)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(sentence).unwrap()))
}

async fn assign(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(sentence_id): Path<i64>,
    Json(payload): Json<AssignRequest>,
) -> ApiResult<serde_json::Value> {
    let assignees = SentenceOrchestrator::new(state)
        .assign(&actor, sentence_id, payload)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "assignee_ids": assignees })))
}

async fn submit(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(sentence_id): Path<i64>,
    Json(payload): Json<SubmitPayload>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, Json<serde_json::Value>)> {
    let outcome = SentenceOrchestrator::new(state)
        .submit(&actor, sentence_id, payload)
        .await
        .map_err(error_response)?;
    match outcome {
        SubmitOutcome::Accepted(annotation) => Ok((
            StatusCode::OK,
            Json(serde_json::to_value(annotation).unwrap()),
        )),
        SubmitOutcome::Rejected(report) => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({
                "code": "validation_failed",
                "report": report,
            })),
        )),
    }
}

async fn review(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(sentence_id): Path<i64>,
    Json(payload): Json<ReviewPayload>,
) -> ApiResult<serde_json::Value> {
    let sentence = SentenceOrchestrator::new(state)
        .review(&actor, sentence_id, payload)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(sentence).unwrap()))
}

async fn adjudicate(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(sentence_id): Path<i64>,
    Json(payload): Json<AdjudicatePayload>,
) -> ApiResult<serde_json::Value> {
    let adjudication = SentenceOrchestrator::new(state)
        .adjudicate(&actor, sentence_id, payload)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(adjudication).unwrap()))
}

async fn accept(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(sentence_id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let sentence = SentenceOrchestrator::new(state)
        .accept(&actor, sentence_id)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(sentence).unwrap()))
}

async fn reopen(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(sentence_id): Path<i64>,
    Json(payload): Json<ReopenPayload>,
) -> ApiResult<serde_json::Value> {
    let sentence = SentenceOrchestrator::new(state)
        .reopen(&actor, sentence_id, payload)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(sentence).unwrap()))
}
