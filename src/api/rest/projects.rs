use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::projects::{MembershipCreate, ProjectCreate, ProjectService},
};

use super::error_response;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<serde_json::Value>)>;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:project_id/summary", get(summary))
        .route("/:project_id/members", post(add_member))
        .route("/:project_id/members/:user_id/approve", post(approve_member))
}

async fn create(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Json(payload): Json<ProjectCreate>,
) -> ApiResult<serde_json::Value> {
    let project = ProjectService::new(state)
        .create(&actor, payload)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(project).unwrap()))
}

async fn list(Extension(state): Extension<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let projects = ProjectService::new(state).list().await.map_err(error_response)?;
    Ok(Json(serde_json::to_value(projects).unwrap()))
}

async fn summary(
    Extension(state): Extension<Arc<AppState>>,
    Path(project_id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let summary = ProjectService::new(state)
        .summary(project_id)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(summary).unwrap()))
}

async fn add_member(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(project_id): Path<i64>,
    Json(payload): Json<MembershipCreate>,
) -> ApiResult<serde_json::Value> {
    let membership = ProjectService::new(state)
        .add_member(&actor, project_id, payload)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(membership).unwrap()))
}

async fn approve_member(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path((project_id, user_id)): Path<(i64, i64)>,
) -> ApiResult<serde_json::Value> {
    let membership = ProjectService::new(state)
        .approve_member(&actor, project_id, user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(membership).unwrap()))
}
