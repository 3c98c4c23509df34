use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    domain::models::{ExportFormat, ExportLevel, PiiStrategy},
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::{
        errors::ServiceError,
        export::{ExportRequest, ExportService},
        export_jobs::{CreateJobRequest, ExportJobQueue},
    },
};

use super::error_response;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<serde_json::Value>)>;

pub fn router() -> Router {
    Router::new()
        .route("/project/:project_id", get(export_now))
        .route("/project/:project_id/jobs", post(create_job))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/download", get(download_job))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    level: ExportLevel,
    format: ExportFormat,
    pii_strategy: PiiStrategy,
    #[serde(default)]
    include_manifest: bool,
    #[serde(default)]
    include_failed: bool,
    #[serde(default)]
    include_rejected: bool,
}

/// Synchronous export for small projects: runs inline and returns the
/// storage key immediately, instead of going through the job queue.
async fn export_now(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(project_id): Path<i64>,
    axum::extract::Query(query): axum::extract::Query<ExportQuery>,
) -> ApiResult<serde_json::Value> {
    let request = ExportRequest {
        project_id,
        level: query.level,
        format: query.format,
        pii_strategy: query.pii_strategy,
        include_manifest: query.include_manifest,
        include_failed: query.include_failed,
        include_rejected: query.include_rejected,
    };
    let outcome = ExportService::new(state)
        .export(actor.role, &request, None, Utc::now())
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({
        "storage_key": outcome.storage_key,
        "record_count": outcome.record_count,
        "failed_count": outcome.failed_count,
    })))
}

#[derive(Debug, Deserialize)]
struct CreateJobPayload {
    format: ExportFormat,
    level: ExportLevel,
    pii_strategy: PiiStrategy,
    #[serde(default)]
    include_manifest: bool,
    #[serde(default)]
    include_failed: bool,
    #[serde(default)]
    include_rejected: bool,
}

async fn create_job(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(project_id): Path<i64>,
    Json(payload): Json<CreateJobPayload>,
) -> ApiResult<serde_json::Value> {
    if !matches!(actor.role, crate::domain::models::Role::Admin | crate::domain::models::Role::Curator) {
        return Err(error_response(ServiceError::TransitionForbidden));
    }
    let job = ExportJobQueue::new(state)
        .enqueue(CreateJobRequest {
            project_id,
            created_by: actor.user_id,
            format: payload.format,
            level: payload.level,
            pii_strategy: payload.pii_strategy,
            include_manifest: payload.include_manifest,
            include_failed: payload.include_failed,
            include_rejected: payload.include_rejected,
        })
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(job).unwrap()))
}

async fn get_job(
    Extension(state): Extension<Arc<AppState>>,
    Path(job_id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let job = ExportJobQueue::new(state).get(job_id).await.map_err(error_response)?;
    Ok(Json(serde_json::to_value(job).unwrap()))
}

async fn download_job(
    Extension(state): Extension<Arc<AppState>>,
    Path(job_id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let job = ExportJobQueue::new(Arc::clone(&state))
        .get(job_id)
        .await
        .map_err(error_response)?;
    let Some(result_path) = job.result_path else {
        return Err(error_response(ServiceError::NotFound));
    };
    let url = state
        .storage
        .presigned_url(&result_path)
        .await
        .map_err(|e| error_response(ServiceError::Internal(e.to_string())))?
        .ok_or(ServiceError::NotFound)
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "url": url })))
}
