use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::{
        audit::{AuditQuery as ServiceAuditQuery, AuditReader},
        errors::ServiceError,
    },
};

use super::error_response;

pub fn router() -> Router {
    Router::new().route("/", get(list))
}

#[derive(Debug, Deserialize)]
struct AuditFilter {
    project_id: Option<i64>,
    entity_type: Option<String>,
    entity_id: Option<i64>,
    actor_id: Option<i64>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

async fn list(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Query(filter): Query<AuditFilter>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !matches!(actor.role, crate::domain::models::Role::Admin | crate::domain::models::Role::Curator) {
        return Err(error_response(ServiceError::TransitionForbidden));
    }

    let entries = AuditReader::new(state)
        .list(ServiceAuditQuery {
            project_id: filter.project_id,
            entity_type: filter.entity_type,
            entity_id: filter.entity_id,
            actor_id: filter.actor_id,
            limit: filter.limit,
            offset: filter.offset,
        })
        .await
        .map_err(error_response)?;

    Ok(Json(serde_json::to_value(entries).unwrap()))
}
