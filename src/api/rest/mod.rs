use axum::{http::StatusCode, routing::get, Json, Router};

use crate::services::errors::ServiceError;

pub mod audit;
pub mod auth;
pub mod exports;
pub mod health;
pub mod projects;
pub mod sentences;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health::healthcheck))
        .nest("/auth", auth::router())
        .nest("/projects", projects::router())
        .nest("/sentences", sentences::router())
        .nest("/audit", audit::router())
        .nest("/exports", exports::router())
}

/// Uniform `{ detail }` envelope the HTTP layer renders for every domain
/// error. `ValidationFailed` carries the full report in `detail`
/// instead of a plain string.
pub fn error_response(err: ServiceError) -> (StatusCode, Json<serde_json::Value>) {
    let status = err.status_code();
    let body = match &err {
        ServiceError::ValidationFailed(report) => serde_json::json!({
            "code": err.code(),
            "detail": err.detail_tr(),
            "report": report.as_ref(),
        }),
        other => serde_json::json!({
            "code": other.code(),
            "detail": other.detail_tr(),
        }),
    };
    (status, Json(body))
}
