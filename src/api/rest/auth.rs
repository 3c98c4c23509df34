use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::post,
    Json, Router,
};

use crate::{
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    services::identity::{IdentityService, LoginRequest, RegisterRequest, UpdateUserRole},
};

use super::error_response;

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/token", post(token))
        .route("/me", axum::routing::get(me))
        .route("/users/:user_id/role", post(update_user_role))
}

async fn register(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let user = IdentityService::new(state)
        .register(payload)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "role": user.role,
    })))
}

async fn token(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let (token, role) = IdentityService::new(state)
        .issue_token(payload)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({
        "access_token": token,
        "token_type": "bearer",
        "role": role,
    })))
}

async fn me(
    Extension(state): Extension<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let found = IdentityService::new(state)
        .me(user.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({
        "id": found.id,
        "username": found.username,
        "email": found.email,
        "role": found.role,
    })))
}

async fn update_user_role(
    Extension(state): Extension<Arc<AppState>>,
    actor: AuthenticatedUser,
    Path(user_id): Path<i64>,
    Json(payload): Json<UpdateUserRole>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let updated = IdentityService::new(state)
        .update_user_role(&actor, user_id, payload)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({
        "id": updated.id,
        "username": updated.username,
        "email": updated.email,
        "role": updated.role,
        "is_active": updated.is_active,
    })))
}
