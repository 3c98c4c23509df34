//! Registration, login, and "who am I" — the identity surface carried as
//! ambient infrastructure so the rest of the core has something real to
//! authenticate against.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    domain::models::{Role, User},
    infrastructure::{
        auth::{issue_token, AuthenticatedUser},
        state::AppState,
    },
};

use super::errors::ServiceError;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, message = "username must be at least 3 characters"))]
    pub username: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username must not be empty"))]
    pub username: String,
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub password: String,
}

pub struct IdentityService {
    state: Arc<AppState>,
}

impl IdentityService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// New users start life as `pending`; an admin promotes them once
    /// they've been vetted for project membership.
    pub async fn register(&self, payload: RegisterRequest) -> Result<User, ServiceError> {
        payload
            .validate()
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM users WHERE username = $1 OR email = $2")
                .bind(&payload.username)
                .bind(&payload.email)
                .fetch_optional(&self.state.pool)
                .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict);
        }

        let hashed = hash_password(&payload.password)?;

        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (username, email, hashed_password, role, is_active, created_at)
            VALUES ($1,$2,$3,$4,true, now())
            RETURNING *
            "#,
        )
        .bind(&payload.username)
        .bind(&payload.email)
        .bind(&hashed)
        .bind(Role::Pending)
        .fetch_one(&self.state.pool)
        .await?;

        Ok(user)
    }

    /// Verifies credentials and issues a bearer token carrying `(sub, role)`.
    pub async fn issue_token(&self, payload: LoginRequest) -> Result<(String, Role), ServiceError> {
        payload
            .validate()
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
        let user: User = sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(&payload.username)
            .fetch_optional(&self.state.pool)
            .await?
            .ok_or(ServiceError::AuthInvalid)?;

        if !user.is_active {
            return Err(ServiceError::AuthInvalid);
        }

        if !verify_password(&payload.password, &user.hashed_password) {
            return Err(ServiceError::AuthInvalid);
        }

        let token = issue_token(&self.state, user.id, user.role)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        Ok((token, user.role))
    }

    pub async fn me(&self, user_id: i64) -> Result<User, ServiceError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.state.pool)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// Admin-only escape hatch for bootstrapping the first admin and for
    /// deactivating accounts: changes a user's global role and/or active flag
    /// directly, bypassing the membership-approval flow.
    pub async fn update_user_role(
        &self,
        actor: &AuthenticatedUser,
        user_id: i64,
        payload: UpdateUserRole,
    ) -> Result<User, ServiceError> {
        payload
            .validate()
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
        if !actor.role.is_admin() {
            return Err(ServiceError::TransitionForbidden);
        }

        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET role = $1, is_active = COALESCE($2, is_active)
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(payload.role)
        .bind(payload.is_active)
        .bind(user_id)
        .fetch_optional(&self.state.pool)
        .await?
        .ok_or(ServiceError::NotFound)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRole {
    pub role: Role,
    pub is_active: Option<bool>,
}

fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::Internal(e.to_string()))
}

fn verify_password(password: &str, hashed: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hashed) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trips() {
        let hashed = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hashed));
        assert!(!verify_password("wrong password", &hashed));
    }
}
