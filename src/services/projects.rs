//! Project configuration and approved memberships that gate participation
//! (project creation, membership, and approval).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{
    domain::models::{Project, ProjectMembership, Role, SentenceStatus},
    infrastructure::{auth::AuthenticatedUser, state::AppState},
};

use super::errors::ServiceError;

#[derive(Debug, Deserialize, Validate)]
pub struct ProjectCreate {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_amr_version")]
    pub amr_version: String,
    #[serde(default = "default_role_set_version")]
    pub role_set_version: String,
    #[serde(default = "default_rule_version")]
    pub validation_rule_version: String,
    #[serde(default = "default_version_tag")]
    pub version_tag: String,
    pub description: Option<String>,
}

fn default_language() -> String {
    "tr".to_string()
}
fn default_amr_version() -> String {
    "1.0".to_string()
}
fn default_role_set_version() -> String {
    "tr-propbank".to_string()
}
fn default_rule_version() -> String {
    "v1".to_string()
}
fn default_version_tag() -> String {
    "v1".to_string()
}

#[derive(Debug, Deserialize)]
pub struct MembershipCreate {
    pub user_id: i64,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    pub project_id: i64,
    pub status_counts: HashMap<String, i64>,
    pub role_counts: HashMap<String, i64>,
}

#[derive(Debug, FromRow)]
struct StatusCountRow {
    status: SentenceStatus,
    count: i64,
}

#[derive(Debug, FromRow)]
struct RoleCountRow {
    role: Role,
    count: i64,
}

pub struct ProjectService {
    state: Arc<AppState>,
}

impl ProjectService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn create(
        &self,
        actor: &AuthenticatedUser,
        payload: ProjectCreate,
    ) -> Result<Project, ServiceError> {
        payload
            .validate()
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
        if !actor.role.is_admin() {
            return Err(ServiceError::TransitionForbidden);
        }

        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM projects WHERE name = $1")
            .bind(&payload.name)
            .fetch_optional(&self.state.pool)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict);
        }

        let project: Project = sqlx::query_as(
            r#"
            INSERT INTO projects
                (name, language, amr_version, role_set_version, validation_rule_version, version_tag, description, created_at, updated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7, now(), now())
            RETURNING *
            "#,
        )
        .bind(&payload.name)
        .bind(&payload.language)
        .bind(&payload.amr_version)
        .bind(&payload.role_set_version)
        .bind(&payload.validation_rule_version)
        .bind(&payload.version_tag)
        .bind(&payload.description)
        .fetch_one(&self.state.pool)
        .await?;

        Ok(project)
    }

    pub async fn list(&self) -> Result<Vec<Project>, ServiceError> {
        Ok(sqlx::query_as("SELECT * FROM projects ORDER BY id").fetch_all(&self.state.pool).await?)
    }

    pub async fn summary(&self, project_id: i64) -> Result<ProjectSummary, ServiceError> {
        let _ = self.get(project_id).await?;

        let status_rows: Vec<StatusCountRow> = sqlx::query_as(
            "SELECT status, COUNT(*) as count FROM sentences WHERE project_id = $1 GROUP BY status",
        )
        .bind(project_id)
        .fetch_all(&self.state.pool)
        .await?;

        let role_rows: Vec<RoleCountRow> = sqlx::query_as(
            r#"
            SELECT role, COUNT(*) as count FROM project_memberships
            WHERE project_id = $1 AND is_active = true AND approved_at IS NOT NULL
            GROUP BY role
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.state.pool)
        .await?;

        Ok(ProjectSummary {
            project_id,
            status_counts: status_rows
                .into_iter()
                .map(|r| (r.status.as_str().to_string(), r.count))
                .collect(),
            role_counts: role_rows
                .into_iter()
                .map(|r| (r.role.as_str().to_string(), r.count))
                .collect(),
        })
    }

    pub async fn get(&self, project_id: i64) -> Result<Project, ServiceError> {
        sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&self.state.pool)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// Creates an inactive, unapproved membership. A curator or admin must
    /// separately approve it before the user participates.
    pub async fn add_member(
        &self,
        actor: &AuthenticatedUser,
        project_id: i64,
        payload: MembershipCreate,
    ) -> Result<ProjectMembership, ServiceError> {
        if !matches!(actor.role, Role::Admin | Role::Curator) {
            return Err(ServiceError::TransitionForbidden);
        }
        self.get(project_id).await?;

        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM project_memberships WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(payload.user_id)
        .fetch_optional(&self.state.pool)
        .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict);
        }

        let membership: ProjectMembership = sqlx::query_as(
            r#"
            INSERT INTO project_memberships (project_id, user_id, role, is_active, approved_at)
            VALUES ($1,$2,$3,false,NULL)
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(payload.user_id)
        .bind(payload.role)
        .fetch_one(&self.state.pool)
        .await?;

        Ok(membership)
    }

    pub async fn approve_member(
        &self,
        actor: &AuthenticatedUser,
        project_id: i64,
        user_id: i64,
    ) -> Result<ProjectMembership, ServiceError> {
        if !matches!(actor.role, Role::Admin | Role::Curator) {
            return Err(ServiceError::TransitionForbidden);
        }

        let membership: ProjectMembership = sqlx::query_as(
            r#"
            UPDATE project_memberships
            SET is_active = true, approved_at = now()
            WHERE project_id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.state.pool)
        .await?
        .ok_or(ServiceError::NotFound)?;

        Ok(membership)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_create_defaults_match_turkish_amr_project_conventions() {
        assert_eq!(default_language(), "tr");
        assert_eq!(default_role_set_version(), "tr-propbank");
    }
}
