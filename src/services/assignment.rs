//! Selects N eligible annotators/reviewers for a sentence by round-robin or
//! skill-overlap.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sqlx::FromRow;

use crate::{
    domain::models::{AssignmentStrategy, Role},
    infrastructure::state::AppState,
};

use super::errors::ServiceError;

#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    pub project_id: i64,
    pub strategy: AssignmentStrategy,
    pub role: Role,
    pub count: u32,
    pub required_skills: Vec<String>,
    pub provided_assignees: Vec<i64>,
    pub exclude_user_ids: Vec<i64>,
}

#[derive(Debug, FromRow)]
struct EligibleRow {
    user_id: i64,
}

#[derive(Debug, FromRow)]
struct LoadRow {
    user_id: i64,
    load: i64,
}

#[derive(Debug, FromRow)]
struct SkillRow {
    user_id: i64,
    skills: serde_json::Value,
}

pub struct AssignmentEngine {
    state: Arc<AppState>,
}

impl AssignmentEngine {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Picks up to `request.count` user ids eligible for `request.role` on
    /// `request.project_id`.
    pub async fn select(&self, request: &AssignmentRequest) -> Result<Vec<i64>, ServiceError> {
        if request.count == 0 {
            return Err(ServiceError::InvalidCount);
        }

        let eligible: Vec<i64> = sqlx::query_as::<_, EligibleRow>(
            r#"
            SELECT user_id
            FROM project_memberships
            WHERE project_id = $1 AND role = $2 AND is_active = true AND approved_at IS NOT NULL
            "#,
        )
        .bind(request.project_id)
        .bind(request.role)
        .fetch_all(&self.state.pool)
        .await?
        .into_iter()
        .map(|r| r.user_id)
        .collect();

        if !request.provided_assignees.is_empty() {
            return self.apply_override(request, eligible);
        }

        match request.strategy {
            AssignmentStrategy::RoundRobin => self.round_robin(request, eligible).await,
            AssignmentStrategy::SkillBased => {
                if request.required_skills.is_empty() {
                    self.round_robin(request, eligible).await
                } else {
                    self.skill_based(request, eligible).await
                }
            }
        }
    }

    fn apply_override(
        &self,
        request: &AssignmentRequest,
        eligible: Vec<i64>,
    ) -> Result<Vec<i64>, ServiceError> {
        let eligible_set: HashSet<i64> = eligible.into_iter().collect();
        let excluded: HashSet<i64> = request.exclude_user_ids.iter().copied().collect();
        let picked: Vec<i64> = request
            .provided_assignees
            .iter()
            .copied()
            .filter(|id| eligible_set.contains(id) && !excluded.contains(id))
            .take(request.count as usize)
            .collect();
        if picked.is_empty() {
            return Err(ServiceError::NoEligibleCandidates);
        }
        Ok(picked)
    }

    async fn loads_for(
        &self,
        request: &AssignmentRequest,
        candidates: &[i64],
    ) -> Result<HashMap<i64, i64>, ServiceError> {
        let loads: Vec<LoadRow> = sqlx::query_as(
            r#"
            SELECT a.user_id AS user_id, COUNT(*) AS load
            FROM assignments a
            JOIN sentences s ON s.id = a.sentence_id
            WHERE s.project_id = $1 AND a.role = $2 AND a.is_active = true
              AND a.user_id = ANY($3)
            GROUP BY a.user_id
            "#,
        )
        .bind(request.project_id)
        .bind(request.role)
        .bind(candidates)
        .fetch_all(&self.state.pool)
        .await?;
        Ok(loads.into_iter().map(|r| (r.user_id, r.load)).collect())
    }

    async fn round_robin(
        &self,
        request: &AssignmentRequest,
        eligible: Vec<i64>,
    ) -> Result<Vec<i64>, ServiceError> {
        let excluded: HashSet<i64> = request.exclude_user_ids.iter().copied().collect();
        let candidates: Vec<i64> = eligible.into_iter().filter(|id| !excluded.contains(id)).collect();
        if candidates.is_empty() {
            return Err(ServiceError::NoEligibleCandidates);
        }

        if candidates.len() < request.count as usize {
            return Err(ServiceError::InsufficientCandidates);
        }

        let mut load_by_user = self.loads_for(request, &candidates).await?;
        let mut ordered = candidates;
        ordered.sort_by_key(|id| (*load_by_user.entry(*id).or_insert(0), *id));
        ordered.truncate(request.count as usize);
        Ok(ordered)
    }

    async fn skill_based(
        &self,
        request: &AssignmentRequest,
        eligible: Vec<i64>,
    ) -> Result<Vec<i64>, ServiceError> {
        let excluded: HashSet<i64> = request.exclude_user_ids.iter().copied().collect();
        let candidates: Vec<i64> = eligible.into_iter().filter(|id| !excluded.contains(id)).collect();
        if candidates.is_empty() {
            return Err(ServiceError::NoEligibleCandidates);
        }

        let profiles: Vec<SkillRow> = sqlx::query_as(
            r#"
            SELECT user_id, skills
            FROM user_profiles
            WHERE user_id = ANY($1) AND is_active = true
            "#,
        )
        .bind(&candidates)
        .fetch_all(&self.state.pool)
        .await?;

        let required: HashSet<String> = request
            .required_skills
            .iter()
            .map(|s| s.to_lowercase())
            .collect();

        let mut overlap_by_user: HashMap<i64, usize> = HashMap::new();
        for row in profiles {
            let skills: HashSet<String> = row
                .skills
                .as_array()
                .map(|values| {
                    values
                        .iter()
                        .filter_map(|v| v.as_str().map(|s| s.to_lowercase()))
                        .collect()
                })
                .unwrap_or_default();
            let overlap = required.intersection(&skills).count();
            if overlap > 0 {
                overlap_by_user.insert(row.user_id, overlap);
            }
        }

        let mut filtered: Vec<i64> = candidates
            .into_iter()
            .filter(|id| overlap_by_user.contains_key(id))
            .collect();
        if filtered.is_empty() {
            return Err(ServiceError::NoEligibleCandidates);
        }
        if filtered.len() < request.count as usize {
            return Err(ServiceError::InsufficientCandidates);
        }

        let mut load_by_user = self.loads_for(request, &filtered).await?;
        filtered.sort_by_key(|id| {
            let overlap = *overlap_by_user.get(id).unwrap_or(&0);
            let load = *load_by_user.entry(*id).or_insert(0);
            (std::cmp::Reverse(overlap), load, *id)
        });
        filtered.truncate(request.count as usize);
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_with_zero_count_is_constructible_but_rejected_by_select() {
        let request = AssignmentRequest {
            project_id: 1,
            strategy: AssignmentStrategy::RoundRobin,
            role: Role::Annotator,
            count: 0,
            required_skills: Vec::new(),
            provided_assignees: Vec::new(),
            exclude_user_ids: Vec::new(),
        };
        assert_eq!(request.count, 0);
    }
}
