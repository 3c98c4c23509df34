//! The sentence lifecycle orchestrator: composes guard checks,
//! writes, validator calls and audit entries into single transactions.

use std::sync::Arc;

use serde::Deserialize;
use sqlx::{FromRow, Postgres, Transaction};
use validator::Validate;

use crate::{
    domain::{
        models::{
            Adjudication, Annotation, AssignmentStrategy, Project, Review, ReviewDecision, Role,
            Sentence, SentenceStatus,
        },
        workflow,
    },
    infrastructure::{auth::AuthenticatedUser, state::AppState},
    validation::{self, VersionTriple},
};

use super::{
    assignment::{AssignmentEngine, AssignmentRequest},
    audit::{self, AuditEntry},
    errors::ServiceError,
    failures::{self, FailedReviewInput, FailedValidationInput},
};

#[derive(Debug, Deserialize, Validate)]
pub struct SentenceCreate {
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub text: String,
    pub source: Option<String>,
    pub difficulty_tag: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignRequest {
    pub strategy: AssignmentStrategy,
    pub role: Role,
    #[validate(range(min = 1, message = "count must be at least 1"))]
    pub count: u32,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub provided_assignees: Vec<i64>,
    #[serde(default)]
    pub exclude_user_ids: Vec<i64>,
    #[serde(default)]
    pub allow_multiple: bool,
    #[serde(default)]
    pub reassign_after_reject: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitPayload {
    #[validate(length(min = 1, message = "penman_text must not be empty"))]
    pub penman_text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewPayload {
    pub annotation_id: i64,
    pub decision: ReviewDecision,
    #[validate(range(min = 0, max = 100, message = "score must be between 0 and 100"))]
    pub score: Option<i32>,
    pub comment: Option<String>,
    #[serde(default)]
    pub is_multi_annotator: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdjudicatePayload {
    #[validate(length(min = 1, message = "final_penman must not be empty"))]
    pub final_penman: String,
    pub note: Option<String>,
    #[serde(default)]
    pub source_annotation_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReopenPayload {
    #[validate(length(min = 1, message = "reason must not be empty"))]
    pub reason: String,
}

/// Either the stored annotation (submission accepted) or the full
/// validation report (submission rejected) — the "dynamic-typed error
/// envelope modeled as a Rust `enum`.
#[derive(Debug)]
pub enum SubmitOutcome {
    Accepted(Annotation),
    Rejected(Box<validation::ValidationReport>),
}

#[derive(Debug, FromRow)]
struct ActiveAssignmentRow {
    id: i64,
    user_id: i64,
    role: Role,
}

fn validate_payload<T: Validate>(payload: &T) -> Result<(), ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::InvalidRequest(e.to_string()))
}

pub struct SentenceOrchestrator {
    state: Arc<AppState>,
}

impl SentenceOrchestrator {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    async fn load_project(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        project_id: i64,
    ) -> Result<Project, ServiceError> {
        sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    async fn load_sentence(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sentence_id: i64,
    ) -> Result<Sentence, ServiceError> {
        sqlx::query_as::<_, Sentence>("SELECT * FROM sentences WHERE id = $1 FOR UPDATE")
            .bind(sentence_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    async fn active_assignments(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sentence_id: i64,
    ) -> Result<Vec<ActiveAssignmentRow>, ServiceError> {
        Ok(sqlx::query_as(
            "SELECT id, user_id, role FROM assignments WHERE sentence_id = $1 AND is_active = true",
        )
        .bind(sentence_id)
        .fetch_all(&mut **tx)
        .await?)
    }

    async fn deactivate_assignments(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i64],
    ) -> Result<(), ServiceError> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE assignments SET is_active = false, updated_at = now() WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sentence_id: i64,
        status: SentenceStatus,
    ) -> Result<(), ServiceError> {
        sqlx::query("UPDATE sentences SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status)
            .bind(sentence_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn has_prior_rejection(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sentence_id: i64,
    ) -> Result<bool, ServiceError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM reviews r
            JOIN annotations a ON a.id = r.annotation_id
            WHERE a.sentence_id = $1 AND r.decision = $2
            "#,
        )
        .bind(sentence_id)
        .bind(ReviewDecision::Reject)
        .fetch_one(&mut **tx)
        .await?;
        Ok(count > 0)
    }

    pub async fn create(
        &self,
        actor: &AuthenticatedUser,
        project_id: i64,
        payload: SentenceCreate,
    ) -> Result<Sentence, ServiceError> {
        validate_payload(&payload)?;
        workflow::require_roles(actor.role, &[Role::Curator])?;

        let mut tx = self.state.pool.begin().await?;
        self.load_project(&mut tx, project_id).await?;

        let sentence: Sentence = sqlx::query_as(
            r#"
            INSERT INTO sentences (project_id, text, source, difficulty_tag, status, created_at, updated_at)
            VALUES ($1,$2,$3,$4,$5, now(), now())
            RETURNING *
            "#,
        )
        .bind(project_id)
        .bind(&payload.text)
        .bind(&payload.source)
        .bind(&payload.difficulty_tag)
        .bind(SentenceStatus::New)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            AuditEntry {
                actor_id: Some(actor.user_id),
                actor_role: Some(actor.role),
                action: "sentence_created",
                entity_type: "sentence",
                entity_id: Some(sentence.id),
                before_status: None,
                after_status: Some(sentence.status.as_str()),
                project_id: Some(project_id),
                metadata: serde_json::json!({}),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(sentence)
    }

    pub async fn assign(
        &self,
        actor: &AuthenticatedUser,
        sentence_id: i64,
        request: AssignRequest,
    ) -> Result<Vec<i64>, ServiceError> {
        validate_payload(&request)?;
        let mut tx = self.state.pool.begin().await?;
        let sentence = self.load_sentence(&mut tx, sentence_id).await?;
        let active = self.active_assignments(&mut tx, sentence_id).await?;

        workflow::ensure_assignment_allowed(
            sentence.status,
            !active.is_empty(),
            request.allow_multiple,
            request.reassign_after_reject,
        )?;

        let mut deactivated_ids = Vec::new();
        if request.reassign_after_reject {
            let has_rejection = self.has_prior_rejection(&mut tx, sentence_id).await?;
            workflow::require_rejection_for_reassignment(has_rejection)?;
            deactivated_ids = active.iter().map(|a| a.id).collect();
            self.deactivate_assignments(&mut tx, &deactivated_ids).await?;
        }

        workflow::ensure_transition(sentence.status, SentenceStatus::Assigned, actor.role)?;

        let mut exclude_user_ids = request.exclude_user_ids.clone();
        exclude_user_ids.extend(active.iter().map(|a| a.user_id));

        let engine = AssignmentEngine::new(Arc::clone(&self.state));
        let selected = engine
            .select(&AssignmentRequest {
                project_id: sentence.project_id,
                strategy: request.strategy,
                role: request.role,
                count: request.count,
                required_skills: request.required_skills.clone(),
                provided_assignees: request.provided_assignees.clone(),
                exclude_user_ids,
            })
            .await?;

        for user_id in &selected {
            sqlx::query(
                r#"
                INSERT INTO assignments (sentence_id, user_id, role, is_blind, is_active, created_at, updated_at)
                VALUES ($1,$2,$3,false,true, now(), now())
                "#,
            )
            .bind(sentence_id)
            .bind(user_id)
            .bind(request.role)
            .execute(&mut *tx)
            .await?;
        }

        self.set_status(&mut tx, sentence_id, SentenceStatus::Assigned).await?;

        audit::record(
            &mut tx,
            AuditEntry {
                actor_id: Some(actor.user_id),
                actor_role: Some(actor.role),
                action: "sentence_assigned",
                entity_type: "sentence",
                entity_id: Some(sentence_id),
                before_status: Some(sentence.status.as_str()),
                after_status: Some(SentenceStatus::Assigned.as_str()),
                project_id: Some(sentence.project_id),
                metadata: serde_json::json!({
                    "assignee_ids": selected,
                    "strategy": request.strategy.as_str(),
                    "requested_count": request.count,
                    "deactivated_assignment_ids": deactivated_ids,
                }),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(selected)
    }

    pub async fn submit(
        &self,
        actor: &AuthenticatedUser,
        sentence_id: i64,
        payload: SubmitPayload,
    ) -> Result<SubmitOutcome, ServiceError> {
        validate_payload(&payload)?;
        let mut tx = self.state.pool.begin().await?;
        let sentence = self.load_sentence(&mut tx, sentence_id).await?;
        let project = self.load_project(&mut tx, sentence.project_id).await?;

        let assignment: ActiveAssignmentRow = sqlx::query_as(
            r#"
            SELECT id, user_id, role FROM assignments
            WHERE sentence_id = $1 AND user_id = $2 AND is_active = true AND role = $3
            "#,
        )
        .bind(sentence_id)
        .bind(actor.user_id)
        .bind(Role::Annotator)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServiceError::NotFound)?;

        workflow::ensure_transition(sentence.status, SentenceStatus::Submitted, actor.role)?;

        let versions = VersionTriple {
            amr_version: project.amr_version.clone(),
            role_set_version: project.role_set_version.clone(),
            rule_version: project.validation_rule_version.clone(),
        };
        let report = validation::validate(&payload.penman_text, &versions);

        if !report.is_valid {
            failures::record_validation_failure(
                &mut tx,
                FailedValidationInput {
                    project_id: sentence.project_id,
                    sentence_id,
                    assignment_id: Some(assignment.id),
                    user_id: Some(actor.user_id),
                    submitted_penman: &payload.penman_text,
                    report: &report,
                },
            )
            .await?;
            tx.commit().await?;
            return Ok(SubmitOutcome::Rejected(Box::new(report)));
        }

        let canonical = report
            .canonical_penman
            .clone()
            .ok_or_else(|| ServiceError::Internal("valid report missing canonical form".into()))?;
        let report_json =
            serde_json::to_value(&report).map_err(|e| ServiceError::Internal(e.to_string()))?;

        let annotation: Annotation = sqlx::query_as(
            r#"
            INSERT INTO annotations (sentence_id, assignment_id, author_id, canonical_penman, validity_report, created_at)
            VALUES ($1,$2,$3,$4,$5, now())
            RETURNING *
            "#,
        )
        .bind(sentence_id)
        .bind(assignment.id)
        .bind(actor.user_id)
        .bind(&canonical)
        .bind(&report_json)
        .fetch_one(&mut *tx)
        .await?;

        self.set_status(&mut tx, sentence_id, SentenceStatus::Submitted).await?;

        audit::record(
            &mut tx,
            AuditEntry {
                actor_id: Some(actor.user_id),
                actor_role: Some(actor.role),
                action: "annotation_submitted",
                entity_type: "sentence",
                entity_id: Some(sentence_id),
                before_status: Some(sentence.status.as_str()),
                after_status: Some(SentenceStatus::Submitted.as_str()),
                project_id: Some(sentence.project_id),
                metadata: serde_json::json!({ "annotation_id": annotation.id }),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(SubmitOutcome::Accepted(annotation))
    }

    pub async fn review(
        &self,
        actor: &AuthenticatedUser,
        sentence_id: i64,
        payload: ReviewPayload,
    ) -> Result<Sentence, ServiceError> {
        validate_payload(&payload)?;
        let mut tx = self.state.pool.begin().await?;
        let sentence = self.load_sentence(&mut tx, sentence_id).await?;
        let project = self.load_project(&mut tx, sentence.project_id).await?;

        let annotation: Annotation =
            sqlx::query_as("SELECT * FROM annotations WHERE id = $1 AND sentence_id = $2")
                .bind(payload.annotation_id)
                .bind(sentence_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(ServiceError::NotFound)?;

        let mut before_status = sentence.status;
        if before_status == SentenceStatus::Submitted {
            workflow::ensure_transition(before_status, SentenceStatus::InReview, actor.role)?;
            self.set_status(&mut tx, sentence_id, SentenceStatus::InReview).await?;
            before_status = SentenceStatus::InReview;
        }

        let target = workflow::review_to_target(payload.decision, payload.is_multi_annotator);
        workflow::ensure_transition(before_status, target, actor.role)?;

        let review: Review = sqlx::query_as(
            r#"
            INSERT INTO reviews (annotation_id, reviewer_id, decision, score, comment, created_at)
            VALUES ($1,$2,$3,$4,$5, now())
            RETURNING *
            "#,
        )
        .bind(payload.annotation_id)
        .bind(actor.user_id)
        .bind(payload.decision)
        .bind(payload.score)
        .bind(&payload.comment)
        .fetch_one(&mut *tx)
        .await?;

        let mut deactivated_ids = Vec::new();
        if workflow::should_close_assignment_for_review(payload.decision) {
            deactivated_ids.push(annotation.assignment_id);
        }
        if workflow::should_lock_assignments_for_target(target) {
            let active = self.active_assignments(&mut tx, sentence_id).await?;
            for a in active {
                if !deactivated_ids.contains(&a.id) {
                    deactivated_ids.push(a.id);
                }
            }
        }
        self.deactivate_assignments(&mut tx, &deactivated_ids).await?;

        self.set_status(&mut tx, sentence_id, target).await?;

        if payload.decision == ReviewDecision::Reject {
            failures::record_review_rejection(
                &mut tx,
                FailedReviewInput {
                    project_id: sentence.project_id,
                    sentence_id,
                    annotation_id: payload.annotation_id,
                    reviewer_id: actor.user_id,
                    reason: payload.comment.as_deref().unwrap_or("rejected"),
                    amr_version: &project.amr_version,
                    role_set_version: &project.role_set_version,
                    rule_version: &project.validation_rule_version,
                },
            )
            .await?;
        }

        audit::record(
            &mut tx,
            AuditEntry {
                actor_id: Some(actor.user_id),
                actor_role: Some(actor.role),
                action: "review_recorded",
                entity_type: "sentence",
                entity_id: Some(sentence_id),
                before_status: Some(sentence.status.as_str()),
                after_status: Some(target.as_str()),
                project_id: Some(sentence.project_id),
                metadata: serde_json::json!({
                    "review_id": review.id,
                    "decision": payload.decision.as_str(),
                    "deactivated_assignment_ids": deactivated_ids,
                }),
            },
        )
        .await?;

        tx.commit().await?;
        self.refetch_sentence(sentence_id).await
    }

    pub async fn adjudicate(
        &self,
        actor: &AuthenticatedUser,
        sentence_id: i64,
        payload: AdjudicatePayload,
    ) -> Result<Adjudication, ServiceError> {
        validate_payload(&payload)?;
        workflow::require_roles(actor.role, &[Role::Curator])?;

        let mut tx = self.state.pool.begin().await?;
        let sentence = self.load_sentence(&mut tx, sentence_id).await?;
        if sentence.status != SentenceStatus::InReview {
            return Err(ServiceError::TransitionNotDefined);
        }
        workflow::ensure_transition(sentence.status, SentenceStatus::Adjudicated, actor.role)?;

        let active = self.active_assignments(&mut tx, sentence_id).await?;
        let ids: Vec<i64> = active.iter().map(|a| a.id).collect();
        self.deactivate_assignments(&mut tx, &ids).await?;

        let sources =
            serde_json::to_value(&payload.source_annotation_ids).map_err(|e| ServiceError::Internal(e.to_string()))?;
        let adjudication: Adjudication = sqlx::query_as(
            r#"
            INSERT INTO adjudications (sentence_id, curator_id, final_penman, decision_note, source_annotation_ids, created_at)
            VALUES ($1,$2,$3,$4,$5, now())
            RETURNING *
            "#,
        )
        .bind(sentence_id)
        .bind(actor.user_id)
        .bind(&payload.final_penman)
        .bind(&payload.note)
        .bind(&sources)
        .fetch_one(&mut *tx)
        .await?;

        self.set_status(&mut tx, sentence_id, SentenceStatus::Adjudicated).await?;

        audit::record(
            &mut tx,
            AuditEntry {
                actor_id: Some(actor.user_id),
                actor_role: Some(actor.role),
                action: "sentence_adjudicated",
                entity_type: "sentence",
                entity_id: Some(sentence_id),
                before_status: Some(sentence.status.as_str()),
                after_status: Some(SentenceStatus::Adjudicated.as_str()),
                project_id: Some(sentence.project_id),
                metadata: serde_json::json!({ "adjudication_id": adjudication.id }),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(adjudication)
    }

    pub async fn accept(
        &self,
        actor: &AuthenticatedUser,
        sentence_id: i64,
    ) -> Result<Sentence, ServiceError> {
        workflow::require_roles(actor.role, &[Role::Curator])?;

        let mut tx = self.state.pool.begin().await?;
        let sentence = self.load_sentence(&mut tx, sentence_id).await?;
        workflow::ensure_transition(sentence.status, SentenceStatus::Accepted, actor.role)?;

        let active = self.active_assignments(&mut tx, sentence_id).await?;
        let ids: Vec<i64> = active.iter().map(|a| a.id).collect();
        self.deactivate_assignments(&mut tx, &ids).await?;

        self.set_status(&mut tx, sentence_id, SentenceStatus::Accepted).await?;

        audit::record(
            &mut tx,
            AuditEntry {
                actor_id: Some(actor.user_id),
                actor_role: Some(actor.role),
                action: "sentence_accepted",
                entity_type: "sentence",
                entity_id: Some(sentence_id),
                before_status: Some(sentence.status.as_str()),
                after_status: Some(SentenceStatus::Accepted.as_str()),
                project_id: Some(sentence.project_id),
                metadata: serde_json::json!({}),
            },
        )
        .await?;

        tx.commit().await?;
        self.refetch_sentence(sentence_id).await
    }

    pub async fn reopen(
        &self,
        actor: &AuthenticatedUser,
        sentence_id: i64,
        payload: ReopenPayload,
    ) -> Result<Sentence, ServiceError> {
        validate_payload(&payload)?;
        workflow::require_roles(actor.role, &[Role::Curator])?;

        let mut tx = self.state.pool.begin().await?;
        let sentence = self.load_sentence(&mut tx, sentence_id).await?;
        if sentence.status != SentenceStatus::Adjudicated {
            return Err(ServiceError::TransitionNotDefined);
        }
        workflow::ensure_transition(sentence.status, SentenceStatus::InReview, actor.role)?;

        self.set_status(&mut tx, sentence_id, SentenceStatus::InReview).await?;

        audit::record(
            &mut tx,
            AuditEntry {
                actor_id: Some(actor.user_id),
                actor_role: Some(actor.role),
                action: "sentence_reopened",
                entity_type: "sentence",
                entity_id: Some(sentence_id),
                before_status: Some(sentence.status.as_str()),
                after_status: Some(SentenceStatus::InReview.as_str()),
                project_id: Some(sentence.project_id),
                metadata: serde_json::json!({ "reason": payload.reason }),
            },
        )
        .await?;

        tx.commit().await?;
        self.refetch_sentence(sentence_id).await
    }

    async fn refetch_sentence(&self, sentence_id: i64) -> Result<Sentence, ServiceError> {
        sqlx::query_as::<_, Sentence>("SELECT * FROM sentences WHERE id = $1")
            .bind(sentence_id)
            .fetch_optional(&self.state.pool)
            .await?
            .ok_or(ServiceError::NotFound)
    }
}
