//! Persists `FailedSubmission` rows, stamped with the project's version
//! triple so reproducibility survives later rule changes.

use sqlx::{Postgres, Transaction};

use crate::{
    domain::models::FailureType,
    validation::ValidationReport,
};

use super::errors::ServiceError;

pub struct FailedValidationInput<'a> {
    pub project_id: i64,
    pub sentence_id: i64,
    pub assignment_id: Option<i64>,
    pub user_id: Option<i64>,
    pub submitted_penman: &'a str,
    pub report: &'a ValidationReport,
}

pub struct FailedReviewInput<'a> {
    pub project_id: i64,
    pub sentence_id: i64,
    pub annotation_id: i64,
    pub reviewer_id: i64,
    pub reason: &'a str,
    pub amr_version: &'a str,
    pub role_set_version: &'a str,
    pub rule_version: &'a str,
}

/// Records a `validation`-type failure: a `submit` attempt whose PENMAN text
/// failed the validator. The sentence status is left untouched by the
/// caller; this only appends the record.
pub async fn record_validation_failure(
    tx: &mut Transaction<'_, Postgres>,
    input: FailedValidationInput<'_>,
) -> Result<i64, ServiceError> {
    let reason = input
        .report
        .errors
        .first()
        .map(|e| e.code.clone())
        .unwrap_or_else(|| "validation_failed".to_string());
    let details = serde_json::to_value(input.report).map_err(|e| ServiceError::Internal(e.to_string()))?;

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO failed_submissions
            (project_id, sentence_id, assignment_id, annotation_id, user_id, reviewer_id,
             failure_type, reason, details, amr_version, role_set_version, rule_version, submitted_penman, created_at)
        VALUES ($1,$2,$3,NULL,$4,NULL,$5,$6,$7,$8,$9,$10,$11, now())
        RETURNING id
        "#,
    )
    .bind(input.project_id)
    .bind(input.sentence_id)
    .bind(input.assignment_id)
    .bind(input.user_id)
    .bind(FailureType::Validation)
    .bind(reason)
    .bind(details)
    .bind(&input.report.amr_version)
    .bind(&input.report.role_set_version)
    .bind(&input.report.rule_version)
    .bind(input.submitted_penman)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

/// Records a `review_reject`-type failure: a reviewer decided `reject` on an
/// annotation.
pub async fn record_review_rejection(
    tx: &mut Transaction<'_, Postgres>,
    input: FailedReviewInput<'_>,
) -> Result<i64, ServiceError> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO failed_submissions
            (project_id, sentence_id, assignment_id, annotation_id, user_id, reviewer_id,
             failure_type, reason, details, amr_version, role_set_version, rule_version, submitted_penman, created_at)
        VALUES ($1,$2,NULL,$3,NULL,$4,$5,$6,$7,$8,$9,$10,NULL, now())
        RETURNING id
        "#,
    )
    .bind(input.project_id)
    .bind(input.sentence_id)
    .bind(input.annotation_id)
    .bind(input.reviewer_id)
    .bind(FailureType::ReviewReject)
    .bind(input.reason)
    .bind(serde_json::json!({ "reason": input.reason }))
    .bind(input.amr_version)
    .bind(input.role_set_version)
    .bind(input.rule_version)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}
