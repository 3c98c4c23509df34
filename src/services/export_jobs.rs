//! Persistent export job records and the single-consumer worker loop that
//! runs them one at a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    domain::models::{ExportFormat, ExportJob, ExportLevel, JobStatus, PiiStrategy, Role},
    infrastructure::state::AppState,
};

use super::{
    errors::ServiceError,
    export::{ExportRequest, ExportService},
};

pub struct CreateJobRequest {
    pub project_id: i64,
    pub created_by: i64,
    pub format: ExportFormat,
    pub level: ExportLevel,
    pub pii_strategy: PiiStrategy,
    pub include_manifest: bool,
    pub include_failed: bool,
    pub include_rejected: bool,
}

pub struct ExportJobQueue {
    state: Arc<AppState>,
}

impl ExportJobQueue {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn enqueue(&self, request: CreateJobRequest) -> Result<ExportJob, ServiceError> {
        let job: ExportJob = sqlx::query_as(
            r#"
            INSERT INTO export_jobs
                (project_id, created_by, status, format, level, pii_strategy,
                 include_manifest, include_failed, include_rejected, created_at, updated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9, now(), now())
            RETURNING *
            "#,
        )
        .bind(request.project_id)
        .bind(request.created_by)
        .bind(JobStatus::Queued)
        .bind(request.format)
        .bind(request.level)
        .bind(request.pii_strategy)
        .bind(request.include_manifest)
        .bind(request.include_failed)
        .bind(request.include_rejected)
        .fetch_one(&self.state.pool)
        .await?;

        Ok(job)
    }

    pub async fn get(&self, job_id: i64) -> Result<ExportJob, ServiceError> {
        sqlx::query_as::<_, ExportJob>("SELECT * FROM export_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.state.pool)
            .await?
            .ok_or(ServiceError::NotFound)
    }
}

/// One pass of the worker loop: claim the oldest queued job (if any) with a
/// `FOR UPDATE SKIP LOCKED` select, mark it `running`, run the export, then
/// mark `completed`/`failed`. Returns `true` if a job was claimed.
pub async fn run_once(state: &Arc<AppState>) -> Result<bool, ServiceError> {
    let mut tx = state.pool.begin().await?;
    let claimed: Option<ExportJob> = sqlx::query_as(
        r#"
        SELECT * FROM export_jobs
        WHERE status = $1
        ORDER BY created_at ASC, id ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(JobStatus::Queued)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(job) = claimed else {
        tx.commit().await?;
        return Ok(false);
    };

    sqlx::query("UPDATE export_jobs SET status = $1, updated_at = now() WHERE id = $2")
        .bind(JobStatus::Running)
        .bind(job.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let export_service = ExportService::new(Arc::clone(state));
    let request = ExportRequest {
        project_id: job.project_id,
        level: job.level,
        format: job.format,
        pii_strategy: job.pii_strategy,
        include_manifest: job.include_manifest,
        include_failed: job.include_failed,
        include_rejected: job.include_rejected,
    };

    match export_service
        .export(Role::Admin, &request, Some(job.id), Utc::now())
        .await
    {
        Ok(outcome) => {
            sqlx::query(
                "UPDATE export_jobs SET status = $1, result_path = $2, updated_at = now() WHERE id = $3",
            )
            .bind(JobStatus::Completed)
            .bind(outcome.storage_key)
            .bind(job.id)
            .execute(&state.pool)
            .await?;
        }
        Err(err) => {
            warn!(job_id = job.id, error = ?err, "export job failed");
            sqlx::query(
                "UPDATE export_jobs SET status = $1, error_message = $2, updated_at = now() WHERE id = $3",
            )
            .bind(JobStatus::Failed)
            .bind(err.to_string())
            .bind(job.id)
            .execute(&state.pool)
            .await?;
        }
    }

    Ok(true)
}

/// Spawns the cooperative pull loop: poll, claim at most one job, run it to
/// completion, sleep, repeat. Never runs more than one job `running` at a
/// time per worker; no retries on failure.
pub fn spawn_worker(state: Arc<AppState>) -> JoinHandle<()> {
    let poll_interval = Duration::from_secs(state.config.export_worker.poll_interval_seconds);
    tokio::spawn(async move {
        info!("export job worker started");
        loop {
            match run_once(&state).await {
                Ok(true) => continue,
                Ok(false) => tokio::time::sleep(poll_interval).await,
                Err(err) => {
                    warn!(error = ?err, "export worker pass failed");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    })
}
