//! Assembles a project snapshot, applies the PII policy, builds the
//! manifest, and materializes the result to storage.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::FromRow;

use crate::{
    domain::models::{ExportFormat, ExportLevel, PiiStrategy, Project, Role, SentenceStatus},
    infrastructure::state::AppState,
    validation::{self, VersionTriple},
};

use super::errors::ServiceError;

#[derive(Debug, Clone, Deserialize)]
pub struct ExportRequest {
    pub project_id: i64,
    pub level: ExportLevel,
    pub format: ExportFormat,
    pub pii_strategy: PiiStrategy,
    #[serde(default)]
    pub include_manifest: bool,
    #[serde(default)]
    pub include_failed: bool,
    #[serde(default)]
    pub include_rejected: bool,
}

pub struct ExportOutcome {
    pub storage_key: String,
    pub record_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, FromRow)]
struct SentenceRow {
    id: i64,
    project_id: i64,
    text: String,
    source: Option<String>,
    difficulty_tag: Option<String>,
    status: SentenceStatus,
}

#[derive(Debug, FromRow)]
struct AnnotationRow {
    id: i64,
    sentence_id: i64,
    author_id: i64,
    canonical_penman: String,
    validity_report: serde_json::Value,
}

#[derive(Debug, FromRow)]
struct ReviewRow {
    id: i64,
    annotation_id: i64,
    reviewer_id: i64,
    decision: String,
    score: Option<i32>,
    comment: Option<String>,
}

#[derive(Debug, FromRow)]
struct AdjudicationRow {
    sentence_id: i64,
    curator_id: i64,
    final_penman: String,
    decision_note: Option<String>,
}

#[derive(Debug, FromRow)]
struct FailedSubmissionRow {
    id: i64,
    sentence_id: i64,
    user_id: Option<i64>,
    reviewer_id: Option<i64>,
    failure_type: String,
    reason: String,
    submitted_penman: Option<String>,
}

pub struct ExportService {
    state: Arc<AppState>,
}

impl ExportService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn export(
        &self,
        actor_role: Role,
        request: &ExportRequest,
        job_id: Option<i64>,
        generated_at: DateTime<Utc>,
    ) -> Result<ExportOutcome, ServiceError> {
        if !matches!(actor_role, Role::Admin | Role::Curator) {
            return Err(ServiceError::ExportAccessError);
        }

        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
            .bind(request.project_id)
            .fetch_optional(&self.state.pool)
            .await?
            .ok_or(ServiceError::ExportNotFound)?;

        let statuses = statuses_for_level(request.level);
        let sentences: Vec<SentenceRow> = if statuses.is_empty() {
            Vec::new()
        } else {
            sqlx::query_as(
                "SELECT id, project_id, text, source, difficulty_tag, status FROM sentences WHERE project_id = $1 AND status = ANY($2) ORDER BY id",
            )
            .bind(request.project_id)
            .bind(statuses.iter().map(|s| s.as_str()).collect::<Vec<_>>())
            .fetch_all(&self.state.pool)
            .await?
        };

        let mut records = Vec::with_capacity(sentences.len());
        let versions = VersionTriple {
            amr_version: project.amr_version.clone(),
            role_set_version: project.role_set_version.clone(),
            rule_version: project.validation_rule_version.clone(),
        };

        for sentence in &sentences {
            let annotations: Vec<AnnotationRow> = sqlx::query_as(
                "SELECT id, sentence_id, author_id, canonical_penman, validity_report FROM annotations WHERE sentence_id = $1 ORDER BY id",
            )
            .bind(sentence.id)
            .fetch_all(&self.state.pool)
            .await?;

            let mut annotation_records = Vec::with_capacity(annotations.len());
            for annotation in annotations {
                let reviews: Vec<ReviewRow> = sqlx::query_as(
                    "SELECT id, annotation_id, reviewer_id, decision, score, comment FROM reviews WHERE annotation_id = $1 ORDER BY id",
                )
                .bind(annotation.id)
                .fetch_all(&self.state.pool)
                .await?;

                let report = parse_or_recompute(&annotation.validity_report, &annotation.canonical_penman, &versions);

                annotation_records.push(serde_json::json!({
                    "id": annotation.id,
                    "author_id": annotation.author_id,
                    "canonical_penman": annotation.canonical_penman,
                    "validity_report": report,
                    "reviews": reviews.iter().map(|r| serde_json::json!({
                        "id": r.id,
                        "reviewer_id": r.reviewer_id,
                        "decision": r.decision,
                        "score": r.score,
                        "comment": r.comment,
                    })).collect::<Vec<_>>(),
                }));
            }

            let adjudication: Option<AdjudicationRow> = sqlx::query_as(
                "SELECT sentence_id, curator_id, final_penman, decision_note FROM adjudications WHERE sentence_id = $1 ORDER BY id DESC LIMIT 1",
            )
            .bind(sentence.id)
            .fetch_optional(&self.state.pool)
            .await?;

            records.push(serde_json::json!({
                "id": sentence.id,
                "project_id": sentence.project_id,
                "text": sentence.text,
                "source": sentence.source,
                "difficulty_tag": sentence.difficulty_tag,
                "status": sentence.status.as_str(),
                "annotations": annotation_records,
                "adjudication": adjudication.map(|a| serde_json::json!({
                    "curator_id": a.curator_id,
                    "final_penman": a.final_penman,
                    "decision_note": a.decision_note,
                })),
            }));
        }

        let include_failed = request.include_failed || request.level == ExportLevel::Failed;
        let include_rejected = request.include_rejected || request.level == ExportLevel::Rejected;

        let mut failed_records = Vec::new();
        if include_failed || include_rejected {
            let rows: Vec<FailedSubmissionRow> = sqlx::query_as(
                "SELECT id, sentence_id, user_id, reviewer_id, failure_type, reason, submitted_penman FROM failed_submissions WHERE project_id = $1 ORDER BY id",
            )
            .bind(request.project_id)
            .fetch_all(&self.state.pool)
            .await?;

            for row in rows {
                let is_rejection = row.failure_type == "review_reject";
                let keep = (include_failed && !is_rejection) || (include_rejected && is_rejection);
                if !keep {
                    continue;
                }
                failed_records.push(serde_json::json!({
                    "id": row.id,
                    "sentence_id": row.sentence_id,
                    "user_id": row.user_id,
                    "reviewer_id": row.reviewer_id,
                    "failure_type": row.failure_type,
                    "reason": row.reason,
                    "submitted_penman": row.submitted_penman,
                }));
            }
        }

        apply_pii(&mut records, &mut failed_records, request.pii_strategy);

        let record_count = records.len();
        let failed_count = failed_records.len();

        let data = serde_json::json!({
            "records": records,
            "failed_submissions": failed_records,
        });

        let manifest = if request.include_manifest {
            Some(serde_json::json!({
                "project": {
                    "id": project.id,
                    "name": project.name,
                    "amr_version": project.amr_version,
                    "role_set_version": project.role_set_version,
                    "validation_rule_version": project.validation_rule_version,
                    "version_tag": project.version_tag,
                },
                "parameters": {
                    "level": request.level.as_str(),
                    "format": request.format.as_str(),
                    "pii_strategy": request.pii_strategy.as_str(),
                    "include_manifest": request.include_manifest,
                    "include_failed": include_failed,
                    "include_rejected": include_rejected,
                },
                "record_count": record_count,
                "failed_count": failed_count,
                "generated_at": generated_at.to_rfc3339(),
            }))
        } else {
            None
        };

        let bytes = materialize(request.format, &data, manifest.as_ref())?;
        let key = file_name(request.project_id, request.level, job_id, generated_at, request.format);
        self.state
            .storage
            .put(&key, bytes.into(), content_type(request.format))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        Ok(ExportOutcome {
            storage_key: key,
            record_count,
            failed_count,
        })
    }
}

fn statuses_for_level(level: ExportLevel) -> Vec<SentenceStatus> {
    match level {
        ExportLevel::Gold => vec![SentenceStatus::Accepted],
        ExportLevel::Silver => vec![SentenceStatus::Adjudicated, SentenceStatus::InReview],
        ExportLevel::All => vec![
            SentenceStatus::New,
            SentenceStatus::Assigned,
            SentenceStatus::Submitted,
            SentenceStatus::InReview,
            SentenceStatus::Adjudicated,
            SentenceStatus::Accepted,
        ],
        ExportLevel::Failed | ExportLevel::Rejected => Vec::new(),
    }
}

fn parse_or_recompute(
    stored: &serde_json::Value,
    canonical_penman: &str,
    versions: &VersionTriple,
) -> serde_json::Value {
    if stored.is_object() {
        return stored.clone();
    }
    let report = validation::validate(canonical_penman, versions);
    serde_json::to_value(report).unwrap_or(serde_json::Value::Null)
}

/// Deterministic small-integer mapping for anonymization: hashes the input
/// and folds it down, so the same id/email/source maps to the same
/// pseudonym across repeated exports without needing a stored table.
fn stable_small_int(key: &str) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let mut acc: u32 = 0;
    for byte in &digest[..4] {
        acc = (acc << 8) | *byte as u32;
    }
    acc % 100_000
}

fn looks_like_email(value: &str) -> bool {
    value.contains('@') && value.contains('.')
}

fn anonymize_value(value: &serde_json::Value, is_user_id_field: bool, is_source_field: bool) -> serde_json::Value {
    match value {
        serde_json::Value::Null => serde_json::Value::Null,
        serde_json::Value::Number(n) if is_user_id_field => {
            serde_json::json!(stable_small_int(&n.to_string()))
        }
        serde_json::Value::String(s) if is_source_field => {
            serde_json::json!(format!("src-{}", stable_small_int(s)))
        }
        serde_json::Value::String(s) if looks_like_email(s) => {
            serde_json::json!(format!("user-{}@example.local", stable_small_int(s)))
        }
        other => other.clone(),
    }
}

fn apply_pii(records: &mut [serde_json::Value], failed: &mut [serde_json::Value], strategy: PiiStrategy) {
    if strategy == PiiStrategy::Include {
        return;
    }

    let user_id_keys = ["author_id", "reviewer_id", "user_id", "curator_id"];
    let source_keys = ["source"];
    let ip_keys = ["ip_address"];

    for record in records.iter_mut().chain(failed.iter_mut()) {
        apply_pii_object(record, strategy, &user_id_keys, &source_keys, &ip_keys);
    }
}

fn apply_pii_object(
    value: &mut serde_json::Value,
    strategy: PiiStrategy,
    user_id_keys: &[&str],
    source_keys: &[&str],
    ip_keys: &[&str],
) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                let is_user_id = user_id_keys.contains(&key.as_str());
                let is_source = source_keys.contains(&key.as_str());
                let is_ip = ip_keys.contains(&key.as_str());
                match strategy {
                    PiiStrategy::Strip => {
                        if is_user_id || is_source || is_ip {
                            *v = serde_json::Value::Null;
                        } else if let serde_json::Value::String(s) = v {
                            if looks_like_email(s) {
                                *v = serde_json::Value::Null;
                            }
                        }
                    }
                    PiiStrategy::Anonymize => {
                        if is_ip {
                            *v = serde_json::json!("0.0.0.0");
                        } else {
                            *v = anonymize_value(v, is_user_id, is_source);
                        }
                    }
                    PiiStrategy::Include => {}
                }
                apply_pii_object(v, strategy, user_id_keys, source_keys, ip_keys);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                apply_pii_object(item, strategy, user_id_keys, source_keys, ip_keys);
            }
        }
        _ => {}
    }
}

fn content_type(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Json => "application/json",
        ExportFormat::ManifestJson => "application/zip",
    }
}

fn materialize(
    format: ExportFormat,
    data: &serde_json::Value,
    manifest: Option<&serde_json::Value>,
) -> Result<Vec<u8>, ServiceError> {
    match format {
        ExportFormat::Json => {
            let mut payload = data.clone();
            if let (Some(manifest), serde_json::Value::Object(map)) = (manifest, &mut payload) {
                map.insert("manifest".to_string(), manifest.clone());
            }
            serde_json::to_vec_pretty(&payload).map_err(|e| ServiceError::Internal(e.to_string()))
        }
        ExportFormat::ManifestJson => {
            let mut buffer = std::io::Cursor::new(Vec::new());
            {
                let mut zip = zip::ZipWriter::new(&mut buffer);
                let options = zip::write::FileOptions::default()
                    .compression_method(zip::CompressionMethod::Deflated);

                zip.start_file("data.json", options)
                    .map_err(|e| ServiceError::Internal(e.to_string()))?;
                let data_bytes =
                    serde_json::to_vec_pretty(data).map_err(|e| ServiceError::Internal(e.to_string()))?;
                std::io::Write::write_all(&mut zip, &data_bytes)
                    .map_err(|e| ServiceError::Internal(e.to_string()))?;

                if let Some(manifest) = manifest {
                    zip.start_file("manifest.json", options)
                        .map_err(|e| ServiceError::Internal(e.to_string()))?;
                    let manifest_bytes = serde_json::to_vec_pretty(manifest)
                        .map_err(|e| ServiceError::Internal(e.to_string()))?;
                    std::io::Write::write_all(&mut zip, &manifest_bytes)
                        .map_err(|e| ServiceError::Internal(e.to_string()))?;
                }

                zip.finish().map_err(|e| ServiceError::Internal(e.to_string()))?;
            }
            Ok(buffer.into_inner())
        }
    }
}

fn file_name(
    project_id: i64,
    level: ExportLevel,
    job_id: Option<i64>,
    generated_at: DateTime<Utc>,
    format: ExportFormat,
) -> String {
    let timestamp = generated_at.format("%Y%m%d-%H%M%S");
    match job_id {
        Some(job_id) => format!(
            "project-{project_id}-{}-job-{job_id}-{timestamp}.{}",
            level.as_str(),
            format.file_extension()
        ),
        None => format!(
            "project-{project_id}-{}-{timestamp}.{}",
            level.as_str(),
            format.file_extension()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymize_mapping_is_deterministic() {
        let a = stable_small_int("user@example.com");
        let b = stable_small_int("user@example.com");
        assert_eq!(a, b);
        let c = stable_small_int("other@example.com");
        assert_ne!(a, c);
    }

    #[test]
    fn strip_strategy_nulls_pii_fields() {
        let mut records = vec![serde_json::json!({
            "author_id": 42,
            "source": "field-notes",
            "text": "hello",
        })];
        let mut failed = Vec::new();
        apply_pii(&mut records, &mut failed, PiiStrategy::Strip);
        assert_eq!(records[0]["author_id"], serde_json::Value::Null);
        assert_eq!(records[0]["source"], serde_json::Value::Null);
        assert_eq!(records[0]["text"], serde_json::json!("hello"));
    }

    #[test]
    fn anonymize_strategy_replaces_source_with_stable_pseudonym() {
        let mut records = vec![serde_json::json!({ "source": "field-notes" })];
        let mut failed = Vec::new();
        apply_pii(&mut records, &mut failed, PiiStrategy::Anonymize);
        let value = records[0]["source"].as_str().unwrap().to_string();
        assert!(value.starts_with("src-"));

        let mut records_again = vec![serde_json::json!({ "source": "field-notes" })];
        apply_pii(&mut records_again, &mut Vec::new(), PiiStrategy::Anonymize);
        assert_eq!(records_again[0]["source"], serde_json::json!(value));
    }

    #[test]
    fn file_name_includes_job_id_when_present() {
        let ts = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let name = file_name(7, ExportLevel::Gold, Some(9), ts, ExportFormat::Json);
        assert_eq!(name, "project-7-gold-job-9-20260102-030405.json");
        let name_no_job = file_name(7, ExportLevel::Gold, None, ts, ExportFormat::ManifestJson);
        assert_eq!(name_no_job, "project-7-gold-20260102-030405.zip");
    }
}
