use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use sqlx::decode::Decode;
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{FromRow, Postgres, Type};
use std::str::FromStr;

/// Implements `sqlx::Type`/`Encode`/`Decode` for a closed enum stored as `TEXT`,
/// routed through the type's existing `as_str`/`FromStr`.
macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl Type<Postgres> for $ty {
            fn type_info() -> PgTypeInfo {
                <String as Type<Postgres>>::type_info()
            }
        }

        impl<'q> Encode<'q, Postgres> for $ty {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
                <&str as Encode<Postgres>>::encode(self.as_str(), buf)
            }
        }

        impl<'r> Decode<'r, Postgres> for $ty {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let raw = <&str as Decode<Postgres>>::decode(value)?;
                Ok(<$ty>::from_str(raw)?)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    Pending,
    Annotator,
    Reviewer,
    Curator,
    Admin,
    AssignmentEngine,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Pending => "pending",
            Role::Annotator => "annotator",
            Role::Reviewer => "reviewer",
            Role::Curator => "curator",
            Role::Admin => "admin",
            Role::AssignmentEngine => "assignment_engine",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "guest" => Ok(Role::Guest),
            "pending" => Ok(Role::Pending),
            "annotator" => Ok(Role::Annotator),
            "reviewer" => Ok(Role::Reviewer),
            "curator" => Ok(Role::Curator),
            "admin" => Ok(Role::Admin),
            "assignment_engine" => Ok(Role::AssignmentEngine),
            other => Err(format!("unknown role {other}")),
        }
    }
}

text_enum_sql!(Role);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SentenceStatus {
    New,
    Assigned,
    Submitted,
    InReview,
    Adjudicated,
    Accepted,
}

impl SentenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentenceStatus::New => "new",
            SentenceStatus::Assigned => "assigned",
            SentenceStatus::Submitted => "submitted",
            SentenceStatus::InReview => "in_review",
            SentenceStatus::Adjudicated => "adjudicated",
            SentenceStatus::Accepted => "accepted",
        }
    }
}

impl FromStr for SentenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(SentenceStatus::New),
            "assigned" => Ok(SentenceStatus::Assigned),
            "submitted" => Ok(SentenceStatus::Submitted),
            "in_review" => Ok(SentenceStatus::InReview),
            "adjudicated" => Ok(SentenceStatus::Adjudicated),
            "accepted" => Ok(SentenceStatus::Accepted),
            other => Err(format!("unknown sentence status {other}")),
        }
    }
}

text_enum_sql!(SentenceStatus);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    NeedsFix,
    Reject,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Approve => "approve",
            ReviewDecision::NeedsFix => "needs_fix",
            ReviewDecision::Reject => "reject",
        }
    }
}

impl FromStr for ReviewDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approve" => Ok(ReviewDecision::Approve),
            "needs_fix" => Ok(ReviewDecision::NeedsFix),
            "reject" => Ok(ReviewDecision::Reject),
            other => Err(format!("unknown review decision {other}")),
        }
    }
}

text_enum_sql!(ReviewDecision);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    RoundRobin,
    SkillBased,
}

impl AssignmentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStrategy::RoundRobin => "round_robin",
            AssignmentStrategy::SkillBased => "skill_based",
        }
    }
}

impl FromStr for AssignmentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "round_robin" => Ok(AssignmentStrategy::RoundRobin),
            "skill_based" => Ok(AssignmentStrategy::SkillBased),
            other => Err(format!("unknown assignment strategy {other}")),
        }
    }
}

text_enum_sql!(AssignmentStrategy);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExportLevel {
    Gold,
    Silver,
    All,
    Failed,
    Rejected,
}

impl ExportLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportLevel::Gold => "gold",
            ExportLevel::Silver => "silver",
            ExportLevel::All => "all",
            ExportLevel::Failed => "failed",
            ExportLevel::Rejected => "rejected",
        }
    }
}

impl FromStr for ExportLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gold" => Ok(ExportLevel::Gold),
            "silver" => Ok(ExportLevel::Silver),
            "all" => Ok(ExportLevel::All),
            "failed" => Ok(ExportLevel::Failed),
            "rejected" => Ok(ExportLevel::Rejected),
            other => Err(format!("unknown export level {other}")),
        }
    }
}

text_enum_sql!(ExportLevel);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    ManifestJson,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::ManifestJson => "manifest+json",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::ManifestJson => "zip",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "manifest+json" => Ok(ExportFormat::ManifestJson),
            other => Err(format!("unknown export format {other}")),
        }
    }
}

text_enum_sql!(ExportFormat);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PiiStrategy {
    Include,
    Strip,
    Anonymize,
}

impl PiiStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiStrategy::Include => "include",
            PiiStrategy::Strip => "strip",
            PiiStrategy::Anonymize => "anonymize",
        }
    }
}

impl FromStr for PiiStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "include" => Ok(PiiStrategy::Include),
            "strip" => Ok(PiiStrategy::Strip),
            "anonymize" => Ok(PiiStrategy::Anonymize),
            other => Err(format!("unknown pii strategy {other}")),
        }
    }
}

text_enum_sql!(PiiStrategy);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status {other}")),
        }
    }
}

text_enum_sql!(JobStatus);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Validation,
    ReviewReject,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Validation => "validation",
            FailureType::ReviewReject => "review_reject",
        }
    }
}

impl FromStr for FailureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "validation" => Ok(FailureType::Validation),
            "review_reject" => Ok(FailureType::ReviewReject),
            other => Err(format!("unknown failure type {other}")),
        }
    }
}

text_enum_sql!(FailureType);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub language: String,
    pub amr_version: String,
    pub role_set_version: String,
    pub validation_rule_version: String,
    pub version_tag: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserProfile {
    pub id: i64,
    pub user_id: i64,
    pub skills: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn skill_set(&self) -> Vec<String> {
        self.skills
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProjectMembership {
    pub id: i64,
    pub project_id: i64,
    pub user_id: i64,
    pub role: Role,
    pub is_active: bool,
    pub approved_at: Option<DateTime<Utc>>,
}

impl ProjectMembership {
    pub fn participates(&self) -> bool {
        self.is_active && self.approved_at.is_some()
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Sentence {
    pub id: i64,
    pub project_id: i64,
    pub text: String,
    pub source: Option<String>,
    pub difficulty_tag: Option<String>,
    pub status: SentenceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Assignment {
    pub id: i64,
    pub sentence_id: i64,
    pub user_id: i64,
    pub role: Role,
    pub is_blind: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Annotation {
    pub id: i64,
    pub sentence_id: i64,
    pub assignment_id: i64,
    pub author_id: i64,
    pub canonical_penman: String,
    pub validity_report: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Review {
    pub id: i64,
    pub annotation_id: i64,
    pub reviewer_id: i64,
    pub decision: ReviewDecision,
    pub score: Option<i32>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Adjudication {
    pub id: i64,
    pub sentence_id: i64,
    pub curator_id: i64,
    pub final_penman: String,
    pub decision_note: Option<String>,
    pub source_annotation_ids: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FailedSubmission {
    pub id: i64,
    pub project_id: i64,
    pub sentence_id: i64,
    pub assignment_id: Option<i64>,
    pub annotation_id: Option<i64>,
    pub user_id: Option<i64>,
    pub reviewer_id: Option<i64>,
    pub failure_type: FailureType,
    pub reason: String,
    pub details: serde_json::Value,
    pub amr_version: String,
    pub role_set_version: String,
    pub rule_version: String,
    pub submitted_penman: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub actor_id: Option<i64>,
    pub actor_role: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<i64>,
    pub before_status: Option<String>,
    pub after_status: Option<String>,
    pub project_id: Option<i64>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ExportJob {
    pub id: i64,
    pub project_id: i64,
    pub created_by: i64,
    pub status: JobStatus,
    pub format: ExportFormat,
    pub level: ExportLevel,
    pub pii_strategy: PiiStrategy,
    pub include_manifest: bool,
    pub include_failed: bool,
    pub include_rejected: bool,
    pub result_path: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_as_str() {
        for role in [
            Role::Guest,
            Role::Pending,
            Role::Annotator,
            Role::Reviewer,
            Role::Curator,
            Role::Admin,
            Role::AssignmentEngine,
        ] {
            assert_eq!(Role::from_str(role.as_str()).unwrap(), role);
        }
    }

    #[test]
    fn sentence_status_round_trips() {
        for status in [
            SentenceStatus::New,
            SentenceStatus::Assigned,
            SentenceStatus::Submitted,
            SentenceStatus::InReview,
            SentenceStatus::Adjudicated,
            SentenceStatus::Accepted,
        ] {
            assert_eq!(SentenceStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn export_format_maps_to_correct_extension() {
        assert_eq!(ExportFormat::Json.file_extension(), "json");
        assert_eq!(ExportFormat::ManifestJson.file_extension(), "zip");
    }

    #[test]
    fn membership_participates_requires_active_and_approved() {
        let base = ProjectMembership {
            id: 1,
            project_id: 1,
            user_id: 1,
            role: Role::Annotator,
            is_active: true,
            approved_at: None,
        };
        assert!(!base.participates());
        let approved = ProjectMembership {
            approved_at: Some(Utc::now()),
            ..base
        };
        assert!(approved.participates());
    }
}
