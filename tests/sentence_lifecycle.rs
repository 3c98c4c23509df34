mod test_harness;

use std::sync::Arc;

use amr_workbench::{
    domain::models::{AssignmentStrategy, Role, SentenceStatus},
    infrastructure::{
        auth::AuthenticatedUser,
        config::{AppConfig, AuthConfig, Config, DatabaseConfig, ExportWorkerConfig, StorageConfig},
        state::AppState,
        storage,
    },
    services::{
        identity::{IdentityService, RegisterRequest},
        orchestrator::{AssignRequest, SentenceCreate, SentenceOrchestrator, SubmitOutcome, SubmitPayload},
        projects::{ProjectCreate, ProjectService},
    },
};

fn test_config(database_url: &str) -> Arc<Config> {
    let mut storage_config = StorageConfig::default();
    storage_config.provider = "memory".to_string();

    Arc::new(Config {
        app: AppConfig::default(),
        database: DatabaseConfig {
            url: database_url.to_string(),
            max_connections: 5,
        },
        auth: AuthConfig {
            jwt_secret: "integration-test-secret".to_string(),
            ..AuthConfig::default()
        },
        storage: storage_config,
        export_worker: ExportWorkerConfig::default(),
    })
}

async fn build_state(pool: sqlx::PgPool) -> anyhow::Result<Arc<AppState>> {
    let config = test_config("postgres://unused-in-tests");
    let storage = storage::build_storage(&config.storage)?;
    Ok(Arc::new(AppState::new(config, pool, storage)?))
}

async fn register_user(state: &Arc<AppState>, username: &str, role: Role) -> anyhow::Result<i64> {
    let identity = IdentityService::new(Arc::clone(state));
    let user = identity
        .register(RegisterRequest {
            username: username.to_string(),
            email: format!("{username}@example.test"),
            password: "correct horse battery staple".to_string(),
        })
        .await?;
    sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
        .bind(role)
        .bind(user.id)
        .execute(&state.pool)
        .await?;
    Ok(user.id)
}

#[tokio::test]
async fn full_submission_to_acceptance_round_trip() -> anyhow::Result<()> {
    test_harness::run_test(|pool| async move {
        let state = build_state(pool).await?;

        let curator_id = register_user(&state, "curator_one", Role::Curator).await?;
        let annotator_id = register_user(&state, "annotator_one", Role::Annotator).await?;
        let reviewer_id = register_user(&state, "reviewer_one", Role::Reviewer).await?;

        let projects = ProjectService::new(Arc::clone(&state));
        let curator = AuthenticatedUser {
            user_id: curator_id,
            role: Role::Curator,
        };
        let project = projects
            .create(
                &curator,
                ProjectCreate {
                    name: "sozlesme-derlemi".to_string(),
                    language: "tr".to_string(),
                    amr_version: "1.0".to_string(),
                    role_set_version: "tr-propbank".to_string(),
                    validation_rule_version: "v1".to_string(),
                    version_tag: "v1".to_string(),
                    description: None,
                },
            )
            .await?;

        for (user_id, role) in [
            (annotator_id, Role::Annotator),
            (reviewer_id, Role::Reviewer),
        ] {
            let membership = projects
                .add_member(
                    &curator,
                    project.id,
                    amr_workbench::services::projects::MembershipCreate { user_id, role },
                )
                .await?;
            projects
                .approve_member(&curator, project.id, membership.user_id)
                .await?;
        }

        let orchestrator = SentenceOrchestrator::new(Arc::clone(&state));
        let sentence = orchestrator
            .create(
                &curator,
                project.id,
                SentenceCreate {
                    text: "Çocuk okula gitti.".to_string(),
                    source: Some("seed".to_string()),
                    difficulty_tag: None,
                },
            )
            .await?;
        assert_eq!(sentence.status, SentenceStatus::New);

        let assignees = orchestrator
            .assign(
                &curator,
                sentence.id,
                AssignRequest {
                    strategy: AssignmentStrategy::RoundRobin,
                    role: Role::Annotator,
                    count: 1,
                    required_skills: Vec::new(),
                    provided_assignees: vec![annotator_id],
                    exclude_user_ids: Vec::new(),
                    allow_multiple: false,
                    reassign_after_reject: false,
                },
            )
            .await?;
        assert_eq!(assignees, vec![annotator_id]);

        let annotator = AuthenticatedUser {
            user_id: annotator_id,
            role: Role::Annotator,
        };
        let outcome = orchestrator
            .submit(
                &annotator,
                sentence.id,
                SubmitPayload {
                    penman_text: "(g / git-01 :ARG0 (c / çocuk) :ARG4 (o / okul))".to_string(),
                },
            )
            .await?;
        let annotation = match outcome {
            SubmitOutcome::Accepted(annotation) => annotation,
            SubmitOutcome::Rejected(report) => panic!("expected acceptance, got {report:?}"),
        };

        let reviewer = AuthenticatedUser {
            user_id: reviewer_id,
            role: Role::Reviewer,
        };
        let reviewed = orchestrator
            .review(
                &reviewer,
                sentence.id,
                amr_workbench::services::orchestrator::ReviewPayload {
                    annotation_id: annotation.id,
                    decision: amr_workbench::domain::models::ReviewDecision::Approve,
                    score: Some(5),
                    comment: None,
                    is_multi_annotator: false,
                },
            )
            .await?;
        assert_eq!(reviewed.status, SentenceStatus::Adjudicated);

        let accepted = orchestrator.accept(&curator, sentence.id).await?;
        assert_eq!(accepted.status, SentenceStatus::Accepted);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn invalid_submission_is_rejected_and_leaves_sentence_assigned() -> anyhow::Result<()> {
    test_harness::run_test(|pool| async move {
        let state = build_state(pool).await?;

        let curator_id = register_user(&state, "curator_two", Role::Curator).await?;
        let annotator_id = register_user(&state, "annotator_two", Role::Annotator).await?;

        let curator = AuthenticatedUser {
            user_id: curator_id,
            role: Role::Curator,
        };
        let projects = ProjectService::new(Arc::clone(&state));
        let project = projects
            .create(
                &curator,
                ProjectCreate {
                    name: "sozlesme-derlemi-2".to_string(),
                    language: "tr".to_string(),
                    amr_version: "1.0".to_string(),
                    role_set_version: "tr-propbank".to_string(),
                    validation_rule_version: "v1".to_string(),
                    version_tag: "v1".to_string(),
                    description: None,
                },
            )
            .await?;

        let membership = projects
            .add_member(
                &curator,
                project.id,
                amr_workbench::services::projects::MembershipCreate {
                    user_id: annotator_id,
                    role: Role::Annotator,
                },
            )
            .await?;
        projects
            .approve_member(&curator, project.id, membership.user_id)
            .await?;

        let orchestrator = SentenceOrchestrator::new(Arc::clone(&state));
        let sentence = orchestrator
            .create(
                &curator,
                project.id,
                SentenceCreate {
                    text: "Kedi uyudu.".to_string(),
                    source: None,
                    difficulty_tag: None,
                },
            )
            .await?;

        orchestrator
            .assign(
                &curator,
                sentence.id,
                AssignRequest {
                    strategy: AssignmentStrategy::RoundRobin,
                    role: Role::Annotator,
                    count: 1,
                    required_skills: Vec::new(),
                    provided_assignees: vec![annotator_id],
                    exclude_user_ids: Vec::new(),
                    allow_multiple: false,
                    reassign_after_reject: false,
                },
            )
            .await?;

        let annotator = AuthenticatedUser {
            user_id: annotator_id,
            role: Role::Annotator,
        };
        let outcome = orchestrator
            .submit(
                &annotator,
                sentence.id,
                SubmitPayload {
                    penman_text: "(b / buy-01".to_string(),
                },
            )
            .await?;

        match outcome {
            SubmitOutcome::Rejected(report) => {
                assert!(!report.is_valid);
                assert!(report.errors.iter().any(|e| e.code == "parse_error"));
            }
            SubmitOutcome::Accepted(_) => panic!("expected rejection for unbalanced parens"),
        }

        let (failed_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM failed_submissions WHERE sentence_id = $1")
                .bind(sentence.id)
                .fetch_one(&state.pool)
                .await?;
        assert_eq!(failed_count, 1);

        Ok(())
    })
    .await
}
