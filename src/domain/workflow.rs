//! The sentence status state machine: transition table, role gating, and the
//! small set of pure predicates the orchestrator composes around it.

use thiserror::Error;

use super::models::{ReviewDecision, Role, SentenceStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("no transition defined from {from:?} to {to:?}")]
    TransitionNotDefined {
        from: SentenceStatus,
        to: SentenceStatus,
    },
    #[error("role {role:?} is not permitted to move {from:?} to {to:?}")]
    TransitionForbidden {
        from: SentenceStatus,
        to: SentenceStatus,
        role: Role,
    },
    #[error("assignment not allowed in current status")]
    AssignmentNotAllowed,
    #[error("reassignment requires a prior reject review")]
    ReassignRequiresRejection,
}

/// `(from, to, roles allowed to perform the transition)`. This is the richer
/// of the two transition-table variants observed in the source material:
/// `NEW -> ASSIGNED` permits curator (not just admin/engine), and the
/// `ASSIGNED -> ASSIGNED` / `IN_REVIEW -> IN_REVIEW` self-loops are explicit
/// rather than implied.
const TRANSITIONS: &[(SentenceStatus, SentenceStatus, &[Role])] = &[
    (
        SentenceStatus::New,
        SentenceStatus::Assigned,
        &[Role::Admin, Role::AssignmentEngine, Role::Curator],
    ),
    (
        SentenceStatus::Assigned,
        SentenceStatus::Assigned,
        &[Role::Admin, Role::AssignmentEngine, Role::Curator],
    ),
    (
        SentenceStatus::Assigned,
        SentenceStatus::Submitted,
        &[Role::Annotator],
    ),
    (
        SentenceStatus::Submitted,
        SentenceStatus::InReview,
        &[Role::Admin, Role::Reviewer, Role::Curator],
    ),
    (
        SentenceStatus::InReview,
        SentenceStatus::InReview,
        &[Role::Admin, Role::Reviewer, Role::Curator],
    ),
    (
        SentenceStatus::InReview,
        SentenceStatus::Adjudicated,
        &[Role::Admin, Role::Reviewer, Role::Curator],
    ),
    (
        SentenceStatus::InReview,
        SentenceStatus::Submitted,
        &[Role::Reviewer],
    ),
    (
        SentenceStatus::InReview,
        SentenceStatus::Assigned,
        &[Role::Admin, Role::Reviewer, Role::Curator],
    ),
    (
        SentenceStatus::Adjudicated,
        SentenceStatus::Accepted,
        &[Role::Admin, Role::Curator],
    ),
    (
        SentenceStatus::Adjudicated,
        SentenceStatus::InReview,
        &[Role::Admin, Role::Curator],
    ),
];

/// Checks that `(current, target)` is a defined transition and that `actor`
/// (admin always passes) is in the allowed role set for it.
pub fn ensure_transition(
    current: SentenceStatus,
    target: SentenceStatus,
    actor: Role,
) -> Result<(), GuardError> {
    let Some((_, _, roles)) = TRANSITIONS
        .iter()
        .find(|(from, to, _)| *from == current && *to == target)
    else {
        return Err(GuardError::TransitionNotDefined {
            from: current,
            to: target,
        });
    };
    if actor.is_admin() || roles.contains(&actor) {
        Ok(())
    } else {
        Err(GuardError::TransitionForbidden {
            from: current,
            to: target,
            role: actor,
        })
    }
}

/// Maps a review decision to the target sentence status.
/// `approve` goes to `IN_REVIEW` instead of `ADJUDICATED` when a
/// multi-annotator hold (`is_multi_annotator`) is signalled by the caller.
pub fn review_to_target(decision: ReviewDecision, is_multi_annotator: bool) -> SentenceStatus {
    match decision {
        ReviewDecision::Approve if is_multi_annotator => SentenceStatus::InReview,
        ReviewDecision::Approve => SentenceStatus::Adjudicated,
        ReviewDecision::NeedsFix => SentenceStatus::Submitted,
        ReviewDecision::Reject => SentenceStatus::Assigned,
    }
}

/// New assignments are only permitted from `NEW` or `ASSIGNED`, and if
/// assignments already exist, only when multiple assignees or a
/// reject-driven reassignment is explicitly allowed.
pub fn ensure_assignment_allowed(
    status: SentenceStatus,
    has_active_assignments: bool,
    allow_multiple: bool,
    allow_reassign: bool,
) -> Result<(), GuardError> {
    let status_ok = matches!(status, SentenceStatus::New | SentenceStatus::Assigned);
    if !status_ok {
        return Err(GuardError::AssignmentNotAllowed);
    }
    if has_active_assignments && !(allow_multiple || allow_reassign) {
        return Err(GuardError::AssignmentNotAllowed);
    }
    Ok(())
}

pub fn require_rejection_for_reassignment(has_rejection: bool) -> Result<(), GuardError> {
    if has_rejection {
        Ok(())
    } else {
        Err(GuardError::ReassignRequiresRejection)
    }
}

pub fn should_close_assignment_for_review(decision: ReviewDecision) -> bool {
    matches!(decision, ReviewDecision::Approve | ReviewDecision::Reject)
}

pub fn should_lock_assignments_for_target(target: SentenceStatus) -> bool {
    matches!(
        target,
        SentenceStatus::InReview | SentenceStatus::Adjudicated | SentenceStatus::Accepted
    )
}

/// Generic role gate used throughout the orchestrator and HTTP handlers.
/// Admin always passes regardless of the allowed set.
pub fn require_roles(actor: Role, allowed: &[Role]) -> Result<(), GuardError> {
    if actor.is_admin() || allowed.contains(&actor) {
        Ok(())
    } else {
        Err(GuardError::TransitionForbidden {
            from: SentenceStatus::New,
            to: SentenceStatus::New,
            role: actor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_transition_is_rejected() {
        let err = ensure_transition(SentenceStatus::New, SentenceStatus::Accepted, Role::Admin)
            .unwrap_err();
        assert_eq!(
            err,
            GuardError::TransitionNotDefined {
                from: SentenceStatus::New,
                to: SentenceStatus::Accepted
            }
        );
    }

    #[test]
    fn annotator_cannot_assign() {
        let err = ensure_transition(SentenceStatus::New, SentenceStatus::Assigned, Role::Annotator)
            .unwrap_err();
        assert!(matches!(err, GuardError::TransitionForbidden { .. }));
    }

    #[test]
    fn admin_is_superuser_for_any_defined_transition() {
        assert!(ensure_transition(SentenceStatus::New, SentenceStatus::Assigned, Role::Admin).is_ok());
        assert!(ensure_transition(
            SentenceStatus::Assigned,
            SentenceStatus::Submitted,
            Role::Admin
        )
        .is_ok());
    }

    #[test]
    fn review_to_target_maps_decisions() {
        assert_eq!(
            review_to_target(ReviewDecision::Approve, false),
            SentenceStatus::Adjudicated
        );
        assert_eq!(
            review_to_target(ReviewDecision::Approve, true),
            SentenceStatus::InReview
        );
        assert_eq!(
            review_to_target(ReviewDecision::NeedsFix, false),
            SentenceStatus::Submitted
        );
        assert_eq!(
            review_to_target(ReviewDecision::Reject, false),
            SentenceStatus::Assigned
        );
    }

    #[test]
    fn assignment_allowed_only_from_new_or_assigned() {
        assert!(ensure_assignment_allowed(SentenceStatus::New, false, false, false).is_ok());
        assert!(ensure_assignment_allowed(SentenceStatus::Submitted, false, false, false).is_err());
    }

    #[test]
    fn assignment_blocked_when_active_and_not_allowed() {
        assert!(ensure_assignment_allowed(SentenceStatus::Assigned, true, false, false).is_err());
        assert!(ensure_assignment_allowed(SentenceStatus::Assigned, true, true, false).is_ok());
        assert!(ensure_assignment_allowed(SentenceStatus::Assigned, true, false, true).is_ok());
    }

    #[test]
    fn reassignment_requires_prior_rejection() {
        assert!(require_rejection_for_reassignment(false).is_err());
        assert!(require_rejection_for_reassignment(true).is_ok());
    }

    #[test]
    fn close_assignment_flags() {
        assert!(should_close_assignment_for_review(ReviewDecision::Approve));
        assert!(should_close_assignment_for_review(ReviewDecision::Reject));
        assert!(!should_close_assignment_for_review(ReviewDecision::NeedsFix));
    }

    #[test]
    fn lock_assignments_flags() {
        assert!(should_lock_assignments_for_target(SentenceStatus::InReview));
        assert!(should_lock_assignments_for_target(SentenceStatus::Adjudicated));
        assert!(should_lock_assignments_for_target(SentenceStatus::Accepted));
        assert!(!should_lock_assignments_for_target(SentenceStatus::Submitted));
    }
}
