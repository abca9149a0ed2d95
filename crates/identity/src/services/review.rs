//! Manual review gateway: a human reviewer forces a terminal decision.
//!
//! Approvals run the same conflict-checked registry commit as the webhook
//! gateway; a detected conflict refuses the approval and is surfaced to the
//! reviewer rather than silently downgraded.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use cargaruta_identity_core::{
    AssetComponent, AttemptId, AttemptStatus, AttemptUpdate, DecisionAction, ManualDecision,
    UserId,
};

use crate::error::AppError;
use crate::store::{ApprovalOutcome, ApprovalWrite, IdentityStore, RejectionWrite};

/// Outcome of a manual decision.
#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    /// Attempt approved; profile verified; registry updated.
    Approved,
    /// Approval refused: the ID number belongs to another decided account.
    Conflict { owner_user_id: UserId },
    /// Attempt rejected; profile banned; reason recorded for the user.
    Rejected,
    /// Attempt flagged for recapture of the listed components.
    RetryRequested,
}

/// Service backing the reviewer-facing decision endpoint.
pub struct ReviewService {
    store: Arc<dyn IdentityStore>,
}

impl ReviewService {
    /// Create a review service over the store.
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Apply a reviewer decision to an attempt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown attempt,
    /// `AppError::BadRequest` for an illegal transition (e.g. deciding an
    /// already-terminal attempt differently), and `AppError::Store` on
    /// storage failures.
    #[instrument(
        skip(self, reason, requested_components),
        fields(user = %user_id, attempt = %attempt_id, reviewer = %reviewer_id, action = %action)
    )]
    pub async fn decide(
        &self,
        user_id: &UserId,
        attempt_id: &AttemptId,
        action: DecisionAction,
        reason: Option<String>,
        requested_components: Option<Vec<AssetComponent>>,
        reviewer_id: &UserId,
    ) -> Result<ReviewOutcome, AppError> {
        let attempt = self
            .store
            .get_attempt(user_id, attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("attempt {attempt_id}")))?;

        let decision = ManualDecision {
            action,
            reason: reason.clone(),
            reviewer_id: reviewer_id.clone(),
            decided_at: Utc::now(),
        };

        match action {
            DecisionAction::Approved => {
                let outcome = self
                    .store
                    .commit_approval(ApprovalWrite {
                        user_id: user_id.clone(),
                        attempt_id: attempt_id.clone(),
                        provider: attempt.provider,
                        confidence_score: attempt.confidence_score,
                        id_number: attempt.submitted_id_number.clone(),
                        reference_id: None,
                        premium_scores: None,
                        manual_decision: Some(decision),
                    })
                    .await?;

                match outcome {
                    ApprovalOutcome::Applied(_) => {
                        info!("Attempt approved by reviewer");
                        Ok(ReviewOutcome::Approved)
                    }
                    ApprovalOutcome::Conflict { owner_user_id } => {
                        warn!(owner = %owner_user_id, "Approval refused: ID number already claimed");
                        Ok(ReviewOutcome::Conflict { owner_user_id })
                    }
                }
            }
            DecisionAction::Rejected => {
                self.store
                    .commit_manual_rejection(RejectionWrite {
                        user_id: user_id.clone(),
                        attempt_id: attempt_id.clone(),
                        manual_decision: decision,
                        reason,
                    })
                    .await?;
                info!("Attempt rejected by reviewer");
                Ok(ReviewOutcome::Rejected)
            }
            DecisionAction::Retry => {
                // Not a terminal decision: the record is flagged so the
                // client can re-capture only the listed components.
                self.store
                    .apply_update(
                        user_id,
                        attempt_id,
                        AttemptUpdate {
                            status: Some(AttemptStatus::RetryRequired),
                            requested_components,
                            feedback: reason,
                            ..AttemptUpdate::default()
                        },
                    )
                    .await?;
                info!("Recapture requested by reviewer");
                Ok(ReviewOutcome::RetryRequested)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use cargaruta_identity_core::{GovernmentId, ProfileState, VerificationStatus};

    use crate::store::MemoryStore;

    use super::*;

    async fn pending_attempt_with_id(
        store: &MemoryStore,
        user: &UserId,
        id_number: &str,
    ) -> AttemptId {
        let started = store.start_attempt(user).await.expect("start");
        store
            .apply_update(
                user,
                &started.attempt.attempt_id,
                AttemptUpdate {
                    status: Some(AttemptStatus::Pending),
                    submitted_id_number: Some(GovernmentId::parse(id_number).expect("valid")),
                    confidence_score: Some(0.8),
                    ..AttemptUpdate::default()
                },
            )
            .await
            .expect("submit");
        started.attempt.attempt_id
    }

    #[tokio::test]
    async fn test_approve_updates_profile_and_registry() {
        let store = Arc::new(MemoryStore::new());
        let service = ReviewService::new(Arc::clone(&store) as Arc<dyn IdentityStore>);
        let user = UserId::new("u-1");
        let attempt_id = pending_attempt_with_id(&store, &user, "30111222").await;

        let outcome = service
            .decide(
                &user,
                &attempt_id,
                DecisionAction::Approved,
                None,
                None,
                &UserId::new("staff-1"),
            )
            .await
            .expect("decide");
        assert!(matches!(outcome, ReviewOutcome::Approved));

        let profile = store
            .get_profile(&user)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(profile.verification_status, VerificationStatus::Verified);
        assert_eq!(profile.profile_state, ProfileState::Validated);

        let attempt = store
            .get_attempt(&user, &attempt_id)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(attempt.status, AttemptStatus::Approved);
        let decision = attempt.manual_decision.expect("decision recorded");
        assert_eq!(decision.action, DecisionAction::Approved);
        assert_eq!(decision.reviewer_id, UserId::new("staff-1"));
    }

    #[tokio::test]
    async fn test_approve_refused_on_conflict() {
        let store = Arc::new(MemoryStore::new());
        let service = ReviewService::new(Arc::clone(&store) as Arc<dyn IdentityStore>);

        // u-a owns the number.
        let a = UserId::new("u-a");
        let attempt_a = pending_attempt_with_id(&store, &a, "30111222").await;
        service
            .decide(
                &a,
                &attempt_a,
                DecisionAction::Approved,
                None,
                None,
                &UserId::new("staff-1"),
            )
            .await
            .expect("approve a");

        // u-b submits the same number; approval must be refused.
        let b = UserId::new("u-b");
        let attempt_b = pending_attempt_with_id(&store, &b, "30111222").await;
        let outcome = service
            .decide(
                &b,
                &attempt_b,
                DecisionAction::Approved,
                None,
                None,
                &UserId::new("staff-1"),
            )
            .await
            .expect("decide");

        let ReviewOutcome::Conflict { owner_user_id } = outcome else {
            panic!("expected conflict");
        };
        assert_eq!(owner_user_id, a);

        // b's attempt is not approved and b's profile is untouched.
        let attempt = store
            .get_attempt(&b, &attempt_b)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(attempt.status, AttemptStatus::Pending);
        assert!(store.get_profile(&b).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn test_reject_records_reason_for_user() {
        let store = Arc::new(MemoryStore::new());
        let service = ReviewService::new(Arc::clone(&store) as Arc<dyn IdentityStore>);
        let user = UserId::new("u-1");
        let attempt_id = pending_attempt_with_id(&store, &user, "30111222").await;

        let outcome = service
            .decide(
                &user,
                &attempt_id,
                DecisionAction::Rejected,
                Some("photo too blurry".to_owned()),
                None,
                &UserId::new("staff-1"),
            )
            .await
            .expect("decide");
        assert!(matches!(outcome, ReviewOutcome::Rejected));

        let profile = store
            .get_profile(&user)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(profile.verification_status, VerificationStatus::Banned);
        assert_eq!(profile.profile_state, ProfileState::Rejected);
        assert_eq!(
            profile.verification_feedback.as_deref(),
            Some("photo too blurry")
        );
    }

    #[tokio::test]
    async fn test_retry_flags_components_without_deciding() {
        let store = Arc::new(MemoryStore::new());
        let service = ReviewService::new(Arc::clone(&store) as Arc<dyn IdentityStore>);
        let user = UserId::new("u-1");
        let attempt_id = pending_attempt_with_id(&store, &user, "30111222").await;

        let outcome = service
            .decide(
                &user,
                &attempt_id,
                DecisionAction::Retry,
                Some("selfie is too dark".to_owned()),
                Some(vec![AssetComponent::Selfie, AssetComponent::Front]),
                &UserId::new("staff-1"),
            )
            .await
            .expect("decide");
        assert!(matches!(outcome, ReviewOutcome::RetryRequested));

        let attempt = store
            .get_attempt(&user, &attempt_id)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(attempt.status, AttemptStatus::RetryRequired);
        assert_eq!(
            attempt.requested_components,
            Some(vec![AssetComponent::Selfie, AssetComponent::Front])
        );
        assert_eq!(attempt.feedback.as_deref(), Some("selfie is too dark"));
        // No terminal decision was recorded.
        assert!(attempt.manual_decision.is_none());

        // The user can still be decided later.
        let outcome = service
            .decide(
                &user,
                &attempt_id,
                DecisionAction::Rejected,
                None,
                None,
                &UserId::new("staff-1"),
            )
            .await
            .expect("decide after retry");
        assert!(matches!(outcome, ReviewOutcome::Rejected));
    }

    #[tokio::test]
    async fn test_unknown_attempt_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let service = ReviewService::new(store as Arc<dyn IdentityStore>);

        let err = service
            .decide(
                &UserId::new("u-1"),
                &AttemptId::new("missing"),
                DecisionAction::Approved,
                None,
                None,
                &UserId::new("staff-1"),
            )
            .await
            .expect_err("missing attempt");
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
