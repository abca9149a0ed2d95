//! Storage ports for attempts, the uniqueness registry, and profiles.
//!
//! The orchestrator, webhook gateway, and manual review all talk to one
//! [`IdentityStore`] trait so the backing store can be swapped (Postgres in
//! production, in-memory for tests and local development). The operations
//! whose correctness depends on a prior read - attempt-number allocation and
//! the registry conflict check - are single trait methods, so every adapter
//! implements them atomically and no caller can interleave a stale read with
//! a write.
//!
//! Registry writes only happen inside [`IdentityStore::commit_approval`],
//! [`IdentityStore::commit_manual_rejection`], and the advisory upsert; no
//! other component writes the registry.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use cargaruta_identity_core::{
    AttemptId, AttemptStatus, AttemptUpdate, GovernmentId, ManualDecision, ProfileState,
    ProviderTier, RegistryEntry, UserId, UserProfile, VerificationAttempt,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// The requested status change violates the attempt lifecycle.
    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition {
        from: AttemptStatus,
        to: AttemptStatus,
    },
}

/// Result of [`IdentityStore::start_attempt`].
#[derive(Debug, Clone)]
pub struct StartedAttempt {
    pub attempt: VerificationAttempt,
    /// True when an existing `in_progress` attempt was returned unchanged.
    pub resumed: bool,
}

/// The fields an approval writes across attempt, profile, and registry.
#[derive(Debug, Clone)]
pub struct ApprovalWrite {
    pub user_id: UserId,
    pub attempt_id: AttemptId,
    pub provider: ProviderTier,
    pub confidence_score: f64,
    /// When present, the registry is conflict-checked and upserted.
    pub id_number: Option<GovernmentId>,
    pub reference_id: Option<String>,
    pub premium_scores: Option<serde_json::Value>,
    pub manual_decision: Option<ManualDecision>,
}

/// Outcome of a conflict-checked approval.
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    /// Attempt, profile, and registry were all updated.
    Applied(VerificationAttempt),
    /// The ID number is already bound to a different decided account.
    /// Nothing was written.
    Conflict { owner_user_id: UserId },
}

/// The fields a manual rejection writes across attempt, profile, and registry.
#[derive(Debug, Clone)]
pub struct RejectionWrite {
    pub user_id: UserId,
    pub attempt_id: AttemptId,
    pub manual_decision: ManualDecision,
    /// User-facing feedback recorded on the profile.
    pub reason: Option<String>,
}

/// Apply a merge patch after validating the status transition.
///
/// Shared by every adapter so the lifecycle check cannot drift between
/// backends.
pub(crate) fn merge_checked(
    attempt: &mut VerificationAttempt,
    update: AttemptUpdate,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), StoreError> {
    if let Some(next) = update.status
        && !attempt.status.can_transition_to(next)
    {
        return Err(StoreError::IllegalTransition {
            from: attempt.status,
            to: next,
        });
    }
    attempt.merge(update, now);
    Ok(())
}

/// Combined storage port for the verification core.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Idempotently start or resume an attempt for a user.
    ///
    /// If an `in_progress` attempt exists it is returned unchanged;
    /// otherwise a new attempt is created with the next attempt number and
    /// the tier the escalation policy selects for it. Number allocation and
    /// insertion happen atomically, so concurrent calls converge on the
    /// same attempt instead of allocating duplicates.
    async fn start_attempt(&self, user_id: &UserId) -> Result<StartedAttempt, StoreError>;

    /// The most recent attempt for a user, if any.
    async fn latest_attempt(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerificationAttempt>, StoreError>;

    /// Fetch one attempt by owner and ID.
    async fn get_attempt(
        &self,
        user_id: &UserId,
        attempt_id: &AttemptId,
    ) -> Result<Option<VerificationAttempt>, StoreError>;

    /// Apply a merge-style update to an attempt.
    ///
    /// Status changes are validated against
    /// [`AttemptStatus::can_transition_to`]; writing the current status
    /// again is a no-op, so webhook replays are safe.
    async fn apply_update(
        &self,
        user_id: &UserId,
        attempt_id: &AttemptId,
        update: AttemptUpdate,
    ) -> Result<VerificationAttempt, StoreError>;

    /// Read the registry entry for a normalized ID number.
    async fn registry_get(
        &self,
        id_number: &GovernmentId,
    ) -> Result<Option<RegistryEntry>, StoreError>;

    /// Record provider/confidence for an ID number without deciding it.
    ///
    /// Never overwrites an entry already owned by a decided account, so the
    /// advisory path cannot violate the uniqueness invariant.
    async fn registry_upsert_advisory(
        &self,
        id_number: &GovernmentId,
        entry: RegistryEntry,
    ) -> Result<(), StoreError>;

    /// Atomic conflict-checked approval.
    ///
    /// Reads the registry entry for the submitted ID number, and when a
    /// different decided owner holds it, returns
    /// [`ApprovalOutcome::Conflict`] without writing anything. Otherwise
    /// writes the attempt (status `approved`), flips the profile to
    /// validated/verified, and upserts the registry entry in one
    /// transaction.
    async fn commit_approval(&self, write: ApprovalWrite) -> Result<ApprovalOutcome, StoreError>;

    /// Atomic manual rejection.
    ///
    /// Writes the attempt (status `rejected`, manual decision), flips the
    /// profile to rejected/banned with the reviewer's reason as user-facing
    /// feedback, and - when the attempt carries an ID number not owned by a
    /// different decided account - records a banned registry entry.
    async fn commit_manual_rejection(
        &self,
        write: RejectionWrite,
    ) -> Result<VerificationAttempt, StoreError>;

    /// Read the verification-relevant profile slice.
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError>;

    /// Set the user-facing profile state (creates the profile slice if the
    /// surrounding application has not touched it yet).
    async fn set_profile_state(
        &self,
        user_id: &UserId,
        state: ProfileState,
    ) -> Result<(), StoreError>;
}
