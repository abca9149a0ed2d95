//! In-memory store for tests and local development.
//!
//! A Mutex-guarded map store that implements the same atomicity contract as
//! the Postgres adapter: every read-modify-write runs under one lock
//! acquisition, so attempt numbering and registry conflict checks behave the
//! same way they do under a database transaction.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use cargaruta_identity_core::{
    AttemptId, AttemptStatus, AttemptUpdate, GovernmentId, ProfileState, RegistryEntry, UserId,
    UserProfile, VerificationAttempt, VerificationStatus,
};

use super::{
    ApprovalOutcome, ApprovalWrite, IdentityStore, RejectionWrite, StartedAttempt, StoreError,
};

#[derive(Default)]
struct Inner {
    attempts: HashMap<UserId, Vec<VerificationAttempt>>,
    registry: HashMap<GovernmentId, RegistryEntry>,
    profiles: HashMap<UserId, UserProfile>,
}

/// In-memory [`IdentityStore`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-write; tests should see it.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Inner {
    fn attempt_mut(
        &mut self,
        user_id: &UserId,
        attempt_id: &AttemptId,
    ) -> Result<&mut VerificationAttempt, StoreError> {
        self.attempts
            .get_mut(user_id)
            .and_then(|list| list.iter_mut().find(|a| a.attempt_id == *attempt_id))
            .ok_or(StoreError::NotFound)
    }

    fn profile_mut(&mut self, user_id: &UserId) -> &mut UserProfile {
        self.profiles
            .entry(user_id.clone())
            .or_insert_with(|| UserProfile::new(user_id.clone()))
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn start_attempt(&self, user_id: &UserId) -> Result<StartedAttempt, StoreError> {
        let mut inner = self.lock();
        let list = inner.attempts.entry(user_id.clone()).or_default();

        if let Some(last) = list.last()
            && last.status == AttemptStatus::InProgress
        {
            return Ok(StartedAttempt {
                attempt: last.clone(),
                resumed: true,
            });
        }

        let next_number = list.last().map_or(0, |a| a.attempt_number) + 1;
        let attempt = VerificationAttempt::new(
            AttemptId::new(Uuid::new_v4().to_string()),
            user_id.clone(),
            next_number,
            Utc::now(),
        );
        list.push(attempt.clone());

        Ok(StartedAttempt {
            attempt,
            resumed: false,
        })
    }

    async fn latest_attempt(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerificationAttempt>, StoreError> {
        Ok(self
            .lock()
            .attempts
            .get(user_id)
            .and_then(|list| list.last().cloned()))
    }

    async fn get_attempt(
        &self,
        user_id: &UserId,
        attempt_id: &AttemptId,
    ) -> Result<Option<VerificationAttempt>, StoreError> {
        Ok(self.lock().attempts.get(user_id).and_then(|list| {
            list.iter()
                .find(|a| a.attempt_id == *attempt_id)
                .cloned()
        }))
    }

    async fn apply_update(
        &self,
        user_id: &UserId,
        attempt_id: &AttemptId,
        update: AttemptUpdate,
    ) -> Result<VerificationAttempt, StoreError> {
        let mut inner = self.lock();
        let attempt = inner.attempt_mut(user_id, attempt_id)?;
        super::merge_checked(attempt, update, Utc::now())?;
        Ok(attempt.clone())
    }

    async fn registry_get(
        &self,
        id_number: &GovernmentId,
    ) -> Result<Option<RegistryEntry>, StoreError> {
        Ok(self.lock().registry.get(id_number).cloned())
    }

    async fn registry_upsert_advisory(
        &self,
        id_number: &GovernmentId,
        entry: RegistryEntry,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        match inner.registry.get_mut(id_number) {
            // Never touch an entry held by a different decided account.
            Some(existing) if existing.conflicts_with(&entry.owner_user_id) => Ok(()),
            Some(existing) => {
                // Merge semantics: the advisory write refreshes provider and
                // confidence but never downgrades a decided status.
                existing.provider = entry.provider;
                existing.confidence_score = entry.confidence_score;
                existing.updated_at = entry.updated_at;
                if let Some(reference) = entry.reference_id {
                    existing.reference_id = Some(reference);
                }
                Ok(())
            }
            None => {
                inner.registry.insert(id_number.clone(), entry);
                Ok(())
            }
        }
    }

    async fn commit_approval(&self, write: ApprovalWrite) -> Result<ApprovalOutcome, StoreError> {
        let mut inner = self.lock();

        // Conflict check before any write.
        if let Some(id_number) = &write.id_number
            && let Some(existing) = inner.registry.get(id_number)
            && existing.conflicts_with(&write.user_id)
        {
            return Ok(ApprovalOutcome::Conflict {
                owner_user_id: existing.owner_user_id.clone(),
            });
        }

        let now = Utc::now();

        let attempt = inner.attempt_mut(&write.user_id, &write.attempt_id)?;
        super::merge_checked(
            attempt,
            AttemptUpdate {
                provider: Some(write.provider),
                status: Some(AttemptStatus::Approved),
                confidence_score: Some(write.confidence_score),
                premium_scores: write.premium_scores,
                manual_decision: write.manual_decision,
                ..AttemptUpdate::default()
            },
            now,
        )?;
        let updated = attempt.clone();

        let profile = inner.profile_mut(&write.user_id);
        profile.verification_status = VerificationStatus::Verified;
        profile.profile_state = ProfileState::Validated;
        profile.verification_feedback = None;

        if let Some(id_number) = write.id_number {
            inner.registry.insert(
                id_number,
                RegistryEntry {
                    owner_user_id: write.user_id,
                    verification_status: VerificationStatus::Verified,
                    provider: write.provider,
                    confidence_score: Some(write.confidence_score),
                    reference_id: write.reference_id,
                    updated_at: now,
                },
            );
        }

        Ok(ApprovalOutcome::Applied(updated))
    }

    async fn commit_manual_rejection(
        &self,
        write: RejectionWrite,
    ) -> Result<VerificationAttempt, StoreError> {
        let mut inner = self.lock();
        let now = Utc::now();

        let attempt = inner.attempt_mut(&write.user_id, &write.attempt_id)?;
        super::merge_checked(
            attempt,
            AttemptUpdate {
                status: Some(AttemptStatus::Rejected),
                manual_decision: Some(write.manual_decision),
                ..AttemptUpdate::default()
            },
            now,
        )?;
        let updated = attempt.clone();

        let profile = inner.profile_mut(&write.user_id);
        profile.verification_status = VerificationStatus::Banned;
        profile.profile_state = ProfileState::Rejected;
        profile.verification_feedback = write.reason;

        // A banned account blocks its ID number too, unless a different
        // decided owner already holds it.
        if let Some(id_number) = updated.submitted_id_number.clone() {
            let blocked = inner
                .registry
                .get(&id_number)
                .is_some_and(|existing| existing.conflicts_with(&updated.user_id));
            if !blocked {
                inner.registry.insert(
                    id_number,
                    RegistryEntry {
                        owner_user_id: updated.user_id.clone(),
                        verification_status: VerificationStatus::Banned,
                        provider: updated.provider,
                        confidence_score: Some(updated.confidence_score),
                        reference_id: None,
                        updated_at: now,
                    },
                );
            }
        }

        Ok(updated)
    }

    async fn get_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.lock().profiles.get(user_id).cloned())
    }

    async fn set_profile_state(
        &self,
        user_id: &UserId,
        state: ProfileState,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.profile_mut(user_id).profile_state = state;
        Ok(())
    }
}
