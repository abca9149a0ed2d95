//! `PostgreSQL` adapter for the identity store.
//!
//! # Tables (schema `identity`)
//!
//! - `verification_attempts` - one row per attempt, full record as JSONB
//!   plus indexed columns; `UNIQUE (user_id, attempt_number)`
//! - `id_registry` - one row per normalized government ID number
//! - `profiles` - the verification-relevant profile slice
//!
//! All SQL is runtime-checked (`sqlx::query`, not `sqlx::query!`) so the
//! crate builds without a live database. Writes that depend on a prior read
//! run inside a transaction holding a `pg_advisory_xact_lock` on the user
//! (attempt allocation) or the ID number (registry check-then-write), which
//! linearizes concurrent starts and approvals.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use cargaruta_identity_core::{
    AttemptId, AttemptStatus, AttemptUpdate, GovernmentId, ProfileState, RegistryEntry, UserId,
    UserProfile, VerificationAttempt, VerificationStatus,
};

use super::{
    ApprovalOutcome, ApprovalWrite, IdentityStore, RejectionWrite, StartedAttempt, StoreError,
    merge_checked,
};

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// `PostgreSQL`-backed [`IdentityStore`] implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the schema and tables if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if DDL execution fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query("CREATE SCHEMA IF NOT EXISTS identity")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS identity.verification_attempts (
                attempt_id     TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL,
                attempt_number BIGINT NOT NULL,
                status         TEXT NOT NULL,
                doc            JSONB NOT NULL,
                created_at     TIMESTAMPTZ NOT NULL,
                updated_at     TIMESTAMPTZ NOT NULL,
                UNIQUE (user_id, attempt_number)
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS identity.id_registry (
                id_number  TEXT PRIMARY KEY,
                doc        JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS identity.profiles (
                user_id TEXT PRIMARY KEY,
                doc     JSONB NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn lock_user(
        tx: &mut Transaction<'_, Postgres>,
        user_id: &UserId,
    ) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('attempt:' || $1))")
            .bind(user_id.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn lock_id_number(
        tx: &mut Transaction<'_, Postgres>,
        id_number: &GovernmentId,
    ) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('registry:' || $1))")
            .bind(id_number.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn load_attempt_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: &UserId,
        attempt_id: &AttemptId,
    ) -> Result<VerificationAttempt, StoreError> {
        let row = sqlx::query(
            "SELECT doc FROM identity.verification_attempts WHERE user_id = $1 AND attempt_id = $2 FOR UPDATE",
        )
        .bind(user_id.as_str())
        .bind(attempt_id.as_str())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        parse_attempt(row.try_get("doc")?)
    }

    async fn save_attempt_tx(
        tx: &mut Transaction<'_, Postgres>,
        attempt: &VerificationAttempt,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE identity.verification_attempts
            SET status = $3, doc = $4, updated_at = $5
            WHERE user_id = $1 AND attempt_id = $2
            ",
        )
        .bind(attempt.user_id.as_str())
        .bind(attempt.attempt_id.as_str())
        .bind(attempt.status.to_string())
        .bind(attempt_doc(attempt)?)
        .bind(attempt.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn load_registry_tx(
        tx: &mut Transaction<'_, Postgres>,
        id_number: &GovernmentId,
    ) -> Result<Option<RegistryEntry>, StoreError> {
        let row = sqlx::query("SELECT doc FROM identity.id_registry WHERE id_number = $1")
            .bind(id_number.as_str())
            .fetch_optional(&mut **tx)
            .await?;
        row.map(|r| parse_registry(r.try_get("doc")?)).transpose()
    }

    async fn save_registry_tx(
        tx: &mut Transaction<'_, Postgres>,
        id_number: &GovernmentId,
        entry: &RegistryEntry,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO identity.id_registry (id_number, doc, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id_number) DO UPDATE SET doc = $2, updated_at = $3
            ",
        )
        .bind(id_number.as_str())
        .bind(registry_doc(entry)?)
        .bind(entry.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn save_profile_tx(
        tx: &mut Transaction<'_, Postgres>,
        profile: &UserProfile,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO identity.profiles (user_id, doc)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET doc = $2
            ",
        )
        .bind(profile.user_id.as_str())
        .bind(profile_doc(profile)?)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn load_profile_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: &UserId,
    ) -> Result<UserProfile, StoreError> {
        let row = sqlx::query("SELECT doc FROM identity.profiles WHERE user_id = $1 FOR UPDATE")
            .bind(user_id.as_str())
            .fetch_optional(&mut **tx)
            .await?;
        match row {
            Some(r) => parse_profile(r.try_get("doc")?),
            None => Ok(UserProfile::new(user_id.clone())),
        }
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn start_attempt(&self, user_id: &UserId) -> Result<StartedAttempt, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_user(&mut tx, user_id).await?;

        let last = sqlx::query(
            r"
            SELECT doc FROM identity.verification_attempts
            WHERE user_id = $1
            ORDER BY attempt_number DESC
            LIMIT 1
            ",
        )
        .bind(user_id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| parse_attempt(r.try_get("doc")?))
        .transpose()?;

        if let Some(attempt) = &last
            && attempt.status == AttemptStatus::InProgress
        {
            tx.commit().await?;
            return Ok(StartedAttempt {
                attempt: attempt.clone(),
                resumed: true,
            });
        }

        let next_number = last.map_or(0, |a| a.attempt_number) + 1;
        let attempt = VerificationAttempt::new(
            AttemptId::new(Uuid::new_v4().to_string()),
            user_id.clone(),
            next_number,
            Utc::now(),
        );
        sqlx::query(
            r"
            INSERT INTO identity.verification_attempts
                (attempt_id, user_id, attempt_number, status, doc, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(attempt.attempt_id.as_str())
        .bind(attempt.user_id.as_str())
        .bind(i64::from(attempt.attempt_number))
        .bind(attempt.status.to_string())
        .bind(attempt_doc(&attempt)?)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(StartedAttempt {
            attempt,
            resumed: false,
        })
    }

    async fn latest_attempt(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerificationAttempt>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT doc FROM identity.verification_attempts
            WHERE user_id = $1
            ORDER BY attempt_number DESC
            LIMIT 1
            ",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| parse_attempt(r.try_get("doc")?)).transpose()
    }

    async fn get_attempt(
        &self,
        user_id: &UserId,
        attempt_id: &AttemptId,
    ) -> Result<Option<VerificationAttempt>, StoreError> {
        let row = sqlx::query(
            "SELECT doc FROM identity.verification_attempts WHERE user_id = $1 AND attempt_id = $2",
        )
        .bind(user_id.as_str())
        .bind(attempt_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| parse_attempt(r.try_get("doc")?)).transpose()
    }

    async fn apply_update(
        &self,
        user_id: &UserId,
        attempt_id: &AttemptId,
        update: AttemptUpdate,
    ) -> Result<VerificationAttempt, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut attempt = Self::load_attempt_tx(&mut tx, user_id, attempt_id).await?;
        merge_checked(&mut attempt, update, Utc::now())?;
        Self::save_attempt_tx(&mut tx, &attempt).await?;
        tx.commit().await?;
        Ok(attempt)
    }

    async fn registry_get(
        &self,
        id_number: &GovernmentId,
    ) -> Result<Option<RegistryEntry>, StoreError> {
        let row = sqlx::query("SELECT doc FROM identity.id_registry WHERE id_number = $1")
            .bind(id_number.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| parse_registry(r.try_get("doc")?)).transpose()
    }

    async fn registry_upsert_advisory(
        &self,
        id_number: &GovernmentId,
        entry: RegistryEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_id_number(&mut tx, id_number).await?;

        let existing = Self::load_registry_tx(&mut tx, id_number).await?;
        let merged = match existing {
            // Never touch an entry held by a different decided account.
            Some(existing) if existing.conflicts_with(&entry.owner_user_id) => {
                tx.commit().await?;
                return Ok(());
            }
            Some(mut existing) => {
                existing.provider = entry.provider;
                existing.confidence_score = entry.confidence_score;
                existing.updated_at = entry.updated_at;
                if let Some(reference) = entry.reference_id {
                    existing.reference_id = Some(reference);
                }
                existing
            }
            None => entry,
        };
        Self::save_registry_tx(&mut tx, id_number, &merged).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_approval(&self, write: ApprovalWrite) -> Result<ApprovalOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(id_number) = &write.id_number {
            Self::lock_id_number(&mut tx, id_number).await?;
            if let Some(existing) = Self::load_registry_tx(&mut tx, id_number).await?
                && existing.conflicts_with(&write.user_id)
            {
                // Roll back; the conflict is reported as data, not an error.
                tx.rollback().await?;
                return Ok(ApprovalOutcome::Conflict {
                    owner_user_id: existing.owner_user_id,
                });
            }
        }

        let now = Utc::now();

        let mut attempt = Self::load_attempt_tx(&mut tx, &write.user_id, &write.attempt_id).await?;
        merge_checked(
            &mut attempt,
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
        Self::save_attempt_tx(&mut tx, &attempt).await?;

        let mut profile = Self::load_profile_tx(&mut tx, &write.user_id).await?;
        profile.verification_status = VerificationStatus::Verified;
        profile.profile_state = ProfileState::Validated;
        profile.verification_feedback = None;
        Self::save_profile_tx(&mut tx, &profile).await?;

        if let Some(id_number) = &write.id_number {
            let entry = RegistryEntry {
                owner_user_id: write.user_id.clone(),
                verification_status: VerificationStatus::Verified,
                provider: write.provider,
                confidence_score: Some(write.confidence_score),
                reference_id: write.reference_id.clone(),
                updated_at: now,
            };
            Self::save_registry_tx(&mut tx, id_number, &entry).await?;
        }

        tx.commit().await?;
        Ok(ApprovalOutcome::Applied(attempt))
    }

    async fn commit_manual_rejection(
        &self,
        write: RejectionWrite,
    ) -> Result<VerificationAttempt, StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let mut attempt = Self::load_attempt_tx(&mut tx, &write.user_id, &write.attempt_id).await?;
        merge_checked(
            &mut attempt,
            AttemptUpdate {
                status: Some(AttemptStatus::Rejected),
                manual_decision: Some(write.manual_decision),
                ..AttemptUpdate::default()
            },
            now,
        )?;
        Self::save_attempt_tx(&mut tx, &attempt).await?;

        let mut profile = Self::load_profile_tx(&mut tx, &write.user_id).await?;
        profile.verification_status = VerificationStatus::Banned;
        profile.profile_state = ProfileState::Rejected;
        profile.verification_feedback = write.reason;
        Self::save_profile_tx(&mut tx, &profile).await?;

        // A banned account blocks its ID number too, unless a different
        // decided owner already holds it.
        if let Some(id_number) = attempt.submitted_id_number.clone() {
            Self::lock_id_number(&mut tx, &id_number).await?;
            let blocked = Self::load_registry_tx(&mut tx, &id_number)
                .await?
                .is_some_and(|existing| existing.conflicts_with(&attempt.user_id));
            if !blocked {
                let entry = RegistryEntry {
                    owner_user_id: attempt.user_id.clone(),
                    verification_status: VerificationStatus::Banned,
                    provider: attempt.provider,
                    confidence_score: Some(attempt.confidence_score),
                    reference_id: None,
                    updated_at: now,
                };
                Self::save_registry_tx(&mut tx, &id_number, &entry).await?;
            }
        }

        tx.commit().await?;
        Ok(attempt)
    }

    async fn get_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, StoreError> {
        let row = sqlx::query("SELECT doc FROM identity.profiles WHERE user_id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| parse_profile(r.try_get("doc")?)).transpose()
    }

    async fn set_profile_state(
        &self,
        user_id: &UserId,
        state: ProfileState,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut profile = Self::load_profile_tx(&mut tx, user_id).await?;
        profile.profile_state = state;
        Self::save_profile_tx(&mut tx, &profile).await?;
        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Row <-> record conversions
// =============================================================================

fn parse_attempt(doc: serde_json::Value) -> Result<VerificationAttempt, StoreError> {
    serde_json::from_value(doc)
        .map_err(|e| StoreError::DataCorruption(format!("invalid attempt document: {e}")))
}

fn attempt_doc(attempt: &VerificationAttempt) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(attempt)
        .map_err(|e| StoreError::DataCorruption(format!("unserializable attempt: {e}")))
}

fn parse_registry(doc: serde_json::Value) -> Result<RegistryEntry, StoreError> {
    serde_json::from_value(doc)
        .map_err(|e| StoreError::DataCorruption(format!("invalid registry document: {e}")))
}

fn registry_doc(entry: &RegistryEntry) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(entry)
        .map_err(|e| StoreError::DataCorruption(format!("unserializable registry entry: {e}")))
}

fn parse_profile(doc: serde_json::Value) -> Result<UserProfile, StoreError> {
    serde_json::from_value(doc)
        .map_err(|e| StoreError::DataCorruption(format!("invalid profile document: {e}")))
}

fn profile_doc(profile: &UserProfile) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(profile)
        .map_err(|e| StoreError::DataCorruption(format!("unserializable profile: {e}")))
}
