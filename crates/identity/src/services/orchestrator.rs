//! Verification orchestrator: creates/resumes attempts, routes submissions
//! to the tier the escalation policy selects, aggregates provider output,
//! and drives the user's profile state.
//!
//! Automated tiers are advisory only - they populate `pending` for staff
//! review and never approve on their own. Terminal decisions come exclusively
//! from the webhook gateway (premium tier) and the manual review gateway.
//!
//! Provider failures are absorbed: the attempt keeps a conservative
//! confidence floor and lands in staff review instead of failing the user
//! request. The degraded path is an explicit, named outcome so callers and
//! tests can assert on it.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use cargaruta_identity_core::confidence::{self, CONFIDENCE_FLOOR};
use cargaruta_identity_core::{
    AssetReferences, AttemptId, AttemptStatus, AttemptUpdate, DocumentVerification,
    ExtractedFields, GovernmentId, ProfileState, ProviderTier, RegistryEntry, UserId,
    VerificationStatus,
};

use crate::error::AppError;
use crate::providers::{ConsistencyChecker, DocumentAnalyzer, PremiumVerifier};
use crate::store::{IdentityStore, StartedAttempt};

/// Confidence recorded when the tier-1 consistency check passes.
const HEURISTIC_PASS_CONFIDENCE: f64 = 0.8;
/// Confidence recorded when the tier-1 consistency check fails.
const HEURISTIC_FAIL_CONFIDENCE: f64 = 0.5;

/// Result of a submission, always awaiting a downstream decision.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub attempt_id: AttemptId,
    pub status: AttemptStatus,
    /// Advisory confidence as a percentage (0-100).
    pub confidence_percent: u32,
    /// True when the tier's provider failed or was not configured and the
    /// attempt fell back to the conservative floor.
    pub degraded: bool,
    /// Another account already registered for the submitted ID number.
    pub duplicate_of: Option<UserId>,
}

/// The state-machine driver for verification attempts.
pub struct VerificationOrchestrator {
    store: Arc<dyn IdentityStore>,
    checker: Option<Arc<dyn ConsistencyChecker>>,
    analyzer: Option<Arc<dyn DocumentAnalyzer>>,
    premium: Option<Arc<dyn PremiumVerifier>>,
}

impl VerificationOrchestrator {
    /// Create an orchestrator over a store and the configured providers.
    ///
    /// Any provider may be absent; its tier then degrades to manual review.
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        checker: Option<Arc<dyn ConsistencyChecker>>,
        analyzer: Option<Arc<dyn DocumentAnalyzer>>,
        premium: Option<Arc<dyn PremiumVerifier>>,
    ) -> Self {
        Self {
            store,
            checker,
            analyzer,
            premium,
        }
    }

    /// Start a new attempt or resume the existing `in_progress` one.
    ///
    /// Safe to call repeatedly: client retries and reconnects converge on
    /// the same attempt instead of creating duplicates.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the store fails.
    #[instrument(skip(self), fields(user = %user_id))]
    pub async fn start_or_resume(&self, user_id: &UserId) -> Result<StartedAttempt, AppError> {
        let started = self.store.start_attempt(user_id).await?;
        info!(
            attempt = %started.attempt.attempt_id,
            number = started.attempt.attempt_number,
            tier = %started.attempt.provider,
            resumed = started.resumed,
            "Attempt started"
        );
        Ok(started)
    }

    /// Submit captured assets for a decision.
    ///
    /// Routes to the tier-specific provider, aggregates the result, writes
    /// the attempt, and parks it in `pending` for the next external event
    /// (staff review or the premium webhook).
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown attempt and
    /// `AppError::BadRequest` when the attempt is already terminal. Provider
    /// failures do not error; they degrade.
    #[instrument(skip(self, assets, submitted_id), fields(user = %user_id, attempt = %attempt_id))]
    pub async fn submit_for_decision(
        &self,
        user_id: &UserId,
        attempt_id: &AttemptId,
        assets: AssetReferences,
        submitted_id: Option<GovernmentId>,
    ) -> Result<SubmissionOutcome, AppError> {
        let attempt = self
            .store
            .get_attempt(user_id, attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("attempt {attempt_id}")))?;

        if attempt.status.is_terminal() {
            return Err(AppError::BadRequest(format!(
                "attempt {attempt_id} already decided ({})",
                attempt.status
            )));
        }

        // Uniqueness pre-flight: record who else holds the number. Advisory
        // only - staff decides what to do with the flag.
        let duplicate_of = match &submitted_id {
            Some(id_number) => self
                .store
                .registry_get(id_number)
                .await?
                .filter(|entry| entry.owner_user_id != *user_id)
                .map(|entry| entry.owner_user_id),
            None => None,
        };

        let tier = attempt.provider;
        let signal = self
            .run_tier(tier, user_id, attempt_id, &assets, submitted_id.as_ref())
            .await;

        let update = AttemptUpdate {
            status: Some(AttemptStatus::Pending),
            confidence_score: Some(signal.confidence),
            extracted_fields: signal.extracted,
            machine_readable: signal.machine_readable,
            document_verification: signal.document_verification,
            submitted_id_number: submitted_id.clone(),
            asset_references: Some(assets),
            duplicate_of: Some(duplicate_of.clone()),
            ..AttemptUpdate::default()
        };
        let updated = self.store.apply_update(user_id, attempt_id, update).await?;

        // Advisory registry note for the document tier, so staff can see
        // which number the strongest automated signal was measured against.
        if tier == ProviderTier::DocumentAi
            && !signal.degraded
            && let Some(id_number) = &submitted_id
        {
            self.store
                .registry_upsert_advisory(
                    id_number,
                    RegistryEntry {
                        owner_user_id: user_id.clone(),
                        verification_status: VerificationStatus::Pending,
                        provider: tier,
                        confidence_score: Some(signal.confidence),
                        reference_id: None,
                        updated_at: Utc::now(),
                    },
                )
                .await?;
        }

        self.store
            .set_profile_state(user_id, ProfileState::PendingReview)
            .await?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let confidence_percent = (updated.confidence_score * 100.0).round() as u32;

        info!(
            tier = %tier,
            confidence = updated.confidence_score,
            degraded = signal.degraded,
            duplicate = duplicate_of.is_some(),
            "Submission recorded, awaiting decision"
        );

        Ok(SubmissionOutcome {
            attempt_id: updated.attempt_id,
            status: updated.status,
            confidence_percent,
            degraded: signal.degraded,
            duplicate_of,
        })
    }

    /// Pre-flight uniqueness guard: is the number already claimed by a
    /// different decided account?
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the registry read fails.
    #[instrument(skip(self, id_number), fields(user = %user_id))]
    pub async fn guard_uniqueness(
        &self,
        id_number: &GovernmentId,
        user_id: &UserId,
    ) -> Result<bool, AppError> {
        let conflict = self
            .store
            .registry_get(id_number)
            .await?
            .is_some_and(|entry| entry.conflicts_with(user_id));
        Ok(conflict)
    }

    /// Invoke the tier's provider and fold the result into one signal.
    async fn run_tier(
        &self,
        tier: ProviderTier,
        user_id: &UserId,
        attempt_id: &AttemptId,
        assets: &AssetReferences,
        submitted_id: Option<&GovernmentId>,
    ) -> TierSignal {
        match tier {
            ProviderTier::Heuristic => self.run_heuristic(assets, submitted_id).await,
            ProviderTier::DocumentAi => self.run_document_ai(assets, submitted_id).await,
            ProviderTier::PremiumBiometric => {
                self.run_premium(user_id, attempt_id, assets).await
            }
            // Staff reviews raw assets; no automated scoring.
            ProviderTier::Staff => TierSignal::floor(false),
        }
    }

    async fn run_heuristic(
        &self,
        assets: &AssetReferences,
        submitted_id: Option<&GovernmentId>,
    ) -> TierSignal {
        let Some(checker) = &self.checker else {
            warn!("Consistency checker not configured, degrading to review");
            return TierSignal::floor(true);
        };
        match checker.check(assets, submitted_id).await {
            Ok(outcome) => {
                let confidence = if outcome.success {
                    HEURISTIC_PASS_CONFIDENCE
                } else {
                    HEURISTIC_FAIL_CONFIDENCE
                };
                TierSignal {
                    confidence,
                    extracted: Some(ExtractedFields {
                        reason: outcome.reason,
                        ..ExtractedFields::default()
                    }),
                    machine_readable: None,
                    document_verification: Some(DocumentVerification::from_confidence(confidence)),
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(error = %e, "Consistency check failed, degrading to review");
                TierSignal::floor(true)
            }
        }
    }

    async fn run_document_ai(
        &self,
        assets: &AssetReferences,
        submitted_id: Option<&GovernmentId>,
    ) -> TierSignal {
        let Some(analyzer) = &self.analyzer else {
            warn!("Document analyzer not configured, degrading to review");
            return TierSignal::floor(true);
        };
        match analyzer.analyze(assets, submitted_id).await {
            Ok(analysis) => {
                let confidence = confidence::aggregate_score(&analysis);
                TierSignal {
                    confidence,
                    extracted: Some(confidence::extract_fields(&analysis)),
                    machine_readable: Some(analysis.machine_readable),
                    document_verification: Some(DocumentVerification::from_confidence(confidence)),
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(error = %e, "Document analysis failed, degrading to review");
                TierSignal::floor(true)
            }
        }
    }

    async fn run_premium(
        &self,
        user_id: &UserId,
        attempt_id: &AttemptId,
        assets: &AssetReferences,
    ) -> TierSignal {
        // Fire-and-forget: the decision arrives via webhook. A failed start
        // still parks the attempt in review rather than failing the user.
        match &self.premium {
            Some(premium) => {
                if let Err(e) = premium.start(user_id, attempt_id, assets).await {
                    warn!(error = %e, "Premium start failed, attempt stays in review");
                    return TierSignal::floor(true);
                }
                TierSignal::floor(false)
            }
            None => {
                warn!("Premium verifier not configured, degrading to review");
                TierSignal::floor(true)
            }
        }
    }
}

/// What a tier invocation contributed to the attempt.
struct TierSignal {
    confidence: f64,
    extracted: Option<ExtractedFields>,
    machine_readable: Option<cargaruta_identity_core::MachineReadable>,
    document_verification: Option<DocumentVerification>,
    degraded: bool,
}

impl TierSignal {
    /// Conservative floor signal with no extracted data.
    const fn floor(degraded: bool) -> Self {
        Self {
            confidence: CONFIDENCE_FLOOR,
            extracted: None,
            machine_readable: None,
            document_verification: None,
            degraded,
        }
    }
}
