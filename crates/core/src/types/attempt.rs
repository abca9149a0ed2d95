//! Verification attempt record and its merge-style update patch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::government_id::GovernmentId;
use super::id::{AttemptId, UserId};
use super::status::{AttemptStatus, DecisionAction, ProviderTier};

/// Opaque storage locators for the captured assets.
///
/// These are references into the surrounding application's object storage;
/// raw image bytes never cross this service's boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReferences {
    pub front: Option<String>,
    pub back: Option<String>,
    pub selfie: Option<String>,
    pub license_front: Option<String>,
    pub license_back: Option<String>,
}

impl AssetReferences {
    /// Whether any locator is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.front.is_none()
            && self.back.is_none()
            && self.selfie.is_none()
            && self.license_front.is_none()
            && self.license_back.is_none()
    }
}

/// A capture component a reviewer can request to be redone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetComponent {
    Front,
    Back,
    Selfie,
    LicenseFront,
    LicenseBack,
}

/// Machine-readable zone/barcode detection flags from the document tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineReadable {
    pub qr: bool,
    pub pdf417: bool,
    pub mrz: bool,
}

impl MachineReadable {
    /// Whether any machine-readable feature was detected.
    #[must_use]
    pub const fn any(self) -> bool {
        self.qr || self.pdf417 || self.mrz
    }
}

/// Structured fields extracted from the document by OCR.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub id_number: Option<String>,
    pub birth_date: Option<String>,
    /// Free-text reason from the heuristic tier consistency check.
    pub reason: Option<String>,
}

/// Advisory verdict over the automated document analysis.
///
/// This is a UI hint only; automated tiers never approve on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVerification {
    pub success: bool,
    pub reason: String,
}

impl DocumentVerification {
    /// Confidence at or above which the document signal counts as sufficient.
    pub const SUFFICIENT_CONFIDENCE: f64 = 0.7;

    /// Build the advisory verdict from an aggregated confidence score.
    #[must_use]
    pub fn from_confidence(score: f64) -> Self {
        if score >= Self::SUFFICIENT_CONFIDENCE {
            Self {
                success: true,
                reason: "sufficient OCR signal".to_owned(),
            }
        } else {
            Self {
                success: false,
                reason: "manual review needed".to_owned(),
            }
        }
    }
}

/// A terminal decision recorded by a human reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualDecision {
    pub action: DecisionAction,
    pub reason: Option<String>,
    pub reviewer_id: UserId,
    pub decided_at: DateTime<Utc>,
}

/// One pass through identity verification for a user.
///
/// Attempts are append-only audit records: they become terminal at
/// `approved`/`rejected` and are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationAttempt {
    pub attempt_id: AttemptId,
    pub user_id: UserId,
    /// Monotonically increasing per user, starting at 1.
    pub attempt_number: u32,
    pub provider: ProviderTier,
    pub status: AttemptStatus,
    /// Advisory confidence in `[0, 1]`.
    pub confidence_score: f64,
    pub extracted_fields: Option<ExtractedFields>,
    pub machine_readable: MachineReadable,
    pub document_verification: Option<DocumentVerification>,
    pub submitted_id_number: Option<GovernmentId>,
    pub asset_references: AssetReferences,
    /// Another account already registered for the same ID number at
    /// submission time. Advisory; staff decides.
    pub duplicate_of: Option<UserId>,
    /// Set when an approval was blocked by a registry conflict.
    pub conflict_flag: bool,
    /// Raw score map from the premium provider, retained for audit.
    pub premium_scores: Option<serde_json::Value>,
    pub manual_decision: Option<ManualDecision>,
    /// Components a reviewer asked to be recaptured.
    pub requested_components: Option<Vec<AssetComponent>>,
    /// Reviewer feedback accompanying a retry request.
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationAttempt {
    /// Create a fresh `in_progress` attempt for a user.
    #[must_use]
    pub fn new(
        attempt_id: AttemptId,
        user_id: UserId,
        attempt_number: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_id,
            user_id,
            attempt_number,
            provider: ProviderTier::for_attempt(attempt_number),
            status: AttemptStatus::InProgress,
            confidence_score: 0.0,
            extracted_fields: None,
            machine_readable: MachineReadable::default(),
            document_verification: None,
            submitted_id_number: None,
            asset_references: AssetReferences::default(),
            duplicate_of: None,
            conflict_flag: false,
            premium_scores: None,
            manual_decision: None,
            requested_components: None,
            feedback: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a merge-style update patch in place.
    ///
    /// Only fields present in the patch are written; everything else is
    /// retained, so replays of the same update are harmless.
    pub fn merge(&mut self, update: AttemptUpdate, now: DateTime<Utc>) {
        let AttemptUpdate {
            provider,
            status,
            confidence_score,
            extracted_fields,
            machine_readable,
            document_verification,
            submitted_id_number,
            asset_references,
            duplicate_of,
            conflict_flag,
            premium_scores,
            manual_decision,
            requested_components,
            feedback,
        } = update;

        if let Some(provider) = provider {
            self.provider = provider;
        }
        if let Some(status) = status {
            self.status = status;
        }
        if let Some(score) = confidence_score {
            self.confidence_score = score.clamp(0.0, 1.0);
        }
        if let Some(fields) = extracted_fields {
            self.extracted_fields = Some(fields);
        }
        if let Some(flags) = machine_readable {
            self.machine_readable = flags;
        }
        if let Some(verdict) = document_verification {
            self.document_verification = Some(verdict);
        }
        if let Some(id) = submitted_id_number {
            self.submitted_id_number = Some(id);
        }
        if let Some(assets) = asset_references {
            self.asset_references = assets;
        }
        if let Some(dup) = duplicate_of {
            self.duplicate_of = dup;
        }
        if let Some(flag) = conflict_flag {
            self.conflict_flag = flag;
        }
        if let Some(scores) = premium_scores {
            self.premium_scores = Some(scores);
        }
        if let Some(decision) = manual_decision {
            self.manual_decision = Some(decision);
        }
        if let Some(components) = requested_components {
            self.requested_components = Some(components);
        }
        if let Some(feedback) = feedback {
            self.feedback = Some(feedback);
        }
        self.updated_at = now;
    }
}

/// Merge-style update for an attempt (`None` = leave unchanged).
///
/// Mirrors the `set(..., merge: true)` write discipline every gateway uses:
/// tier invocation results, webhook ingestion, and manual review all express
/// their effect as a patch rather than a full rewrite.
#[derive(Debug, Clone, Default)]
pub struct AttemptUpdate {
    pub provider: Option<ProviderTier>,
    pub status: Option<AttemptStatus>,
    pub confidence_score: Option<f64>,
    pub extracted_fields: Option<ExtractedFields>,
    pub machine_readable: Option<MachineReadable>,
    pub document_verification: Option<DocumentVerification>,
    pub submitted_id_number: Option<GovernmentId>,
    pub asset_references: Option<AssetReferences>,
    /// `Some(None)` clears the duplicate flag.
    pub duplicate_of: Option<Option<UserId>>,
    pub conflict_flag: Option<bool>,
    pub premium_scores: Option<serde_json::Value>,
    pub manual_decision: Option<ManualDecision>,
    pub requested_components: Option<Vec<AssetComponent>>,
    pub feedback: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_attempt() -> VerificationAttempt {
        VerificationAttempt::new(
            AttemptId::new("a-1"),
            UserId::new("u-1"),
            1,
            Utc::now(),
        )
    }

    #[test]
    fn test_new_attempt_defaults() {
        let attempt = sample_attempt();
        assert_eq!(attempt.status, AttemptStatus::InProgress);
        assert_eq!(attempt.provider, ProviderTier::Heuristic);
        assert!(attempt.confidence_score.abs() < f64::EPSILON);
        assert!(!attempt.conflict_flag);
    }

    #[test]
    fn test_merge_only_touches_present_fields() {
        let mut attempt = sample_attempt();
        let created = attempt.created_at;

        let update = AttemptUpdate {
            status: Some(AttemptStatus::Pending),
            confidence_score: Some(0.82),
            ..AttemptUpdate::default()
        };
        attempt.merge(update, Utc::now());

        assert_eq!(attempt.status, AttemptStatus::Pending);
        assert!((attempt.confidence_score - 0.82).abs() < f64::EPSILON);
        assert_eq!(attempt.provider, ProviderTier::Heuristic);
        assert_eq!(attempt.created_at, created);
        assert!(attempt.updated_at >= created);
    }

    #[test]
    fn test_merge_clamps_confidence() {
        let mut attempt = sample_attempt();
        attempt.merge(
            AttemptUpdate {
                confidence_score: Some(1.4),
                ..AttemptUpdate::default()
            },
            Utc::now(),
        );
        assert!((attempt.confidence_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_can_clear_duplicate_flag() {
        let mut attempt = sample_attempt();
        attempt.duplicate_of = Some(UserId::new("u-2"));
        attempt.merge(
            AttemptUpdate {
                duplicate_of: Some(None),
                ..AttemptUpdate::default()
            },
            Utc::now(),
        );
        assert!(attempt.duplicate_of.is_none());
    }

    #[test]
    fn test_document_verification_threshold() {
        assert!(DocumentVerification::from_confidence(0.7).success);
        assert!(DocumentVerification::from_confidence(0.99).success);
        assert!(!DocumentVerification::from_confidence(0.69).success);
    }
}
