//! Identity uniqueness registry entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::UserId;
use super::status::{ProviderTier, VerificationStatus};

/// The registry value for one normalized government ID number.
///
/// For a given number, at most one owner may hold a decided status
/// (`verified` or `banned`) at a time. A second account attempting to claim
/// the number while that holds is a conflict and must not overwrite the
/// entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub owner_user_id: UserId,
    pub verification_status: VerificationStatus,
    pub provider: ProviderTier,
    pub confidence_score: Option<f64>,
    /// Provider-side reference for the decision, when one exists.
    pub reference_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RegistryEntry {
    /// Whether this entry blocks `claimant` from claiming the number.
    ///
    /// Only a *different* owner with a decided status blocks; the same user
    /// re-approving, or an advisory (undecided) entry, never conflicts.
    #[must_use]
    pub fn conflicts_with(&self, claimant: &UserId) -> bool {
        self.owner_user_id != *claimant && self.verification_status.is_decided()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(owner: &str, status: VerificationStatus) -> RegistryEntry {
        RegistryEntry {
            owner_user_id: UserId::new(owner),
            verification_status: status,
            provider: ProviderTier::PremiumBiometric,
            confidence_score: Some(0.9),
            reference_id: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_decided_other_owner_conflicts() {
        let e = entry("u-1", VerificationStatus::Verified);
        assert!(e.conflicts_with(&UserId::new("u-2")));

        let e = entry("u-1", VerificationStatus::Banned);
        assert!(e.conflicts_with(&UserId::new("u-2")));
    }

    #[test]
    fn test_same_owner_never_conflicts() {
        let e = entry("u-1", VerificationStatus::Verified);
        assert!(!e.conflicts_with(&UserId::new("u-1")));
    }

    #[test]
    fn test_advisory_entry_never_conflicts() {
        let e = entry("u-1", VerificationStatus::Pending);
        assert!(!e.conflicts_with(&UserId::new("u-2")));
    }
}
