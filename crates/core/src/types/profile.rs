//! The slice of the user profile this service reads and writes.

use serde::{Deserialize, Serialize};

use super::id::UserId;
use super::status::{ProfileState, VerificationStatus};

/// Verification-relevant profile fields.
///
/// The full user document is owned by the surrounding application; this
/// service only drives the verification status, the profile state derived
/// from the most recent attempt, and the user-facing rejection feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: UserId,
    pub verification_status: VerificationStatus,
    pub profile_state: ProfileState,
    /// Shown to the user after a manual rejection.
    pub verification_feedback: Option<String>,
}

impl UserProfile {
    /// A fresh, unverified profile.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            verification_status: VerificationStatus::Pending,
            profile_state: ProfileState::PendingAttempt1,
            verification_feedback: None,
        }
    }
}
