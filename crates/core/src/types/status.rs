//! Status enums for the verification domain.
//!
//! The attempt lifecycle is driven by a single authoritative transition
//! function, [`AttemptStatus::can_transition_to`]. Every component that
//! mutates an attempt goes through it, so an illegal move such as
//! `approved -> in_progress` is impossible regardless of which gateway
//! (orchestrator, webhook, manual review) requested the write.

use serde::{Deserialize, Serialize};

/// Verification provider tier, selected by attempt number.
///
/// Escalating cost only after cheaper tiers fail keeps unit cost low while
/// guaranteeing a human-reviewable path exists for every user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    /// Fast, client-assisted consistency check.
    Heuristic,
    /// OCR + barcode/MRZ vision analysis.
    DocumentAi,
    /// Asynchronous third-party face match, webhook-driven.
    PremiumBiometric,
    /// Manual-only, no automated scoring.
    Staff,
}

impl ProviderTier {
    /// Select the tier for a given attempt number.
    ///
    /// Attempt numbers start at 1; zero maps to the cheapest tier so the
    /// function stays total.
    #[must_use]
    pub const fn for_attempt(attempt_number: u32) -> Self {
        match attempt_number {
            0 | 1 => Self::Heuristic,
            2 => Self::DocumentAi,
            3 => Self::PremiumBiometric,
            _ => Self::Staff,
        }
    }

    /// Whether this tier produces an automated confidence score.
    #[must_use]
    pub const fn is_automated(self) -> bool {
        !matches!(self, Self::Staff)
    }
}

impl std::fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heuristic => write!(f, "heuristic"),
            Self::DocumentAi => write!(f, "document_ai"),
            Self::PremiumBiometric => write!(f, "premium_biometric"),
            Self::Staff => write!(f, "staff"),
        }
    }
}

impl std::str::FromStr for ProviderTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heuristic" => Ok(Self::Heuristic),
            "document_ai" => Ok(Self::DocumentAi),
            "premium_biometric" => Ok(Self::PremiumBiometric),
            "staff" => Ok(Self::Staff),
            _ => Err(format!("invalid provider tier: {s}")),
        }
    }
}

/// Lifecycle status of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Created, awaiting submission of assets.
    InProgress,
    /// Submitted, awaiting a decision (staff review or webhook callback).
    Pending,
    /// A reviewer requested that specific components be recaptured.
    RetryRequired,
    /// Terminal: identity confirmed.
    Approved,
    /// Terminal: identity rejected.
    Rejected,
}

impl AttemptStatus {
    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// The single authoritative transition check.
    ///
    /// Writing the current status again is permitted (idempotent replays of
    /// webhook callbacks re-apply the same terminal state), but a terminal
    /// status never moves to a different one.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self as u8 == next as u8 {
            return true;
        }
        match self {
            Self::InProgress => true,
            Self::Pending => matches!(next, Self::Approved | Self::Rejected | Self::RetryRequired),
            // Staff may still decide an attempt they flagged for recapture.
            Self::RetryRequired => {
                matches!(next, Self::Pending | Self::Approved | Self::Rejected)
            }
            Self::Approved | Self::Rejected => false,
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Pending => write!(f, "pending"),
            Self::RetryRequired => write!(f, "retry_required"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "pending" => Ok(Self::Pending),
            "retry_required" => Ok(Self::RetryRequired),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("invalid attempt status: {s}")),
        }
    }
}

/// Account-level verification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Verified,
    Banned,
}

impl VerificationStatus {
    /// Whether this status binds a government ID number in the registry.
    #[must_use]
    pub const fn is_decided(self) -> bool {
        matches!(self, Self::Verified | Self::Banned)
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Verified => write!(f, "verified"),
            Self::Banned => write!(f, "banned"),
        }
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "verified" => Ok(Self::Verified),
            "banned" => Ok(Self::Banned),
            _ => Err(format!("invalid verification status: {s}")),
        }
    }
}

/// User-facing profile state, driven by the most recent attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProfileState {
    #[default]
    PendingAttempt1,
    PendingAttempt2,
    PendingSelfie,
    PendingReview,
    Validated,
    Rejected,
}

impl std::fmt::Display for ProfileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingAttempt1 => write!(f, "pending_attempt1"),
            Self::PendingAttempt2 => write!(f, "pending_attempt2"),
            Self::PendingSelfie => write!(f, "pending_selfie"),
            Self::PendingReview => write!(f, "pending_review"),
            Self::Validated => write!(f, "validated"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for ProfileState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_attempt1" => Ok(Self::PendingAttempt1),
            "pending_attempt2" => Ok(Self::PendingAttempt2),
            "pending_selfie" => Ok(Self::PendingSelfie),
            "pending_review" => Ok(Self::PendingReview),
            "validated" => Ok(Self::Validated),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("invalid profile state: {s}")),
        }
    }
}

/// Action a human reviewer may take on an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approved,
    Rejected,
    Retry,
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Retry => write!(f, "retry"),
        }
    }
}
