//! Core types for Cargaruta identity verification.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod attempt;
pub mod government_id;
pub mod id;
pub mod profile;
pub mod registry;
pub mod status;

pub use attempt::{
    AssetComponent, AssetReferences, AttemptUpdate, DocumentVerification, ExtractedFields,
    MachineReadable, ManualDecision, VerificationAttempt,
};
pub use government_id::{GovernmentId, GovernmentIdError};
pub use id::{AttemptId, UserId};
pub use profile::UserProfile;
pub use registry::RegistryEntry;
pub use status::{AttemptStatus, DecisionAction, ProfileState, ProviderTier, VerificationStatus};
