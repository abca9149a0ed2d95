//! Business services over the storage ports and provider clients.

pub mod orchestrator;
pub mod review;

pub use orchestrator::{SubmissionOutcome, VerificationOrchestrator};
pub use review::{ReviewOutcome, ReviewService};
