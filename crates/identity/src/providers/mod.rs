//! Verification provider ports and HTTP clients.
//!
//! Each tier talks to an opaque external provider:
//! - tier 1 ([`ConsistencyChecker`]) - fast document/selfie consistency check
//! - tier 2 ([`DocumentAnalyzer`]) - OCR + barcode/MRZ vision analysis
//! - tier 3 ([`PremiumVerifier`]) - biometric face match, started
//!   fire-and-forget; the provider calls back through the webhook gateway
//!
//! Provider calls are the only blocking operations in the core; every client
//! carries a bounded timeout and holds no store lock while waiting. Callers
//! absorb provider failures into a degraded-but-valid attempt state instead
//! of failing the user flow.

pub mod document_ai;
pub mod heuristic;
pub mod premium;

use async_trait::async_trait;
use thiserror::Error;

use cargaruta_identity_core::confidence::DocumentAnalysis;
use cargaruta_identity_core::{AssetReferences, AttemptId, GovernmentId, UserId};

pub use document_ai::HttpDocumentAnalyzer;
pub use heuristic::HttpConsistencyChecker;
pub use premium::HttpPremiumVerifier;

/// Errors from provider invocations.
///
/// These never propagate to the end of a user request; the orchestrator
/// logs them and degrades to manual review.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The HTTP request could not be sent (includes timeouts).
    #[error("provider request failed: {0}")]
    Request(String),

    /// The response body did not match the expected shape.
    #[error("provider response invalid: {0}")]
    Response(String),

    /// The provider answered with an error status.
    #[error("provider error: {0}")]
    Api(String),
}

/// Result of the tier-1 consistency check.
#[derive(Debug, Clone)]
pub struct ConsistencyOutcome {
    pub success: bool,
    pub reason: Option<String>,
}

/// Tier-1 provider: document/selfie consistency check.
#[async_trait]
pub trait ConsistencyChecker: Send + Sync {
    /// Check that the captured document and selfie are plausibly the same
    /// person and match the submitted ID number.
    async fn check(
        &self,
        assets: &AssetReferences,
        submitted_id: Option<&GovernmentId>,
    ) -> Result<ConsistencyOutcome, ProviderError>;
}

/// Tier-2 provider: OCR + barcode/MRZ document analysis.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Analyze the captured document images.
    async fn analyze(
        &self,
        assets: &AssetReferences,
        submitted_id: Option<&GovernmentId>,
    ) -> Result<DocumentAnalysis, ProviderError>;
}

/// Tier-3 provider: premium biometric verification.
///
/// The start call is fire-and-forget; the decision arrives asynchronously
/// through the webhook gateway. This core never polls the provider.
#[async_trait]
pub trait PremiumVerifier: Send + Sync {
    /// Tell the provider to begin verifying the given attempt.
    async fn start(
        &self,
        user_id: &UserId,
        attempt_id: &AttemptId,
        assets: &AssetReferences,
    ) -> Result<(), ProviderError>;
}
