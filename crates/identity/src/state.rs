//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::IdentityConfig;
use crate::providers::{
    ConsistencyChecker, DocumentAnalyzer, HttpConsistencyChecker, HttpDocumentAnalyzer,
    HttpPremiumVerifier, PremiumVerifier, ProviderError,
};
use crate::services::{ReviewService, VerificationOrchestrator};
use crate::store::IdentityStore;
use crate::webhook::WebhookGateway;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// store, provider clients, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: IdentityConfig,
    store: Arc<dyn IdentityStore>,
    checker: Option<Arc<dyn ConsistencyChecker>>,
    analyzer: Option<Arc<dyn DocumentAnalyzer>>,
    premium: Option<Arc<dyn PremiumVerifier>>,
}

impl AppState {
    /// Create application state, building HTTP provider clients from the
    /// configuration. Absent provider config leaves that tier degraded to
    /// manual review.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if an HTTP client cannot be constructed.
    pub fn new(
        config: IdentityConfig,
        store: Arc<dyn IdentityStore>,
    ) -> Result<Self, ProviderError> {
        let checker = config
            .heuristic
            .as_ref()
            .map(|c| {
                HttpConsistencyChecker::new(c, config.provider_timeout, config.country.clone())
            })
            .transpose()?
            .map(|c| Arc::new(c) as Arc<dyn ConsistencyChecker>);

        let analyzer = config
            .document_ai
            .as_ref()
            .map(|c| HttpDocumentAnalyzer::new(c, config.provider_timeout, config.country.clone()))
            .transpose()?
            .map(|c| Arc::new(c) as Arc<dyn DocumentAnalyzer>);

        let premium = config
            .premium
            .as_ref()
            .map(|c| HttpPremiumVerifier::new(c, config.provider_timeout, config.country.clone()))
            .transpose()?
            .map(|c| Arc::new(c) as Arc<dyn PremiumVerifier>);

        Ok(Self::with_providers(config, store, checker, analyzer, premium))
    }

    /// Create application state with explicit provider implementations.
    ///
    /// Used by tests to inject stubs.
    #[must_use]
    pub fn with_providers(
        config: IdentityConfig,
        store: Arc<dyn IdentityStore>,
        checker: Option<Arc<dyn ConsistencyChecker>>,
        analyzer: Option<Arc<dyn DocumentAnalyzer>>,
        premium: Option<Arc<dyn PremiumVerifier>>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                checker,
                analyzer,
                premium,
            }),
        }
    }

    /// Get a reference to the service configuration.
    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.inner.config
    }

    /// Get a handle to the identity store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn IdentityStore> {
        Arc::clone(&self.inner.store)
    }

    /// Build the verification orchestrator for this request.
    #[must_use]
    pub fn orchestrator(&self) -> VerificationOrchestrator {
        VerificationOrchestrator::new(
            Arc::clone(&self.inner.store),
            self.inner.checker.clone(),
            self.inner.analyzer.clone(),
            self.inner.premium.clone(),
        )
    }

    /// Build the manual review service for this request.
    #[must_use]
    pub fn review(&self) -> ReviewService {
        ReviewService::new(Arc::clone(&self.inner.store))
    }

    /// Build the webhook ingestion gateway for this request.
    #[must_use]
    pub fn webhook_gateway(&self) -> WebhookGateway {
        WebhookGateway::new(
            Arc::clone(&self.inner.store),
            self.inner.config.webhook_secret.clone(),
        )
    }
}
