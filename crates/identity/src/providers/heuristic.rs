//! HTTP client for the tier-1 consistency-check provider.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use cargaruta_identity_core::{AssetReferences, GovernmentId};

use crate::config::HeuristicConfig;

use super::{ConsistencyChecker, ConsistencyOutcome, ProviderError};

/// Consistency-check provider client.
#[derive(Clone)]
pub struct HttpConsistencyChecker {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    country: String,
}

impl std::fmt::Debug for HttpConsistencyChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConsistencyChecker")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("country", &self.country)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequest<'a> {
    assets: &'a AssetReferences,
    dni_number: Option<&'a str>,
    country_iso2: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    success: bool,
    #[serde(default)]
    reason: Option<String>,
}

impl HttpConsistencyChecker {
    /// Create a client from configuration with a bounded request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Request` if the HTTP client cannot be built.
    pub fn new(
        config: &HeuristicConfig,
        timeout: std::time::Duration,
        country: String,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            country,
        })
    }
}

#[async_trait]
impl ConsistencyChecker for HttpConsistencyChecker {
    #[instrument(skip_all)]
    async fn check(
        &self,
        assets: &AssetReferences,
        submitted_id: Option<&GovernmentId>,
    ) -> Result<ConsistencyOutcome, ProviderError> {
        let body = CheckRequest {
            assets,
            dni_number: submitted_id.map(GovernmentId::as_str),
            country_iso2: &self.country,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api(format!(
                "consistency check returned {status}"
            )));
        }

        let parsed: CheckResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;

        debug!(success = parsed.success, "Consistency check received");

        Ok(ConsistencyOutcome {
            success: parsed.success,
            reason: parsed.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parses_without_reason() {
        let parsed: CheckResponse =
            serde_json::from_str(r#"{"success": true}"#).expect("parse");
        assert!(parsed.success);
        assert!(parsed.reason.is_none());
    }

    #[test]
    fn test_response_parses_with_reason() {
        let parsed: CheckResponse =
            serde_json::from_str(r#"{"success": false, "reason": "selfie mismatch"}"#)
                .expect("parse");
        assert!(!parsed.success);
        assert_eq!(parsed.reason.as_deref(), Some("selfie mismatch"));
    }
}
