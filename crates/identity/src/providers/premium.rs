//! HTTP client for starting premium biometric verification.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, instrument};

use cargaruta_identity_core::{AssetReferences, AttemptId, UserId};

use crate::config::PremiumConfig;

use super::{PremiumVerifier, ProviderError};

/// Premium biometric provider client (start only).
///
/// The decision comes back asynchronously through `POST /providerWebhook`.
#[derive(Clone)]
pub struct HttpPremiumVerifier {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    country: String,
}

impl std::fmt::Debug for HttpPremiumVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPremiumVerifier")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("country", &self.country)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest<'a> {
    uid: &'a str,
    attempt_id: &'a str,
    country_iso2: &'a str,
    assets: &'a AssetReferences,
}

impl HttpPremiumVerifier {
    /// Create a client from configuration with a bounded request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Request` if the HTTP client cannot be built.
    pub fn new(
        config: &PremiumConfig,
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
impl PremiumVerifier for HttpPremiumVerifier {
    #[instrument(skip(self, assets), fields(user = %user_id, attempt = %attempt_id))]
    async fn start(
        &self,
        user_id: &UserId,
        attempt_id: &AttemptId,
        assets: &AssetReferences,
    ) -> Result<(), ProviderError> {
        let body = StartRequest {
            uid: user_id.as_str(),
            attempt_id: attempt_id.as_str(),
            country_iso2: &self.country,
            assets,
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
                "premium start returned {status}"
            )));
        }

        debug!("Premium verification started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_request_shape() {
        let assets = AssetReferences {
            front: Some("gs://bucket/front.jpg".to_owned()),
            selfie: Some("gs://bucket/selfie.jpg".to_owned()),
            ..AssetReferences::default()
        };
        let body = StartRequest {
            uid: "u-1",
            attempt_id: "a-1",
            country_iso2: "AR",
            assets: &assets,
        };

        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["uid"], "u-1");
        assert_eq!(json["attemptId"], "a-1");
        assert_eq!(json["assets"]["selfie"], "gs://bucket/selfie.jpg");
    }
}
