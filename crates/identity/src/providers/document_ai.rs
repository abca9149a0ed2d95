//! HTTP client for the OCR/vision document analysis provider.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, instrument};

use cargaruta_identity_core::confidence::DocumentAnalysis;
use cargaruta_identity_core::{AssetReferences, GovernmentId};

use crate::config::DocumentAiConfig;

use super::{DocumentAnalyzer, ProviderError};

/// OCR/vision provider client.
///
/// Posts asset locators (never raw bytes) to the configured endpoint and
/// parses the typed analysis response at this boundary; payloads that do
/// not match the expected shape are rejected here.
#[derive(Clone)]
pub struct HttpDocumentAnalyzer {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    country: String,
}

impl std::fmt::Debug for HttpDocumentAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDocumentAnalyzer")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("country", &self.country)
            .finish_non_exhaustive()
    }
}

/// Request body sent to the provider.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    assets: &'a AssetReferences,
    dni_number: Option<&'a str>,
    country_iso2: &'a str,
}

impl HttpDocumentAnalyzer {
    /// Create a client from configuration with a bounded request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Request` if the HTTP client cannot be built.
    pub fn new(
        config: &DocumentAiConfig,
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
impl DocumentAnalyzer for HttpDocumentAnalyzer {
    #[instrument(skip_all)]
    async fn analyze(
        &self,
        assets: &AssetReferences,
        submitted_id: Option<&GovernmentId>,
    ) -> Result<DocumentAnalysis, ProviderError> {
        let body = AnalyzeRequest {
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
                "document analysis returned {status}"
            )));
        }

        let analysis: DocumentAnalysis = response
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;

        debug!(
            entities = analysis.entities.len(),
            qr = analysis.machine_readable.qr,
            pdf417 = analysis.machine_readable.pdf417,
            mrz = analysis.machine_readable.mrz,
            "Document analysis received"
        );

        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let assets = AssetReferences {
            front: Some("gs://bucket/front.jpg".to_owned()),
            back: Some("gs://bucket/back.jpg".to_owned()),
            ..AssetReferences::default()
        };
        let id = GovernmentId::parse("30111222").expect("valid");
        let body = AnalyzeRequest {
            assets: &assets,
            dni_number: Some(id.as_str()),
            country_iso2: "AR",
        };

        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["dniNumber"], "30111222");
        assert_eq!(json["countryIso2"], "AR");
        assert_eq!(json["assets"]["front"], "gs://bucket/front.jpg");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let analyzer = HttpDocumentAnalyzer::new(
            &DocumentAiConfig {
                endpoint: "https://vision.example.net/analyze".to_owned(),
                api_key: SecretString::from("super_secret_vision_key"),
            },
            std::time::Duration::from_secs(5),
            "AR".to_owned(),
        )
        .expect("client");

        let debug_output = format!("{analyzer:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_vision_key"));
    }
}
