//! Premium provider webhook endpoint.

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::Serialize;
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

/// Signature header set by the premium provider.
const SIGNATURE_HEADER: &str = "X-HO-Signature";

/// Build the webhook router.
pub fn router() -> Router<AppState> {
    Router::new().route("/providerWebhook", post(provider_webhook))
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<bool>,
}

/// POST /providerWebhook - authenticated provider callback.
///
/// The body is taken raw so the HMAC is computed over exactly the bytes
/// the provider signed; parsing happens only after verification.
///
/// # Errors
///
/// - 500 when the shared secret is unconfigured (fail closed)
/// - 403 on signature mismatch
/// - 400 on missing required fields
#[instrument(skip(state, headers, body))]
pub async fn provider_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let ack = state
        .webhook_gateway()
        .ingest(body.as_bytes(), signature)
        .await?;

    Ok(Json(WebhookResponse {
        ok: true,
        conflict: ack.conflict.then_some(true),
    }))
}
