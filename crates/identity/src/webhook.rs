//! Webhook ingestion gateway for the premium biometric provider.
//!
//! The provider calls back with a decision signed via HMAC-SHA256 over the
//! exact raw request body (`X-HO-Signature`, hex). Verification happens
//! before any business field is parsed, and the endpoint fails closed when
//! the shared secret is unconfigured - an unsigned callback silently
//! accepted would be a security hole.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, instrument, warn};

use cargaruta_identity_core::confidence::premium_score;
use cargaruta_identity_core::{
    AttemptId, AttemptStatus, AttemptUpdate, GovernmentId, ProviderTier, UserId,
};

use crate::error::AppError;
use crate::store::{ApprovalOutcome, ApprovalWrite, IdentityStore};

type HmacSha256 = Hmac<Sha256>;

/// Raw webhook payload from the premium provider.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(default)]
    pub uid: Option<String>,
    /// Attempt reference of the form `.../attempts/{attemptId}`.
    #[serde(default)]
    pub attempt_path: Option<String>,
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub dni_number: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub scores: Option<serde_json::Value>,
}

/// Acknowledgement returned to the provider.
#[derive(Debug, Clone, Copy)]
pub struct WebhookAck {
    /// The approval was blocked by a registry conflict and the attempt was
    /// parked for staff instead.
    pub conflict: bool,
}

/// Verify a hex HMAC-SHA256 signature over the raw body.
///
/// The digest lengths are compared before the constant-time byte comparison
/// to defend against malformed or truncated signatures.
///
/// # Errors
///
/// Returns `AppError::Forbidden` on any mismatch.
pub fn verify_signature(
    secret: &SecretString,
    raw_body: &[u8],
    signature_hex: &str,
) -> Result<(), AppError> {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) else {
        return Err(AppError::Forbidden("signature verification failed".into()));
    };
    mac.update(raw_body);
    let computed = mac.finalize().into_bytes();

    let provided = hex::decode(signature_hex.trim())
        .map_err(|_| AppError::Forbidden("invalid signature encoding".into()))?;

    if !constant_time_compare(computed.as_slice(), &provided) {
        return Err(AppError::Forbidden("signature mismatch".into()));
    }

    debug!("Webhook signature verified");
    Ok(())
}

/// Constant-time byte comparison (length checked first).
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Gateway folding authenticated provider callbacks into the store.
pub struct WebhookGateway {
    store: Arc<dyn IdentityStore>,
    secret: Option<SecretString>,
}

impl WebhookGateway {
    /// Create a gateway; `secret` comes from `PREMIUM_WEBHOOK_SECRET`.
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>, secret: Option<SecretString>) -> Self {
        Self { store, secret }
    }

    /// Authenticate and ingest one provider callback.
    ///
    /// Replays are safe: the update is merge-style and re-applying the same
    /// terminal state is a no-op.
    ///
    /// # Errors
    ///
    /// - `AppError::Configuration` when the shared secret is unconfigured
    ///   (fail closed, HTTP 500)
    /// - `AppError::Forbidden` when the signature is missing or wrong
    ///   (HTTP 403), checked before any business field is parsed
    /// - `AppError::BadRequest` when `uid`/`attemptPath` are missing or the
    ///   ID number is malformed (HTTP 400)
    #[instrument(skip(self, raw_body, signature))]
    pub async fn ingest(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, AppError> {
        let Some(secret) = &self.secret else {
            return Err(AppError::Configuration(
                "PREMIUM_WEBHOOK_SECRET is not configured".into(),
            ));
        };

        let signature =
            signature.ok_or_else(|| AppError::Forbidden("missing signature header".into()))?;
        verify_signature(secret, raw_body, signature)?;

        // Only now is the body parsed.
        let payload: WebhookPayload = serde_json::from_slice(raw_body)
            .map_err(|e| AppError::BadRequest(format!("invalid webhook body: {e}")))?;

        let uid = payload
            .uid
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::BadRequest("missing uid".into()))?;
        let attempt_path = payload
            .attempt_path
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::BadRequest("missing attemptPath".into()))?;

        let user_id = UserId::new(uid);
        let attempt_id = attempt_id_from_path(attempt_path)
            .ok_or_else(|| AppError::BadRequest("invalid attemptPath".into()))?;

        let decision = payload.decision.as_deref().unwrap_or_default();
        let status = match decision {
            "approved" => AttemptStatus::Approved,
            "review_needed" => AttemptStatus::Pending,
            _ => AttemptStatus::Rejected,
        };

        let face_match = payload
            .scores
            .as_ref()
            .and_then(|scores| scores.get("face_match"))
            .and_then(serde_json::Value::as_f64);
        let confidence = premium_score(face_match);

        let id_number = payload
            .dni_number
            .as_deref()
            .map(GovernmentId::parse)
            .transpose()
            .map_err(|e| AppError::BadRequest(format!("invalid dniNumber: {e}")))?;

        if status == AttemptStatus::Approved {
            let outcome = self
                .store
                .commit_approval(ApprovalWrite {
                    user_id: user_id.clone(),
                    attempt_id: attempt_id.clone(),
                    provider: ProviderTier::PremiumBiometric,
                    confidence_score: confidence,
                    id_number,
                    reference_id: payload.reference_id.clone(),
                    premium_scores: payload.scores.clone(),
                    manual_decision: None,
                })
                .await?;

            if let ApprovalOutcome::Conflict { owner_user_id } = outcome {
                // The number belongs to someone else: park the attempt for
                // staff with the conflict flag instead of approving.
                warn!(owner = %owner_user_id, "Approval blocked by registry conflict");
                self.store
                    .apply_update(
                        &user_id,
                        &attempt_id,
                        AttemptUpdate {
                            provider: Some(ProviderTier::PremiumBiometric),
                            status: Some(AttemptStatus::Pending),
                            confidence_score: Some(confidence),
                            premium_scores: payload.scores,
                            conflict_flag: Some(true),
                            ..AttemptUpdate::default()
                        },
                    )
                    .await?;
                return Ok(WebhookAck { conflict: true });
            }

            info!("Premium approval applied");
            return Ok(WebhookAck { conflict: false });
        }

        // Non-approval decisions only touch the attempt.
        self.store
            .apply_update(
                &user_id,
                &attempt_id,
                AttemptUpdate {
                    provider: Some(ProviderTier::PremiumBiometric),
                    status: Some(status),
                    confidence_score: Some(confidence),
                    premium_scores: payload.scores,
                    ..AttemptUpdate::default()
                },
            )
            .await?;

        info!(status = %status, "Premium decision applied");
        Ok(WebhookAck { conflict: false })
    }
}

/// Extract the attempt ID from a provider-supplied attempt path.
///
/// Paths look like `identity_verification_logs/{uid}/attempts/{attemptId}`;
/// the last non-empty segment is the ID.
fn attempt_id_from_path(path: &str) -> Option<AttemptId> {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(AttemptId::new)
}

#[cfg(test)]
mod tests {
    use cargaruta_identity_core::{AssetReferences, VerificationStatus};

    use crate::store::{IdentityStore, MemoryStore};

    use super::*;

    const SECRET: &str = "wH8@kD3$nV6!qR1%tZ5&mB9*xF2^cJ7e";

    fn sign(body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).expect("hmac key");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn gateway(store: Arc<MemoryStore>) -> WebhookGateway {
        WebhookGateway::new(store, Some(SecretString::from(SECRET)))
    }

    async fn pending_premium_attempt(store: &MemoryStore, user: &str) -> (UserId, AttemptId) {
        let user_id = UserId::new(user);
        let started = store.start_attempt(&user_id).await.expect("start");
        store
            .apply_update(
                &user_id,
                &started.attempt.attempt_id,
                AttemptUpdate {
                    status: Some(AttemptStatus::Pending),
                    asset_references: Some(AssetReferences::default()),
                    ..AttemptUpdate::default()
                },
            )
            .await
            .expect("park pending");
        (user_id, started.attempt.attempt_id)
    }

    fn body_for(user: &UserId, attempt: &AttemptId, decision: &str, dni: Option<&str>) -> Vec<u8> {
        let mut payload = serde_json::json!({
            "uid": user.as_str(),
            "attemptPath": format!(
                "identity_verification_logs/{}/attempts/{}",
                user.as_str(),
                attempt.as_str()
            ),
            "decision": decision,
            "scores": {"face_match": 0.92},
        });
        if let Some(dni) = dni {
            payload["dniNumber"] = serde_json::Value::from(dni);
        }
        serde_json::to_vec(&payload).expect("serialize")
    }

    #[test]
    fn test_attempt_id_from_path() {
        let id = attempt_id_from_path("identity_verification_logs/u-1/attempts/a-9");
        assert_eq!(id, Some(AttemptId::new("a-9")));

        let id = attempt_id_from_path("attempts/a-9/");
        assert_eq!(id, Some(AttemptId::new("a-9")));

        assert!(attempt_id_from_path("").is_none());
        assert!(attempt_id_from_path("///").is_none());
    }

    #[test]
    fn test_constant_time_compare_length_guard() {
        assert!(!constant_time_compare(b"abc", b"abcd"));
        assert!(constant_time_compare(b"abc", b"abc"));
        assert!(!constant_time_compare(b"abc", b"abd"));
    }

    #[tokio::test]
    async fn test_missing_secret_fails_closed() {
        let store = Arc::new(MemoryStore::new());
        let gateway = WebhookGateway::new(store, None);

        let err = gateway
            .ingest(b"{}", Some("deadbeef"))
            .await
            .expect_err("must fail closed");
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_signature_over_different_body_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (user, attempt) = pending_premium_attempt(&store, "u-1").await;
        let gateway = gateway(Arc::clone(&store));

        let body = body_for(&user, &attempt, "approved", None);
        let other_body = body_for(&user, &attempt, "rejected", None);

        let err = gateway
            .ingest(&body, Some(&sign(&other_body)))
            .await
            .expect_err("signature over a different body must be rejected");
        assert!(matches!(err, AppError::Forbidden(_)));

        // Nothing was mutated.
        let stored = store
            .get_attempt(&user, &attempt)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(stored.status, AttemptStatus::Pending);
    }

    #[tokio::test]
    async fn test_missing_signature_header_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(store);

        let err = gateway
            .ingest(b"{}", None)
            .await
            .expect_err("missing header");
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_valid_signature_updates_attempt() {
        let store = Arc::new(MemoryStore::new());
        let (user, attempt) = pending_premium_attempt(&store, "u-1").await;
        let gateway = gateway(Arc::clone(&store));

        let body = body_for(&user, &attempt, "review_needed", None);
        let ack = gateway
            .ingest(&body, Some(&sign(&body)))
            .await
            .expect("ingest");
        assert!(!ack.conflict);

        let stored = store
            .get_attempt(&user, &attempt)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(stored.status, AttemptStatus::Pending);
        assert_eq!(stored.provider, ProviderTier::PremiumBiometric);
        assert!((stored.confidence_score - 0.92).abs() < f64::EPSILON);
        assert!(stored.premium_scores.is_some());
    }

    #[tokio::test]
    async fn test_missing_required_fields_is_bad_request() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(store);

        let body = serde_json::to_vec(&serde_json::json!({"decision": "approved"}))
            .expect("serialize");
        let err = gateway
            .ingest(&body, Some(&sign(&body)))
            .await
            .expect_err("missing uid/attemptPath");
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_approval_without_conflict_verifies_user() {
        let store = Arc::new(MemoryStore::new());
        let (user, attempt) = pending_premium_attempt(&store, "u-1").await;
        let gateway = gateway(Arc::clone(&store));

        let body = body_for(&user, &attempt, "approved", Some("30111222"));
        let ack = gateway
            .ingest(&body, Some(&sign(&body)))
            .await
            .expect("ingest");
        assert!(!ack.conflict);

        let stored = store
            .get_attempt(&user, &attempt)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(stored.status, AttemptStatus::Approved);

        let profile = store
            .get_profile(&user)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(profile.verification_status, VerificationStatus::Verified);

        let entry = store
            .registry_get(&GovernmentId::parse("30111222").expect("valid"))
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(entry.owner_user_id, user);
        assert_eq!(entry.verification_status, VerificationStatus::Verified);
    }

    #[tokio::test]
    async fn test_conflicting_approval_parks_attempt() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(Arc::clone(&store));

        // User A already verified with the number.
        let (user_a, attempt_a) = pending_premium_attempt(&store, "u-a").await;
        let body = body_for(&user_a, &attempt_a, "approved", Some("30111222"));
        gateway
            .ingest(&body, Some(&sign(&body)))
            .await
            .expect("approve a");

        // User B's approval carries the same number.
        let (user_b, attempt_b) = pending_premium_attempt(&store, "u-b").await;
        let body = body_for(&user_b, &attempt_b, "approved", Some("30111222"));
        let ack = gateway
            .ingest(&body, Some(&sign(&body)))
            .await
            .expect("ingest");
        assert!(ack.conflict);

        let stored = store
            .get_attempt(&user_b, &attempt_b)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(stored.status, AttemptStatus::Pending);
        assert!(stored.conflict_flag);

        // A's registry entry is untouched.
        let entry = store
            .registry_get(&GovernmentId::parse("30111222").expect("valid"))
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(entry.owner_user_id, user_a);

        // B's profile was never verified.
        let profile_b = store.get_profile(&user_b).await.expect("read");
        assert!(
            profile_b.is_none_or(|p| p.verification_status != VerificationStatus::Verified)
        );
    }

    #[tokio::test]
    async fn test_replayed_approval_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let (user, attempt) = pending_premium_attempt(&store, "u-1").await;
        let gateway = gateway(Arc::clone(&store));

        let body = body_for(&user, &attempt, "approved", Some("30111222"));
        for _ in 0..2 {
            let ack = gateway
                .ingest(&body, Some(&sign(&body)))
                .await
                .expect("replay must be safe");
            assert!(!ack.conflict);
        }

        let stored = store
            .get_attempt(&user, &attempt)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(stored.status, AttemptStatus::Approved);
    }

    #[tokio::test]
    async fn test_unknown_decision_maps_to_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (user, attempt) = pending_premium_attempt(&store, "u-1").await;
        let gateway = gateway(Arc::clone(&store));

        let body = body_for(&user, &attempt, "something_else", None);
        gateway
            .ingest(&body, Some(&sign(&body)))
            .await
            .expect("ingest");

        let stored = store
            .get_attempt(&user, &attempt)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(stored.status, AttemptStatus::Rejected);
    }

    #[tokio::test]
    async fn test_default_face_match_when_scores_absent() {
        let store = Arc::new(MemoryStore::new());
        let (user, attempt) = pending_premium_attempt(&store, "u-1").await;
        let gateway = gateway(Arc::clone(&store));

        let payload = serde_json::json!({
            "uid": user.as_str(),
            "attemptPath": format!("attempts/{}", attempt.as_str()),
            "decision": "review_needed",
        });
        let body = serde_json::to_vec(&payload).expect("serialize");
        gateway
            .ingest(&body, Some(&sign(&body)))
            .await
            .expect("ingest");

        let stored = store
            .get_attempt(&user, &attempt)
            .await
            .expect("read")
            .expect("exists");
        assert!((stored.confidence_score - 0.85).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_unknown_attempt_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(store);

        let user = UserId::new("u-1");
        let attempt = AttemptId::new("missing");
        let body = body_for(&user, &attempt, "rejected", None);
        let err = gateway
            .ingest(&body, Some(&sign(&body)))
            .await
            .expect_err("unknown attempt");
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
