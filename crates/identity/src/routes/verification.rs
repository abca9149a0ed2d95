//! Callable verification endpoints for the client capture flow.

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};

use cargaruta_identity_core::{AssetReferences, AttemptId, GovernmentId, UserId};

use crate::error::AppError;
use crate::middleware::RequireServiceAuth;
use crate::state::AppState;

/// Build the verification router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/verification/start", post(start_or_resume))
        .route("/api/verification/submit", post(submit_for_decision))
        .route("/api/verification/guard-dni", post(guard_dni))
}

// =============================================================================
// Request / Response DTOs
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub attempt_id: String,
    pub attempt_number: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub user_id: String,
    pub attempt_id: String,
    /// Opaque storage locators; never inline binary payloads.
    #[serde(default)]
    pub assets: AssetReferences,
    #[serde(default)]
    pub dni_number: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub status: cargaruta_identity_core::AttemptStatus,
    pub confidence_score_percent: u32,
    /// The tier's provider failed or was unavailable; the attempt fell back
    /// to the conservative floor and awaits staff review.
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardDniRequest {
    pub user_id: String,
    #[serde(default)]
    pub dni_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GuardDniResponse {
    pub ok: bool,
    pub conflict: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/verification/start - create or resume an attempt.
///
/// Idempotent: repeated calls converge on the same `in_progress` attempt.
///
/// # Errors
///
/// Returns an error if the caller is unauthenticated or the store fails.
pub async fn start_or_resume(
    _auth: RequireServiceAuth,
    State(state): State<AppState>,
    Json(body): Json<StartRequest>,
) -> Result<Json<StartResponse>, AppError> {
    if body.user_id.is_empty() {
        return Err(AppError::BadRequest("missing userId".into()));
    }
    let user_id = UserId::new(body.user_id);

    let started = state.orchestrator().start_or_resume(&user_id).await?;
    Ok(Json(StartResponse {
        attempt_id: started.attempt.attempt_id.into_inner(),
        attempt_number: started.attempt.attempt_number,
    }))
}

/// POST /api/verification/submit - submit captured assets for a decision.
///
/// # Errors
///
/// Returns an error for unauthenticated callers, unknown attempts, or an
/// already-decided attempt. Provider failures degrade instead of erroring.
pub async fn submit_for_decision(
    _auth: RequireServiceAuth,
    State(state): State<AppState>,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    if body.user_id.is_empty() || body.attempt_id.is_empty() {
        return Err(AppError::BadRequest("missing userId/attemptId".into()));
    }
    let user_id = UserId::new(body.user_id);
    let attempt_id = AttemptId::new(body.attempt_id);

    let submitted_id = body
        .dni_number
        .as_deref()
        .map(GovernmentId::parse)
        .transpose()
        .map_err(|e| AppError::BadRequest(format!("invalid dniNumber: {e}")))?;

    let outcome = state
        .orchestrator()
        .submit_for_decision(&user_id, &attempt_id, body.assets, submitted_id)
        .await?;

    Ok(Json(SubmitResponse {
        status: outcome.status,
        confidence_score_percent: outcome.confidence_percent,
        degraded: outcome.degraded,
    }))
}

/// POST /api/verification/guard-dni - pre-flight uniqueness check.
///
/// Lets the client tell a user their ID number is already claimed before
/// any expensive verification work starts. Read-only.
///
/// # Errors
///
/// Returns an error for unauthenticated callers or a malformed ID number.
pub async fn guard_dni(
    _auth: RequireServiceAuth,
    State(state): State<AppState>,
    Json(body): Json<GuardDniRequest>,
) -> Result<Json<GuardDniResponse>, AppError> {
    if body.user_id.is_empty() {
        return Err(AppError::BadRequest("missing userId".into()));
    }
    let user_id = UserId::new(body.user_id);

    let Some(raw) = body.dni_number.filter(|s| !s.is_empty()) else {
        return Ok(Json(GuardDniResponse {
            ok: true,
            conflict: false,
        }));
    };

    let id_number = GovernmentId::parse(&raw)
        .map_err(|e| AppError::BadRequest(format!("invalid dniNumber: {e}")))?;

    let conflict = state
        .orchestrator()
        .guard_uniqueness(&id_number, &user_id)
        .await?;

    Ok(Json(GuardDniResponse { ok: true, conflict }))
}
