//! Reviewer-facing decision endpoint.
//!
//! Reviewer-role authorization is enforced by the surrounding application;
//! this service only requires the internal bearer token.

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};

use cargaruta_identity_core::{AssetComponent, AttemptId, DecisionAction, UserId};

use crate::error::AppError;
use crate::middleware::RequireServiceAuth;
use crate::services::ReviewOutcome;
use crate::state::AppState;

/// Build the review router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/review/decide", post(decide))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideRequest {
    pub uid: String,
    pub attempt_id: String,
    pub action: DecisionAction,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub requested_components: Option<Vec<AssetComponent>>,
    pub reviewer_id: String,
}

#[derive(Debug, Serialize)]
pub struct DecideResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<bool>,
}

/// POST /api/review/decide - force a decision on an attempt.
///
/// A conflicting approval is refused and surfaced to the reviewer as
/// `conflict: true` rather than silently downgraded.
///
/// # Errors
///
/// Returns an error for unauthenticated callers, unknown attempts, or an
/// illegal decision on an already-terminal attempt.
pub async fn decide(
    _auth: RequireServiceAuth,
    State(state): State<AppState>,
    Json(body): Json<DecideRequest>,
) -> Result<Json<DecideResponse>, AppError> {
    if body.uid.is_empty() || body.attempt_id.is_empty() || body.reviewer_id.is_empty() {
        return Err(AppError::BadRequest(
            "missing uid/attemptId/reviewerId".into(),
        ));
    }
    let user_id = UserId::new(body.uid);
    let attempt_id = AttemptId::new(body.attempt_id);
    let reviewer_id = UserId::new(body.reviewer_id);

    let outcome = state
        .review()
        .decide(
            &user_id,
            &attempt_id,
            body.action,
            body.reason,
            body.requested_components,
            &reviewer_id,
        )
        .await?;

    let response = match outcome {
        ReviewOutcome::Conflict { .. } => DecideResponse {
            ok: false,
            conflict: Some(true),
        },
        ReviewOutcome::Approved | ReviewOutcome::Rejected | ReviewOutcome::RetryRequested => {
            DecideResponse {
                ok: true,
                conflict: None,
            }
        }
    };
    Ok(Json(response))
}
