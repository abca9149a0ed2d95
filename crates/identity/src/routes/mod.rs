//! HTTP routes for the identity service.
//!
//! - `/api/verification/*` - callable endpoints for the client capture flow
//! - `/api/review/*` - reviewer decisions (role checks live in the caller)
//! - `/providerWebhook` - premium provider callback (HMAC-authenticated)

pub mod review;
pub mod verification;
pub mod webhook;

use axum::Router;

use crate::state::AppState;

/// Build the combined application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(verification::router())
        .merge(review::router())
        .merge(webhook::router())
}
