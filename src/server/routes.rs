//! Router configuration for the settlement engine.
//!
//! Builds the complete Axum router with all endpoints.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{checkin, checkout};
use axum::{
    routing::{get, post},
    Router,
};

/// Build the complete Axum router.
///
/// Configures all routes:
/// - Health checks
/// - Storefront checkout endpoints (create/verify/status/cancel)
/// - Attraction gate check-in endpoint
pub fn build_router(state: AppState) -> Router {
    let storefront_routes = Router::new()
        .route("/:identifier/checkout", post(checkout::create_session))
        .route(
            "/:identifier/checkout/verify",
            get(checkout::verify_session).post(checkout::verify_session),
        )
        .route(
            "/:identifier/checkout/status/:order_id_or_ref",
            get(checkout::order_status),
        )
        .route("/:identifier/checkout/cancel", post(checkout::cancel_session));

    let attraction_routes =
        Router::new().route("/:attraction_id/check-in/scan", post(checkin::scan));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/storefronts", storefront_routes)
        .nest("/attractions", attraction_routes)
        .with_state(state)
}
