//! Health check endpoints for the settlement engine.
//!
//! Provides endpoints for monitoring service health and readiness.

use axum::{http::StatusCode, Json};
use serde::Serialize;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Health check endpoint.
///
/// Returns 200 OK if the service is running. This is a simple liveness
/// check - it doesn't verify dependencies.
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
}

/// Readiness check endpoint.
///
/// Returns 200 OK once the service is ready to accept traffic; the store
/// pool is established before the router is served, so reachability of the
/// process implies readiness.
pub async fn readiness_check() -> (StatusCode, Json<ReadinessResponse>) {
    (StatusCode::OK, Json(ReadinessResponse { ready: true }))
}
