//! HTTP server module for the settlement engine.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - Health check endpoints
//! - Error-to-response mapping with stable error codes
//! - Router configuration

pub mod error;
pub mod health;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use health::health_check;
pub use routes::build_router;
pub use state::AppState;
