//! HTTP API endpoints for the settlement engine.
//!
//! - `checkout`: storefront-facing purchase flow (create, verify, status,
//!   cancel)
//! - `checkin`: attraction-facing gate scan

pub mod checkin;
pub mod checkout;
