//! Application state for the settlement engine HTTP server.
//!
//! Contains all shared resources needed by HTTP handlers: the checkout
//! orchestrator, the check-in gate, and the fee calculator. Handlers never
//! touch the store or gateway directly.

use crate::checkin::CheckInGate;
use crate::checkout::CheckoutOrchestrator;
use crate::fees::{FeeCalculator, StoreTierSource};
use crate::payment_gateway::PaymentGateway;
use crate::store::EngineStore;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Checkout orchestrator for session create/verify/cancel/status.
    pub checkout: Arc<CheckoutOrchestrator>,

    /// Gate for ticket redemption.
    pub gate: Arc<CheckInGate>,

    /// Fee calculator, exposed for cache invalidation hooks.
    pub fees: Arc<FeeCalculator>,
}

impl AppState {
    /// Wires the full service graph over a store and a gateway.
    #[must_use]
    pub fn new(
        store: Arc<dyn EngineStore>,
        gateway: Arc<dyn PaymentGateway>,
        tier_cache_ttl: std::time::Duration,
    ) -> Self {
        let fees = Arc::new(FeeCalculator::new(
            Arc::new(StoreTierSource(store.clone())),
            tier_cache_ttl,
        ));
        let checkout = Arc::new(CheckoutOrchestrator::new(
            store.clone(),
            gateway,
            fees.clone(),
        ));
        let gate = Arc::new(CheckInGate::new(store));
        Self {
            checkout,
            gate,
            fees,
        }
    }
}
