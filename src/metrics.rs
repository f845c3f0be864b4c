//! Business metrics for the settlement engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_checkout_sessions_total` - Payment sessions opened
//! - `boxoffice_orders_completed_total` - Orders completed (first completion only)
//! - `boxoffice_orders_canceled_total` - Orders canceled before payment
//! - `boxoffice_revenue_cents_total` - Revenue from completed orders in cents
//! - `boxoffice_tickets_redeemed_total` - Tickets redeemed at the gate
//! - `boxoffice_duplicate_scans_total` - Scans rejected as already used

use metrics::describe_counter;

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics
/// are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "boxoffice_checkout_sessions_total",
        "Total number of payment sessions opened"
    );
    describe_counter!(
        "boxoffice_orders_completed_total",
        "Total number of orders completed (counted once per order)"
    );
    describe_counter!(
        "boxoffice_orders_canceled_total",
        "Total number of orders canceled before payment"
    );
    describe_counter!(
        "boxoffice_revenue_cents_total",
        "Total revenue from completed orders in cents"
    );
    describe_counter!(
        "boxoffice_tickets_redeemed_total",
        "Total number of tickets redeemed at the gate"
    );
    describe_counter!(
        "boxoffice_duplicate_scans_total",
        "Total number of gate scans rejected because the ticket was already used"
    );

    tracing::info!("Business metrics registered");
}
