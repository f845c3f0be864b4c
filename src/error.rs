//! Error taxonomy for the settlement engine.
//!
//! The variants fall into the buckets the engine treats differently:
//! configuration errors (permanent until an operator fixes setup), input
//! errors (rejected before any state mutation), transient gateway errors
//! (order state untouched, safe to retry), terminal gateway outcomes (drive
//! the order to `canceled`), and internal store failures. Losing a
//! completion or redemption race is deliberately *not* represented here:
//! the loser observes and returns the winner's outcome.

use crate::types::{OrderId, OrderStatus};
use thiserror::Error;

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by checkout, completion, and check-in operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No active storefront matches the given identifier.
    #[error("storefront '{identifier}' not found")]
    StorefrontNotFound {
        /// The identifier the caller presented.
        identifier: String,
    },

    /// The organization has no connected payment account.
    #[error("payment is not configured for this organization")]
    PaymentNotConfigured,

    /// A payment account exists but has not finished activation.
    #[error("payment is not enabled for this organization")]
    PaymentNotEnabled,

    /// One or more cart lines reference unknown or inactive ticket types.
    #[error("invalid ticket types: {details}")]
    InvalidTicketTypes {
        /// What was wrong with the cart.
        details: String,
    },

    /// The gateway refused to open a payment session. The order has been
    /// canceled with a recorded reason; retrying means a new order.
    #[error("payment session creation failed: {reason}")]
    PaymentInitFailed {
        /// Gateway-reported failure reason.
        reason: String,
    },

    /// No order matches the given id, session, or reference.
    #[error("order not found")]
    OrderNotFound,

    /// The gateway has not yet confirmed payment; the caller should poll.
    #[error("payment not complete")]
    PaymentNotComplete,

    /// The gateway session could not be verified.
    #[error("session verification failed: {reason}")]
    SessionVerificationFailed {
        /// Why verification failed.
        reason: String,
    },

    /// Cancellation was requested for an order already completed.
    #[error("order {order_id} is already completed")]
    OrderAlreadyCompleted {
        /// The completed order.
        order_id: OrderId,
    },

    /// No ticket matches the given redemption code at this attraction.
    #[error("ticket not found")]
    TicketNotFound,

    /// The gateway could not be reached. The order stays in its current
    /// state; the same step is safe to retry.
    #[error("payment gateway unreachable: {reason}")]
    GatewayUnavailable {
        /// Transport-level failure description.
        reason: String,
    },

    /// The gateway reported a terminal payment failure.
    #[error("payment declined: {reason}")]
    GatewayDeclined {
        /// Gateway-reported decline reason.
        reason: String,
    },

    /// An order row was in a state the state machine does not allow the
    /// requested operation from.
    #[error("order {order_id} is {status}, operation not allowed")]
    InvalidOrderState {
        /// The order in question.
        order_id: OrderId,
        /// Its current status.
        status: OrderStatus,
    },

    /// Backing store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Returns true for gateway-transient failures that leave the order
    /// state untouched and are safe to retry from the same step.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::GatewayUnavailable { .. })
    }
}

/// Failures raised by the backing store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be mapped onto its domain type.
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}
