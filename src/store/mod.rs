//! Backing store seam.
//!
//! All concurrency correctness in this engine is delegated to the store's
//! atomic single-row operations: status transitions and ticket redemption
//! are expressed as conditional writes (`update where status = X`,
//! `set used_at where used_at is null`) executed as one statement, never as
//! read-then-compare-then-write in application code. The orchestrator and
//! the check-in gate are built on the outcome enums below; losing a race is
//! an outcome, not an error.

use crate::error::StoreError;
use crate::fees::FeeTier;
use crate::types::{
    AttractionId, Order, OrderId, OrderStatus, OrgId, PaymentAccount, Storefront, Ticket,
    TicketTypeRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Result of a conditional status transition.
#[derive(Clone, Debug)]
pub enum TransitionOutcome {
    /// The conditional write matched; the order moved `from -> to`.
    Transitioned(Order),
    /// The order was already in the target state. Idempotent no-op.
    AlreadyInState(Order),
    /// The order was in some other state; nothing was written.
    Conflict {
        /// The order as the store currently sees it.
        current: Order,
    },
}

/// Result of the atomic completion unit (status flip + ticket batch).
#[derive(Clone, Debug)]
pub enum CompletionOutcome {
    /// This caller won the `processing -> completed` race and issued the
    /// ticket batch.
    Completed {
        /// The completed order.
        order: Order,
        /// The issued tickets.
        tickets: Vec<Ticket>,
    },
    /// Another caller completed the order first; these are the winner's
    /// tickets (plus any missing ones backfilled idempotently).
    AlreadyCompleted {
        /// The completed order.
        order: Order,
        /// The existing ticket set.
        tickets: Vec<Ticket>,
    },
    /// The order was neither `processing` nor `completed`.
    NotCompletable {
        /// The order as the store currently sees it.
        current: Order,
    },
}

/// Result of the atomic set-if-null redemption write.
#[derive(Clone, Debug)]
pub enum RedeemOutcome {
    /// This scanner won; `used_at` was null and is now set.
    Redeemed(Ticket),
    /// The ticket was already redeemed.
    AlreadyUsed {
        /// When the winning scan happened.
        used_at: DateTime<Utc>,
    },
    /// No ticket with this code exists at this attraction.
    NotFound,
}

/// Store operations over the `Order` aggregate.
///
/// The order repository is the only writer of order status; every status
/// write goes through [`OrderStore::transition`] or
/// [`OrderStore::complete_order`].
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a freshly created order (status `pending`).
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Fetches an order by id, scoped to the organization.
    async fn find_order(&self, org_id: OrgId, order_id: OrderId)
    -> Result<Option<Order>, StoreError>;

    /// Fetches an order by its gateway session id, scoped to the
    /// organization. Session ids correlate external callbacks to exactly
    /// one local order.
    async fn find_by_session(
        &self,
        org_id: OrgId,
        session_id: &str,
    ) -> Result<Option<Order>, StoreError>;

    /// Fetches an order by its gateway payment reference, scoped to the
    /// organization.
    async fn find_by_reference(
        &self,
        org_id: OrgId,
        reference: &str,
    ) -> Result<Option<Order>, StoreError>;

    /// Records the gateway session id on the order. Set once.
    async fn set_payment_session(
        &self,
        order_id: OrderId,
        session_id: &str,
    ) -> Result<(), StoreError>;

    /// Records the gateway charge/intent identifier on the order.
    async fn set_payment_reference(
        &self,
        order_id: OrderId,
        reference: &str,
    ) -> Result<(), StoreError>;

    /// Single conditional status write: succeeds only if the row is still
    /// in `from`. `reason` is recorded on cancellations.
    async fn transition(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, StoreError>;

    /// The failure-atomic completion unit: conditionally flips
    /// `processing -> completed` and inserts the ticket batch in the same
    /// transaction. Re-running against a completed order inserts only
    /// tickets whose `(order_id, ticket_number)` slot is vacant and returns
    /// the full existing set.
    async fn complete_order(
        &self,
        order_id: OrderId,
        tickets: Vec<Ticket>,
    ) -> Result<CompletionOutcome, StoreError>;

    /// Records a waiver acceptance for a completed order. Idempotent.
    async fn record_waiver_acceptance(&self, order_id: OrderId) -> Result<(), StoreError>;
}

/// Store operations over issued tickets.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// All tickets for an order, ordered by `ticket_number`.
    async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>, StoreError>;

    /// Looks up a ticket by redemption code, scoped to the attraction.
    async fn find_by_code(
        &self,
        attraction_id: AttractionId,
        code: &str,
    ) -> Result<Option<Ticket>, StoreError>;

    /// The atomic set-if-null redemption write. Exactly one of any number
    /// of concurrent callers observes [`RedeemOutcome::Redeemed`].
    async fn redeem_if_unused(
        &self,
        attraction_id: AttractionId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome, StoreError>;
}

/// Read-only access to the directory records checkout resolves against.
///
/// The directory itself (attraction/org CRUD, gateway onboarding) is an
/// external collaborator; this engine only reads it.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Resolves a public storefront identifier to an active storefront.
    async fn resolve_storefront(&self, identifier: &str)
    -> Result<Option<Storefront>, StoreError>;

    /// The organization's connected payment account, if onboarded.
    async fn payment_account(&self, org_id: OrgId)
    -> Result<Option<PaymentAccount>, StoreError>;

    /// Sellable ticket types for an attraction.
    async fn ticket_types(
        &self,
        attraction_id: AttractionId,
    ) -> Result<Vec<TicketTypeRecord>, StoreError>;

    /// The organization's subscription fee tier, if one is configured.
    async fn org_tier(&self, org_id: OrgId) -> Result<Option<FeeTier>, StoreError>;
}

/// The full store surface the engine is wired against.
pub trait EngineStore: OrderStore + TicketStore + DirectoryStore {}

impl<T: OrderStore + TicketStore + DirectoryStore> EngineStore for T {}
