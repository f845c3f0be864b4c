//! In-memory store implementation.
//!
//! Backs tests and local development. A single mutex per store guards every
//! table, so each conditional write executes as one critical section with
//! the same compare-and-set semantics the Postgres store gets from
//! single-statement conditional updates.

use crate::error::StoreError;
use crate::fees::FeeTier;
use crate::store::{
    CompletionOutcome, DirectoryStore, OrderStore, RedeemOutcome, TicketStore, TransitionOutcome,
};
use crate::types::{
    AttractionId, Order, OrderId, OrderStatus, OrgId, PaymentAccount, Storefront, Ticket,
    TicketTypeRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    tickets: Vec<Ticket>,
    waivers: HashSet<OrderId>,
    storefronts: HashMap<String, Storefront>,
    payment_accounts: HashMap<OrgId, PaymentAccount>,
    ticket_types: HashMap<AttractionId, Vec<TicketTypeRecord>>,
    tiers: HashMap<OrgId, FeeTier>,
}

/// In-memory engine store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a storefront under a public identifier.
    #[must_use]
    pub fn with_storefront(self, identifier: &str, storefront: Storefront) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            tables.storefronts.insert(identifier.to_string(), storefront);
        }
        self
    }

    /// Seeds a connected payment account for an organization.
    #[must_use]
    pub fn with_payment_account(self, org_id: OrgId, account: PaymentAccount) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            tables.payment_accounts.insert(org_id, account);
        }
        self
    }

    /// Seeds the sellable ticket types for an attraction.
    #[must_use]
    pub fn with_ticket_types(
        self,
        attraction_id: AttractionId,
        types: Vec<TicketTypeRecord>,
    ) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            tables.ticket_types.insert(attraction_id, types);
        }
        self
    }

    /// Seeds a fee tier for an organization.
    #[must_use]
    pub fn with_tier(self, org_id: OrgId, tier: FeeTier) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            tables.tiers.insert(org_id, tier);
        }
        self
    }

    /// Whether a waiver acceptance has been recorded for an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table lock is poisoned.
    pub fn waiver_recorded(&self, order_id: OrderId) -> Result<bool, StoreError> {
        Ok(self.lock()?.waivers.contains(&order_id))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".to_string()))
    }
}

fn order_tickets(tables: &Tables, order_id: OrderId) -> Vec<Ticket> {
    let mut tickets: Vec<Ticket> = tables
        .tickets
        .iter()
        .filter(|ticket| ticket.order_id == order_id)
        .cloned()
        .collect();
    tickets.sort_by_key(|ticket| ticket.ticket_number);
    tickets
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.orders.contains_key(&order.id) {
            return Err(StoreError::Database(format!(
                "duplicate order id {}",
                order.id
            )));
        }
        if tables
            .orders
            .values()
            .any(|existing| existing.order_number == order.order_number)
        {
            return Err(StoreError::Database(format!(
                "duplicate order number {}",
                order.order_number
            )));
        }
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order(
        &self,
        org_id: OrgId,
        order_id: OrderId,
    ) -> Result<Option<Order>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .orders
            .get(&order_id)
            .filter(|order| order.org_id == org_id)
            .cloned())
    }

    async fn find_by_session(
        &self,
        org_id: OrgId,
        session_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .orders
            .values()
            .find(|order| {
                order.org_id == org_id
                    && order.payment_session_id.as_deref() == Some(session_id)
            })
            .cloned())
    }

    async fn find_by_reference(
        &self,
        org_id: OrgId,
        reference: &str,
    ) -> Result<Option<Order>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .orders
            .values()
            .find(|order| {
                order.org_id == org_id
                    && order.payment_reference_id.as_deref() == Some(reference)
            })
            .cloned())
    }

    async fn set_payment_session(
        &self,
        order_id: OrderId,
        session_id: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::Database(format!("no order {order_id}")))?;
        if order.payment_session_id.is_some() {
            return Err(StoreError::Database(format!(
                "payment session already set on order {order_id}"
            )));
        }
        order.payment_session_id = Some(session_id.to_string());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn set_payment_reference(
        &self,
        order_id: OrderId,
        reference: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::Database(format!("no order {order_id}")))?;
        order.payment_reference_id = Some(reference.to_string());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn transition(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut tables = self.lock()?;
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::Database(format!("no order {order_id}")))?;

        if order.status == from && from.can_transition_to(to) {
            order.status = to;
            order.updated_at = Utc::now();
            if to == OrderStatus::Canceled {
                order.cancel_reason = reason.map(ToString::to_string);
            }
            return Ok(TransitionOutcome::Transitioned(order.clone()));
        }
        if order.status == to {
            return Ok(TransitionOutcome::AlreadyInState(order.clone()));
        }
        Ok(TransitionOutcome::Conflict {
            current: order.clone(),
        })
    }

    async fn complete_order(
        &self,
        order_id: OrderId,
        tickets: Vec<Ticket>,
    ) -> Result<CompletionOutcome, StoreError> {
        let mut tables = self.lock()?;
        let order = tables
            .orders
            .get(&order_id)
            .ok_or_else(|| StoreError::Database(format!("no order {order_id}")))?
            .clone();

        match order.status {
            OrderStatus::Processing => {
                // This caller wins the flip; insert the whole batch.
                if let Some(order) = tables.orders.get_mut(&order_id) {
                    order.status = OrderStatus::Completed;
                    order.updated_at = Utc::now();
                }
                tables.tickets.extend(tickets);
                let order = tables
                    .orders
                    .get(&order_id)
                    .cloned()
                    .ok_or_else(|| StoreError::Database(format!("no order {order_id}")))?;
                let tickets = order_tickets(&tables, order_id);
                Ok(CompletionOutcome::Completed { order, tickets })
            }
            OrderStatus::Completed => {
                // Idempotent re-run: backfill only vacant ticket-number
                // slots, then return the full existing set.
                let existing: HashSet<u32> = tables
                    .tickets
                    .iter()
                    .filter(|ticket| ticket.order_id == order_id)
                    .map(|ticket| ticket.ticket_number)
                    .collect();
                tables
                    .tickets
                    .extend(
                        tickets
                            .into_iter()
                            .filter(|ticket| !existing.contains(&ticket.ticket_number)),
                    );
                let tickets = order_tickets(&tables, order_id);
                Ok(CompletionOutcome::AlreadyCompleted { order, tickets })
            }
            OrderStatus::Pending | OrderStatus::Canceled => {
                Ok(CompletionOutcome::NotCompletable { current: order })
            }
        }
    }

    async fn record_waiver_acceptance(&self, order_id: OrderId) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.waivers.insert(order_id);
        Ok(())
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>, StoreError> {
        let tables = self.lock()?;
        Ok(order_tickets(&tables, order_id))
    }

    async fn find_by_code(
        &self,
        attraction_id: AttractionId,
        code: &str,
    ) -> Result<Option<Ticket>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .tickets
            .iter()
            .find(|ticket| {
                ticket.redemption_code == code
                    && tables
                        .orders
                        .get(&ticket.order_id)
                        .is_some_and(|order| order.attraction_id == attraction_id)
            })
            .cloned())
    }

    async fn redeem_if_unused(
        &self,
        attraction_id: AttractionId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome, StoreError> {
        let mut tables = self.lock()?;

        let order_ids: HashMap<OrderId, AttractionId> = tables
            .orders
            .iter()
            .map(|(id, order)| (*id, order.attraction_id))
            .collect();

        let Some(ticket) = tables.tickets.iter_mut().find(|ticket| {
            ticket.redemption_code == code
                && order_ids.get(&ticket.order_id) == Some(&attraction_id)
        }) else {
            return Ok(RedeemOutcome::NotFound);
        };

        match ticket.used_at {
            Some(used_at) => Ok(RedeemOutcome::AlreadyUsed { used_at }),
            None => {
                ticket.used_at = Some(now);
                Ok(RedeemOutcome::Redeemed(ticket.clone()))
            }
        }
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn resolve_storefront(
        &self,
        identifier: &str,
    ) -> Result<Option<Storefront>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .storefronts
            .get(identifier)
            .filter(|storefront| storefront.active)
            .cloned())
    }

    async fn payment_account(
        &self,
        org_id: OrgId,
    ) -> Result<Option<PaymentAccount>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.payment_accounts.get(&org_id).cloned())
    }

    async fn ticket_types(
        &self,
        attraction_id: AttractionId,
    ) -> Result<Vec<TicketTypeRecord>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .ticket_types
            .get(&attraction_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn org_tier(&self, org_id: OrgId) -> Result<Option<FeeTier>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.tiers.get(&org_id).copied())
    }
}
