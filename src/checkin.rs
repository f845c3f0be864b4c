//! Gate check-in.
//!
//! Redemption of a ticket by its opaque code, scoped to one attraction.
//! Exactly-once is enforced by the store's conditional update: of N
//! concurrent scans of the same code, one observes the unused ticket and
//! stamps it, the rest observe the stamp. A duplicate scan is a normal
//! business outcome for the gate operator, not an error.

use crate::error::{EngineError, EngineResult};
use crate::store::{EngineStore, RedeemOutcome, TicketStore};
use crate::types::{AttractionId, Ticket};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of a gate scan.
#[derive(Clone, Debug)]
pub enum ScanOutcome {
    /// The ticket was valid and has now been marked used.
    Redeemed(Ticket),
    /// The ticket was already redeemed; `used_at` is the original stamp.
    AlreadyUsed {
        /// When the ticket was first redeemed.
        used_at: DateTime<Utc>,
    },
}

/// Validates and redeems tickets at the attraction gate.
pub struct CheckInGate {
    store: Arc<dyn EngineStore>,
}

impl CheckInGate {
    /// Creates a gate over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    /// Scans a redemption code at an attraction's gate.
    ///
    /// The lookup is scoped to the attraction: a code from another
    /// attraction's ticket reads as not found, never as redeemable.
    ///
    /// # Errors
    ///
    /// `TicketNotFound` if no ticket with this code belongs to the
    /// attraction, or a store error.
    pub async fn scan(
        &self,
        attraction_id: AttractionId,
        redemption_code: &str,
    ) -> EngineResult<ScanOutcome> {
        let now = Utc::now();
        match self
            .store
            .redeem_if_unused(attraction_id, redemption_code, now)
            .await?
        {
            RedeemOutcome::Redeemed(ticket) => {
                tracing::info!(
                    ticket_id = %ticket.id,
                    order_id = %ticket.order_id,
                    attraction_id = %attraction_id,
                    "Ticket redeemed"
                );
                metrics::counter!("boxoffice_tickets_redeemed_total").increment(1);
                Ok(ScanOutcome::Redeemed(ticket))
            }
            RedeemOutcome::AlreadyUsed { used_at } => {
                tracing::info!(
                    attraction_id = %attraction_id,
                    used_at = %used_at,
                    "Duplicate scan rejected"
                );
                metrics::counter!("boxoffice_duplicate_scans_total").increment(1);
                Ok(ScanOutcome::AlreadyUsed { used_at })
            }
            RedeemOutcome::NotFound => Err(EngineError::TicketNotFound),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::store::{CompletionOutcome, MemoryStore, OrderStore};
    use crate::types::{
        Money, Order, OrderId, OrderItem, OrderStatus, OrgId, TicketId, TicketTypeId,
    };

    fn processing_order(attraction_id: AttractionId) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            order_number: "BO-20260830-GATE01".to_string(),
            org_id: OrgId::new(),
            attraction_id,
            customer_email: "buyer@example.com".to_string(),
            items: vec![OrderItem {
                ticket_type_id: TicketTypeId::new(),
                quantity: 1,
                unit_price: Money::from_cents(2000),
            }],
            subtotal: Money::from_cents(2000),
            platform_fee: Money::from_cents(130),
            total: Money::from_cents(2000),
            status: OrderStatus::Processing,
            payment_session_id: Some("cs_gate".to_string()),
            payment_reference_id: Some("pi_gate".to_string()),
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn completed_ticket(store: &MemoryStore, attraction_id: AttractionId) -> Ticket {
        let order = processing_order(attraction_id);
        store.insert_order(&order).await.unwrap();
        let batch = vec![Ticket {
            id: TicketId::new(),
            order_id: order.id,
            ticket_type_id: order.items[0].ticket_type_id,
            ticket_number: 1,
            redemption_code: "TKT-GATETESTCODE".to_string(),
            used_at: None,
        }];
        match store.complete_order(order.id, batch).await.unwrap() {
            CompletionOutcome::Completed { mut tickets, .. } => tickets.remove(0),
            other => panic!("unexpected completion outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_scan_redeems_second_reports_original_stamp() {
        let store = Arc::new(MemoryStore::new());
        let attraction_id = AttractionId::new();
        let ticket = completed_ticket(&store, attraction_id).await;
        let gate = CheckInGate::new(store);

        let first = gate.scan(attraction_id, &ticket.redemption_code).await.unwrap();
        let stamped = match first {
            ScanOutcome::Redeemed(ticket) => ticket.used_at.unwrap(),
            ScanOutcome::AlreadyUsed { .. } => panic!("first scan must redeem"),
        };

        let second = gate.scan(attraction_id, &ticket.redemption_code).await.unwrap();
        match second {
            ScanOutcome::AlreadyUsed { used_at } => assert_eq!(used_at, stamped),
            ScanOutcome::Redeemed(_) => panic!("second scan must not redeem"),
        }
    }

    #[tokio::test]
    async fn code_from_another_attraction_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let home = AttractionId::new();
        let ticket = completed_ticket(&store, home).await;
        let gate = CheckInGate::new(store);

        let err = gate
            .scan(AttractionId::new(), &ticket.redemption_code)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TicketNotFound));

        // Still redeemable at its own gate.
        let outcome = gate.scan(home, &ticket.redemption_code).await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Redeemed(_)));
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let gate = CheckInGate::new(store);
        let err = gate
            .scan(AttractionId::new(), "TKT-NEVERISSUED1")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TicketNotFound));
    }
}
