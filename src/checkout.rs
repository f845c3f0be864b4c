//! Checkout orchestration.
//!
//! Bridges an `Order` to a payment gateway session and later reconciles the
//! gateway's outcome back onto the order. Both the buyer-initiated verify
//! call and a gateway-initiated completion signal funnel through
//! [`CheckoutOrchestrator::verify_session`], which is safe to invoke
//! concurrently for the same order: the `processing -> completed` flip is a
//! single conditional write in the store, and the loser of the race reads
//! back the winner's ticket set.

use crate::error::{EngineError, EngineResult};
use crate::fees::FeeCalculator;
use crate::issuer::TicketIssuer;
use crate::payment_gateway::{
    CreateSessionRequest, PaymentGateway, PaymentGatewayError, SessionStatus,
};
use crate::store::{
    CompletionOutcome, DirectoryStore, EngineStore, OrderStore, TicketStore, TransitionOutcome,
};
use crate::types::{
    Money, Order, OrderId, OrderItem, OrderStatus, OrgId, Storefront, Ticket, TicketTypeId,
};
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A cart line as submitted by the storefront.
#[derive(Clone, Debug)]
pub struct CartLine {
    /// Requested ticket type.
    pub ticket_type_id: TicketTypeId,
    /// Requested quantity.
    pub quantity: u32,
}

/// A cart ready for conversion into an order.
#[derive(Clone, Debug)]
pub struct CartRequest {
    /// Buyer's email address.
    pub customer_email: String,
    /// Requested lines; must be non-empty.
    pub items: Vec<CartLine>,
}

/// Result of opening a checkout session.
#[derive(Clone, Debug)]
pub struct CreatedSession {
    /// URL the buyer is redirected to.
    pub checkout_url: String,
    /// Gateway session id.
    pub session_id: String,
    /// The order backing the session.
    pub order_id: OrderId,
    /// Amount the customer will be charged, in cents.
    pub total: Money,
    /// Platform fee, in cents.
    pub platform_fee: Money,
}

/// Snapshot returned by the status poll.
#[derive(Clone, Debug)]
pub struct OrderStatusView {
    /// The order's id.
    pub order_id: OrderId,
    /// The order's human-readable number.
    pub order_number: String,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Customer total, in cents.
    pub total: Money,
    /// Number of issued tickets (0 until completed).
    pub ticket_count: usize,
}

/// Drives orders from cart to `completed` or `canceled`.
pub struct CheckoutOrchestrator {
    store: Arc<dyn EngineStore>,
    gateway: Arc<dyn PaymentGateway>,
    fees: Arc<FeeCalculator>,
    issuer: TicketIssuer,
}

impl CheckoutOrchestrator {
    /// Creates an orchestrator over the given store, gateway, and fee
    /// calculator.
    #[must_use]
    pub fn new(
        store: Arc<dyn EngineStore>,
        gateway: Arc<dyn PaymentGateway>,
        fees: Arc<FeeCalculator>,
    ) -> Self {
        Self {
            store,
            gateway,
            fees,
            issuer: TicketIssuer::new(),
        }
    }

    /// Opens a payment session for a new order built from the cart.
    ///
    /// On gateway failure the order is transitioned `pending -> canceled`
    /// with a recorded reason before the error is surfaced; retrying the
    /// purchase creates a brand-new order.
    ///
    /// # Errors
    ///
    /// `StorefrontNotFound`, `PaymentNotConfigured`, `PaymentNotEnabled`,
    /// `InvalidTicketTypes`, `PaymentInitFailed`, or a store error.
    pub async fn create_session(
        &self,
        identifier: &str,
        cart: CartRequest,
    ) -> EngineResult<CreatedSession> {
        let storefront = self.resolve_storefront(identifier).await?;

        let account = self
            .store
            .payment_account(storefront.org_id)
            .await?
            .ok_or(EngineError::PaymentNotConfigured)?;
        if !account.charges_enabled {
            return Err(EngineError::PaymentNotEnabled);
        }

        let order = self.build_order(&storefront, cart).await?;
        self.store.insert_order(&order).await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            org_id = %order.org_id,
            total = order.total.cents(),
            platform_fee = order.platform_fee.cents(),
            "Order created, opening payment session"
        );

        let session = match self
            .gateway
            .create_session(CreateSessionRequest {
                amount: order.total,
                application_fee: order.platform_fee,
                connected_account: account.account_ref,
                order_id: order.id,
                org_id: order.org_id,
                customer_email: order.customer_email.clone(),
            })
            .await
        {
            Ok(session) => session,
            Err(error) => {
                let reason = format!("payment session creation failed: {error}");
                tracing::warn!(order_id = %order.id, error = %error, "Canceling order after gateway failure");
                self.store
                    .transition(
                        order.id,
                        OrderStatus::Pending,
                        OrderStatus::Canceled,
                        Some(reason.as_str()),
                    )
                    .await?;
                return Err(EngineError::PaymentInitFailed {
                    reason: error.to_string(),
                });
            }
        };

        self.store
            .set_payment_session(order.id, &session.session_id)
            .await?;
        if let Some(reference) = &session.payment_reference {
            self.store.set_payment_reference(order.id, reference).await?;
        }
        self.store
            .transition(order.id, OrderStatus::Pending, OrderStatus::Processing, None)
            .await?;

        metrics::counter!("boxoffice_checkout_sessions_total").increment(1);

        Ok(CreatedSession {
            checkout_url: session.checkout_url,
            session_id: session.session_id,
            order_id: order.id,
            total: order.total,
            platform_fee: order.platform_fee,
        })
    }

    /// Reconciles a gateway session's outcome onto its order, completing
    /// it when payment is confirmed.
    ///
    /// Idempotent: calling twice (or concurrently) for the same confirmed
    /// session yields the same order number and the same ticket id set.
    ///
    /// # Errors
    ///
    /// `OrderNotFound`, `PaymentNotComplete` (caller should poll),
    /// `SessionVerificationFailed` (terminal gateway outcomes),
    /// `GatewayUnavailable` (retryable), or a store error.
    pub async fn verify_session(
        &self,
        identifier: &str,
        session_id: &str,
    ) -> EngineResult<(Order, Vec<Ticket>)> {
        let storefront = self.resolve_storefront(identifier).await?;

        let order = self
            .store
            .find_by_session(storefront.org_id, session_id)
            .await?
            .ok_or(EngineError::OrderNotFound)?;

        let session = match self.gateway.retrieve_session(session_id).await {
            Ok(session) => session,
            Err(PaymentGatewayError::Declined { reason }) => {
                // A decline is terminal for this attempt; the order must
                // not stay in `processing` waiting for a payment that will
                // never arrive.
                if order.status == OrderStatus::Completed {
                    let tickets = self.store.tickets_for_order(order.id).await?;
                    return Ok((order, tickets));
                }
                self.store
                    .transition(
                        order.id,
                        OrderStatus::Processing,
                        OrderStatus::Canceled,
                        Some("payment declined"),
                    )
                    .await?;
                return Err(EngineError::GatewayDeclined { reason });
            }
            Err(error) => return Err(map_gateway_error(error)),
        };

        match session.status {
            SessionStatus::Complete => {}
            SessionStatus::Open => {
                if order.status == OrderStatus::Completed {
                    // Completion already observed through another path.
                    let tickets = self.store.tickets_for_order(order.id).await?;
                    return Ok((order, tickets));
                }
                return Err(EngineError::PaymentNotComplete);
            }
            SessionStatus::Unknown(raw) => {
                // Fail closed: an unrecognized status is never success.
                tracing::warn!(
                    order_id = %order.id,
                    session_id = %session_id,
                    status = %raw,
                    "Unknown gateway session status, treating as not complete"
                );
                if order.status == OrderStatus::Completed {
                    let tickets = self.store.tickets_for_order(order.id).await?;
                    return Ok((order, tickets));
                }
                return Err(EngineError::PaymentNotComplete);
            }
            SessionStatus::Expired | SessionStatus::Canceled => {
                if order.status == OrderStatus::Completed {
                    let tickets = self.store.tickets_for_order(order.id).await?;
                    return Ok((order, tickets));
                }
                let reason = match session.status {
                    SessionStatus::Expired => "checkout session expired",
                    _ => "checkout session canceled at gateway",
                };
                self.store
                    .transition(
                        order.id,
                        OrderStatus::Processing,
                        OrderStatus::Canceled,
                        Some(reason),
                    )
                    .await?;
                return Err(EngineError::SessionVerificationFailed {
                    reason: reason.to_string(),
                });
            }
        }

        if let Some(reference) = &session.payment_reference {
            self.store.set_payment_reference(order.id, reference).await?;
        }

        let (order, tickets) = self.complete(storefront.org_id, order.id).await?;

        if storefront.requires_waiver {
            self.store.record_waiver_acceptance(order.id).await?;
        }

        Ok((order, tickets))
    }

    /// Completes an order: flips `processing -> completed` and issues the
    /// ticket batch as one atomic unit. A no-op returning the existing
    /// order and tickets when already completed.
    ///
    /// # Errors
    ///
    /// `OrderNotFound` if the order does not exist for this organization;
    /// `InvalidOrderState` if it is `pending` or `canceled`.
    pub async fn complete(
        &self,
        org_id: OrgId,
        order_id: OrderId,
    ) -> EngineResult<(Order, Vec<Ticket>)> {
        let order = self
            .store
            .find_order(org_id, order_id)
            .await?
            .ok_or(EngineError::OrderNotFound)?;

        if !matches!(order.status, OrderStatus::Processing | OrderStatus::Completed) {
            return Err(EngineError::InvalidOrderState {
                order_id,
                status: order.status,
            });
        }

        let batch = self.issuer.issue(&order);
        match self.store.complete_order(order_id, batch).await? {
            CompletionOutcome::Completed { order, tickets } => {
                tracing::info!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    tickets = tickets.len(),
                    "Order completed, tickets issued"
                );
                metrics::counter!("boxoffice_orders_completed_total").increment(1);
                metrics::counter!("boxoffice_revenue_cents_total")
                    .increment(order.total.cents());
                Ok((order, tickets))
            }
            CompletionOutcome::AlreadyCompleted { order, tickets } => {
                // Lost the completion race (or a deliberate retry); the
                // winner's result is the result.
                Ok((order, tickets))
            }
            CompletionOutcome::NotCompletable { current } => Err(EngineError::InvalidOrderState {
                order_id,
                status: current.status,
            }),
        }
    }

    /// Cancels an order still awaiting payment.
    ///
    /// Only legal while the order is `processing`. Gateway-side charge
    /// cancellation is best-effort: a failure there is logged but does not
    /// block the local transition, since the local order record is
    /// authoritative for what the business considers sellable.
    ///
    /// # Errors
    ///
    /// `OrderNotFound`, `OrderAlreadyCompleted` once the order is
    /// terminal-completed, `InvalidOrderState` if it never reached
    /// `processing`.
    pub async fn cancel_session(
        &self,
        identifier: &str,
        payment_reference_id: &str,
    ) -> EngineResult<Order> {
        let storefront = self.resolve_storefront(identifier).await?;

        let order = self
            .store
            .find_by_reference(storefront.org_id, payment_reference_id)
            .await?
            .ok_or(EngineError::OrderNotFound)?;

        let outcome = self
            .store
            .transition(
                order.id,
                OrderStatus::Processing,
                OrderStatus::Canceled,
                Some("canceled before payment"),
            )
            .await?;

        let order = match outcome {
            TransitionOutcome::Transitioned(order) => {
                if let Err(error) = self.gateway.cancel_charge(payment_reference_id).await {
                    tracing::warn!(
                        order_id = %order.id,
                        payment_reference_id = %payment_reference_id,
                        error = %error,
                        "Gateway charge cancellation failed, local cancel stands"
                    );
                }
                metrics::counter!("boxoffice_orders_canceled_total").increment(1);
                order
            }
            // Already canceled: deterministic no-op.
            TransitionOutcome::AlreadyInState(order) => order,
            TransitionOutcome::Conflict { current } => {
                if current.status == OrderStatus::Completed {
                    return Err(EngineError::OrderAlreadyCompleted {
                        order_id: current.id,
                    });
                }
                return Err(EngineError::InvalidOrderState {
                    order_id: current.id,
                    status: current.status,
                });
            }
        };

        Ok(order)
    }

    /// Status poll by order id or gateway payment reference.
    ///
    /// # Errors
    ///
    /// `OrderNotFound` if neither lookup matches.
    pub async fn order_status(
        &self,
        identifier: &str,
        order_id_or_ref: &str,
    ) -> EngineResult<OrderStatusView> {
        let storefront = self.resolve_storefront(identifier).await?;

        let order = match Uuid::parse_str(order_id_or_ref) {
            Ok(uuid) => {
                self.store
                    .find_order(storefront.org_id, OrderId::from_uuid(uuid))
                    .await?
            }
            Err(_) => {
                self.store
                    .find_by_reference(storefront.org_id, order_id_or_ref)
                    .await?
            }
        }
        .ok_or(EngineError::OrderNotFound)?;

        let ticket_count = if order.status == OrderStatus::Completed {
            self.store.tickets_for_order(order.id).await?.len()
        } else {
            0
        };

        Ok(OrderStatusView {
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
            total: order.total,
            ticket_count,
        })
    }

    async fn resolve_storefront(&self, identifier: &str) -> EngineResult<Storefront> {
        self.store
            .resolve_storefront(identifier)
            .await?
            .ok_or_else(|| EngineError::StorefrontNotFound {
                identifier: identifier.to_string(),
            })
    }

    /// Converts a cart into a `pending` order, validating ticket types and
    /// recomputing the total from the directory's prices.
    async fn build_order(
        &self,
        storefront: &Storefront,
        cart: CartRequest,
    ) -> EngineResult<Order> {
        if cart.items.is_empty() {
            return Err(EngineError::InvalidTicketTypes {
                details: "cart is empty".to_string(),
            });
        }
        if cart.items.iter().any(|line| line.quantity == 0) {
            return Err(EngineError::InvalidTicketTypes {
                details: "zero-quantity line".to_string(),
            });
        }

        let catalog: HashMap<TicketTypeId, _> = self
            .store
            .ticket_types(storefront.attraction_id)
            .await?
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        let mut items = Vec::with_capacity(cart.items.len());
        let mut subtotal = Money::ZERO;
        for line in &cart.items {
            let record = catalog.get(&line.ticket_type_id).ok_or_else(|| {
                EngineError::InvalidTicketTypes {
                    details: format!("unknown ticket type {}", line.ticket_type_id),
                }
            })?;
            if !record.active {
                return Err(EngineError::InvalidTicketTypes {
                    details: format!("ticket type '{}' is not on sale", record.name),
                });
            }
            let line_total = record
                .price
                .checked_multiply(line.quantity)
                .and_then(|total| subtotal.checked_add(total))
                .ok_or_else(|| EngineError::InvalidTicketTypes {
                    details: "cart total overflows".to_string(),
                })?;
            subtotal = line_total;
            items.push(OrderItem {
                ticket_type_id: line.ticket_type_id,
                quantity: line.quantity,
                unit_price: record.price,
            });
        }

        let platform_fee = self.fees.platform_fee(storefront.org_id, subtotal).await;
        let now = Utc::now();

        Ok(Order {
            id: OrderId::new(),
            order_number: generate_order_number(),
            org_id: storefront.org_id,
            attraction_id: storefront.attraction_id,
            customer_email: cart.customer_email,
            items,
            subtotal,
            platform_fee,
            // The fee is charged separately to the platform; the customer
            // pays the subtotal.
            total: subtotal,
            status: OrderStatus::Pending,
            payment_session_id: None,
            payment_reference_id: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Generates a human-readable order number, unique by construction date
/// plus a random suffix; the store's unique constraint backstops the
/// negligible collision odds.
#[must_use]
pub fn generate_order_number() -> String {
    const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| {
            let idx = rng.gen_range(0..SUFFIX_ALPHABET.len());
            char::from(SUFFIX_ALPHABET[idx])
        })
        .collect();
    format!("BO-{}-{suffix}", Utc::now().format("%Y%m%d"))
}

fn map_gateway_error(error: PaymentGatewayError) -> EngineError {
    match error {
        PaymentGatewayError::Unavailable { reason } => EngineError::GatewayUnavailable { reason },
        PaymentGatewayError::Declined { reason } => EngineError::GatewayDeclined { reason },
        PaymentGatewayError::Rejected { reason } => {
            EngineError::SessionVerificationFailed { reason }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::fees::{FeeCalculator, FeeTier, StoreTierSource};
    use crate::payment_gateway::{StubBehavior, StubGateway};
    use crate::store::MemoryStore;
    use crate::types::{AttractionId, PaymentAccount, TicketTypeRecord};

    struct Fixture {
        orchestrator: CheckoutOrchestrator,
        gateway: StubGateway,
        storefront: &'static str,
        ticket_type: TicketTypeId,
    }

    fn fixture() -> Fixture {
        let org_id = OrgId::new();
        let attraction_id = AttractionId::new();
        let ticket_type = TicketTypeId::new();

        let store = Arc::new(
            MemoryStore::new()
                .with_storefront(
                    "museum",
                    Storefront {
                        attraction_id,
                        org_id,
                        requires_waiver: false,
                        active: true,
                    },
                )
                .with_payment_account(
                    org_id,
                    PaymentAccount {
                        account_ref: "acct_museum".to_string(),
                        charges_enabled: true,
                    },
                )
                .with_ticket_types(
                    attraction_id,
                    vec![TicketTypeRecord {
                        id: ticket_type,
                        name: "Adult".to_string(),
                        price: Money::from_cents(2000),
                        active: true,
                    }],
                )
                .with_tier(
                    org_id,
                    FeeTier {
                        percent_bps: 500,
                        fixed_cents: 30,
                    },
                ),
        );

        let gateway = StubGateway::open();
        let fees = Arc::new(FeeCalculator::new(
            Arc::new(StoreTierSource(store.clone() as Arc<dyn EngineStore>)),
            FeeCalculator::DEFAULT_TTL,
        ));
        let orchestrator = CheckoutOrchestrator::new(
            store,
            Arc::new(gateway.clone()),
            fees,
        );

        Fixture {
            orchestrator,
            gateway,
            storefront: "museum",
            ticket_type,
        }
    }

    fn two_ticket_cart(ticket_type: TicketTypeId) -> CartRequest {
        CartRequest {
            customer_email: "buyer@example.com".to_string(),
            items: vec![CartLine {
                ticket_type_id: ticket_type,
                quantity: 2,
            }],
        }
    }

    #[tokio::test]
    async fn create_session_computes_fee_and_moves_to_processing() {
        let fx = fixture();
        let created = fx
            .orchestrator
            .create_session(fx.storefront, two_ticket_cart(fx.ticket_type))
            .await
            .unwrap();

        // 2 x 2000 = 4000 subtotal; 5% + 30 = 230 fee; customer pays 4000.
        assert_eq!(created.total.cents(), 4000);
        assert_eq!(created.platform_fee.cents(), 230);

        let view = fx
            .orchestrator
            .order_status(fx.storefront, &created.order_id.to_string())
            .await
            .unwrap();
        assert_eq!(view.status, OrderStatus::Processing);
        assert_eq!(view.ticket_count, 0);
    }

    #[tokio::test]
    async fn verify_before_payment_reports_not_complete() {
        let fx = fixture();
        let created = fx
            .orchestrator
            .create_session(fx.storefront, two_ticket_cart(fx.ticket_type))
            .await
            .unwrap();

        let err = fx
            .orchestrator
            .verify_session(fx.storefront, &created.session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PaymentNotComplete));
    }

    #[tokio::test]
    async fn confirmed_payment_issues_one_ticket_per_unit() {
        let fx = fixture();
        let created = fx
            .orchestrator
            .create_session(fx.storefront, two_ticket_cart(fx.ticket_type))
            .await
            .unwrap();

        fx.gateway
            .set_behavior(StubBehavior::ReportStatus(SessionStatus::Complete));
        let (order, tickets) = fx
            .orchestrator
            .verify_session(fx.storefront, &created.session_id)
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.payment_reference_id.is_some());
        assert_eq!(tickets.len(), 2);
        assert_ne!(tickets[0].redemption_code, tickets[1].redemption_code);
    }

    #[tokio::test]
    async fn verify_twice_returns_identical_ticket_sets() {
        let fx = fixture();
        let created = fx
            .orchestrator
            .create_session(fx.storefront, two_ticket_cart(fx.ticket_type))
            .await
            .unwrap();
        fx.gateway
            .set_behavior(StubBehavior::ReportStatus(SessionStatus::Complete));

        let (first_order, first) = fx
            .orchestrator
            .verify_session(fx.storefront, &created.session_id)
            .await
            .unwrap();
        let (second_order, second) = fx
            .orchestrator
            .verify_session(fx.storefront, &created.session_id)
            .await
            .unwrap();

        assert_eq!(first_order.order_number, second_order.order_number);
        assert_eq!(
            first.iter().map(|t| t.id).collect::<Vec<_>>(),
            second.iter().map(|t| t.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn gateway_init_failure_cancels_order_with_reason() {
        let fx = fixture();
        fx.gateway
            .set_behavior(StubBehavior::FailCreate("account restricted".to_string()));

        let err = fx
            .orchestrator
            .create_session(fx.storefront, two_ticket_cart(fx.ticket_type))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PaymentInitFailed { .. }));

        // A retry creates a brand-new order rather than resurrecting the
        // canceled one.
        fx.gateway
            .set_behavior(StubBehavior::ReportStatus(SessionStatus::Open));
        let created = fx
            .orchestrator
            .create_session(fx.storefront, two_ticket_cart(fx.ticket_type))
            .await
            .unwrap();
        let view = fx
            .orchestrator
            .order_status(fx.storefront, &created.order_id.to_string())
            .await
            .unwrap();
        assert_eq!(view.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn cancel_after_completion_is_rejected() {
        let fx = fixture();
        let created = fx
            .orchestrator
            .create_session(fx.storefront, two_ticket_cart(fx.ticket_type))
            .await
            .unwrap();
        fx.gateway
            .set_behavior(StubBehavior::ReportStatus(SessionStatus::Complete));
        let (order, tickets) = fx
            .orchestrator
            .verify_session(fx.storefront, &created.session_id)
            .await
            .unwrap();

        let reference = order.payment_reference_id.clone().unwrap();
        let err = fx
            .orchestrator
            .cancel_session(fx.storefront, &reference)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::OrderAlreadyCompleted { .. }));

        // Order and tickets unchanged.
        let (again, tickets_again) = fx
            .orchestrator
            .verify_session(fx.storefront, &created.session_id)
            .await
            .unwrap();
        assert_eq!(again.status, OrderStatus::Completed);
        assert_eq!(tickets.len(), tickets_again.len());
    }

    #[tokio::test]
    async fn expired_session_cancels_the_order() {
        let fx = fixture();
        let created = fx
            .orchestrator
            .create_session(fx.storefront, two_ticket_cart(fx.ticket_type))
            .await
            .unwrap();
        fx.gateway
            .set_behavior(StubBehavior::ReportStatus(SessionStatus::Expired));

        let err = fx
            .orchestrator
            .verify_session(fx.storefront, &created.session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionVerificationFailed { .. }));

        let view = fx
            .orchestrator
            .order_status(fx.storefront, &created.order_id.to_string())
            .await
            .unwrap();
        assert_eq!(view.status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn declined_payment_cancels_the_order() {
        let fx = fixture();
        let created = fx
            .orchestrator
            .create_session(fx.storefront, two_ticket_cart(fx.ticket_type))
            .await
            .unwrap();
        fx.gateway
            .set_behavior(StubBehavior::Decline("card declined".to_string()));

        let err = fx
            .orchestrator
            .verify_session(fx.storefront, &created.session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::GatewayDeclined { .. }));
        assert!(!err.is_transient());

        // The order is not left stranded in `processing`.
        let view = fx
            .orchestrator
            .order_status(fx.storefront, &created.order_id.to_string())
            .await
            .unwrap();
        assert_eq!(view.status, OrderStatus::Canceled);
        assert_eq!(view.ticket_count, 0);
    }

    #[tokio::test]
    async fn unknown_gateway_status_fails_closed() {
        let fx = fixture();
        let created = fx
            .orchestrator
            .create_session(fx.storefront, two_ticket_cart(fx.ticket_type))
            .await
            .unwrap();
        fx.gateway.set_behavior(StubBehavior::ReportStatus(
            SessionStatus::Unknown("requires_action".to_string()),
        ));

        let err = fx
            .orchestrator
            .verify_session(fx.storefront, &created.session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PaymentNotComplete));

        // Order untouched; still awaiting a recognized terminal status.
        let view = fx
            .orchestrator
            .order_status(fx.storefront, &created.order_id.to_string())
            .await
            .unwrap();
        assert_eq!(view.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn unreachable_gateway_leaves_order_processing() {
        let fx = fixture();
        let created = fx
            .orchestrator
            .create_session(fx.storefront, two_ticket_cart(fx.ticket_type))
            .await
            .unwrap();
        fx.gateway.set_behavior(StubBehavior::Unreachable);

        let err = fx
            .orchestrator
            .verify_session(fx.storefront, &created.session_id)
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let view = fx
            .orchestrator
            .order_status(fx.storefront, &created.order_id.to_string())
            .await
            .unwrap();
        assert_eq!(view.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn invalid_ticket_types_rejected_before_any_write() {
        let fx = fixture();
        let err = fx
            .orchestrator
            .create_session(
                fx.storefront,
                CartRequest {
                    customer_email: "buyer@example.com".to_string(),
                    items: vec![CartLine {
                        ticket_type_id: TicketTypeId::new(),
                        quantity: 1,
                    }],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTicketTypes { .. }));
    }

    #[tokio::test]
    async fn unconfigured_payment_account_is_surfaced() {
        let org_id = OrgId::new();
        let attraction_id = AttractionId::new();
        let store = Arc::new(MemoryStore::new().with_storefront(
            "bare",
            Storefront {
                attraction_id,
                org_id,
                requires_waiver: false,
                active: true,
            },
        ));
        let fees = Arc::new(FeeCalculator::new(
            Arc::new(StoreTierSource(store.clone() as Arc<dyn EngineStore>)),
            FeeCalculator::DEFAULT_TTL,
        ));
        let orchestrator =
            CheckoutOrchestrator::new(store, Arc::new(StubGateway::open()), fees);

        let err = orchestrator
            .create_session("bare", two_ticket_cart(TicketTypeId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PaymentNotConfigured));
    }

    #[tokio::test]
    async fn dormant_payment_account_is_rejected() {
        let org_id = OrgId::new();
        let attraction_id = AttractionId::new();
        let store = Arc::new(
            MemoryStore::new()
                .with_storefront(
                    "dormant",
                    Storefront {
                        attraction_id,
                        org_id,
                        requires_waiver: false,
                        active: true,
                    },
                )
                // Onboarded but the gateway has not activated charges yet.
                .with_payment_account(
                    org_id,
                    PaymentAccount {
                        account_ref: "acct_dormant".to_string(),
                        charges_enabled: false,
                    },
                ),
        );
        let fees = Arc::new(FeeCalculator::new(
            Arc::new(StoreTierSource(store.clone() as Arc<dyn EngineStore>)),
            FeeCalculator::DEFAULT_TTL,
        ));
        let orchestrator =
            CheckoutOrchestrator::new(store, Arc::new(StubGateway::open()), fees);

        let err = orchestrator
            .create_session("dormant", two_ticket_cart(TicketTypeId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PaymentNotEnabled));
    }
}
