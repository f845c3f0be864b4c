//! End-to-end checkout flow tests.
//!
//! Exercises the full purchase path through the service layer against the
//! in-memory store and the scriptable gateway stub: cart to session, session
//! to completed order with tickets, tickets to gate admission.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use boxoffice::checkin::{CheckInGate, ScanOutcome};
use boxoffice::checkout::{CartLine, CartRequest, CheckoutOrchestrator};
use boxoffice::error::EngineError;
use boxoffice::fees::{FeeCalculator, FeeTier, StoreTierSource};
use boxoffice::payment_gateway::{SessionStatus, StubBehavior, StubGateway};
use boxoffice::store::{DirectoryStore, EngineStore, MemoryStore, OrderStore};
use boxoffice::types::{
    AttractionId, Money, OrderStatus, OrgId, PaymentAccount, Storefront, TicketTypeId,
    TicketTypeRecord,
};
use std::sync::Arc;

struct Harness {
    store: Arc<MemoryStore>,
    orchestrator: CheckoutOrchestrator,
    gate: CheckInGate,
    gateway: StubGateway,
    attraction_id: AttractionId,
    ticket_type: TicketTypeId,
}

fn harness(requires_waiver: bool) -> Harness {
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
                    requires_waiver,
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
        store.clone(),
        Arc::new(gateway.clone()),
        fees,
    );
    let gate = CheckInGate::new(store.clone());

    Harness {
        store,
        orchestrator,
        gate,
        gateway,
        attraction_id,
        ticket_type,
    }
}

fn cart(ticket_type: TicketTypeId, quantity: u32) -> CartRequest {
    CartRequest {
        customer_email: "buyer@example.com".to_string(),
        items: vec![CartLine {
            ticket_type_id: ticket_type,
            quantity,
        }],
    }
}

#[tokio::test]
async fn purchase_then_admission_end_to_end() {
    let hx = harness(false);

    // Open a session for two adult tickets: subtotal 4000, fee 5% + 30.
    let created = hx
        .orchestrator
        .create_session("museum", cart(hx.ticket_type, 2))
        .await
        .unwrap();
    assert_eq!(created.total.cents(), 4000);
    assert_eq!(created.platform_fee.cents(), 230);

    // Verify before the buyer pays: not complete, order untouched.
    let err = hx
        .orchestrator
        .verify_session("museum", &created.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PaymentNotComplete));

    // Buyer pays; verify completes the order and issues the tickets.
    hx.gateway
        .set_behavior(StubBehavior::ReportStatus(SessionStatus::Complete));
    let (order, tickets) = hx
        .orchestrator
        .verify_session("museum", &created.session_id)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(tickets.len(), 2);
    assert_ne!(tickets[0].redemption_code, tickets[1].redemption_code);

    let view = hx
        .orchestrator
        .order_status("museum", &order.id.to_string())
        .await
        .unwrap();
    assert_eq!(view.status, OrderStatus::Completed);
    assert_eq!(view.ticket_count, 2);

    // First scan admits; second scan of the same code reports the
    // original stamp.
    let outcome = hx
        .gate
        .scan(hx.attraction_id, &tickets[0].redemption_code)
        .await
        .unwrap();
    let stamped = match outcome {
        ScanOutcome::Redeemed(ticket) => ticket.used_at.unwrap(),
        ScanOutcome::AlreadyUsed { .. } => panic!("first scan must admit"),
    };
    let outcome = hx
        .gate
        .scan(hx.attraction_id, &tickets[0].redemption_code)
        .await
        .unwrap();
    match outcome {
        ScanOutcome::AlreadyUsed { used_at } => assert_eq!(used_at, stamped),
        ScanOutcome::Redeemed(_) => panic!("second scan must not admit"),
    }

    // The second ticket is unaffected by the first one's redemption.
    let outcome = hx
        .gate
        .scan(hx.attraction_id, &tickets[1].redemption_code)
        .await
        .unwrap();
    assert!(matches!(outcome, ScanOutcome::Redeemed(_)));
}

#[tokio::test]
async fn cancel_before_payment_cancels_locally_and_at_gateway() {
    let hx = harness(false);
    let created = hx
        .orchestrator
        .create_session("museum", cart(hx.ticket_type, 1))
        .await
        .unwrap();

    let view = hx
        .orchestrator
        .order_status("museum", &created.order_id.to_string())
        .await
        .unwrap();
    assert_eq!(view.status, OrderStatus::Processing);

    let order = hx
        .store
        .find_order(
            hx.store
                .resolve_storefront("museum")
                .await
                .unwrap()
                .unwrap()
                .org_id,
            created.order_id,
        )
        .await
        .unwrap()
        .unwrap();
    let reference = order.payment_reference_id.unwrap();

    let canceled = hx
        .orchestrator
        .cancel_session("museum", &reference)
        .await
        .unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert!(hx.gateway.canceled_charges().contains(&reference));

    // Cancel is idempotent.
    let again = hx
        .orchestrator
        .cancel_session("museum", &reference)
        .await
        .unwrap();
    assert_eq!(again.status, OrderStatus::Canceled);

    // A canceled order never completes, even if the gateway later claims
    // the session was paid.
    hx.gateway
        .set_behavior(StubBehavior::ReportStatus(SessionStatus::Complete));
    let err = hx
        .orchestrator
        .verify_session("museum", &created.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidOrderState { .. }));
}

#[tokio::test]
async fn waiver_recorded_once_for_waiver_storefronts() {
    let hx = harness(true);
    let created = hx
        .orchestrator
        .create_session("museum", cart(hx.ticket_type, 1))
        .await
        .unwrap();
    hx.gateway
        .set_behavior(StubBehavior::ReportStatus(SessionStatus::Complete));

    let (order, _) = hx
        .orchestrator
        .verify_session("museum", &created.session_id)
        .await
        .unwrap();
    assert!(hx.store.waiver_recorded(order.id).unwrap());

    // A repeat verify does not error on the already-recorded waiver.
    let (again, _) = hx
        .orchestrator
        .verify_session("museum", &created.session_id)
        .await
        .unwrap();
    assert_eq!(again.id, order.id);
    assert!(hx.store.waiver_recorded(order.id).unwrap());
}

#[tokio::test]
async fn unknown_storefront_is_rejected() {
    let hx = harness(false);
    let err = hx
        .orchestrator
        .create_session("no-such-storefront", cart(hx.ticket_type, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StorefrontNotFound { .. }));
}

#[tokio::test]
async fn order_status_resolves_by_payment_reference_too() {
    let hx = harness(false);
    let created = hx
        .orchestrator
        .create_session("museum", cart(hx.ticket_type, 1))
        .await
        .unwrap();
    hx.gateway
        .set_behavior(StubBehavior::ReportStatus(SessionStatus::Complete));
    let (order, _) = hx
        .orchestrator
        .verify_session("museum", &created.session_id)
        .await
        .unwrap();

    let reference = order.payment_reference_id.unwrap();
    let view = hx
        .orchestrator
        .order_status("museum", &reference)
        .await
        .unwrap();
    assert_eq!(view.order_id, order.id);
    assert_eq!(view.status, OrderStatus::Completed);
}
