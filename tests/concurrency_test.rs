//! Concurrency tests for the exactly-once guarantees.
//!
//! Drives the three money-adjacent races through the service layer:
//! concurrent verification of one paid session, concurrent redemption of
//! one code, and a cancel racing a completion. The in-memory store uses
//! the same conditional-update primitives as the Postgres store, so the
//! winner/loser classification exercised here is the production logic.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use boxoffice::checkin::{CheckInGate, ScanOutcome};
use boxoffice::checkout::{CartLine, CartRequest, CheckoutOrchestrator};
use boxoffice::fees::{FeeCalculator, FeeTier, StoreTierSource};
use boxoffice::payment_gateway::{SessionStatus, StubBehavior, StubGateway};
use boxoffice::store::{DirectoryStore, EngineStore, MemoryStore, OrderStore, TicketStore};
use boxoffice::types::{
    AttractionId, Money, OrderStatus, OrgId, PaymentAccount, Storefront, TicketTypeId,
    TicketTypeRecord,
};
use std::collections::BTreeSet;
use std::sync::Arc;

struct Harness {
    store: Arc<MemoryStore>,
    orchestrator: Arc<CheckoutOrchestrator>,
    gate: Arc<CheckInGate>,
    gateway: StubGateway,
    attraction_id: AttractionId,
    ticket_type: TicketTypeId,
}

fn harness() -> Harness {
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
    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        store.clone(),
        Arc::new(gateway.clone()),
        fees,
    ));
    let gate = Arc::new(CheckInGate::new(store.clone()));

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
async fn concurrent_verifies_converge_on_one_ticket_set() {
    let hx = harness();
    let created = hx
        .orchestrator
        .create_session("museum", cart(hx.ticket_type, 3))
        .await
        .unwrap();
    hx.gateway
        .set_behavior(StubBehavior::ReportStatus(SessionStatus::Complete));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let orchestrator = hx.orchestrator.clone();
        let session_id = created.session_id.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.verify_session("museum", &session_id).await
        }));
    }

    let mut ticket_sets = Vec::new();
    for handle in handles {
        let (order, tickets) = handle.await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        ticket_sets.push(
            tickets
                .iter()
                .map(|t| t.id)
                .collect::<BTreeSet<_>>(),
        );
    }

    // Every caller observed the same three tickets.
    assert!(ticket_sets.iter().all(|set| set.len() == 3));
    assert!(ticket_sets.windows(2).all(|pair| pair[0] == pair[1]));

    // And the store holds exactly one ticket per purchased unit.
    let stored = hx.store.tickets_for_order(created.order_id).await.unwrap();
    assert_eq!(stored.len(), 3);
}

#[tokio::test]
async fn concurrent_scans_admit_exactly_once() {
    let hx = harness();
    let created = hx
        .orchestrator
        .create_session("museum", cart(hx.ticket_type, 1))
        .await
        .unwrap();
    hx.gateway
        .set_behavior(StubBehavior::ReportStatus(SessionStatus::Complete));
    let (_, tickets) = hx
        .orchestrator
        .verify_session("museum", &created.session_id)
        .await
        .unwrap();
    let code = tickets[0].redemption_code.clone();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let gate = hx.gate.clone();
        let code = code.clone();
        let attraction_id = hx.attraction_id;
        handles.push(tokio::spawn(async move {
            gate.scan(attraction_id, &code).await
        }));
    }

    let mut admitted = 0;
    let mut stamps = BTreeSet::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ScanOutcome::Redeemed(ticket) => {
                admitted += 1;
                stamps.insert(ticket.used_at.unwrap());
            }
            ScanOutcome::AlreadyUsed { used_at } => {
                stamps.insert(used_at);
            }
        }
    }

    assert_eq!(admitted, 1);
    // Every loser saw the winner's timestamp.
    assert_eq!(stamps.len(), 1);
}

#[tokio::test]
async fn cancel_racing_completion_yields_one_terminal_state() {
    for _ in 0..8 {
        let hx = harness();
        let created = hx
            .orchestrator
            .create_session("museum", cart(hx.ticket_type, 2))
            .await
            .unwrap();
        hx.gateway
            .set_behavior(StubBehavior::ReportStatus(SessionStatus::Complete));

        let storefront = hx
            .store
            .resolve_storefront("museum")
            .await
            .unwrap()
            .unwrap();
        let order = hx
            .store
            .find_order(storefront.org_id, created.order_id)
            .await
            .unwrap()
            .unwrap();
        let reference = order.payment_reference_id.unwrap();

        let verify = {
            let orchestrator = hx.orchestrator.clone();
            let session_id = created.session_id.clone();
            tokio::spawn(async move { orchestrator.verify_session("museum", &session_id).await })
        };
        let cancel = {
            let orchestrator = hx.orchestrator.clone();
            let reference = reference.clone();
            tokio::spawn(async move { orchestrator.cancel_session("museum", &reference).await })
        };

        let verified = verify.await.unwrap();
        let canceled = cancel.await.unwrap();

        let final_order = hx
            .store
            .find_order(storefront.org_id, created.order_id)
            .await
            .unwrap()
            .unwrap();
        let tickets = hx.store.tickets_for_order(created.order_id).await.unwrap();

        match final_order.status {
            OrderStatus::Completed => {
                // Completion won: verify succeeded, cancel was rejected,
                // tickets exist.
                assert!(verified.is_ok());
                assert!(canceled.is_err());
                assert_eq!(tickets.len(), 2);
            }
            OrderStatus::Canceled => {
                // Cancel won: no tickets were ever issued.
                assert!(canceled.is_ok());
                assert!(verified.is_err());
                assert!(tickets.is_empty());
            }
            other => panic!("order ended in non-terminal state {other:?}"),
        }
    }
}

mod lifecycle_properties {
    use boxoffice::types::OrderStatus;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = OrderStatus> {
        prop_oneof![
            Just(OrderStatus::Pending),
            Just(OrderStatus::Processing),
            Just(OrderStatus::Completed),
            Just(OrderStatus::Canceled),
        ]
    }

    proptest! {
        /// No sequence of permitted transitions ever leaves a terminal
        /// state or moves backwards.
        #[test]
        fn transitions_are_forward_only(targets in proptest::collection::vec(any_status(), 1..20)) {
            let mut current = OrderStatus::Pending;
            let mut seen_terminal = false;
            for target in targets {
                if current.can_transition_to(target) {
                    prop_assert!(!seen_terminal);
                    prop_assert!(target != OrderStatus::Pending);
                    current = target;
                }
                if current.is_terminal() {
                    seen_terminal = true;
                }
            }
        }

        /// Terminal states accept no outgoing transitions at all.
        #[test]
        fn terminal_states_are_absorbing(target in any_status()) {
            prop_assert!(!OrderStatus::Completed.can_transition_to(target));
            prop_assert!(!OrderStatus::Canceled.can_transition_to(target));
        }
    }
}
