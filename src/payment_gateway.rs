//! Payment gateway boundary.
//!
//! The engine never touches gateway-specific types directly. This module
//! defines the narrow interface it depends on (create a hosted payment
//! session, retrieve its status, cancel a pending charge) plus a mock
//! implementation for development and a scriptable stub for tests. In
//! production, the trait is implemented by an adapter over the real
//! gateway SDK (Stripe Checkout or similar).

use crate::types::{Money, OrderId, OrgId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Payment gateway result.
pub type GatewayResult<T> = Result<T, PaymentGatewayError>;

/// Payment gateway error.
///
/// `Unavailable` is transport-level and retryable; everything else is a
/// definitive gateway answer.
#[derive(Debug, Clone)]
pub enum PaymentGatewayError {
    /// The gateway explicitly declined or failed the payment.
    Declined {
        /// Decline reason
        reason: String,
    },
    /// The gateway rejected the request as malformed or unauthorized.
    Rejected {
        /// Rejection reason
        reason: String,
    },
    /// The gateway could not be reached (network failure or timeout).
    Unavailable {
        /// Transport failure description
        reason: String,
    },
}

impl std::fmt::Display for PaymentGatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declined { reason } => write!(f, "Payment declined: {reason}"),
            Self::Rejected { reason } => write!(f, "Request rejected: {reason}"),
            Self::Unavailable { reason } => write!(f, "Gateway unavailable: {reason}"),
        }
    }
}

impl std::error::Error for PaymentGatewayError {}

/// Status of a hosted checkout session as the gateway reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    /// The session is open and awaiting payment.
    Open,
    /// Payment has been collected.
    Complete,
    /// The session expired before payment (30-minute window).
    Expired,
    /// The session was canceled at the gateway.
    Canceled,
    /// A status this engine does not recognize. Treated as not-yet-paid
    /// (fail closed), never as success.
    Unknown(String),
}

impl SessionStatus {
    /// Parses a gateway-reported status string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "open" => Self::Open,
            "complete" => Self::Complete,
            "expired" => Self::Expired,
            "canceled" => Self::Canceled,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Request to open a hosted checkout session.
#[derive(Clone, Debug)]
pub struct CreateSessionRequest {
    /// Amount to collect from the customer, in cents.
    pub amount: Money,
    /// Application-level fee directed to the platform, in cents. The
    /// remainder settles to the connected account.
    pub application_fee: Money,
    /// The seller's connected account reference at the gateway.
    pub connected_account: String,
    /// Order id attached as session metadata for later reconciliation.
    pub order_id: OrderId,
    /// Organization id attached as session metadata.
    pub org_id: OrgId,
    /// Buyer's email, prefilled on the hosted page.
    pub customer_email: String,
}

/// A gateway checkout session as the engine sees it.
#[derive(Clone, Debug)]
pub struct GatewaySession {
    /// Gateway session identifier, stored on the order for correlation.
    pub session_id: String,
    /// URL the buyer's browser is redirected to.
    pub checkout_url: String,
    /// The gateway's charge/intent identifier, once known.
    pub payment_reference: Option<String>,
    /// Current session status.
    pub status: SessionStatus,
}

/// Payment gateway trait.
///
/// Abstraction over hosted-checkout processors. One concrete adapter per
/// gateway; the engine only ever sees these three operations.
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted payment session for an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway rejects the request or cannot be
    /// reached.
    fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<GatewaySession>> + Send>>;

    /// Retrieve a session and its current payment status.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown to the gateway or the
    /// gateway cannot be reached.
    fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<GatewaySession>> + Send>>;

    /// Best-effort cancel of a pending charge.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway refuses or cannot be reached. The
    /// caller logs failures and proceeds; the local order record is
    /// authoritative.
    fn cancel_charge(
        &self,
        payment_reference: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<()>> + Send>>;
}

/// Mock payment gateway (always succeeds, for development).
///
/// Sessions are reported `Complete` on retrieval so the full checkout flow
/// can be exercised without a real processor.
#[derive(Clone, Debug, Default)]
pub struct MockPaymentGateway;

impl MockPaymentGateway {
    /// Creates a new mock payment gateway.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Creates an Arc-wrapped instance for sharing.
    #[must_use]
    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new())
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<GatewaySession>> + Send>> {
        Box::pin(async move {
            let session_id = format!("mock_cs_{}", Uuid::new_v4().simple());

            tracing::info!(
                order_id = %request.order_id,
                amount = request.amount.cents(),
                application_fee = request.application_fee.cents(),
                session_id = %session_id,
                "Mock checkout session created"
            );

            Ok(GatewaySession {
                checkout_url: format!("https://pay.example.test/c/{session_id}"),
                session_id,
                payment_reference: None,
                status: SessionStatus::Open,
            })
        })
    }

    fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<GatewaySession>> + Send>> {
        let session_id = session_id.to_string();
        Box::pin(async move {
            Ok(GatewaySession {
                checkout_url: format!("https://pay.example.test/c/{session_id}"),
                payment_reference: Some(format!("mock_pi_{}", Uuid::new_v4().simple())),
                session_id,
                status: SessionStatus::Complete,
            })
        })
    }

    fn cancel_charge(
        &self,
        payment_reference: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<()>> + Send>> {
        let payment_reference = payment_reference.to_string();
        Box::pin(async move {
            tracing::info!(payment_reference = %payment_reference, "Mock charge canceled");
            Ok(())
        })
    }
}

/// Scripted gateway behavior for [`StubGateway`].
#[derive(Clone, Debug)]
pub enum StubBehavior {
    /// Create succeeds; retrieve reports the given status.
    ReportStatus(SessionStatus),
    /// Create succeeds; retrieve reports the charge declined.
    Decline(String),
    /// Session creation is rejected with the given reason.
    FailCreate(String),
    /// Every call fails as unreachable.
    Unreachable,
}

/// Scriptable gateway for tests.
///
/// Remembers created sessions and canceled charges so tests can assert on
/// them; the reported retrieval status can be changed mid-test to simulate
/// the buyer paying.
#[derive(Clone, Debug)]
pub struct StubGateway {
    inner: Arc<Mutex<StubState>>,
}

#[derive(Debug)]
struct StubState {
    behavior: StubBehavior,
    sessions: HashMap<String, OrderId>,
    canceled_charges: Vec<String>,
}

impl StubGateway {
    /// Creates a stub with the given scripted behavior.
    #[must_use]
    pub fn with_behavior(behavior: StubBehavior) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StubState {
                behavior,
                sessions: HashMap::new(),
                canceled_charges: Vec::new(),
            })),
        }
    }

    /// Creates a stub whose sessions report `open` until told otherwise.
    #[must_use]
    pub fn open() -> Self {
        Self::with_behavior(StubBehavior::ReportStatus(SessionStatus::Open))
    }

    /// Replaces the scripted behavior.
    pub fn set_behavior(&self, behavior: StubBehavior) {
        if let Ok(mut state) = self.inner.lock() {
            state.behavior = behavior;
        }
    }

    /// Charge references the engine asked to cancel.
    #[must_use]
    pub fn canceled_charges(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|state| state.canceled_charges.clone())
            .unwrap_or_default()
    }
}

impl PaymentGateway for StubGateway {
    fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<GatewaySession>> + Send>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().map_err(|_| PaymentGatewayError::Unavailable {
                reason: "stub poisoned".to_string(),
            })?;
            match &state.behavior {
                StubBehavior::FailCreate(reason) => Err(PaymentGatewayError::Rejected {
                    reason: reason.clone(),
                }),
                StubBehavior::Unreachable => Err(PaymentGatewayError::Unavailable {
                    reason: "stub unreachable".to_string(),
                }),
                StubBehavior::ReportStatus(_) | StubBehavior::Decline(_) => {
                    // The reference is assigned at creation, the way a real
                    // gateway pins an intent to the session up front.
                    let session_id = format!("stub_cs_{}", Uuid::new_v4().simple());
                    state.sessions.insert(session_id.clone(), request.order_id);
                    Ok(GatewaySession {
                        checkout_url: format!("https://stub.test/c/{session_id}"),
                        payment_reference: Some(format!("stub_pi_{session_id}")),
                        session_id,
                        status: SessionStatus::Open,
                    })
                }
            }
        })
    }

    fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<GatewaySession>> + Send>> {
        let inner = self.inner.clone();
        let session_id = session_id.to_string();
        Box::pin(async move {
            let state = inner.lock().map_err(|_| PaymentGatewayError::Unavailable {
                reason: "stub poisoned".to_string(),
            })?;
            match &state.behavior {
                StubBehavior::Unreachable => Err(PaymentGatewayError::Unavailable {
                    reason: "stub unreachable".to_string(),
                }),
                StubBehavior::Decline(reason) => Err(PaymentGatewayError::Declined {
                    reason: reason.clone(),
                }),
                StubBehavior::FailCreate(_) | StubBehavior::ReportStatus(_) => {
                    if !state.sessions.contains_key(&session_id) {
                        return Err(PaymentGatewayError::Rejected {
                            reason: format!("no such session {session_id}"),
                        });
                    }
                    let status = match &state.behavior {
                        StubBehavior::ReportStatus(status) => status.clone(),
                        _ => SessionStatus::Open,
                    };
                    let payment_reference = match status {
                        SessionStatus::Open => None,
                        _ => Some(format!("stub_pi_{session_id}")),
                    };
                    Ok(GatewaySession {
                        checkout_url: format!("https://stub.test/c/{session_id}"),
                        session_id,
                        payment_reference,
                        status,
                    })
                }
            }
        })
    }

    fn cancel_charge(
        &self,
        payment_reference: &str,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<()>> + Send>> {
        let inner = self.inner.clone();
        let payment_reference = payment_reference.to_string();
        Box::pin(async move {
            let mut state = inner.lock().map_err(|_| PaymentGatewayError::Unavailable {
                reason: "stub poisoned".to_string(),
            })?;
            if matches!(state.behavior, StubBehavior::Unreachable) {
                return Err(PaymentGatewayError::Unavailable {
                    reason: "stub unreachable".to_string(),
                });
            }
            state.canceled_charges.push(payment_reference);
            Ok(())
        })
    }
}
