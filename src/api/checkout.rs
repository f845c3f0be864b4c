//! Checkout API endpoints.
//!
//! Storefront-facing purchase flow:
//! - POST /storefronts/:identifier/checkout - Open a payment session
//! - GET|POST /storefronts/:identifier/checkout/verify?session= - Verify payment, issue tickets
//! - GET /storefronts/:identifier/checkout/status/:order_id_or_ref - Poll order status
//! - POST /storefronts/:identifier/checkout/cancel - Cancel before payment

use crate::checkout::{CartLine, CartRequest};
use crate::server::error::AppError;
use crate::server::state::AppState;
use crate::types::{Order, OrderStatus, Ticket, TicketTypeId};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// One cart line in a checkout request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    /// Ticket type to purchase.
    pub ticket_type_id: TicketTypeId,
    /// Number of tickets.
    pub quantity: u32,
}

/// Request to open a checkout session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    /// Buyer's email address.
    pub customer_email: String,
    /// Cart lines; must be non-empty.
    pub items: Vec<CheckoutItem>,
}

/// Response after opening a checkout session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutResponse {
    /// Hosted payment page the buyer is redirected to.
    pub checkout_url: String,
    /// Gateway session id, echoed back on verify.
    pub session_id: String,
    /// Backing order id.
    pub order_id: Uuid,
    /// Customer total in cents.
    pub total: u64,
    /// Platform fee in cents.
    pub platform_fee: u64,
}

/// Query parameters for the verify endpoint.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    /// Gateway session id returned at checkout creation.
    pub session: String,
}

/// A ticket as returned to the storefront.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    /// Ticket id.
    pub ticket_id: Uuid,
    /// 1-based position within the order.
    pub ticket_number: u32,
    /// Opaque code presented at the gate.
    pub redemption_code: String,
    /// Purchased ticket type.
    pub ticket_type_id: Uuid,
    /// Redemption timestamp, if already used.
    pub used_at: Option<DateTime<Utc>>,
}

/// A completed order with its tickets.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBody {
    /// Order id.
    pub id: Uuid,
    /// Human-readable order number.
    pub order_number: String,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Customer total in cents.
    pub total: u64,
    /// Issued tickets.
    pub tickets: Vec<TicketResponse>,
}

/// Response after a successful verify.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Always true on a 200; failures arrive as error responses.
    pub success: bool,
    /// The completed order with its tickets.
    pub order: OrderBody,
}

/// Response for the status poll.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Order id.
    pub order_id: Uuid,
    /// Human-readable order number.
    pub order_number: String,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Customer total in cents.
    pub total: u64,
    /// Number of issued tickets (0 until completed).
    pub ticket_count: usize,
}

/// Request to cancel an order awaiting payment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    /// Gateway payment reference identifying the order.
    pub payment_reference_id: String,
}

/// Response after a cancel.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    /// Always true on a 200.
    pub success: bool,
    /// Human-readable confirmation.
    pub message: String,
}

fn order_body(order: Order, tickets: Vec<Ticket>) -> OrderBody {
    OrderBody {
        id: *order.id.as_uuid(),
        order_number: order.order_number,
        status: order.status,
        total: order.total.cents(),
        tickets: tickets
            .into_iter()
            .map(|ticket| TicketResponse {
                ticket_id: *ticket.id.as_uuid(),
                ticket_number: ticket.ticket_number,
                redemption_code: ticket.redemption_code,
                ticket_type_id: *ticket.ticket_type_id.as_uuid(),
                used_at: ticket.used_at,
            })
            .collect(),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Open a payment session for a cart.
pub async fn create_session(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>, AppError> {
    let cart = CartRequest {
        customer_email: request.customer_email,
        items: request
            .items
            .into_iter()
            .map(|item| CartLine {
                ticket_type_id: item.ticket_type_id,
                quantity: item.quantity,
            })
            .collect(),
    };

    let created = state.checkout.create_session(&identifier, cart).await?;

    Ok(Json(CreateCheckoutResponse {
        checkout_url: created.checkout_url,
        session_id: created.session_id,
        order_id: *created.order_id.as_uuid(),
        total: created.total.cents(),
        platform_fee: created.platform_fee.cents(),
    }))
}

/// Verify a session's payment and return the completed order.
///
/// Safe to call repeatedly; both the buyer's redirect and a webhook-style
/// confirmation land here and converge on the same ticket set.
pub async fn verify_session(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<VerifyResponse>, AppError> {
    let (order, tickets) = state
        .checkout
        .verify_session(&identifier, &query.session)
        .await?;
    Ok(Json(VerifyResponse {
        success: true,
        order: order_body(order, tickets),
    }))
}

/// Poll an order's status by id or payment reference.
pub async fn order_status(
    State(state): State<AppState>,
    Path((identifier, order_id_or_ref)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, AppError> {
    let view = state
        .checkout
        .order_status(&identifier, &order_id_or_ref)
        .await?;
    Ok(Json(StatusResponse {
        order_id: *view.order_id.as_uuid(),
        order_number: view.order_number,
        status: view.status,
        total: view.total.cents(),
        ticket_count: view.ticket_count,
    }))
}

/// Cancel an order still awaiting payment.
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    let order = state
        .checkout
        .cancel_session(&identifier, &request.payment_reference_id)
        .await?;
    Ok(Json(CancelResponse {
        success: true,
        message: format!("Order {} canceled", order.order_number),
    }))
}
