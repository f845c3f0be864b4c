//! Check-in API endpoint.
//!
//! - POST /attractions/:attraction_id/check-in/scan - Redeem a ticket at the gate
//!
//! A duplicate scan is a normal response for the gate device (HTTP 200 with
//! `success: false`), not an error status: the scanner UI branches on the
//! body, and only a genuinely unknown code is a 404.

use crate::checkin::ScanOutcome;
use crate::server::error::AppError;
use crate::server::state::AppState;
use crate::types::AttractionId;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to redeem a ticket.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    /// The redemption code read from the ticket.
    pub code: String,
}

/// The redeemed ticket as shown to the gate device.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedTicket {
    /// The ticket's id.
    pub id: Uuid,
    /// 1-based position within the order.
    pub ticket_number: u32,
    /// Redemption stamp set by this scan.
    pub used_at: Option<DateTime<Utc>>,
}

/// Response to a gate scan.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    /// Whether the ticket was redeemed by this scan.
    pub success: bool,
    /// The redeemed ticket, present when `success` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<ScannedTicket>,
    /// Machine-readable reason when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the ticket was first redeemed, for duplicate scans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
}

/// Redeem a ticket at an attraction's gate.
pub async fn scan(
    State(state): State<AppState>,
    Path(attraction_id): Path<Uuid>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, AppError> {
    let outcome = state
        .gate
        .scan(AttractionId::from_uuid(attraction_id), &request.code)
        .await?;

    let response = match outcome {
        ScanOutcome::Redeemed(ticket) => ScanResponse {
            success: true,
            ticket: Some(ScannedTicket {
                id: *ticket.id.as_uuid(),
                ticket_number: ticket.ticket_number,
                used_at: ticket.used_at,
            }),
            error: None,
            used_at: None,
        },
        ScanOutcome::AlreadyUsed { used_at } => ScanResponse {
            success: false,
            ticket: None,
            error: Some("TICKET_ALREADY_USED".to_string()),
            used_at: Some(used_at),
        },
    };

    Ok(Json(response))
}
