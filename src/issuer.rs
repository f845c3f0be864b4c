//! Ticket issuance.
//!
//! Builds the ticket batch for a completed order: exactly one ticket per
//! purchased unit across all item quantities, sequential human-facing
//! ticket numbers, and a fresh opaque redemption code per ticket. The batch
//! is handed to the store's atomic completion unit; this module performs no
//! writes itself.

use crate::types::{Order, Ticket, TicketId};
use rand::Rng;

/// Alphabet for redemption codes. Uppercase, with the characters commonly
/// misread at a scanner (O/0, I/1) removed.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of the random portion of a redemption code.
const CODE_LEN: usize = 12;

/// Generates ticket batches for completed orders.
#[derive(Clone, Copy, Debug, Default)]
pub struct TicketIssuer;

impl TicketIssuer {
    /// Creates a new issuer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Builds one unissued ticket per purchased unit.
    ///
    /// Ticket numbers are 1-based and sequential across the order's items
    /// in item order, so re-running issuance for the same order produces
    /// the same `(order_id, ticket_number)` slots. Redemption codes are
    /// fresh on every call; the store's unique constraint and the
    /// `(order_id, ticket_number)` idempotency key together guarantee that
    /// a retry never duplicates an already-issued ticket.
    #[must_use]
    pub fn issue(&self, order: &Order) -> Vec<Ticket> {
        let mut tickets = Vec::with_capacity(order.unit_count() as usize);
        let mut number = 0u32;
        for item in &order.items {
            for _ in 0..item.quantity {
                number += 1;
                tickets.push(Ticket {
                    id: TicketId::new(),
                    order_id: order.id,
                    ticket_type_id: item.ticket_type_id,
                    ticket_number: number,
                    redemption_code: generate_redemption_code(),
                    used_at: None,
                });
            }
        }
        tickets
    }
}

/// Generates a fresh opaque redemption code.
#[must_use]
pub fn generate_redemption_code() -> String {
    let mut rng = rand::thread_rng();
    let body: String = (0..CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            char::from(CODE_ALPHABET[idx])
        })
        .collect();
    format!("TKT-{body}")
}
