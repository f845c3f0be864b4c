//! Domain types for the order lifecycle and payment settlement engine.
//!
//! Contains the identifier newtypes, the cents-based `Money` value object,
//! the order status state machine, and the `Order`/`OrderItem`/`Ticket`
//! entities plus the small directory records checkout resolves against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner `Uuid`.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for an order.
    OrderId
}

uuid_id! {
    /// Unique identifier for a ticket.
    TicketId
}

uuid_id! {
    /// Unique identifier for an organization (seller).
    OrgId
}

uuid_id! {
    /// Unique identifier for an attraction.
    AttractionId
}

uuid_id! {
    /// Unique identifier for a ticket type.
    TicketTypeId
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in minor currency units (cents) to avoid floating-point
/// arithmetic errors. Single currency per order.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Money(u64);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents.
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies money by a quantity with overflow checking.
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Order status state machine
// ============================================================================

/// Order lifecycle status.
///
/// Transitions only move forward:
///
/// ```text
/// pending --(open payment session)--> processing
/// processing --(payment confirmed)--> completed   [terminal]
/// processing --(payment failed/abandoned/expired)--> canceled [terminal]
/// pending --(checkout init failure)--> canceled   [terminal]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created from a cart, no payment session opened yet.
    Pending,
    /// A gateway payment session is open; awaiting confirmation.
    Processing,
    /// Payment confirmed and tickets issued. Terminal.
    Completed,
    /// Payment failed, abandoned, expired, or checkout init failed. Terminal.
    Canceled,
}

impl OrderStatus {
    /// Returns true if this status accepts no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }

    /// Returns true if the state machine allows moving to `next`.
    ///
    /// Terminal states accept nothing; no transition skips a state.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Canceled)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Canceled)
        )
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    /// Parses the storage representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Order aggregate
// ============================================================================

/// A single line of an order: ticket type plus quantity.
///
/// Immutable once the order is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Ticket type purchased.
    pub ticket_type_id: TicketTypeId,
    /// Number of units purchased. Always at least 1.
    pub quantity: u32,
    /// Unit price at time of purchase, in cents.
    pub unit_price: Money,
}

impl OrderItem {
    /// Line total (`unit_price * quantity`) with overflow checking.
    #[must_use]
    pub const fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// A customer's purchase attempt, one row per checkout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Opaque immutable identity.
    pub id: OrderId,
    /// Human-readable unique number, assigned at creation, never reused.
    pub order_number: String,
    /// Selling organization.
    pub org_id: OrgId,
    /// Attraction the tickets admit to.
    pub attraction_id: AttractionId,
    /// Buyer's email address.
    pub customer_email: String,
    /// Purchased lines; non-empty and immutable after creation.
    pub items: Vec<OrderItem>,
    /// Sum of line totals, in cents.
    pub subtotal: Money,
    /// Platform fee charged to the platform, in cents. Not added to `total`.
    pub platform_fee: Money,
    /// Amount charged to the customer. Equals `subtotal`.
    pub total: Money,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Gateway checkout session id, set once a session is opened.
    pub payment_session_id: Option<String>,
    /// Gateway charge/intent identifier, set once known.
    pub payment_reference_id: Option<String>,
    /// Recorded reason for a canceled order.
    pub cancel_reason: Option<String>,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
    /// When the order was last written.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Total number of units across all items.
    #[must_use]
    pub fn unit_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

// ============================================================================
// Ticket
// ============================================================================

/// One issued ticket per purchased unit.
///
/// Tickets exist if and only if their order is `completed`. `used_at` is
/// write-once (null -> timestamp), never cleared or overwritten.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identity.
    pub id: TicketId,
    /// Owning order.
    pub order_id: OrderId,
    /// Ticket type this unit was purchased under.
    pub ticket_type_id: TicketTypeId,
    /// Sequential within the order, 1-based, human-facing.
    pub ticket_number: u32,
    /// Unique opaque code scanned at check-in.
    pub redemption_code: String,
    /// Set exactly once when the ticket is redeemed.
    pub used_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Directory records (external collaborators, interface boundary only)
// ============================================================================

/// A storefront resolved from its public identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storefront {
    /// Attraction sold through this storefront.
    pub attraction_id: AttractionId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Whether completion records a waiver acceptance.
    pub requires_waiver: bool,
    /// Inactive storefronts do not resolve.
    pub active: bool,
}

/// The organization's connected payment account at the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAccount {
    /// Gateway-side connected account reference.
    pub account_ref: String,
    /// False while onboarding is incomplete; charges are rejected.
    pub charges_enabled: bool,
}

/// A sellable ticket type as the directory knows it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTypeRecord {
    /// Ticket type identity.
    pub id: TicketTypeId,
    /// Display name.
    pub name: String,
    /// Unit price in cents.
    pub price: Money,
    /// Inactive ticket types cannot be purchased.
    pub active: bool,
}
