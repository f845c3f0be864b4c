//! Box Office - order lifecycle and payment settlement engine
//!
//! Sells attraction tickets through hosted gateway checkout sessions and
//! guarantees exactly-once outcomes across the three money-adjacent races:
//! a confirmed payment completes its order once, an order's tickets are
//! issued once, and a ticket admits one person once.
//!
//! # Architecture
//!
//! ```text
//! Storefront client                       Gate scanner
//!        │                                     │
//!        ▼                                     ▼
//! ┌──────────────┐                      ┌──────────────┐
//! │   checkout   │                      │   check-in   │
//! │ orchestrator │                      │     gate     │
//! └──────┬───────┘                      └──────┬───────┘
//!        │  conditional writes                 │
//!        ▼                                     ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                    EngineStore                      │
//! │   orders / tickets / directory (Postgres or mem)    │
//! └─────────────────────────────────────────────────────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │   payment    │  hosted sessions, status retrieval,
//! │   gateway    │  best-effort charge cancellation
//! └──────────────┘
//! ```
//!
//! # Key Properties
//!
//! ## 1. Forward-Only Order Lifecycle
//!
//! `pending -> processing -> completed | canceled`, enforced by
//! single-statement conditional updates. Terminal states never change.
//!
//! ## 2. Exactly-Once Completion
//!
//! The `processing -> completed` flip and ticket issuance form one atomic
//! unit keyed by `(order_id, ticket_number)`. Of N concurrent verifies,
//! one completes; the rest read back the winner's tickets.
//!
//! ## 3. Exactly-Once Redemption
//!
//! A gate scan stamps `used_at` only where it is still null. The loser of
//! a double scan receives the winner's timestamp, never a second admit.
//!
//! # Usage
//!
//! See [`checkout::CheckoutOrchestrator`] and [`checkin::CheckInGate`] for
//! the two service entry points, and [`server::build_router`] for the HTTP
//! surface.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod checkin;
pub mod checkout;
pub mod config;
pub mod error;
pub mod fees;
pub mod issuer;
pub mod metrics;
pub mod payment_gateway;
pub mod server;
pub mod store;
pub mod types;

pub use checkin::{CheckInGate, ScanOutcome};
pub use checkout::{CartLine, CartRequest, CheckoutOrchestrator};
pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use fees::{FeeCalculator, FeeTier};
pub use payment_gateway::{PaymentGateway, SessionStatus};
pub use store::{EngineStore, MemoryStore, PostgresStore};
pub use types::*;
