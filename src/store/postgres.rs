//! `PostgreSQL` store implementation.
//!
//! Every conditional write maps to a single SQL statement
//! (`UPDATE ... WHERE status = $from`, `UPDATE ... WHERE used_at IS NULL`)
//! so correctness holds under arbitrary multi-process deployment; the
//! completion unit wraps the status flip and the ticket batch in one
//! transaction. Row-to-domain mapping happens at one boundary function per
//! entity.

use crate::error::StoreError;
use crate::fees::FeeTier;
use crate::store::{
    CompletionOutcome, DirectoryStore, OrderStore, RedeemOutcome, TicketStore, TransitionOutcome,
};
use crate::types::{
    AttractionId, Money, Order, OrderId, OrderItem, OrderStatus, OrgId, PaymentAccount,
    Storefront, Ticket, TicketId, TicketTypeId, TicketTypeRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Schema bootstrap statements, applied idempotently at startup.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        order_number TEXT NOT NULL UNIQUE,
        org_id UUID NOT NULL,
        attraction_id UUID NOT NULL,
        customer_email TEXT NOT NULL,
        items JSONB NOT NULL,
        subtotal BIGINT NOT NULL,
        platform_fee BIGINT NOT NULL,
        total BIGINT NOT NULL,
        status TEXT NOT NULL,
        payment_session_id TEXT UNIQUE,
        payment_reference_id TEXT,
        cancel_reason TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS orders_org_session_idx
        ON orders (org_id, payment_session_id)",
    "CREATE TABLE IF NOT EXISTS tickets (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL REFERENCES orders (id),
        ticket_type_id UUID NOT NULL,
        ticket_number INTEGER NOT NULL,
        redemption_code TEXT NOT NULL UNIQUE,
        used_at TIMESTAMPTZ,
        UNIQUE (order_id, ticket_number)
    )",
    "CREATE TABLE IF NOT EXISTS waiver_acceptances (
        order_id UUID PRIMARY KEY REFERENCES orders (id),
        accepted_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS storefronts (
        identifier TEXT PRIMARY KEY,
        attraction_id UUID NOT NULL,
        org_id UUID NOT NULL,
        requires_waiver BOOLEAN NOT NULL DEFAULT FALSE,
        active BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE IF NOT EXISTS payment_accounts (
        org_id UUID PRIMARY KEY,
        account_ref TEXT NOT NULL,
        charges_enabled BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE TABLE IF NOT EXISTS ticket_types (
        id UUID PRIMARY KEY,
        attraction_id UUID NOT NULL,
        name TEXT NOT NULL,
        price BIGINT NOT NULL,
        active BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE IF NOT EXISTS org_fee_tiers (
        org_id UUID PRIMARY KEY,
        percent_bps INTEGER NOT NULL,
        fixed_cents BIGINT NOT NULL
    )",
];

/// `PostgreSQL`-backed engine store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wraps an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the schema bootstrap statements.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Row shapes and boundary mapping (one function per entity)
// ============================================================================

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    org_id: Uuid,
    attraction_id: Uuid,
    customer_email: String,
    items: Json<Vec<OrderItem>>,
    subtotal: i64,
    platform_fee: i64,
    total: i64,
    status: String,
    payment_session_id: Option<String>,
    payment_reference_id: Option<String>,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    order_id: Uuid,
    ticket_type_id: Uuid,
    ticket_number: i32,
    redemption_code: String,
    used_at: Option<DateTime<Utc>>,
}

fn money_from_db(cents: i64, column: &str) -> Result<Money, StoreError> {
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| StoreError::CorruptRow(format!("negative {column}: {cents}")))
}

fn money_to_db(amount: Money, column: &str) -> Result<i64, StoreError> {
    i64::try_from(amount.cents())
        .map_err(|_| StoreError::Database(format!("{column} out of range: {amount}")))
}

fn order_from_row(row: OrderRow) -> Result<Order, StoreError> {
    let status = OrderStatus::parse(&row.status)
        .ok_or_else(|| StoreError::CorruptRow(format!("unknown order status '{}'", row.status)))?;
    Ok(Order {
        id: OrderId::from_uuid(row.id),
        order_number: row.order_number,
        org_id: OrgId::from_uuid(row.org_id),
        attraction_id: AttractionId::from_uuid(row.attraction_id),
        customer_email: row.customer_email,
        items: row.items.0,
        subtotal: money_from_db(row.subtotal, "subtotal")?,
        platform_fee: money_from_db(row.platform_fee, "platform_fee")?,
        total: money_from_db(row.total, "total")?,
        status,
        payment_session_id: row.payment_session_id,
        payment_reference_id: row.payment_reference_id,
        cancel_reason: row.cancel_reason,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn ticket_from_row(row: TicketRow) -> Result<Ticket, StoreError> {
    let ticket_number = u32::try_from(row.ticket_number)
        .map_err(|_| StoreError::CorruptRow(format!("bad ticket_number {}", row.ticket_number)))?;
    Ok(Ticket {
        id: TicketId::from_uuid(row.id),
        order_id: OrderId::from_uuid(row.order_id),
        ticket_type_id: TicketTypeId::from_uuid(row.ticket_type_id),
        ticket_number,
        redemption_code: row.redemption_code,
        used_at: row.used_at,
    })
}

async fn insert_tickets(
    tx: &mut Transaction<'_, Postgres>,
    tickets: &[Ticket],
) -> Result<(), StoreError> {
    for ticket in tickets {
        sqlx::query(
            "INSERT INTO tickets (id, order_id, ticket_type_id, ticket_number, redemption_code, used_at)
             VALUES ($1, $2, $3, $4, $5, NULL)
             ON CONFLICT (order_id, ticket_number) DO NOTHING",
        )
        .bind(ticket.id.as_uuid())
        .bind(ticket.order_id.as_uuid())
        .bind(ticket.ticket_type_id.as_uuid())
        .bind(i32::try_from(ticket.ticket_number).map_err(|_| {
            StoreError::Database(format!("ticket_number {} out of range", ticket.ticket_number))
        })?)
        .bind(&ticket.redemption_code)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn tickets_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> Result<Vec<Ticket>, StoreError> {
    let rows: Vec<TicketRow> = sqlx::query_as(
        "SELECT id, order_id, ticket_type_id, ticket_number, redemption_code, used_at
         FROM tickets WHERE order_id = $1 ORDER BY ticket_number",
    )
    .bind(order_id.as_uuid())
    .fetch_all(&mut **tx)
    .await?;
    rows.into_iter().map(ticket_from_row).collect()
}

const SELECT_ORDER: &str = "SELECT id, order_number, org_id, attraction_id, customer_email, \
     items, subtotal, platform_fee, total, status, payment_session_id, payment_reference_id, \
     cancel_reason, created_at, updated_at FROM orders";

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO orders (id, order_number, org_id, attraction_id, customer_email, items,
                 subtotal, platform_fee, total, status, payment_session_id, payment_reference_id,
                 cancel_reason, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.org_id.as_uuid())
        .bind(order.attraction_id.as_uuid())
        .bind(&order.customer_email)
        .bind(Json(&order.items))
        .bind(money_to_db(order.subtotal, "subtotal")?)
        .bind(money_to_db(order.platform_fee, "platform_fee")?)
        .bind(money_to_db(order.total, "total")?)
        .bind(order.status.as_str())
        .bind(order.payment_session_id.as_deref())
        .bind(order.payment_reference_id.as_deref())
        .bind(order.cancel_reason.as_deref())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_order(
        &self,
        org_id: OrgId,
        order_id: OrderId,
    ) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("{SELECT_ORDER} WHERE id = $1 AND org_id = $2"))
                .bind(order_id.as_uuid())
                .bind(org_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        row.map(order_from_row).transpose()
    }

    async fn find_by_session(
        &self,
        org_id: OrgId,
        session_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "{SELECT_ORDER} WHERE payment_session_id = $1 AND org_id = $2"
        ))
        .bind(session_id)
        .bind(org_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(order_from_row).transpose()
    }

    async fn find_by_reference(
        &self,
        org_id: OrgId,
        reference: &str,
    ) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "{SELECT_ORDER} WHERE payment_reference_id = $1 AND org_id = $2"
        ))
        .bind(reference)
        .bind(org_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(order_from_row).transpose()
    }

    async fn set_payment_session(
        &self,
        order_id: OrderId,
        session_id: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET payment_session_id = $2, updated_at = NOW()
             WHERE id = $1 AND payment_session_id IS NULL",
        )
        .bind(order_id.as_uuid())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!(
                "payment session already set on order {order_id}"
            )));
        }
        Ok(())
    }

    async fn set_payment_reference(
        &self,
        order_id: OrderId,
        reference: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE orders SET payment_reference_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(order_id.as_uuid())
        .bind(reference)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn transition(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, StoreError> {
        if from.can_transition_to(to) {
            let updated: Option<OrderRow> = sqlx::query_as(
                "UPDATE orders
                 SET status = $3,
                     cancel_reason = CASE WHEN $3 = 'canceled' THEN $4 ELSE cancel_reason END,
                     updated_at = NOW()
                 WHERE id = $1 AND status = $2
                 RETURNING id, order_number, org_id, attraction_id, customer_email, items,
                     subtotal, platform_fee, total, status, payment_session_id,
                     payment_reference_id, cancel_reason, created_at, updated_at",
            )
            .bind(order_id.as_uuid())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(reason)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = updated {
                return Ok(TransitionOutcome::Transitioned(order_from_row(row)?));
            }
        }

        // The conditional write missed (or the transition is illegal):
        // report the row as it currently stands.
        let row: Option<OrderRow> = sqlx::query_as(&format!("{SELECT_ORDER} WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        let current =
            order_from_row(row.ok_or_else(|| {
                StoreError::Database(format!("no order {order_id}"))
            })?)?;
        if current.status == to {
            Ok(TransitionOutcome::AlreadyInState(current))
        } else {
            Ok(TransitionOutcome::Conflict { current })
        }
    }

    async fn complete_order(
        &self,
        order_id: OrderId,
        tickets: Vec<Ticket>,
    ) -> Result<CompletionOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The flip is the idempotency boundary: exactly one caller's
        // conditional write matches.
        let flipped: Option<OrderRow> = sqlx::query_as(
            "UPDATE orders SET status = 'completed', updated_at = NOW()
             WHERE id = $1 AND status = 'processing'
             RETURNING id, order_number, org_id, attraction_id, customer_email, items,
                 subtotal, platform_fee, total, status, payment_session_id,
                 payment_reference_id, cancel_reason, created_at, updated_at",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = flipped {
            let order = order_from_row(row)?;
            insert_tickets(&mut tx, &tickets).await?;
            let tickets = tickets_in_tx(&mut tx, order_id).await?;
            tx.commit().await?;
            return Ok(CompletionOutcome::Completed { order, tickets });
        }

        let row: Option<OrderRow> = sqlx::query_as(&format!("{SELECT_ORDER} WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        let current =
            order_from_row(row.ok_or_else(|| {
                StoreError::Database(format!("no order {order_id}"))
            })?)?;

        if current.status == OrderStatus::Completed {
            // Losing the race (or retrying after a crash between flip and
            // insert): backfill vacant ticket slots only.
            insert_tickets(&mut tx, &tickets).await?;
            let tickets = tickets_in_tx(&mut tx, order_id).await?;
            tx.commit().await?;
            return Ok(CompletionOutcome::AlreadyCompleted {
                order: current,
                tickets,
            });
        }

        tx.rollback().await?;
        Ok(CompletionOutcome::NotCompletable { current })
    }

    async fn record_waiver_acceptance(&self, order_id: OrderId) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO waiver_acceptances (order_id, accepted_at) VALUES ($1, NOW())
             ON CONFLICT (order_id) DO NOTHING",
        )
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TicketStore for PostgresStore {
    async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>, StoreError> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            "SELECT id, order_id, ticket_type_id, ticket_number, redemption_code, used_at
             FROM tickets WHERE order_id = $1 ORDER BY ticket_number",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ticket_from_row).collect()
    }

    async fn find_by_code(
        &self,
        attraction_id: AttractionId,
        code: &str,
    ) -> Result<Option<Ticket>, StoreError> {
        let row: Option<TicketRow> = sqlx::query_as(
            "SELECT t.id, t.order_id, t.ticket_type_id, t.ticket_number, t.redemption_code, t.used_at
             FROM tickets t JOIN orders o ON o.id = t.order_id
             WHERE t.redemption_code = $1 AND o.attraction_id = $2",
        )
        .bind(code)
        .bind(attraction_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ticket_from_row).transpose()
    }

    async fn redeem_if_unused(
        &self,
        attraction_id: AttractionId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome, StoreError> {
        // Single atomic set-if-null write; two terminals scanning within
        // milliseconds race on this statement alone.
        let row: Option<TicketRow> = sqlx::query_as(
            "UPDATE tickets t SET used_at = $3
             FROM orders o
             WHERE t.order_id = o.id
               AND o.attraction_id = $2
               AND t.redemption_code = $1
               AND t.used_at IS NULL
             RETURNING t.id, t.order_id, t.ticket_type_id, t.ticket_number,
                 t.redemption_code, t.used_at",
        )
        .bind(code)
        .bind(attraction_id.as_uuid())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(RedeemOutcome::Redeemed(ticket_from_row(row)?));
        }

        match self.find_by_code(attraction_id, code).await? {
            Some(ticket) => match ticket.used_at {
                Some(used_at) => Ok(RedeemOutcome::AlreadyUsed { used_at }),
                // Winner's commit not visible in this snapshot yet; the
                // scan time is within milliseconds of the real stamp.
                None => Ok(RedeemOutcome::AlreadyUsed { used_at: now }),
            },
            None => Ok(RedeemOutcome::NotFound),
        }
    }
}

#[async_trait]
impl DirectoryStore for PostgresStore {
    async fn resolve_storefront(
        &self,
        identifier: &str,
    ) -> Result<Option<Storefront>, StoreError> {
        let row: Option<(Uuid, Uuid, bool)> = sqlx::query_as(
            "SELECT attraction_id, org_id, requires_waiver
             FROM storefronts WHERE identifier = $1 AND active",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(attraction_id, org_id, requires_waiver)| Storefront {
            attraction_id: AttractionId::from_uuid(attraction_id),
            org_id: OrgId::from_uuid(org_id),
            requires_waiver,
            active: true,
        }))
    }

    async fn payment_account(
        &self,
        org_id: OrgId,
    ) -> Result<Option<PaymentAccount>, StoreError> {
        let row: Option<(String, bool)> = sqlx::query_as(
            "SELECT account_ref, charges_enabled FROM payment_accounts WHERE org_id = $1",
        )
        .bind(org_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(account_ref, charges_enabled)| PaymentAccount {
            account_ref,
            charges_enabled,
        }))
    }

    async fn ticket_types(
        &self,
        attraction_id: AttractionId,
    ) -> Result<Vec<TicketTypeRecord>, StoreError> {
        let rows: Vec<(Uuid, String, i64, bool)> = sqlx::query_as(
            "SELECT id, name, price, active FROM ticket_types WHERE attraction_id = $1",
        )
        .bind(attraction_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id, name, price, active)| {
                Ok(TicketTypeRecord {
                    id: TicketTypeId::from_uuid(id),
                    name,
                    price: money_from_db(price, "price")?,
                    active,
                })
            })
            .collect()
    }

    async fn org_tier(&self, org_id: OrgId) -> Result<Option<FeeTier>, StoreError> {
        let row: Option<(i32, i64)> = sqlx::query_as(
            "SELECT percent_bps, fixed_cents FROM org_fee_tiers WHERE org_id = $1",
        )
        .bind(org_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(percent_bps, fixed_cents)| {
            Ok(FeeTier {
                percent_bps: u32::try_from(percent_bps).map_err(|_| {
                    StoreError::CorruptRow(format!("negative percent_bps {percent_bps}"))
                })?,
                fixed_cents: u64::try_from(fixed_cents).map_err(|_| {
                    StoreError::CorruptRow(format!("negative fixed_cents {fixed_cents}"))
                })?,
            })
        })
        .transpose()
    }
}
