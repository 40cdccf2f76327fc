use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{Conversion, ConversionOutcome, HoldOutcome, IssuedCredential, StoreError, TicketStore};
use crate::models::{
    BuyerInfo, Order, OrderStatus, Reservation, ReservationStatus, Ticket, TicketStatus,
    TicketTypeInventory,
};

const RESERVATION_COLUMNS: &str =
    "id, session_id, ticket_type_id, quantity, status, created_at, expires_at";

const TICKET_COLUMNS: &str = "id, order_id, event_id, ticket_type_id, holder_name, holder_email, \
     ticket_number, status, checked_in, check_in_time, credential, created_at";

#[derive(FromRow)]
struct TicketTypeRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    price: Decimal,
    event_date: DateTime<Utc>,
    total_quantity: i32,
    reserved_quantity: i32,
    sold_quantity: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TicketTypeRow> for TicketTypeInventory {
    fn from(row: TicketTypeRow) -> Self {
        Self {
            id: row.id,
            event_id: row.event_id,
            name: row.name,
            price: row.price,
            event_date: row.event_date,
            total_quantity: row.total_quantity,
            reserved_quantity: row.reserved_quantity,
            sold_quantity: row.sold_quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ReservationRow {
    id: Uuid,
    session_id: String,
    ticket_type_id: Uuid,
    quantity: i32,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            session_id: row.session_id,
            ticket_type_id: row.ticket_type_id,
            quantity: row.quantity,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    session_id: String,
    reservation_id: Uuid,
    buyer_name: String,
    buyer_email: String,
    buyer_phone: Option<String>,
    invoice_number: String,
    total_amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            session_id: row.session_id,
            reservation_id: row.reservation_id,
            buyer: BuyerInfo {
                name: row.buyer_name,
                email: row.buyer_email,
                phone: row.buyer_phone,
            },
            invoice_number: row.invoice_number,
            total_amount: row.total_amount,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct TicketRow {
    id: Uuid,
    order_id: Uuid,
    event_id: Uuid,
    ticket_type_id: Uuid,
    holder_name: String,
    holder_email: Option<String>,
    ticket_number: String,
    status: String,
    checked_in: bool,
    check_in_time: Option<DateTime<Utc>>,
    credential: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            event_id: row.event_id,
            ticket_type_id: row.ticket_type_id,
            holder_name: row.holder_name,
            holder_email: row.holder_email,
            ticket_number: row.ticket_number,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            checked_in: row.checked_in,
            check_in_time: row.check_in_time,
            credential: row.credential,
            created_at: row.created_at,
        })
    }
}

/// Postgres-backed store. Counter updates are single conditional `UPDATE`
/// statements, so the row lock taken by Postgres serializes concurrent holds
/// on the same ticket type.
#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn return_units(
        tx: &mut Transaction<'_, Postgres>,
        ticket_type_id: Uuid,
        quantity: i32,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE ticket_types
             SET reserved_quantity = reserved_quantity - $2, updated_at = NOW()
             WHERE id = $1 AND reserved_quantity >= $2",
        )
        .bind(ticket_type_id)
        .bind(quantity)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::Corrupt(format!(
                "ticket type {ticket_type_id} reserved count below held quantity"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn insert_ticket_type(&self, ticket_type: &TicketTypeInventory) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO ticket_types
               (id, event_id, name, price, event_date, total_quantity,
                reserved_quantity, sold_quantity, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(ticket_type.id)
        .bind(ticket_type.event_id)
        .bind(&ticket_type.name)
        .bind(ticket_type.price)
        .bind(ticket_type.event_date)
        .bind(ticket_type.total_quantity)
        .bind(ticket_type.reserved_quantity)
        .bind(ticket_type.sold_quantity)
        .bind(ticket_type.created_at)
        .bind(ticket_type.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ticket_type(&self, id: Uuid) -> Result<Option<TicketTypeInventory>, StoreError> {
        let row: Option<TicketTypeRow> = sqlx::query_as(
            "SELECT id, event_id, name, price, event_date, total_quantity,
                    reserved_quantity, sold_quantity, created_at, updated_at
             FROM ticket_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn hold(&self, reservation: &Reservation) -> Result<HoldOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let held = sqlx::query(
            "UPDATE ticket_types
             SET reserved_quantity = reserved_quantity + $2, updated_at = NOW()
             WHERE id = $1 AND total_quantity - reserved_quantity - sold_quantity >= $2",
        )
        .bind(reservation.ticket_type_id)
        .bind(reservation.quantity)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if held == 0 {
            let available: Option<(i32,)> = sqlx::query_as(
                "SELECT total_quantity - reserved_quantity - sold_quantity
                 FROM ticket_types WHERE id = $1",
            )
            .bind(reservation.ticket_type_id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;

            return Ok(match available {
                None => HoldOutcome::TicketTypeNotFound,
                Some((available,)) => HoldOutcome::Insufficient { available },
            });
        }

        sqlx::query(
            "INSERT INTO reservations
               (id, session_id, ticket_type_id, quantity, status, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(reservation.id)
        .bind(&reservation.session_id)
        .bind(reservation.ticket_type_id)
        .bind(reservation.quantity)
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(HoldOutcome::Held)
    }

    async fn reservation(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Reservation::try_from).transpose()
    }

    async fn live_reservations(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations
             WHERE session_id = $1 AND status = 'ACTIVE' AND expires_at > $2
             ORDER BY created_at"
        ))
        .bind(session_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Reservation::try_from).collect()
    }

    async fn release(
        &self,
        id: Uuid,
        to: ReservationStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let released: Option<(Uuid, i32)> = sqlx::query_as(
            "UPDATE reservations SET status = $2, updated_at = $3
             WHERE id = $1 AND status = 'ACTIVE'
             RETURNING ticket_type_id, quantity",
        )
        .bind(id)
        .bind(to.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((ticket_type_id, quantity)) = released else {
            tx.rollback().await?;
            return Ok(false);
        };

        Self::return_units(&mut tx, ticket_type_id, quantity).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // A concurrent sweep blocks on the row lock and then re-evaluates the
        // status predicate, so each row is only expired once.
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "UPDATE reservations SET status = 'EXPIRED', updated_at = NOW()
             WHERE status = 'ACTIVE' AND expires_at <= $1
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        let expired = rows
            .into_iter()
            .map(Reservation::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        for reservation in &expired {
            Self::return_units(&mut tx, reservation.ticket_type_id, reservation.quantity).await?;
        }

        tx.commit().await?;
        Ok(expired)
    }

    async fn convert(&self, conversion: &Conversion) -> Result<ConversionOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE"
        ))
        .bind(conversion.reservation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(reservation) = row.map(Reservation::try_from).transpose()? else {
            tx.rollback().await?;
            return Ok(ConversionOutcome::ReservationNotFound);
        };
        if reservation.status != ReservationStatus::Active {
            tx.rollback().await?;
            return Ok(ConversionOutcome::NotActive(reservation.status));
        }
        if reservation.expires_at <= conversion.now {
            tx.rollback().await?;
            return Ok(ConversionOutcome::Expired);
        }
        if conversion.tickets.len() != reservation.quantity as usize {
            tx.rollback().await?;
            return Ok(ConversionOutcome::QuantityMismatch {
                expected: reservation.quantity,
            });
        }

        let order = &conversion.order;
        sqlx::query(
            "INSERT INTO orders
               (id, session_id, reservation_id, buyer_name, buyer_email, buyer_phone,
                invoice_number, total_amount, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(order.id)
        .bind(&order.session_id)
        .bind(order.reservation_id)
        .bind(&order.buyer.name)
        .bind(&order.buyer.email)
        .bind(&order.buyer.phone)
        .bind(&order.invoice_number)
        .bind(order.total_amount)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        for ticket in &conversion.tickets {
            sqlx::query(
                "INSERT INTO tickets
                   (id, order_id, event_id, ticket_type_id, holder_name, holder_email,
                    ticket_number, status, checked_in, check_in_time, credential, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(ticket.id)
            .bind(ticket.order_id)
            .bind(ticket.event_id)
            .bind(ticket.ticket_type_id)
            .bind(&ticket.holder_name)
            .bind(&ticket.holder_email)
            .bind(&ticket.ticket_number)
            .bind(ticket.status.as_str())
            .bind(ticket.checked_in)
            .bind(ticket.check_in_time)
            .bind(&ticket.credential)
            .bind(ticket.created_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE reservations SET status = 'CONVERTED', updated_at = NOW() WHERE id = $1")
            .bind(reservation.id)
            .execute(&mut *tx)
            .await?;

        let moved = sqlx::query(
            "UPDATE ticket_types
             SET reserved_quantity = reserved_quantity - $2,
                 sold_quantity = sold_quantity + $2,
                 updated_at = NOW()
             WHERE id = $1 AND reserved_quantity >= $2",
        )
        .bind(reservation.ticket_type_id)
        .bind(reservation.quantity)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if moved == 0 {
            tx.rollback().await?;
            return Err(StoreError::Corrupt(format!(
                "ticket type {} reserved count below held quantity",
                reservation.ticket_type_id
            )));
        }

        tx.commit().await?;
        Ok(ConversionOutcome::Converted)
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT id, session_id, reservation_id, buyer_name, buyer_email, buyer_phone,
                    invoice_number, total_amount, status, created_at
             FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError> {
        let updated = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    async fn tickets_for_order(&self, order_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE order_id = $1 ORDER BY created_at, ticket_number"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let row: Option<TicketRow> =
            sqlx::query_as(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Ticket::try_from).transpose()
    }

    async fn transition_order_tickets(
        &self,
        order_id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<u64, StoreError> {
        let updated = sqlx::query(
            "UPDATE tickets SET status = $3, updated_at = NOW() WHERE order_id = $1 AND status = $2",
        )
        .bind(order_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }

    async fn fulfil(&self, order_id: Uuid, credentials: &[IssuedCredential]) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let paid = sqlx::query(
            "UPDATE orders SET status = 'PAID', updated_at = NOW()
             WHERE id = $1 AND status = 'PENDING_PAYMENT'",
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if paid == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for issued in credentials {
            let updated = sqlx::query(
                "UPDATE tickets SET credential = $3, updated_at = NOW()
                 WHERE id = $1 AND order_id = $2",
            )
            .bind(issued.ticket_id)
            .bind(order_id)
            .bind(&issued.credential)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated == 0 {
                tx.rollback().await?;
                return Err(StoreError::Conflict(format!(
                    "ticket {} is not part of order {order_id}",
                    issued.ticket_id
                )));
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn check_in(&self, ticket_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let updated = sqlx::query(
            "UPDATE tickets
             SET status = 'USED', checked_in = TRUE, check_in_time = $2, updated_at = NOW()
             WHERE id = $1 AND status = 'ACTIVE'",
        )
        .bind(ticket_id)
        .bind(at)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }
}
