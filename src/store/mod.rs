//! Persistence for inventory, reservations, orders and tickets.
//!
//! Every method that touches inventory counters is atomic with respect to
//! other calls for the same ticket type. Implementations serialize the
//! availability check and the counter update (row lock in Postgres, a single
//! lock in memory), so concurrent callers cannot oversell.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Order, OrderStatus, Reservation, ReservationStatus, Ticket, TicketStatus, TicketTypeInventory,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryTicketStore;
pub use postgres::PgTicketStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result of an atomic check-and-hold on one ticket type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldOutcome {
    Held,
    TicketTypeNotFound,
    Insufficient { available: i32 },
}

/// Everything written when a reservation becomes an order.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub reservation_id: Uuid,
    pub order: Order,
    pub tickets: Vec<Ticket>,
    pub now: DateTime<Utc>,
}

/// Encrypted credential assigned to one ticket at payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub ticket_id: Uuid,
    pub credential: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted,
    ReservationNotFound,
    NotActive(ReservationStatus),
    Expired,
    QuantityMismatch { expected: i32 },
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert_ticket_type(&self, ticket_type: &TicketTypeInventory) -> Result<(), StoreError>;

    async fn ticket_type(&self, id: Uuid) -> Result<Option<TicketTypeInventory>, StoreError>;

    /// Holds `reservation.quantity` units and records the reservation, but only
    /// if that many units are still available. Nothing is written otherwise.
    async fn hold(&self, reservation: &Reservation) -> Result<HoldOutcome, StoreError>;

    async fn reservation(&self, id: Uuid) -> Result<Option<Reservation>, StoreError>;

    /// ACTIVE reservations of a session whose TTL has not elapsed at `now`.
    async fn live_reservations(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Moves an ACTIVE reservation to `to` and returns its units to the pool.
    /// Returns `false` without side effects if the reservation is missing or
    /// already terminal.
    async fn release(
        &self,
        id: Uuid,
        to: ReservationStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Expires every ACTIVE reservation with `expires_at <= now`, returning
    /// the ones this call transitioned.
    async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, StoreError>;

    /// Inserts the order and tickets, marks the reservation CONVERTED and moves
    /// its units from reserved to sold, all or nothing.
    async fn convert(&self, conversion: &Conversion) -> Result<ConversionOutcome, StoreError>;

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Compare-and-set on order status.
    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError>;

    async fn tickets_for_order(&self, order_id: Uuid) -> Result<Vec<Ticket>, StoreError>;

    async fn ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;

    /// Moves every ticket of the order that is in `from` to `to`.
    async fn transition_order_tickets(
        &self,
        order_id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<u64, StoreError>;

    /// PENDING_PAYMENT to PAID together with the credential of each ticket,
    /// all or nothing. Returns `false` without side effects if the order was
    /// not pending. Every credential must name a ticket of the order.
    async fn fulfil(&self, order_id: Uuid, credentials: &[IssuedCredential]) -> Result<bool, StoreError>;

    /// ACTIVE to USED with the check-in time. Returns `false` if the ticket
    /// was not ACTIVE.
    async fn check_in(&self, ticket_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
}
