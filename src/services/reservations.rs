//! Time-boxed inventory holds and their conversion into orders.
//!
//! A reservation is live while `status == ACTIVE && now < expires_at`. Reads
//! always re-check the timestamp; the sweep only exists to return expired
//! units to the pool promptly.

use chrono::Duration;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::numbers::{invoice_number, ticket_number};
use crate::models::{
    BuyerInfo, FailedReservation, HolderInfo, Order, OrderStatus, Purchase, Reservation,
    ReservationBatch, ReservationFailure, ReservationRequest, ReservationStatus, Ticket,
    TicketStatus, TicketTypeInventory,
};
use crate::store::{Conversion, ConversionOutcome, HoldOutcome, StoreError, TicketStore};

/// Longest accepted session token, in bytes. The token ends up inside every
/// credential of the order, which has to fit in a QR code.
pub const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("session id must be 1 to {} bytes", MAX_SESSION_ID_LEN)]
    InvalidSession,

    #[error("reservation TTL must be between 1 and {max} minutes, got {requested}")]
    InvalidTtl { requested: i64, max: i64 },

    #[error("ticket type {0} not found")]
    TicketTypeNotFound(Uuid),

    #[error("reservation {0} not found")]
    ReservationNotFound(Uuid),

    #[error("reservation {0} belongs to another session")]
    NotOwner(Uuid),

    #[error("reservation {0} has expired")]
    ReservationExpired(Uuid),

    #[error("reservation is already {0}")]
    ReservationAlreadyTerminal(ReservationStatus),

    #[error("expected {expected} ticket holders, got {actual}")]
    HolderDataMismatch { expected: usize, actual: usize },

    #[error("invalid buyer details: {0}")]
    InvalidBuyer(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// TTL bounds applied to reservation requests.
#[derive(Debug, Clone, Copy)]
pub struct ReservationPolicy {
    pub default_ttl_minutes: i64,
    pub max_ttl_minutes: i64,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            default_ttl_minutes: 10,
            max_ttl_minutes: 30,
        }
    }
}

/// Outcome of an expiry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub units_released: i64,
}

pub struct ReservationManager {
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
    policy: ReservationPolicy,
}

impl ReservationManager {
    pub fn new(store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>, policy: ReservationPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> ReservationPolicy {
        self.policy
    }

    /// Holds each line item independently. An item that cannot be satisfied
    /// lands in `failed` without affecting its siblings; only infrastructure
    /// errors fail the whole call.
    pub async fn create_reservations(
        &self,
        session_id: &str,
        items: &[ReservationRequest],
        ttl_minutes: Option<i64>,
    ) -> Result<ReservationBatch, ReservationError> {
        validate_session(session_id)?;
        let ttl_minutes = ttl_minutes.unwrap_or(self.policy.default_ttl_minutes);
        if !(1..=self.policy.max_ttl_minutes).contains(&ttl_minutes) {
            return Err(ReservationError::InvalidTtl {
                requested: ttl_minutes,
                max: self.policy.max_ttl_minutes,
            });
        }
        let ttl = Duration::minutes(ttl_minutes);

        let mut batch = ReservationBatch::default();
        for item in items {
            if item.quantity <= 0 {
                batch.failed.push(FailedReservation {
                    ticket_type_id: item.ticket_type_id,
                    reason: ReservationFailure::InvalidQuantity,
                });
                continue;
            }

            let reservation = Reservation::new(
                session_id,
                item.ticket_type_id,
                item.quantity,
                self.clock.now(),
                ttl,
            );

            match self.store.hold(&reservation).await? {
                HoldOutcome::Held => {
                    info!(
                        session_id,
                        reservation_id = %reservation.id,
                        ticket_type_id = %reservation.ticket_type_id,
                        quantity = reservation.quantity,
                        "Reservation created"
                    );
                    batch.successful.push(reservation);
                }
                HoldOutcome::TicketTypeNotFound => {
                    debug!(session_id, ticket_type_id = %item.ticket_type_id, "Unknown ticket type");
                    batch.failed.push(FailedReservation {
                        ticket_type_id: item.ticket_type_id,
                        reason: ReservationFailure::TicketTypeNotFound,
                    });
                }
                HoldOutcome::Insufficient { available } => {
                    info!(
                        session_id,
                        ticket_type_id = %item.ticket_type_id,
                        requested = item.quantity,
                        available,
                        "Insufficient availability"
                    );
                    batch.failed.push(FailedReservation {
                        ticket_type_id: item.ticket_type_id,
                        reason: ReservationFailure::InsufficientAvailability {
                            requested: item.quantity,
                            available: available.max(0),
                        },
                    });
                }
            }
        }

        Ok(batch)
    }

    pub async fn active_reservations(&self, session_id: &str) -> Result<Vec<Reservation>, ReservationError> {
        Ok(self.store.live_reservations(session_id, self.clock.now()).await?)
    }

    /// Releases the listed reservations owned by `session_id`. Ids that are
    /// unknown, foreign or already terminal are skipped, and holds whose TTL
    /// has lapsed are recorded as expired. Returns how many holds were
    /// cancelled.
    pub async fn cancel_reservations(
        &self,
        session_id: &str,
        reservation_ids: &[Uuid],
    ) -> Result<usize, ReservationError> {
        let mut cancelled = 0;
        for &id in reservation_ids {
            match self.store.reservation(id).await? {
                Some(reservation) if reservation.session_id == session_id => {
                    let now = self.clock.now();
                    if !reservation.is_live(now) {
                        self.expire_one(id).await?;
                    } else if self.store.release(id, ReservationStatus::Cancelled, now).await? {
                        info!(session_id, reservation_id = %id, "Reservation cancelled");
                        cancelled += 1;
                    }
                }
                Some(_) => {
                    warn!(session_id, reservation_id = %id, "Cancel attempted on foreign reservation");
                }
                None => {
                    debug!(session_id, reservation_id = %id, "Cancel of unknown reservation ignored");
                }
            }
        }
        Ok(cancelled)
    }

    /// Expires every due reservation. Safe to run concurrently with itself
    /// and with request traffic.
    pub async fn expire_sweep(&self) -> Result<SweepReport, ReservationError> {
        let expired = self.store.expire_due(self.clock.now()).await?;
        let report = SweepReport {
            expired: expired.len(),
            units_released: expired.iter().map(|r| i64::from(r.quantity)).sum(),
        };
        if report.expired > 0 {
            info!(
                expired = report.expired,
                units_released = report.units_released,
                "Expired stale reservations"
            );
        }
        Ok(report)
    }

    /// Turns a live reservation into a PENDING_PAYMENT order with one ticket
    /// per held unit.
    pub async fn convert_to_order(
        &self,
        session_id: &str,
        reservation_id: Uuid,
        buyer: BuyerInfo,
        holders: Vec<HolderInfo>,
    ) -> Result<Purchase, ReservationError> {
        validate_session(session_id)?;
        let reservation = self
            .store
            .reservation(reservation_id)
            .await?
            .ok_or(ReservationError::ReservationNotFound(reservation_id))?;

        if reservation.session_id != session_id {
            return Err(ReservationError::NotOwner(reservation_id));
        }
        if reservation.status.is_terminal() {
            return Err(ReservationError::ReservationAlreadyTerminal(reservation.status));
        }

        let now = self.clock.now();
        if !reservation.is_live(now) {
            self.expire_one(reservation_id).await?;
            return Err(ReservationError::ReservationExpired(reservation_id));
        }

        let expected = reservation.quantity as usize;
        if holders.len() != expected {
            return Err(ReservationError::HolderDataMismatch {
                expected,
                actual: holders.len(),
            });
        }
        validate_buyer(&buyer)?;
        if let Some(blank) = holders.iter().position(|h| h.name.trim().is_empty()) {
            return Err(ReservationError::InvalidBuyer(format!(
                "ticket holder {} has no name",
                blank + 1
            )));
        }

        let ticket_type = self
            .store
            .ticket_type(reservation.ticket_type_id)
            .await?
            .ok_or(ReservationError::TicketTypeNotFound(reservation.ticket_type_id))?;

        let order = Order {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            reservation_id,
            buyer,
            invoice_number: invoice_number(now),
            total_amount: ticket_type.price * Decimal::from(reservation.quantity),
            status: OrderStatus::PendingPayment,
            created_at: now,
        };
        let tickets = issue_tickets(&order, &ticket_type, holders, now);

        let conversion = Conversion {
            reservation_id,
            order,
            tickets,
            now,
        };

        match self.store.convert(&conversion).await? {
            ConversionOutcome::Converted => {
                info!(
                    session_id,
                    reservation_id = %reservation_id,
                    order_id = %conversion.order.id,
                    tickets = conversion.tickets.len(),
                    "Reservation converted to order"
                );
                Ok(Purchase {
                    order: conversion.order,
                    tickets: conversion.tickets,
                })
            }
            ConversionOutcome::ReservationNotFound => {
                Err(ReservationError::ReservationNotFound(reservation_id))
            }
            ConversionOutcome::NotActive(status) => {
                Err(ReservationError::ReservationAlreadyTerminal(status))
            }
            ConversionOutcome::Expired => {
                self.expire_one(reservation_id).await?;
                Err(ReservationError::ReservationExpired(reservation_id))
            }
            ConversionOutcome::QuantityMismatch { expected } => {
                Err(ReservationError::HolderDataMismatch {
                    expected: expected as usize,
                    actual: conversion.tickets.len(),
                })
            }
        }
    }

    async fn expire_one(&self, reservation_id: Uuid) -> Result<(), ReservationError> {
        if self
            .store
            .release(reservation_id, ReservationStatus::Expired, self.clock.now())
            .await?
        {
            info!(reservation_id = %reservation_id, "Reservation expired on access");
        }
        Ok(())
    }
}

fn validate_session(session_id: &str) -> Result<(), ReservationError> {
    if session_id.trim().is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
        return Err(ReservationError::InvalidSession);
    }
    Ok(())
}

fn validate_buyer(buyer: &BuyerInfo) -> Result<(), ReservationError> {
    if buyer.name.trim().is_empty() {
        return Err(ReservationError::InvalidBuyer("name is required".to_string()));
    }
    let email = buyer.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ReservationError::InvalidBuyer(format!(
            "'{email}' is not an email address"
        ))),
    }
}

fn issue_tickets(
    order: &Order,
    ticket_type: &TicketTypeInventory,
    holders: Vec<HolderInfo>,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<Ticket> {
    holders
        .into_iter()
        .map(|holder| Ticket {
            id: Uuid::new_v4(),
            order_id: order.id,
            event_id: ticket_type.event_id,
            ticket_type_id: ticket_type.id,
            holder_name: holder.name,
            holder_email: holder.email,
            ticket_number: ticket_number(),
            status: TicketStatus::Active,
            checked_in: false,
            check_in_time: None,
            credential: None,
            created_at: now,
        })
        .collect()
}
