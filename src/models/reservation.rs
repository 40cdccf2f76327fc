use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    Expired,
    Converted,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Expired => "EXPIRED",
            ReservationStatus::Converted => "CONVERTED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(ReservationStatus::Active),
            "EXPIRED" => Ok(ReservationStatus::Expired),
            "CONVERTED" => Ok(ReservationStatus::Converted),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            other => Err(format!("unknown reservation status '{other}'")),
        }
    }
}

/// A time-boxed hold on `quantity` units of one ticket type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Uuid,
    pub session_id: String,
    pub ticket_type_id: Uuid,
    pub quantity: i32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(
        session_id: impl Into<String>,
        ticket_type_id: Uuid,
        quantity: i32,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            ticket_type_id,
            quantity,
            status: ReservationStatus::Active,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Status as observed at `now`. A stored ACTIVE row whose TTL has elapsed
    /// reads as EXPIRED even before the sweep has touched it.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ReservationStatus {
        match self.status {
            ReservationStatus::Active if now >= self.expires_at => ReservationStatus::Expired,
            status => status,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == ReservationStatus::Active
    }
}

/// One line item of a reservation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    pub ticket_type_id: Uuid,
    pub quantity: i32,
}

/// Why a single line item could not be held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationFailure {
    #[serde(rename_all = "camelCase")]
    InsufficientAvailability { requested: i32, available: i32 },
    TicketTypeNotFound,
    InvalidQuantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedReservation {
    pub ticket_type_id: Uuid,
    pub reason: ReservationFailure,
}

/// Per-item outcome of a reservation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationBatch {
    pub successful: Vec<Reservation>,
    pub failed: Vec<FailedReservation>,
}
