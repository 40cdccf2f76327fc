use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Active,
    Used,
    Cancelled,
    Expired,
    Refunded,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Active => "ACTIVE",
            TicketStatus::Used => "USED",
            TicketStatus::Cancelled => "CANCELLED",
            TicketStatus::Expired => "EXPIRED",
            TicketStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(TicketStatus::Active),
            "USED" => Ok(TicketStatus::Used),
            "CANCELLED" => Ok(TicketStatus::Cancelled),
            "EXPIRED" => Ok(TicketStatus::Expired),
            "REFUNDED" => Ok(TicketStatus::Refunded),
            other => Err(format!("unknown ticket status '{other}'")),
        }
    }
}

/// One individually scannable ticket. Rows are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub order_id: Uuid,
    pub event_id: Uuid,
    pub ticket_type_id: Uuid,
    pub holder_name: String,
    pub holder_email: Option<String>,
    pub ticket_number: String,
    pub status: TicketStatus,
    pub checked_in: bool,
    pub check_in_time: Option<DateTime<Utc>>,
    /// Encrypted credential, set once the order is paid.
    #[serde(skip_serializing)]
    pub credential: Option<String>,
    pub created_at: DateTime<Utc>,
}
