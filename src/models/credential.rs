use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of the hex checksum carried inside a credential.
pub const CHECKSUM_LEN: usize = 16;

/// Plaintext content of a ticket credential. Only ever leaves the process
/// encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub ticket_id: String,
    pub event_id: String,
    pub user_id: String,
    pub transaction_id: String,
    pub ticket_type_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub checksum: String,
}

impl CredentialRecord {
    /// Checksum recomputed from the canonical fields of this record.
    pub fn expected_checksum(&self) -> String {
        checksum(
            &self.ticket_id,
            &self.event_id,
            &self.user_id,
            &self.transaction_id,
            &self.ticket_type_id,
            self.issued_at,
        )
    }

    pub fn checksum_matches(&self) -> bool {
        self.checksum == self.expected_checksum()
    }
}

/// First 16 hex chars of SHA-256 over
/// `ticketId:eventId:userId:transactionId:ticketTypeId:issuedAt`.
pub fn checksum(
    ticket_id: &str,
    event_id: &str,
    user_id: &str,
    transaction_id: &str,
    ticket_type_id: &str,
    issued_at: DateTime<Utc>,
) -> String {
    let canonical = [
        ticket_id,
        event_id,
        user_id,
        transaction_id,
        ticket_type_id,
        &issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    ]
    .join(":");

    let digest = Sha256::digest(canonical.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(CHECKSUM_LEN);
    encoded
}

/// Reason category shown to a scanning operator. Carries no crypto detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Expired,
    AlreadyUsed,
    NotActive,
    Invalid,
}

/// Outcome of validating a credential record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
}

/// Outcome of a door scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
}

impl ScanOutcome {
    pub fn accepted(ticket_id: impl Into<String>) -> Self {
        Self {
            valid: true,
            ticket_id: Some(ticket_id.into()),
            reason: None,
        }
    }

    pub fn rejected(ticket_id: Option<String>, reason: RejectionReason) -> Self {
        Self {
            valid: false,
            ticket_id,
            reason: Some(reason),
        }
    }
}
