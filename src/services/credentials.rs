//! Minting and verification of ticket credentials.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use super::cipher::CredentialCipher;
use super::clock::Clock;
use super::qr::{self, QrRenderOptions};
use crate::models::credential::checksum;
use crate::models::{CredentialRecord, CredentialVerdict, RejectionReason};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential is malformed")]
    MalformedCredential,

    #[error("credential could not be decrypted")]
    DecryptionFailed,

    #[error("credential checksum mismatch")]
    ChecksumMismatch,

    #[error("credential has expired")]
    Expired,

    #[error("credential image could not be rendered: {0}")]
    Render(String),

    #[error("credential serialization failed")]
    Serialization(#[from] serde_json::Error),
}

impl CredentialError {
    /// Category shown to scanning staff.
    pub fn rejection_reason(&self) -> RejectionReason {
        match self {
            CredentialError::Expired => RejectionReason::Expired,
            _ => RejectionReason::Invalid,
        }
    }
}

/// Identifiers bound into a credential.
#[derive(Debug, Clone, Copy)]
pub struct CredentialSubject<'a> {
    pub ticket_id: &'a str,
    pub event_id: &'a str,
    pub user_id: &'a str,
    pub transaction_id: &'a str,
    pub ticket_type_id: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct CredentialPolicy {
    /// Validity after the event starts.
    pub post_event_validity: Duration,
    /// Validity counted from issuance, whatever the event date.
    pub minimum_validity: Duration,
    /// Accepted clock skew past `expires_at`.
    pub grace: Duration,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            post_event_validity: Duration::hours(24),
            minimum_validity: Duration::days(7),
            grace: Duration::hours(1),
        }
    }
}

pub struct CredentialService {
    cipher: CredentialCipher,
    policy: CredentialPolicy,
    clock: Arc<dyn Clock>,
}

impl CredentialService {
    pub fn new(cipher: CredentialCipher, policy: CredentialPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            cipher,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> CredentialPolicy {
        self.policy
    }

    /// Builds the plaintext record. `expires_at` is the later of one day
    /// past the event and one week past issuance.
    pub fn mint(&self, subject: CredentialSubject<'_>, event_date: DateTime<Utc>) -> CredentialRecord {
        let issued_at = self.clock.now().trunc_subsecs(3);
        let expires_at = (event_date + self.policy.post_event_validity)
            .max(issued_at + self.policy.minimum_validity);

        CredentialRecord {
            ticket_id: subject.ticket_id.to_string(),
            event_id: subject.event_id.to_string(),
            user_id: subject.user_id.to_string(),
            transaction_id: subject.transaction_id.to_string(),
            ticket_type_id: subject.ticket_type_id.to_string(),
            issued_at,
            expires_at,
            checksum: checksum(
                subject.ticket_id,
                subject.event_id,
                subject.user_id,
                subject.transaction_id,
                subject.ticket_type_id,
                issued_at,
            ),
        }
    }

    pub fn encrypt(&self, record: &CredentialRecord) -> Result<String, CredentialError> {
        let plaintext = serde_json::to_vec(record)?;
        Ok(self.cipher.seal(&plaintext))
    }

    pub fn decrypt(&self, payload: &str) -> Result<CredentialRecord, CredentialError> {
        let (record, scheme) = self
            .cipher
            .open(payload, |bytes| serde_json::from_slice::<CredentialRecord>(bytes).ok())
            .inspect_err(|e| warn!(error = %e, "Credential rejected before validation"))?;

        if scheme != super::cipher::CipherScheme::Versioned {
            tracing::debug!(ticket_id = %record.ticket_id, ?scheme, "Opened legacy credential");
        }
        Ok(record)
    }

    /// Checks integrity and expiry of an already decrypted record.
    pub fn validate(&self, record: &CredentialRecord) -> Result<(), CredentialError> {
        if !record.checksum_matches() {
            warn!(ticket_id = %record.ticket_id, "Credential checksum mismatch");
            return Err(CredentialError::ChecksumMismatch);
        }
        if self.clock.now() - record.expires_at > self.policy.grace {
            return Err(CredentialError::Expired);
        }
        Ok(())
    }

    pub fn verdict(&self, record: &CredentialRecord) -> CredentialVerdict {
        match self.validate(record) {
            Ok(()) => CredentialVerdict {
                valid: true,
                reason: None,
            },
            Err(e) => CredentialVerdict {
                valid: false,
                reason: Some(e.rejection_reason()),
            },
        }
    }

    /// Decrypts and validates in one step.
    pub fn verify(&self, payload: &str) -> Result<CredentialRecord, CredentialError> {
        let record = self.decrypt(payload)?;
        self.validate(&record)?;
        Ok(record)
    }

    pub fn render_image(
        &self,
        record: &CredentialRecord,
        options: &QrRenderOptions,
    ) -> Result<image::GrayImage, CredentialError> {
        qr::render(&self.encrypt(record)?, options)
    }
}
