use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::credentials::CredentialService;
use crate::models::{CredentialRecord, OrderStatus, RejectionReason, ScanOutcome, Ticket, TicketStatus};
use crate::store::{StoreError, TicketStore};

/// Door scanning. Only storage failures are errors; every credential or
/// ticket problem is a rejected [`ScanOutcome`].
pub struct CheckInService {
    store: Arc<dyn TicketStore>,
    credentials: Arc<CredentialService>,
    clock: Arc<dyn Clock>,
}

impl CheckInService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        credentials: Arc<CredentialService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            credentials,
            clock,
        }
    }

    pub async fn scan(&self, payload: &str) -> Result<ScanOutcome, StoreError> {
        let record = match self.credentials.verify(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Scan rejected");
                return Ok(ScanOutcome::rejected(None, e.rejection_reason()));
            }
        };
        let ticket_ref = Some(record.ticket_id.clone());

        let Some(ticket) = self.lookup(&record).await? else {
            warn!(ticket_id = %record.ticket_id, "Credential does not match a stored ticket");
            return Ok(ScanOutcome::rejected(ticket_ref, RejectionReason::Invalid));
        };

        match ticket.status {
            TicketStatus::Active => {}
            TicketStatus::Used => {
                info!(ticket_id = %ticket.id, "Ticket already checked in");
                return Ok(ScanOutcome::rejected(ticket_ref, RejectionReason::AlreadyUsed));
            }
            TicketStatus::Expired => {
                return Ok(ScanOutcome::rejected(ticket_ref, RejectionReason::Expired));
            }
            TicketStatus::Cancelled | TicketStatus::Refunded => {
                return Ok(ScanOutcome::rejected(ticket_ref, RejectionReason::NotActive));
            }
        }

        let paid = self
            .store
            .order(ticket.order_id)
            .await?
            .is_some_and(|order| order.status == OrderStatus::Paid);
        if !paid {
            return Ok(ScanOutcome::rejected(ticket_ref, RejectionReason::NotActive));
        }

        if !self.store.check_in(ticket.id, self.clock.now()).await? {
            return Ok(ScanOutcome::rejected(ticket_ref, RejectionReason::AlreadyUsed));
        }

        info!(ticket_id = %ticket.id, ticket_number = %ticket.ticket_number, "Ticket checked in");
        Ok(ScanOutcome::accepted(record.ticket_id))
    }

    /// The stored ticket the record refers to, if every bound id agrees.
    async fn lookup(&self, record: &CredentialRecord) -> Result<Option<Ticket>, StoreError> {
        let Ok(ticket_id) = record.ticket_id.parse::<Uuid>() else {
            return Ok(None);
        };
        let ticket = self.store.ticket(ticket_id).await?.filter(|ticket| {
            ticket.event_id.to_string() == record.event_id
                && ticket.ticket_type_id.to_string() == record.ticket_type_id
                && ticket.order_id.to_string() == record.transaction_id
        });
        Ok(ticket)
    }
}
