//! Fulfilment of paid orders: credentials, ticket PDFs and hand-off to
//! delivery.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use super::credentials::{CredentialError, CredentialService, CredentialSubject};
use super::pdf::{render_ticket, TicketSheet};
use super::qr::{self, QrRenderOptions};
use crate::models::{Order, OrderStatus, Ticket, TicketStatus, TicketTypeInventory};
use crate::store::{IssuedCredential, StoreError, TicketStore};

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("order is already {0}")]
    OrderAlreadyFinal(OrderStatus),

    #[error("ticket type {0} not found")]
    TicketTypeNotFound(Uuid),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One deliverable ticket.
#[derive(Debug, Clone)]
pub struct TicketDocument {
    pub ticket_id: Uuid,
    pub ticket_number: String,
    pub holder_name: String,
    pub holder_email: Option<String>,
    pub credential: String,
    pub pdf: Vec<u8>,
}

#[derive(Debug, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Sends ticket documents to the buyer, e.g. by email.
#[async_trait]
pub trait TicketDelivery: Send + Sync {
    async fn deliver(&self, order: &Order, documents: &[TicketDocument]) -> Result<(), DeliveryError>;
}

/// Delivery that only records the hand-off in the log.
#[derive(Debug, Default)]
pub struct LogDelivery;

#[async_trait]
impl TicketDelivery for LogDelivery {
    async fn deliver(&self, order: &Order, documents: &[TicketDocument]) -> Result<(), DeliveryError> {
        info!(
            order_id = %order.id,
            invoice = %order.invoice_number,
            tickets = documents.len(),
            "Tickets ready for delivery"
        );
        Ok(())
    }
}

/// Paid order with its issued tickets.
#[derive(Debug, Clone)]
pub struct Fulfilment {
    pub order: Order,
    pub tickets: Vec<Ticket>,
    pub documents: Vec<TicketDocument>,
    pub delivered: bool,
}

pub struct OrderService {
    store: Arc<dyn TicketStore>,
    credentials: Arc<CredentialService>,
    delivery: Arc<dyn TicketDelivery>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        credentials: Arc<CredentialService>,
        delivery: Arc<dyn TicketDelivery>,
    ) -> Self {
        Self {
            store,
            credentials,
            delivery,
        }
    }

    /// PENDING_PAYMENT to PAID with one credential and PDF per ticket. Every
    /// document is built before anything is written, and the status change
    /// and credentials are stored together, so a failure leaves the order
    /// pending and retryable. A delivery failure is logged and reported in
    /// `delivered`; the payment stands.
    pub async fn mark_paid(&self, order_id: Uuid) -> Result<Fulfilment, OrderError> {
        let mut order = self.pending_order(order_id).await?;
        let mut tickets = self.store.tickets_for_order(order_id).await?;

        let documents = match tickets.first().map(|t| t.ticket_type_id) {
            Some(ticket_type_id) => {
                let ticket_type = self
                    .store
                    .ticket_type(ticket_type_id)
                    .await?
                    .ok_or(OrderError::TicketTypeNotFound(ticket_type_id))?;
                tickets
                    .iter()
                    .map(|ticket| self.issue(&order, ticket, &ticket_type))
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => Vec::new(),
        };

        let credentials: Vec<IssuedCredential> = documents
            .iter()
            .map(|document| IssuedCredential {
                ticket_id: document.ticket_id,
                credential: document.credential.clone(),
            })
            .collect();
        if !self.store.fulfil(order_id, &credentials).await? {
            return Err(self.final_status(order_id).await);
        }
        order.status = OrderStatus::Paid;
        for (ticket, document) in tickets.iter_mut().zip(&documents) {
            ticket.credential = Some(document.credential.clone());
        }
        info!(order_id = %order_id, tickets = tickets.len(), "Order paid");

        let delivered = match self.delivery.deliver(&order, &documents).await {
            Ok(()) => true,
            Err(e) => {
                error!(order_id = %order_id, error = %e, "Ticket delivery failed");
                false
            }
        };

        Ok(Fulfilment {
            order,
            tickets,
            documents,
            delivered,
        })
    }

    /// PENDING_PAYMENT to FAILED. Tickets are cancelled; sold inventory is
    /// not returned.
    pub async fn mark_failed(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.abandon(order_id, OrderStatus::Failed).await
    }

    pub async fn cancel(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.abandon(order_id, OrderStatus::Cancelled).await
    }

    async fn abandon(&self, order_id: Uuid, to: OrderStatus) -> Result<Order, OrderError> {
        let mut order = self.pending_order(order_id).await?;
        if !self
            .store
            .transition_order(order_id, OrderStatus::PendingPayment, to)
            .await?
        {
            return Err(self.final_status(order_id).await);
        }
        let cancelled = self
            .store
            .transition_order_tickets(order_id, TicketStatus::Active, TicketStatus::Cancelled)
            .await?;
        info!(order_id = %order_id, status = %to, tickets_cancelled = cancelled, "Order closed unpaid");

        order.status = to;
        Ok(order)
    }

    async fn pending_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;
        if order.status != OrderStatus::PendingPayment {
            return Err(OrderError::OrderAlreadyFinal(order.status));
        }
        Ok(order)
    }

    async fn final_status(&self, order_id: Uuid) -> OrderError {
        match self.store.order(order_id).await {
            Ok(Some(order)) => OrderError::OrderAlreadyFinal(order.status),
            Ok(None) => OrderError::OrderNotFound(order_id),
            Err(e) => e.into(),
        }
    }

    fn issue(
        &self,
        order: &Order,
        ticket: &Ticket,
        ticket_type: &TicketTypeInventory,
    ) -> Result<TicketDocument, OrderError> {
        let ticket_id = ticket.id.to_string();
        let event_id = ticket.event_id.to_string();
        let transaction_id = order.id.to_string();
        let ticket_type_id = ticket.ticket_type_id.to_string();

        let record = self.credentials.mint(
            CredentialSubject {
                ticket_id: &ticket_id,
                event_id: &event_id,
                user_id: &order.session_id,
                transaction_id: &transaction_id,
                ticket_type_id: &ticket_type_id,
            },
            ticket_type.event_date,
        );
        let credential = self.credentials.encrypt(&record)?;
        let image = qr::render(&credential, &QrRenderOptions::print())?;

        let event_date = ticket_type.event_date.format("%Y-%m-%d %H:%M UTC").to_string();
        let pdf = render_ticket(&TicketSheet {
            title: &ticket_type.name,
            lines: vec![
                ("Ticket".to_string(), ticket.ticket_number.clone()),
                ("Holder".to_string(), ticket.holder_name.clone()),
                ("Event date".to_string(), event_date),
                ("Invoice".to_string(), order.invoice_number.clone()),
            ],
            qr: &image,
        });

        Ok(TicketDocument {
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number.clone(),
            holder_name: ticket.holder_name.clone(),
            holder_email: ticket.holder_email.clone(),
            credential,
            pdf,
        })
    }
}
