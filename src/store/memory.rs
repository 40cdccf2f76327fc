use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Conversion, ConversionOutcome, HoldOutcome, IssuedCredential, StoreError, TicketStore};
use crate::models::{
    Order, OrderStatus, Reservation, ReservationStatus, Ticket, TicketStatus, TicketTypeInventory,
};

#[derive(Default)]
struct Tables {
    ticket_types: HashMap<Uuid, TicketTypeInventory>,
    reservations: HashMap<Uuid, Reservation>,
    orders: HashMap<Uuid, Order>,
    tickets: HashMap<Uuid, Ticket>,
    order_tickets: HashMap<Uuid, Vec<Uuid>>,
}

impl Tables {
    /// Fails if any ticket type holds fewer reserved units than `held` would
    /// return to it.
    fn check_units(&self, held: &HashMap<Uuid, i32>) -> Result<(), StoreError> {
        for (&ticket_type_id, &quantity) in held {
            let inventory = self
                .ticket_types
                .get(&ticket_type_id)
                .ok_or_else(|| StoreError::Corrupt(format!("ticket type {ticket_type_id} missing")))?;
            if inventory.reserved_quantity < quantity {
                return Err(StoreError::Corrupt(format!(
                    "ticket type {ticket_type_id} reserved count below held quantity"
                )));
            }
        }
        Ok(())
    }

    fn return_units(&mut self, reservation: &Reservation, now: DateTime<Utc>) -> Result<(), StoreError> {
        let inventory = self
            .ticket_types
            .get_mut(&reservation.ticket_type_id)
            .ok_or_else(|| StoreError::Corrupt(format!("reservation {} has no ticket type", reservation.id)))?;

        if inventory.reserved_quantity < reservation.quantity {
            return Err(StoreError::Corrupt(format!(
                "ticket type {} reserved count below held quantity",
                inventory.id
            )));
        }
        inventory.reserved_quantity -= reservation.quantity;
        inventory.updated_at = now;
        Ok(())
    }
}

/// Single-process store. One lock guards all tables, so every operation is
/// serializable.
#[derive(Default)]
pub struct MemoryTicketStore {
    tables: Mutex<Tables>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn insert_ticket_type(&self, ticket_type: &TicketTypeInventory) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.ticket_types.contains_key(&ticket_type.id) {
            return Err(StoreError::Conflict(format!("ticket type {} exists", ticket_type.id)));
        }
        tables.ticket_types.insert(ticket_type.id, ticket_type.clone());
        Ok(())
    }

    async fn ticket_type(&self, id: Uuid) -> Result<Option<TicketTypeInventory>, StoreError> {
        Ok(self.tables.lock().await.ticket_types.get(&id).cloned())
    }

    async fn hold(&self, reservation: &Reservation) -> Result<HoldOutcome, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(inventory) = tables.ticket_types.get_mut(&reservation.ticket_type_id) else {
            return Ok(HoldOutcome::TicketTypeNotFound);
        };

        let available = inventory.available();
        if available < reservation.quantity {
            return Ok(HoldOutcome::Insufficient { available });
        }

        inventory.reserved_quantity += reservation.quantity;
        inventory.updated_at = reservation.created_at;
        tables.reservations.insert(reservation.id, reservation.clone());
        Ok(HoldOutcome::Held)
    }

    async fn reservation(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        Ok(self.tables.lock().await.reservations.get(&id).cloned())
    }

    async fn live_reservations(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let tables = self.tables.lock().await;
        let mut live: Vec<Reservation> = tables
            .reservations
            .values()
            .filter(|r| r.session_id == session_id && r.is_live(now))
            .cloned()
            .collect();
        live.sort_by_key(|r| r.created_at);
        Ok(live)
    }

    async fn release(
        &self,
        id: Uuid,
        to: ReservationStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(reservation) = tables.reservations.get(&id).cloned() else {
            return Ok(false);
        };
        if reservation.status != ReservationStatus::Active {
            return Ok(false);
        }

        tables.return_units(&reservation, now)?;
        if let Some(stored) = tables.reservations.get_mut(&id) {
            stored.status = to;
        }
        Ok(true)
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, StoreError> {
        let mut tables = self.tables.lock().await;
        let due: Vec<Reservation> = tables
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Active && r.expires_at <= now)
            .cloned()
            .collect();

        let mut held: HashMap<Uuid, i32> = HashMap::new();
        for reservation in &due {
            *held.entry(reservation.ticket_type_id).or_default() += reservation.quantity;
        }
        tables.check_units(&held)?;

        let mut expired = Vec::with_capacity(due.len());
        for mut reservation in due {
            tables.return_units(&reservation, now)?;
            reservation.status = ReservationStatus::Expired;
            tables.reservations.insert(reservation.id, reservation.clone());
            expired.push(reservation);
        }
        Ok(expired)
    }

    async fn convert(&self, conversion: &Conversion) -> Result<ConversionOutcome, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(reservation) = tables.reservations.get(&conversion.reservation_id).cloned() else {
            return Ok(ConversionOutcome::ReservationNotFound);
        };
        if reservation.status != ReservationStatus::Active {
            return Ok(ConversionOutcome::NotActive(reservation.status));
        }
        if reservation.expires_at <= conversion.now {
            return Ok(ConversionOutcome::Expired);
        }
        if conversion.tickets.len() != reservation.quantity as usize {
            return Ok(ConversionOutcome::QuantityMismatch {
                expected: reservation.quantity,
            });
        }

        let inventory = tables
            .ticket_types
            .get_mut(&reservation.ticket_type_id)
            .ok_or_else(|| StoreError::Corrupt(format!("reservation {} has no ticket type", reservation.id)))?;
        inventory.reserved_quantity -= reservation.quantity;
        inventory.sold_quantity += reservation.quantity;
        inventory.updated_at = conversion.now;

        if let Some(stored) = tables.reservations.get_mut(&reservation.id) {
            stored.status = ReservationStatus::Converted;
        }

        let order_id = conversion.order.id;
        tables.orders.insert(order_id, conversion.order.clone());
        let ids = conversion.tickets.iter().map(|t| t.id).collect();
        tables.order_tickets.insert(order_id, ids);
        for ticket in &conversion.tickets {
            tables.tickets.insert(ticket.id, ticket.clone());
        }
        Ok(ConversionOutcome::Converted)
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }

    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.orders.get_mut(&id) {
            Some(order) if order.status == from => {
                order.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn tickets_for_order(&self, order_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let tables = self.tables.lock().await;
        let tickets: Vec<Ticket> = tables
            .order_tickets
            .get(&order_id)
            .map(|ids| ids.iter().filter_map(|id| tables.tickets.get(id).cloned()).collect())
            .unwrap_or_default();
        Ok(tickets)
    }

    async fn ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        Ok(self.tables.lock().await.tickets.get(&id).cloned())
    }

    async fn transition_order_tickets(
        &self,
        order_id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let ids = tables.order_tickets.get(&order_id).cloned().unwrap_or_default();
        let mut changed = 0;
        for id in ids {
            if let Some(ticket) = tables.tickets.get_mut(&id) {
                if ticket.status == from {
                    ticket.status = to;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn fulfil(&self, order_id: Uuid, credentials: &[IssuedCredential]) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.orders.get(&order_id) {
            Some(order) if order.status == OrderStatus::PendingPayment => {}
            _ => return Ok(false),
        }
        for issued in credentials {
            let belongs = tables
                .tickets
                .get(&issued.ticket_id)
                .is_some_and(|ticket| ticket.order_id == order_id);
            if !belongs {
                return Err(StoreError::Conflict(format!(
                    "ticket {} is not part of order {order_id}",
                    issued.ticket_id
                )));
            }
        }

        for issued in credentials {
            if let Some(ticket) = tables.tickets.get_mut(&issued.ticket_id) {
                ticket.credential = Some(issued.credential.clone());
            }
        }
        if let Some(order) = tables.orders.get_mut(&order_id) {
            order.status = OrderStatus::Paid;
        }
        Ok(true)
    }

    async fn check_in(&self, ticket_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.tickets.get_mut(&ticket_id) {
            Some(ticket) if ticket.status == TicketStatus::Active => {
                ticket.status = TicketStatus::Used;
                ticket.checked_in = true;
                ticket.check_in_time = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;

    async fn store_with_capacity(total: i32) -> (MemoryTicketStore, Uuid) {
        let store = MemoryTicketStore::new();
        let inventory =
            TicketTypeInventory::new(Uuid::new_v4(), "GA", Decimal::new(1000, 2), Utc::now(), total, Utc::now());
        let id = inventory.id;
        store.insert_ticket_type(&inventory).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_hold_refuses_more_than_available() {
        let (store, ticket_type_id) = store_with_capacity(2).await;
        let now = Utc::now();

        let first = Reservation::new("a", ticket_type_id, 2, now, Duration::minutes(10));
        let second = Reservation::new("b", ticket_type_id, 1, now, Duration::minutes(10));

        assert_eq!(store.hold(&first).await.unwrap(), HoldOutcome::Held);
        assert_eq!(
            store.hold(&second).await.unwrap(),
            HoldOutcome::Insufficient { available: 0 }
        );
        assert!(store.reservation(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_only_once() {
        let (store, ticket_type_id) = store_with_capacity(3).await;
        let reservation = Reservation::new("a", ticket_type_id, 2, Utc::now(), Duration::minutes(10));
        store.hold(&reservation).await.unwrap();

        let released_at = Utc::now() + Duration::minutes(3);
        assert!(store
            .release(reservation.id, ReservationStatus::Cancelled, released_at)
            .await
            .unwrap());
        assert!(!store
            .release(reservation.id, ReservationStatus::Cancelled, released_at)
            .await
            .unwrap());

        let inventory = store.ticket_type(ticket_type_id).await.unwrap().unwrap();
        assert_eq!(inventory.reserved_quantity, 0);
        assert_eq!(inventory.updated_at, released_at);
    }

    #[tokio::test]
    async fn test_expire_due_leaves_everything_untouched_on_corrupt_counter() {
        let (store, ticket_type_id) = store_with_capacity(5).await;
        let now = Utc::now();
        let first = Reservation::new("a", ticket_type_id, 2, now, Duration::minutes(10));
        let second = Reservation::new("b", ticket_type_id, 2, now, Duration::minutes(10));
        store.hold(&first).await.unwrap();
        store.hold(&second).await.unwrap();

        store
            .tables
            .lock()
            .await
            .ticket_types
            .get_mut(&ticket_type_id)
            .unwrap()
            .reserved_quantity = 3;

        let result = store.expire_due(now + Duration::minutes(11)).await;
        assert!(matches!(result, Err(StoreError::Corrupt(_))));

        for id in [first.id, second.id] {
            let reservation = store.reservation(id).await.unwrap().unwrap();
            assert_eq!(reservation.status, ReservationStatus::Active);
        }
        let inventory = store.ticket_type(ticket_type_id).await.unwrap().unwrap();
        assert_eq!(inventory.reserved_quantity, 3);
    }

    #[tokio::test]
    async fn test_hold_on_unknown_ticket_type() {
        let store = MemoryTicketStore::new();
        let reservation = Reservation::new("a", Uuid::new_v4(), 1, Utc::now(), Duration::minutes(10));

        assert_eq!(
            store.hold(&reservation).await.unwrap(),
            HoldOutcome::TicketTypeNotFound
        );
    }
}
