use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sellable capacity for one ticket category of one event.
///
/// `reserved_quantity + sold_quantity <= total_quantity` holds for every
/// value handed out by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketTypeInventory {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub event_date: DateTime<Utc>,
    pub total_quantity: i32,
    pub reserved_quantity: i32,
    pub sold_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketTypeInventory {
    pub fn new(
        event_id: Uuid,
        name: impl Into<String>,
        price: Decimal,
        event_date: DateTime<Utc>,
        total_quantity: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            name: name.into(),
            price,
            event_date,
            total_quantity,
            reserved_quantity: 0,
            sold_quantity: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn available(&self) -> i32 {
        self.total_quantity - self.reserved_quantity - self.sold_quantity
    }

    pub fn is_consistent(&self) -> bool {
        self.reserved_quantity >= 0
            && self.sold_quantity >= 0
            && self.reserved_quantity + self.sold_quantity <= self.total_quantity
    }
}

/// Request body for registering a ticket type.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicketType {
    pub event_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub event_date: DateTime<Utc>,
    pub total_quantity: i32,
}

/// Inventory as exposed over the API, with the derived availability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryView {
    #[serde(flatten)]
    pub inventory: TicketTypeInventory,
    pub available: i32,
}

impl From<TicketTypeInventory> for InventoryView {
    fn from(inventory: TicketTypeInventory) -> Self {
        let available = inventory.available();
        Self {
            inventory,
            available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_subtracts_reserved_and_sold() {
        let mut inventory =
            TicketTypeInventory::new(Uuid::new_v4(), "GA", Decimal::new(2500, 2), Utc::now(), 10, Utc::now());
        inventory.reserved_quantity = 3;
        inventory.sold_quantity = 2;

        assert_eq!(inventory.available(), 5);
        assert!(inventory.is_consistent());
    }

    #[test]
    fn test_oversold_inventory_is_inconsistent() {
        let mut inventory =
            TicketTypeInventory::new(Uuid::new_v4(), "VIP", Decimal::ONE, Utc::now(), 2, Utc::now());
        inventory.reserved_quantity = 2;
        inventory.sold_quantity = 1;

        assert!(!inventory.is_consistent());
    }
}
