//! Reservation holds, expiry and conversion against the in-memory store.

use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::Arc;
use ticket_core::models::{
    BuyerInfo, HolderInfo, OrderStatus, ReservationBatch, ReservationFailure, ReservationRequest, ReservationStatus,
    TicketStatus, TicketTypeInventory,
};
use ticket_core::services::{Clock, ManualClock, ReservationError, ReservationManager, ReservationPolicy};
use ticket_core::store::{MemoryTicketStore, TicketStore};
use uuid::Uuid;

struct Fixture {
    store: Arc<MemoryTicketStore>,
    clock: Arc<ManualClock>,
    manager: ReservationManager,
}

impl Fixture {
    fn new() -> Self {
        let store = Arc::new(MemoryTicketStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 5, 1, 18, 0, 0).unwrap(),
        ));
        let manager = ReservationManager::new(store.clone(), clock.clone(), ReservationPolicy::default());
        Self {
            store,
            clock,
            manager,
        }
    }

    async fn ticket_type(&self, total: i32) -> Uuid {
        let inventory = TicketTypeInventory::new(
            Uuid::new_v4(),
            "General Admission",
            Decimal::new(4500, 2),
            Utc.with_ymd_and_hms(2025, 7, 4, 20, 0, 0).unwrap(),
            total,
            self.clock.now(),
        );
        let id = inventory.id;
        self.store.insert_ticket_type(&inventory).await.unwrap();
        id
    }

    async fn inventory(&self, id: Uuid) -> TicketTypeInventory {
        self.store.ticket_type(id).await.unwrap().unwrap()
    }

    async fn reserve(&self, session: &str, ticket_type_id: Uuid, quantity: i32) -> ReservationBatch {
        self.manager
            .create_reservations(
                session,
                &[ReservationRequest {
                    ticket_type_id,
                    quantity,
                }],
                Some(10),
            )
            .await
            .unwrap()
    }
}

fn buyer() -> BuyerInfo {
    BuyerInfo {
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: None,
    }
}

fn holders(n: usize) -> Vec<HolderInfo> {
    (0..n)
        .map(|i| HolderInfo {
            name: format!("Holder {}", i + 1),
            email: None,
        })
        .collect()
}

#[tokio::test]
async fn test_reserve_cancel_reserve_scenario() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(5).await;

    let a = fx.reserve("session-a", ticket_type, 3).await;
    assert_eq!(a.successful.len(), 1);
    assert_eq!(fx.inventory(ticket_type).await.reserved_quantity, 3);

    let b = fx.reserve("session-b", ticket_type, 3).await;
    assert!(b.successful.is_empty());
    assert_eq!(
        b.failed[0].reason,
        ReservationFailure::InsufficientAvailability {
            requested: 3,
            available: 2
        }
    );

    let cancelled = fx
        .manager
        .cancel_reservations("session-a", &[a.successful[0].id])
        .await
        .unwrap();
    assert_eq!(cancelled, 1);
    assert_eq!(fx.inventory(ticket_type).await.reserved_quantity, 0);

    let retry = fx.reserve("session-b", ticket_type, 3).await;
    assert_eq!(retry.successful.len(), 1);
    assert_eq!(fx.inventory(ticket_type).await.reserved_quantity, 3);
}

#[tokio::test]
async fn test_line_items_are_independent() {
    let fx = Fixture::new();
    let small = fx.ticket_type(1).await;
    let large = fx.ticket_type(10).await;
    let unknown = Uuid::new_v4();

    let batch = fx
        .manager
        .create_reservations(
            "session-a",
            &[
                ReservationRequest { ticket_type_id: small, quantity: 2 },
                ReservationRequest { ticket_type_id: large, quantity: 4 },
                ReservationRequest { ticket_type_id: unknown, quantity: 1 },
                ReservationRequest { ticket_type_id: large, quantity: 0 },
            ],
            None,
        )
        .await
        .unwrap();

    assert_eq!(batch.successful.len(), 1);
    assert_eq!(batch.successful[0].ticket_type_id, large);
    assert_eq!(batch.failed.len(), 3);
    assert_eq!(batch.failed[1].reason, ReservationFailure::TicketTypeNotFound);
    assert_eq!(batch.failed[2].reason, ReservationFailure::InvalidQuantity);
    assert_eq!(fx.inventory(small).await.reserved_quantity, 0);
}

#[tokio::test]
async fn test_ttl_outside_policy_is_rejected() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(5).await;
    let items = [ReservationRequest { ticket_type_id: ticket_type, quantity: 1 }];

    for ttl in [0, 31] {
        let result = fx.manager.create_reservations("session-a", &items, Some(ttl)).await;
        assert!(matches!(result, Err(ReservationError::InvalidTtl { .. })));
    }
    let blank = fx.manager.create_reservations("  ", &items, None).await;
    assert!(matches!(blank, Err(ReservationError::InvalidSession)));
    let oversized = fx
        .manager
        .create_reservations(&"s".repeat(600), &items, None)
        .await;
    assert!(matches!(oversized, Err(ReservationError::InvalidSession)));
    assert_eq!(fx.inventory(ticket_type).await.reserved_quantity, 0);
}

#[tokio::test]
async fn test_convert_rejects_oversized_session_id() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(5).await;
    let reservation = fx.reserve("session-a", ticket_type, 1).await.successful[0].clone();

    let result = fx
        .manager
        .convert_to_order(&"s".repeat(600), reservation.id, buyer(), holders(1))
        .await;
    assert!(matches!(result, Err(ReservationError::InvalidSession)));
    assert_eq!(fx.inventory(ticket_type).await.sold_quantity, 0);
}

#[tokio::test]
async fn test_cancel_after_ttl_records_expiry() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(5).await;
    let reservation = fx.reserve("session-a", ticket_type, 2).await.successful[0].clone();

    fx.clock.advance(Duration::minutes(10));
    let cancelled = fx
        .manager
        .cancel_reservations("session-a", &[reservation.id])
        .await
        .unwrap();

    assert_eq!(cancelled, 0);
    let stored = fx.store.reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Expired);
    let inventory = fx.inventory(ticket_type).await;
    assert_eq!(inventory.reserved_quantity, 0);
    assert_eq!(inventory.updated_at, fx.clock.now());
}

#[tokio::test]
async fn test_active_reservations_hide_lapsed_holds_before_sweep() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(5).await;
    fx.reserve("session-a", ticket_type, 1).await;

    assert_eq!(fx.manager.active_reservations("session-a").await.unwrap().len(), 1);
    assert!(fx.manager.active_reservations("session-b").await.unwrap().is_empty());

    fx.clock.advance(Duration::minutes(10));
    assert!(fx.manager.active_reservations("session-a").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sweep_is_idempotent() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(6).await;
    fx.reserve("session-a", ticket_type, 2).await;
    fx.clock.advance(Duration::minutes(5));
    fx.reserve("session-b", ticket_type, 3).await;
    fx.clock.advance(Duration::minutes(6));

    let first = fx.manager.expire_sweep().await.unwrap();
    assert_eq!(first.expired, 1);
    assert_eq!(first.units_released, 2);
    let after_first = fx.inventory(ticket_type).await;

    let second = fx.manager.expire_sweep().await.unwrap();
    assert_eq!(second.expired, 0);
    assert_eq!(fx.inventory(ticket_type).await, after_first);
    assert_eq!(after_first.reserved_quantity, 3);
}

#[tokio::test]
async fn test_concurrent_sweeps_release_once() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(10).await;
    for i in 0..5 {
        fx.reserve(&format!("session-{i}"), ticket_type, 2).await;
    }
    fx.clock.advance(Duration::minutes(15));

    let (a, b) = tokio::join!(fx.manager.expire_sweep(), fx.manager.expire_sweep());
    assert_eq!(a.unwrap().expired + b.unwrap().expired, 5);
    assert_eq!(fx.inventory(ticket_type).await.reserved_quantity, 0);
}

#[tokio::test]
async fn test_terminal_reservations_stay_terminal() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(10).await;

    let cancelled = fx.reserve("session-a", ticket_type, 1).await.successful[0].clone();
    fx.manager.cancel_reservations("session-a", &[cancelled.id]).await.unwrap();

    let converted = fx.reserve("session-a", ticket_type, 1).await.successful[0].clone();
    fx.manager
        .convert_to_order("session-a", converted.id, buyer(), holders(1))
        .await
        .unwrap();

    let expired = fx.reserve("session-a", ticket_type, 1).await.successful[0].clone();
    fx.clock.advance(Duration::minutes(11));
    fx.manager.expire_sweep().await.unwrap();

    let before = fx.inventory(ticket_type).await;
    for (id, status) in [
        (cancelled.id, ReservationStatus::Cancelled),
        (converted.id, ReservationStatus::Converted),
        (expired.id, ReservationStatus::Expired),
    ] {
        assert_eq!(
            fx.manager.cancel_reservations("session-a", &[id]).await.unwrap(),
            0
        );
        let result = fx
            .manager
            .convert_to_order("session-a", id, buyer(), holders(1))
            .await;
        assert!(matches!(
            result,
            Err(ReservationError::ReservationAlreadyTerminal(s)) if s == status
        ));
        fx.manager.expire_sweep().await.unwrap();
        assert_eq!(fx.store.reservation(id).await.unwrap().unwrap().status, status);
    }
    assert_eq!(fx.inventory(ticket_type).await, before);
}

#[tokio::test]
async fn test_convert_moves_reserved_to_sold() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(5).await;
    let reservation = fx.reserve("session-a", ticket_type, 3).await.successful[0].clone();

    let purchase = fx
        .manager
        .convert_to_order("session-a", reservation.id, buyer(), holders(3))
        .await
        .unwrap();

    assert_eq!(purchase.order.status, OrderStatus::PendingPayment);
    assert_eq!(purchase.order.total_amount, Decimal::new(13500, 2));
    assert!(purchase.order.invoice_number.starts_with("INV-20250501-"));
    assert_eq!(purchase.tickets.len(), 3);
    assert!(purchase.tickets.iter().all(|t| t.status == TicketStatus::Active && !t.checked_in));
    assert_eq!(purchase.tickets[2].holder_name, "Holder 3");

    let inventory = fx.inventory(ticket_type).await;
    assert_eq!(inventory.reserved_quantity, 0);
    assert_eq!(inventory.sold_quantity, 3);
    assert_eq!(
        fx.store.tickets_for_order(purchase.order.id).await.unwrap().len(),
        3
    );
}

#[tokio::test]
async fn test_convert_rejects_holder_count_mismatch() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(5).await;
    let reservation = fx.reserve("session-a", ticket_type, 2).await.successful[0].clone();

    let result = fx
        .manager
        .convert_to_order("session-a", reservation.id, buyer(), holders(3))
        .await;
    assert!(matches!(
        result,
        Err(ReservationError::HolderDataMismatch { expected: 2, actual: 3 })
    ));

    let still_held = fx.store.reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(still_held.status, ReservationStatus::Active);
    assert_eq!(fx.inventory(ticket_type).await.reserved_quantity, 2);
}

#[tokio::test]
async fn test_convert_after_ttl_expires_the_hold() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(5).await;
    let reservation = fx.reserve("session-a", ticket_type, 2).await.successful[0].clone();

    fx.clock.advance(Duration::minutes(10));
    let result = fx
        .manager
        .convert_to_order("session-a", reservation.id, buyer(), holders(2))
        .await;

    assert!(matches!(result, Err(ReservationError::ReservationExpired(_))));
    let stored = fx.store.reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Expired);
    let inventory = fx.inventory(ticket_type).await;
    assert_eq!(inventory.reserved_quantity, 0);
    assert_eq!(inventory.sold_quantity, 0);
}

#[tokio::test]
async fn test_reservations_are_session_scoped() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(5).await;
    let reservation = fx.reserve("session-a", ticket_type, 2).await.successful[0].clone();

    assert_eq!(
        fx.manager
            .cancel_reservations("session-b", &[reservation.id, Uuid::new_v4()])
            .await
            .unwrap(),
        0
    );
    let result = fx
        .manager
        .convert_to_order("session-b", reservation.id, buyer(), holders(2))
        .await;
    assert!(matches!(result, Err(ReservationError::NotOwner(_))));
    assert_eq!(fx.inventory(ticket_type).await.reserved_quantity, 2);
}

#[tokio::test]
async fn test_inventory_is_conserved_across_random_operations() {
    let fx = Fixture::new();
    let ticket_type = fx.ticket_type(12).await;
    let mut rng = StdRng::seed_from_u64(7);
    let mut held = Vec::new();
    let mut last_sold = 0;

    for step in 0..400 {
        match rng.gen_range(0..5) {
            0 | 1 => {
                let session = format!("session-{}", rng.gen_range(0..4));
                let quantity = rng.gen_range(1..4);
                let batch = fx.reserve(&session, ticket_type, quantity).await;
                held.extend(batch.successful);
            }
            2 if !held.is_empty() => {
                let r = held.swap_remove(rng.gen_range(0..held.len()));
                fx.manager.cancel_reservations(&r.session_id, &[r.id]).await.unwrap();
            }
            3 if !held.is_empty() => {
                let r = held.swap_remove(rng.gen_range(0..held.len()));
                let _ = fx
                    .manager
                    .convert_to_order(&r.session_id, r.id, buyer(), holders(r.quantity as usize))
                    .await;
            }
            _ => {
                fx.clock.advance(Duration::minutes(rng.gen_range(0..4)));
                fx.manager.expire_sweep().await.unwrap();
            }
        }

        let inventory = fx.inventory(ticket_type).await;
        assert!(inventory.is_consistent(), "step {step}: {inventory:?}");
        assert!(inventory.sold_quantity >= last_sold, "step {step}: sold decreased");
        last_sold = inventory.sold_quantity;
    }
}
