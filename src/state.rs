use chrono::Duration;
use std::sync::Arc;

use crate::config::Config;
use crate::services::{
    CheckInService, Clock, CredentialCipher, CredentialPolicy, CredentialService, OrderService,
    ReservationManager, ReservationPolicy, TicketDelivery,
};
use crate::store::TicketStore;

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TicketStore>,
    pub reservations: Arc<ReservationManager>,
    pub credentials: Arc<CredentialService>,
    pub orders: Arc<OrderService>,
    pub check_in: Arc<CheckInService>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn TicketStore>,
        clock: Arc<dyn Clock>,
        delivery: Arc<dyn TicketDelivery>,
    ) -> Self {
        let cipher = CredentialCipher::new(&config.encryption_key)
            .with_retired_keys(&config.legacy_encryption_keys);
        let credentials = Arc::new(CredentialService::new(
            cipher,
            CredentialPolicy {
                grace: Duration::minutes(config.credential_grace_minutes),
                ..CredentialPolicy::default()
            },
            clock.clone(),
        ));

        let reservations = Arc::new(ReservationManager::new(
            store.clone(),
            clock.clone(),
            ReservationPolicy {
                default_ttl_minutes: config.reservation_ttl_minutes,
                max_ttl_minutes: config.reservation_max_ttl_minutes,
            },
        ));

        Self {
            orders: Arc::new(OrderService::new(store.clone(), credentials.clone(), delivery)),
            check_in: Arc::new(CheckInService::new(store.clone(), credentials.clone(), clock.clone())),
            store,
            reservations,
            credentials,
            clock,
        }
    }
}
