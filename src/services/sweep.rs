use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::reservations::ReservationManager;

/// Periodically expires stale reservations. A failed pass is logged and
/// retried on the next tick.
pub struct ExpirySweeper {
    manager: Arc<ReservationManager>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(manager: Arc<ReservationManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Runs one pass and reports whether it succeeded.
    pub async fn tick(&self) -> bool {
        match self.manager.expire_sweep().await {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Reservation sweep failed, retrying next interval");
                false
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        info!(interval_secs = self.interval.as_secs(), "Starting reservation expiry sweep");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}
