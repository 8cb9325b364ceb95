//! Snapshot Publisher
//!
//! Pushes a full copy of the telemetry state to observers at a fixed rate,
//! but only on ticks where something changed. Changes between two ticks
//! coalesce into one snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, trace};

use crate::observer::ObserverHub;
use crate::telemetry::TelemetryStore;

pub struct SnapshotPublisher {
    store: Arc<TelemetryStore>,
    hub: ObserverHub,
    period: Duration,
}

impl SnapshotPublisher {
    pub fn new(store: Arc<TelemetryStore>, hub: ObserverHub, period: Duration) -> Self {
        Self { store, hub, period }
    }

    /// Publish if dirty; returns whether a snapshot went out
    pub async fn tick(&self) -> bool {
        match self.store.take_if_dirty().await {
            Some(snapshot) => {
                trace!(
                    "[PUBLISH] Snapshot to {} observers (connected={})",
                    self.hub.observer_count(),
                    snapshot.connected
                );
                self.hub.publish_snapshot(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "[PUBLISH] Snapshot publisher started ({}ms)",
                self.period.as_millis()
            );
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}
