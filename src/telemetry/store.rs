use gcs_shared::{now_ms, LinkHealth, TelemetryState};
use tokio::sync::RwLock;

use crate::link::TargetIds;

#[derive(Debug, Default)]
struct Inner {
    state: TelemetryState,
    dirty: bool,
    /// Connection generation the current `connected` flag belongs to
    generation: u64,
}

/// What the command entry point needs to know about the link
#[derive(Debug, Clone, PartialEq)]
pub struct LinkView {
    pub connected: bool,
    pub target: TargetIds,
    pub generation: u64,
    pub mode: String,
}

/// Shared telemetry record with a dirty flag
#[derive(Debug, Default)]
pub struct TelemetryStore {
    inner: RwLock<Inner>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the state; the closure reports whether anything changed,
    /// which sets the dirty flag
    pub async fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut TelemetryState) -> bool,
    {
        let mut inner = self.inner.write().await;
        let changed = f(&mut inner.state);
        if changed {
            inner.dirty = true;
        }
        changed
    }

    pub async fn read<R>(&self, f: impl FnOnce(&TelemetryState) -> R) -> R {
        let inner = self.inner.read().await;
        f(&inner.state)
    }

    /// Full copy of the current state
    pub async fn snapshot(&self) -> TelemetryState {
        self.inner.read().await.state.clone()
    }

    /// Copy the state and clear the dirty flag in one step, or `None` when
    /// nothing changed since the last call
    pub async fn take_if_dirty(&self) -> Option<TelemetryState> {
        let mut inner = self.inner.write().await;
        if !inner.dirty {
            return None;
        }
        inner.dirty = false;
        Some(inner.state.clone())
    }

    #[cfg(test)]
    pub async fn is_dirty(&self) -> bool {
        self.inner.read().await.dirty
    }

    #[cfg(test)]
    pub async fn is_connected(&self) -> bool {
        self.inner.read().await.state.connected
    }

    pub async fn link_view(&self) -> LinkView {
        let inner = self.inner.read().await;
        LinkView {
            connected: inner.state.connected,
            target: TargetIds::new(inner.state.target_system, inner.state.target_component),
            generation: inner.generation,
            mode: inner.state.mode.clone(),
        }
    }

    /// Supervisor: a connection attempt to `address` started
    pub(crate) async fn mark_connecting(&self, address: &str) {
        let mut inner = self.inner.write().await;
        inner.state.link_address = Some(address.to_string());
        inner.state.link_health = LinkHealth::Connecting;
        inner.dirty = true;
    }

    /// Supervisor: first heartbeat received on connection `generation`
    pub(crate) async fn mark_link_up(&self, target: TargetIds, address: &str, generation: u64) {
        let mut inner = self.inner.write().await;
        inner.generation = generation;
        inner.state.connected = true;
        inner.state.link_health = LinkHealth::Ok;
        inner.state.link_address = Some(address.to_string());
        inner.state.target_system = target.system;
        inner.state.target_component = target.component;
        inner.state.last_heartbeat_ms = Some(now_ms());
        inner.dirty = true;
    }

    /// Supervisor: link torn down. Returns whether it had been connected.
    pub(crate) async fn mark_link_down(&self, health: LinkHealth) -> bool {
        let mut inner = self.inner.write().await;
        let was_connected = inner.state.connected;
        inner.state.connected = false;
        inner.state.link_health = health;
        inner.state.ekf_status = "N/A".to_string();
        inner.dirty = true;
        was_connected
    }

    /// Supervisor: heartbeat freshness changed
    pub(crate) async fn set_link_health(&self, health: LinkHealth) -> bool {
        let mut inner = self.inner.write().await;
        if inner.state.link_health == health {
            return false;
        }
        inner.state.link_health = health;
        inner.dirty = true;
        true
    }
}
