use std::time::Duration;

use gcs_shared::LinkState;
use thiserror::Error;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use crate::link::{SessionTarget, TargetError};

/// Stop signal shared by the supervisor and whoever needs it parked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopState {
    Clear,
    /// Raised by an address change; cleared by the same caller
    Raised,
    /// Process is exiting; never cleared
    Shutdown,
}

#[derive(Error, Debug, PartialEq)]
pub enum TargetChangeError {
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] TargetError),

    #[error("session did not stop within {0:?}, link change refused")]
    StopTimeout(Duration),

    #[error("bridge is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetChange {
    /// Already streaming from that address
    Unchanged,
    Switched,
}

/// Coordination point between the supervisor and address-change requests
pub struct SessionControl {
    stop_tx: watch::Sender<StopState>,
    phase_tx: watch::Sender<LinkState>,
    target: Mutex<SessionTarget>,
    /// Serialises address changes
    change_lock: Mutex<()>,
    stop_timeout: Duration,
}

impl SessionControl {
    pub fn new(target: SessionTarget, stop_timeout: Duration) -> Self {
        let (stop_tx, _) = watch::channel(StopState::Clear);
        let (phase_tx, _) = watch::channel(LinkState::Idle);
        Self {
            stop_tx,
            phase_tx,
            target: Mutex::new(target),
            change_lock: Mutex::new(()),
            stop_timeout,
        }
    }

    /// Idempotent; a shutdown is never downgraded
    pub fn raise_stop(&self) {
        self.stop_tx.send_if_modified(|state| {
            if *state == StopState::Clear {
                *state = StopState::Raised;
                true
            } else {
                false
            }
        });
    }

    pub fn clear_stop(&self) {
        self.stop_tx.send_if_modified(|state| {
            if *state == StopState::Raised {
                *state = StopState::Clear;
                true
            } else {
                false
            }
        });
    }

    pub fn shutdown(&self) {
        self.stop_tx.send_replace(StopState::Shutdown);
    }

    pub fn stop_state(&self) -> StopState {
        *self.stop_tx.borrow()
    }

    pub fn subscribe_stop(&self) -> watch::Receiver<StopState> {
        self.stop_tx.subscribe()
    }

    /// Current supervisor phase
    pub fn phase(&self) -> LinkState {
        *self.phase_tx.borrow()
    }

    #[cfg(test)]
    pub fn subscribe_phase(&self) -> watch::Receiver<LinkState> {
        self.phase_tx.subscribe()
    }

    pub(crate) fn publish_phase(&self, phase: LinkState) {
        self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            *current = phase;
            true
        });
    }

    #[cfg(test)]
    pub async fn target(&self) -> SessionTarget {
        self.target.lock().await.clone()
    }

    /// Held by the supervisor while it commits to a connection attempt
    pub(crate) async fn lock_target(&self) -> MutexGuard<'_, SessionTarget> {
        self.target.lock().await
    }

    /// Parse `address` and switch the session to it
    pub async fn change_address(&self, address: &str) -> Result<TargetChange, TargetChangeError> {
        let target: SessionTarget = address.parse()?;
        self.change_target(target).await
    }

    /// Stop the current cycle, swap the target, let the supervisor
    /// reconnect. Refuses if the supervisor does not park in time, so two
    /// links are never open at once.
    pub async fn change_target(
        &self,
        target: SessionTarget,
    ) -> Result<TargetChange, TargetChangeError> {
        let _serial = self.change_lock.lock().await;
        if self.stop_state() == StopState::Shutdown {
            return Err(TargetChangeError::ShuttingDown);
        }
        if self.phase() == LinkState::Streaming && *self.target.lock().await == target {
            info!("[SESSION] Already streaming from {}", target);
            return Ok(TargetChange::Unchanged);
        }

        info!("[SESSION] Switching link to {}", target);
        let mut phase_rx = self.phase_tx.subscribe();
        self.raise_stop();
        let deadline = Instant::now() + self.stop_timeout;

        loop {
            let parked = matches!(
                timeout_at(deadline, phase_rx.wait_for(|phase| phase.is_quiescent())).await,
                Ok(Ok(_))
            );
            if !parked {
                self.clear_stop();
                warn!(
                    "[SESSION] Supervisor still {} after {:?}, link change refused",
                    self.phase(),
                    self.stop_timeout
                );
                return Err(TargetChangeError::StopTimeout(self.stop_timeout));
            }

            // The supervisor publishes CONNECTING while holding this lock
            let mut current = self.target.lock().await;
            if self.phase().is_quiescent() {
                *current = target;
                self.clear_stop();
                return Ok(TargetChange::Switched);
            }
        }
    }
}
