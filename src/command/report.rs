//! Turns command outcomes into observer notifications

use std::sync::Arc;
use std::time::Duration;

use gcs_shared::{CommandStatus, ObserverEvent};
use tracing::{debug, info, warn};

use super::tracker::{AckResult, CommandKey, CommandMeta, CommandTracker, PendingCommand};
use crate::observer::ObserverHub;
use crate::telemetry::TelemetryStore;

/// Reports every terminal outcome of a command exactly once
pub struct CommandReporter {
    tracker: Arc<CommandTracker>,
    store: Arc<TelemetryStore>,
    hub: ObserverHub,
}

impl CommandReporter {
    pub fn new(tracker: Arc<CommandTracker>, store: Arc<TelemetryStore>, hub: ObserverHub) -> Self {
        Self {
            tracker,
            store,
            hub,
        }
    }

    pub fn tracker(&self) -> &Arc<CommandTracker> {
        &self.tracker
    }

    /// Handle an acknowledgment from the vehicle
    pub async fn acknowledge(&self, key: CommandKey, protocol_name: &str, result: AckResult) {
        if result == AckResult::Unknown && key.is_background() {
            debug!("[CMD] Dropping UNKNOWN ack for background {}", protocol_name);
            return;
        }

        let label = match self.tracker.resolve(key, result).await {
            Some(pending) => {
                if result == AckResult::Accepted {
                    self.apply(&pending.meta).await;
                }
                pending.label
            }
            None => protocol_name.to_string(),
        };

        match result {
            AckResult::Accepted | AckResult::InProgress => {
                info!("[CMD] {} -> {:?}", label, result)
            }
            _ => warn!("[CMD] {} -> {:?}", label, result),
        }
        self.hub.notify(ObserverEvent::command_result(
            label,
            result.status(),
            result.explanation(),
        ));
    }

    pub fn expired(&self, entries: Vec<PendingCommand>, timeout: Duration) {
        for entry in entries {
            warn!(
                "[CMD] {} timed out after {:.1}s",
                entry.label,
                timeout.as_secs_f32()
            );
            self.hub.notify(ObserverEvent::command_result(
                entry.label,
                CommandStatus::Timeout,
                format!("No acknowledgment within {}s", timeout.as_secs()),
            ));
        }
    }

    pub fn orphaned(&self, entries: Vec<PendingCommand>) {
        for entry in entries {
            warn!("[CMD] {} orphaned by link loss", entry.label);
            self.hub.notify(ObserverEvent::command_result(
                entry.label,
                CommandStatus::ConnectionLost,
                "Connection lost before acknowledgment",
            ));
        }
    }

    /// An untracked request whose connection closed before it went out
    pub fn lost(&self, label: &str) {
        warn!("[CMD] {} dropped, its connection closed", label);
        self.hub.notify(ObserverEvent::command_result(
            label,
            CommandStatus::ConnectionLost,
            "Connection lost before the request was sent",
        ));
    }

    pub fn evicted(&self, entry: PendingCommand) {
        warn!("[CMD] {} evicted, too many commands in flight", entry.label);
        self.hub.notify(ObserverEvent::command_result(
            entry.label,
            CommandStatus::Evicted,
            "Dropped: too many commands awaiting acknowledgment",
        ));
    }

    pub fn rejected(&self, label: &str, reason: &str) {
        warn!("[CMD] {} rejected: {}", label, reason);
        self.hub.notify(ObserverEvent::command_result(
            label,
            CommandStatus::Rejected,
            reason,
        ));
    }

    /// Effect of an accepted ARM/DISARM or SET_MODE
    async fn apply(&self, meta: &CommandMeta) {
        match meta {
            CommandMeta::Arm(armed) => {
                let armed = *armed;
                self.store
                    .update(|s| {
                        let target = s.target_system;
                        if let Some(record) = s.systems.get_mut(&target) {
                            record.armed = armed;
                        }
                        let changed = s.armed != armed;
                        s.armed = armed;
                        changed
                    })
                    .await;
            }
            CommandMeta::Mode { name, .. } => {
                self.store
                    .update(|s| {
                        let target = s.target_system;
                        if let Some(record) = s.systems.get_mut(&target) {
                            record.mode = name.clone();
                        }
                        let changed = s.mode != *name;
                        s.mode = name.clone();
                        changed
                    })
                    .await;
            }
            _ => {}
        }
    }
}
