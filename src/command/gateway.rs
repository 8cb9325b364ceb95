//! Command Submission Entry Point
//!
//! Runs on the observer's request context. It never touches the vehicle
//! link; validated commands are queued for the supervisor, which owns it.

use std::sync::Arc;

use gcs_shared::CommandRequest;
use mavlink::ardupilotmega::MavMessage;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::report::CommandReporter;
use super::request::{CommandError, VehicleCommand};
use super::tracker::CommandTracker;
use crate::link::{MissionKind, TargetIds};
use crate::telemetry::TelemetryStore;

/// Outbound queue depth between observers and the supervisor
pub const OUTBOUND_QUEUE: usize = 64;

/// Something the supervisor has to do on the link
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(MavMessage),
    /// Start a mission/fence download
    Download(MissionKind),
}

/// Queued work, stamped with the connection it was meant for
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub generation: u64,
    pub payload: Outbound,
}

/// Synchronous answer to a command request
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    pub ok: bool,
    pub message: String,
}

impl From<Result<String, CommandError>> for CommandReply {
    fn from(result: Result<String, CommandError>) -> Self {
        match result {
            Ok(message) => CommandReply { ok: true, message },
            Err(e) => CommandReply {
                ok: false,
                message: e.to_string(),
            },
        }
    }
}

pub struct CommandGateway {
    store: Arc<TelemetryStore>,
    reporter: Arc<CommandReporter>,
    outbound: mpsc::Sender<OutboundFrame>,
}

impl CommandGateway {
    pub fn new(
        store: Arc<TelemetryStore>,
        reporter: Arc<CommandReporter>,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        Self {
            store,
            reporter,
            outbound,
        }
    }

    fn tracker(&self) -> &Arc<CommandTracker> {
        self.reporter.tracker()
    }

    /// Parse, validate and send an observer request
    pub async fn submit_request(&self, request: &CommandRequest) -> CommandReply {
        let result = match VehicleCommand::parse(request) {
            Ok(command) => self.send_command(command, None).await,
            Err(e) => {
                debug!("[CMD] Rejected request {:?}: {}", request.kind, e);
                Err(e)
            }
        };
        result.into()
    }

    /// Send a validated command to `target`, or to the session's primary
    /// system when `None`
    pub async fn send_command(
        &self,
        command: VehicleCommand,
        target: Option<TargetIds>,
    ) -> Result<String, CommandError> {
        let view = self.store.link_view().await;
        if !view.connected {
            return Err(CommandError::NotConnected);
        }
        let target = target.unwrap_or(view.target);
        if target.system == 0 {
            return Err(CommandError::BroadcastTarget);
        }
        if command == VehicleCommand::Arm && view.mode == "RTL" {
            return Err(CommandError::ArmInRtl);
        }

        let label = command.label();
        let payload = command.encode(target);

        let handle = match command.key() {
            Some(key) => {
                let handle = self
                    .tracker()
                    .submit(key, label, command.meta(), view.generation)
                    .await;
                if handle.superseded {
                    debug!("[CMD] {} replaces an unacknowledged {}", label, key);
                }
                if let Some(evicted) = handle.evicted.clone() {
                    self.reporter.evicted(evicted);
                }
                Some(handle)
            }
            None => None,
        };

        let frame = OutboundFrame {
            generation: view.generation,
            payload,
        };
        if let Err(e) = self.outbound.try_send(frame) {
            if let Some(handle) = &handle {
                self.tracker().cancel(handle).await;
            }
            return Err(match e {
                TrySendError::Full(_) => {
                    warn!("[CMD] Outbound queue full, {} not sent", label);
                    CommandError::QueueFull
                }
                TrySendError::Closed(_) => CommandError::NotConnected,
            });
        }

        info!(
            "[CMD] {} queued for system {}/{}",
            label, target.system, target.component
        );
        Ok(format!("{} sent", label))
    }
}
