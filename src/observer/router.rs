use std::sync::Arc;

use gcs_shared::ObserverRequest;
use tracing::{info, warn};

use crate::command::{CommandGateway, CommandReply};
use crate::session::{SessionControl, TargetChange};

/// Routes observer requests to the command gateway or the session control
pub struct RequestRouter {
    gateway: Arc<CommandGateway>,
    control: Arc<SessionControl>,
}

impl RequestRouter {
    pub fn new(gateway: Arc<CommandGateway>, control: Arc<SessionControl>) -> Self {
        Self { gateway, control }
    }

    pub async fn handle(&self, request: ObserverRequest) -> CommandReply {
        match request {
            ObserverRequest::Command { command } => self.gateway.submit_request(&command).await,
            ObserverRequest::UpdateTarget { address } => self.update_target(&address).await,
        }
    }

    async fn update_target(&self, address: &str) -> CommandReply {
        match self.control.change_address(address).await {
            Ok(TargetChange::Unchanged) => CommandReply {
                ok: true,
                message: format!("Already connected to {}", address),
            },
            Ok(TargetChange::Switched) => {
                info!("[OBSERVER] Link target changed to {}", address);
                CommandReply {
                    ok: true,
                    message: format!("Switching to {}", address),
                }
            }
            Err(e) => {
                warn!("[OBSERVER] Link change to {} refused: {}", address, e);
                CommandReply {
                    ok: false,
                    message: e.to_string(),
                }
            }
        }
    }
}
