//! Link trait abstraction for pluggable vehicle transports

use std::time::Duration;

use async_trait::async_trait;
use mavlink::ardupilotmega::MavMessage;
use mavlink::MavHeader;
use thiserror::Error;

use super::target::SessionTarget;

/// A decoded inbound frame with its sender
#[derive(Debug, Clone)]
pub struct Inbound {
    pub header: MavHeader,
    pub message: MavMessage,
}

impl Inbound {
    pub fn new(header: MavHeader, message: MavMessage) -> Self {
        Self { header, message }
    }

    pub fn system_id(&self) -> u8 {
        self.header.system_id
    }

    pub fn component_id(&self) -> u8 {
        self.header.component_id
    }
}

/// Link-level faults; all of them are recovered by reconnecting
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("connection to {address} refused: {reason}")]
    Refused { address: String, reason: String },

    #[error("open timed out after {0:?}")]
    OpenTimeout(Duration),

    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("send failed: {0}")]
    Send(String),

    #[error("send not accepted within {0:?}")]
    SendTimeout(Duration),

    #[error("undecodable traffic: {0}")]
    Decode(String),

    #[error("link closed")]
    Closed,
}

/// An open link to one vehicle
///
/// `recv` must be cancel-safe: the supervisor races it against its outbound
/// queue and the stop signal.
#[async_trait]
pub trait VehicleLink: Send {
    /// Wait up to `timeout` for the next message; `Ok(None)` on silence
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Inbound>, LinkError>;

    async fn send(&mut self, message: &MavMessage) -> Result<(), LinkError>;

    /// Release the transport; the link is unusable afterwards
    async fn close(&mut self);
}

/// Factory for vehicle links
#[async_trait]
pub trait LinkConnector: Send + Sync {
    /// The link type this connector produces
    type Link: VehicleLink + 'static;

    async fn open(&self, target: &SessionTarget) -> Result<Self::Link, LinkError>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
