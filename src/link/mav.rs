//! MAVLink vehicle link
//!
//! Opens `tcpout`/`udpout`/`udpin` connections through the mavlink crate's
//! async backend. One reader task per link pulls frames off the connection
//! and hands them to `recv` through a channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mavlink::ardupilotmega::MavMessage;
use mavlink::error::MessageReadError;
use mavlink::{AsyncMavConnection, MavHeader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::target::SessionTarget;
use super::traits::{Inbound, LinkConnector, LinkError, VehicleLink};

type SharedConnection = Arc<dyn AsyncMavConnection<MavMessage> + Sync + Send>;

/// Undecodable frames in a row before the link counts as broken
const MAX_DECODE_FAILURES: u32 = 64;

/// Tracks consecutive decode failures on one link
#[derive(Debug)]
struct DecodeBudget {
    failures: u32,
    limit: u32,
}

impl DecodeBudget {
    fn new(limit: u32) -> Self {
        Self { failures: 0, limit }
    }

    fn decoded(&mut self) {
        self.failures = 0;
    }

    /// Returns true once the limit is reached
    fn failed(&mut self) -> bool {
        self.failures += 1;
        self.failures >= self.limit
    }
}

/// Opens MAVLink connections as the ground station
#[derive(Debug, Clone)]
pub struct MavlinkConnector {
    /// System ID of this ground station
    system_id: u8,
    /// Component ID of this ground station
    component_id: u8,
}

impl MavlinkConnector {
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
        }
    }
}

#[async_trait]
impl LinkConnector for MavlinkConnector {
    type Link = MavlinkLink;

    async fn open(&self, target: &SessionTarget) -> Result<MavlinkLink, LinkError> {
        let address = target.connection_string();
        info!("[LINK] Opening {}", address);

        let connection = mavlink::connect_async::<MavMessage>(&address)
            .await
            .map_err(|e| LinkError::Refused {
                address: address.clone(),
                reason: e.to_string(),
            })?;

        let header = MavHeader {
            system_id: self.system_id,
            component_id: self.component_id,
            sequence: 0,
        };

        Ok(MavlinkLink::start(Arc::from(connection), header, address))
    }

    fn name(&self) -> &'static str {
        "mavlink"
    }
}

/// An open MAVLink connection
pub struct MavlinkLink {
    connection: SharedConnection,
    inbound: mpsc::Receiver<Result<Inbound, LinkError>>,
    reader: JoinHandle<()>,
    header: MavHeader,
    address: String,
}

impl MavlinkLink {
    fn start(connection: SharedConnection, header: MavHeader, address: String) -> Self {
        let (tx, inbound) = mpsc::channel(256);
        let reader = tokio::spawn(read_loop(connection.clone(), tx, address.clone()));

        Self {
            connection,
            inbound,
            reader,
            header,
            address,
        }
    }
}

/// Sole reader of the connection
async fn read_loop(
    connection: SharedConnection,
    tx: mpsc::Sender<Result<Inbound, LinkError>>,
    address: String,
) {
    let mut budget = DecodeBudget::new(MAX_DECODE_FAILURES);
    loop {
        match connection.recv().await {
            Ok((header, message)) => {
                budget.decoded();
                if tx.send(Ok(Inbound::new(header, message))).await.is_err() {
                    break;
                }
            }
            Err(MessageReadError::Io(e)) => {
                warn!("[LINK] Read error on {}: {}", address, e);
                let _ = tx.send(Err(LinkError::Io(e))).await;
                break;
            }
            Err(e) if budget.failed() => {
                warn!(
                    "[LINK] {} undecodable frames in a row on {}, giving up",
                    MAX_DECODE_FAILURES, address
                );
                let _ = tx.send(Err(LinkError::Decode(e.to_string()))).await;
                break;
            }
            Err(e) => {
                // A single corrupt or unknown frame leaves the stream usable
                debug!("[LINK] Dropping undecodable frame on {}: {}", address, e);
            }
        }
    }
}

#[async_trait]
impl VehicleLink for MavlinkLink {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Inbound>, LinkError> {
        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(Ok(inbound))) => Ok(Some(inbound)),
            Ok(Some(Err(e))) => Err(e),
            Ok(None) => Err(LinkError::Closed),
        }
    }

    async fn send(&mut self, message: &MavMessage) -> Result<(), LinkError> {
        self.header.sequence = self.header.sequence.wrapping_add(1);
        self.connection
            .send(&self.header, message)
            .await
            .map(|_| ())
            .map_err(|e| LinkError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        self.reader.abort();
        self.inbound.close();
        info!("[LINK] Closed {}", self.address);
    }
}

impl Drop for MavlinkLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
