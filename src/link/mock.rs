//! Scripted in-memory links for supervisor tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mavlink::ardupilotmega::{
    MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, HEARTBEAT_DATA,
};
use mavlink::MavHeader;
use tokio::sync::mpsc;

use super::target::SessionTarget;
use super::traits::{Inbound, LinkConnector, LinkError, VehicleLink};

enum Plan {
    Refuse,
    Accept(mpsc::UnboundedReceiver<Inbound>, Arc<AtomicBool>),
}

#[derive(Default)]
struct Shared {
    plans: Mutex<VecDeque<Plan>>,
    opened: Mutex<Vec<SessionTarget>>,
    sent: Mutex<Vec<MavMessage>>,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

/// Connector that hands out links in the order they were scripted.
/// With no script left, `open` is refused.
#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Shared>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next successful open; the returned handle feeds that link
    pub fn push_link(&self) -> MockVehicle {
        let (tx, rx) = mpsc::unbounded_channel();
        let stalled = Arc::new(AtomicBool::new(false));
        self.shared
            .plans
            .lock()
            .unwrap()
            .push_back(Plan::Accept(rx, stalled.clone()));
        MockVehicle { tx, stalled }
    }

    pub fn push_refusal(&self) {
        self.shared.plans.lock().unwrap().push_back(Plan::Refuse);
    }

    /// Every target `open` was called with, refused or not
    pub fn opened(&self) -> Vec<SessionTarget> {
        self.shared.opened.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<MavMessage> {
        self.shared.sent.lock().unwrap().clone()
    }

    pub fn live_links(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open links seen
    pub fn max_live_links(&self) -> usize {
        self.shared.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkConnector for MockConnector {
    type Link = MockLink;

    async fn open(&self, target: &SessionTarget) -> Result<MockLink, LinkError> {
        self.shared.opened.lock().unwrap().push(target.clone());
        let plan = self.shared.plans.lock().unwrap().pop_front();
        match plan {
            Some(Plan::Accept(inbound, stalled)) => {
                let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
                self.shared.max_live.fetch_max(live, Ordering::SeqCst);
                Ok(MockLink {
                    inbound,
                    shared: self.shared.clone(),
                    stalled,
                    open: true,
                })
            }
            Some(Plan::Refuse) | None => Err(LinkError::Refused {
                address: target.to_string(),
                reason: "scripted refusal".into(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub struct MockLink {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    shared: Arc<Shared>,
    stalled: Arc<AtomicBool>,
    open: bool,
}

impl MockLink {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.shared.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl VehicleLink for MockLink {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Inbound>, LinkError> {
        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(inbound)) => Ok(Some(inbound)),
            Ok(None) => Err(LinkError::Closed),
        }
    }

    async fn send(&mut self, message: &MavMessage) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::Closed);
        }
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.shared.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.release();
    }
}

/// Vehicle side of a scripted link
#[derive(Clone)]
pub struct MockVehicle {
    tx: mpsc::UnboundedSender<Inbound>,
    stalled: Arc<AtomicBool>,
}

impl MockVehicle {
    /// From now on the link never completes a send, like a peer that
    /// stopped reading its socket
    pub fn stall_sends(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn send_from(&self, system_id: u8, component_id: u8, message: MavMessage) {
        let header = MavHeader {
            system_id,
            component_id,
            sequence: 0,
        };
        let _ = self.tx.send(Inbound::new(header, message));
    }

    pub fn send(&self, message: MavMessage) {
        self.send_from(1, 1, message);
    }

    /// ArduPilot copter heartbeat from system 1
    pub fn heartbeat(&self, armed: bool, custom_mode: u32) {
        self.send(heartbeat_message(armed, custom_mode));
    }
}

pub fn heartbeat_message(armed: bool, custom_mode: u32) -> MavMessage {
    let mut base_mode = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED;
    if armed {
        base_mode |= MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED;
    }
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode,
        mavtype: MavType::MAV_TYPE_QUADROTOR,
        autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
        base_mode,
        system_status: MavState::MAV_STATE_STANDBY,
        mavlink_version: 3,
    })
}
