//! Session Supervisor
//!
//! Sole owner of the vehicle link. Drives one connection cycle at a time
//! through the [`LinkStateMachine`]:
//!
//! IDLE -> CONNECTING -> AWAITING_HEARTBEAT -> STREAMING -> CLOSING ->
//! RECONNECT_WAIT -> CONNECTING ...
//!
//! Every wait point is bounded and races the stop signal. After a stop has
//! been observed the supervisor parks in IDLE until the caller that raised it
//! clears it.

use std::sync::Arc;
use std::time::Duration;

use gcs_shared::{
    LinkEvent, LinkHealth, LinkState, LinkStateMachine, ObserverEvent, TransitionResult,
};
use mavlink::ardupilotmega::{MavMessage, MavType};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::control::{SessionControl, StopState};
use super::mission::{MissionDownloader, MissionOutput};
use crate::command::{AckResult, CommandKey, CommandReporter, Outbound, OutboundFrame};
use crate::config::SessionConfig;
use crate::dispatch::{DispatchAction, Dispatcher, HandlerContext};
use crate::link::encode::{self, message_id};
use crate::link::{Inbound, LinkConnector, LinkError, SessionTarget, TargetIds, VehicleLink};
use crate::observer::ObserverHub;
use crate::telemetry::TelemetryStore;

/// Resolves once the stop signal is raised (or its sender is gone)
async fn stop_raised(rx: &mut watch::Receiver<StopState>) {
    let _ = rx.wait_for(|state| *state != StopState::Clear).await;
}

/// Bounded write; a transport that stops taking frames faults the link
async fn send_within<L: VehicleLink>(
    link: &mut L,
    message: &MavMessage,
    limit: Duration,
) -> Result<(), LinkError> {
    match timeout(limit, link.send(message)).await {
        Ok(sent) => sent,
        Err(_) => Err(LinkError::SendTimeout(limit)),
    }
}

/// A heartbeat sent by a vehicle rather than another ground station
fn is_vehicle_heartbeat(inbound: &Inbound) -> bool {
    matches!(&inbound.message, MavMessage::HEARTBEAT(hb) if hb.mavtype != MavType::MAV_TYPE_GCS)
}

pub struct SessionSupervisor<C: LinkConnector> {
    connector: C,
    control: Arc<SessionControl>,
    config: SessionConfig,
    store: Arc<TelemetryStore>,
    dispatcher: Dispatcher,
    reporter: Arc<CommandReporter>,
    hub: ObserverHub,
    outbound_rx: mpsc::Receiver<OutboundFrame>,
    stop_rx: watch::Receiver<StopState>,
    fsm: LinkStateMachine,
    mission: MissionDownloader,
    /// Incremented on every connection attempt
    generation: u64,
    address: String,
    target: TargetIds,
    last_heartbeat: Instant,
}

impl<C: LinkConnector + 'static> SessionSupervisor<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connector: C,
        control: Arc<SessionControl>,
        config: SessionConfig,
        store: Arc<TelemetryStore>,
        dispatcher: Dispatcher,
        reporter: Arc<CommandReporter>,
        hub: ObserverHub,
        outbound_rx: mpsc::Receiver<OutboundFrame>,
    ) -> Self {
        let stop_rx = control.subscribe_stop();
        let mission = MissionDownloader::new(config.mission_item_timeout);
        Self {
            connector,
            control,
            config,
            store,
            dispatcher,
            reporter,
            hub,
            outbound_rx,
            stop_rx,
            fsm: LinkStateMachine::new(),
            mission,
            generation: 0,
            address: String::new(),
            target: TargetIds::new(0, 0),
            last_heartbeat: Instant::now(),
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Loop until shutdown
    pub async fn run(mut self) {
        info!("[SESSION] Supervisor started ({} link)", self.connector.name());
        loop {
            match self.fsm.state() {
                LinkState::Idle => {
                    if !self.wait_until_clear().await {
                        break;
                    }
                    self.run_cycle(LinkEvent::Connect).await;
                }
                LinkState::ReconnectWait => {
                    let delay = self.config.reconnect_delay;
                    debug!("[SESSION] Reconnecting in {:?}", delay);
                    let elapsed = tokio::select! {
                        _ = stop_raised(&mut self.stop_rx) => false,
                        _ = sleep(delay) => true,
                    };
                    if elapsed {
                        self.run_cycle(LinkEvent::WaitElapsed).await;
                    } else {
                        self.transition(LinkEvent::StopRequested);
                    }
                }
                other => {
                    // Cycles always end quiescent
                    error!("[SESSION] Unexpected phase {} between cycles", other);
                    self.transition(LinkEvent::StopRequested);
                    self.transition(LinkEvent::Parked);
                }
            }
        }
        info!("[SESSION] Supervisor stopped");
    }

    /// Park in IDLE while a stop is raised. Returns false on shutdown.
    async fn wait_until_clear(&mut self) -> bool {
        let state = match self.stop_rx.wait_for(|s| *s != StopState::Raised).await {
            Ok(state) => *state,
            Err(_) => StopState::Shutdown,
        };
        state == StopState::Clear
    }

    /// One connection: open, first heartbeat, stream, close
    async fn run_cycle(&mut self, start: LinkEvent) {
        let control = self.control.clone();
        let target = {
            let guard = control.lock_target().await;
            if *self.stop_rx.borrow() != StopState::Clear {
                drop(guard);
                self.transition(LinkEvent::StopRequested);
                return;
            }
            self.generation += 1;
            self.address = guard.to_string();
            self.transition(start);
            guard.clone()
        };

        self.store.mark_connecting(&self.address).await;
        let (link, end) = match self.open(&target).await {
            Ok(mut link) => {
                self.transition(LinkEvent::Opened);
                let end = self.session(&mut link).await;
                (Some(link), end)
            }
            Err(end) => (None, end),
        };
        self.close(link, end).await;
    }

    async fn open(&mut self, target: &SessionTarget) -> Result<C::Link, LinkEvent> {
        info!(
            "[SESSION] Connecting to {} (attempt #{})",
            self.address, self.generation
        );
        let open_timeout = self.config.open_timeout;
        tokio::select! {
            _ = stop_raised(&mut self.stop_rx) => Err(LinkEvent::StopRequested),
            opened = timeout(open_timeout, self.connector.open(target)) => match opened {
                Ok(Ok(link)) => Ok(link),
                Ok(Err(e)) => {
                    warn!("[SESSION] Open failed: {}", e);
                    Err(LinkEvent::Fault(e.to_string()))
                }
                Err(_) => {
                    let e = LinkError::OpenTimeout(open_timeout);
                    warn!("[SESSION] Open failed: {}", e);
                    Err(LinkEvent::Fault(e.to_string()))
                }
            },
        }
    }

    /// AWAITING_HEARTBEAT and STREAMING; returns the event that ends them
    async fn session(&mut self, link: &mut C::Link) -> LinkEvent {
        let heartbeat = match self.await_heartbeat(link).await {
            Ok(heartbeat) => heartbeat,
            Err(end) => return end,
        };
        if let Err(e) = self.go_streaming(link, heartbeat).await {
            return LinkEvent::Fault(e.to_string());
        }
        self.stream(link).await
    }

    async fn await_heartbeat(&mut self, link: &mut C::Link) -> Result<Inbound, LinkEvent> {
        let attempts = self.config.heartbeat_attempts;
        for attempt in 1..=attempts {
            let deadline = Instant::now() + self.config.heartbeat_attempt_timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                tokio::select! {
                    _ = stop_raised(&mut self.stop_rx) => return Err(LinkEvent::StopRequested),
                    received = link.recv(remaining) => match received {
                        Ok(Some(inbound)) if is_vehicle_heartbeat(&inbound) => return Ok(inbound),
                        Ok(Some(_)) => continue,
                        Ok(None) => break,
                        Err(e) => return Err(LinkEvent::Fault(e.to_string())),
                    },
                }
            }
            debug!(
                "[SESSION] Waiting for heartbeat ({}/{})",
                attempt, attempts
            );
        }
        warn!(
            "[SESSION] No heartbeat from {} after {} attempts",
            self.address, attempts
        );
        Err(LinkEvent::Fault("no heartbeat".into()))
    }

    async fn go_streaming(&mut self, link: &mut C::Link, heartbeat: Inbound) -> Result<(), LinkError> {
        self.target = TargetIds::new(heartbeat.system_id(), heartbeat.component_id());
        self.last_heartbeat = Instant::now();
        self.store
            .mark_link_up(self.target, &self.address, self.generation)
            .await;
        self.transition(LinkEvent::HeartbeatReceived);
        info!(
            "[SESSION] Heartbeat from system {} component {}, streaming",
            self.target.system, self.target.component
        );

        let home_known = self.store.read(|s| s.home.is_some()).await;
        for request in encode::stream_requests(self.target, self.config.stream_rate_hz, home_known) {
            send_within(link, &request, self.config.send_timeout).await?;
        }
        send_within(link, &encode::gcs_heartbeat(), self.config.send_timeout).await?;

        self.handle_inbound(link, heartbeat).await
    }

    async fn stream(&mut self, link: &mut C::Link) -> LinkEvent {
        let mut gcs_heartbeat = interval(self.config.gcs_heartbeat_interval);
        gcs_heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        gcs_heartbeat.reset();
        let poll = self.config.poll_interval;

        loop {
            if let Some(fault) = self.check_heartbeat().await {
                return fault;
            }
            let expired = self.mission.check_timeout(Instant::now());
            if let Err(e) = self.apply_mission(link, expired).await {
                return LinkEvent::Fault(e.to_string());
            }

            let step = tokio::select! {
                _ = stop_raised(&mut self.stop_rx) => return LinkEvent::StopRequested,
                Some(frame) = self.outbound_rx.recv() => self.send_outbound(link, frame).await,
                _ = gcs_heartbeat.tick() => {
                    send_within(link, &encode::gcs_heartbeat(), self.config.send_timeout).await
                }
                received = link.recv(poll) => match received {
                    Ok(Some(inbound)) => self.handle_inbound(link, inbound).await,
                    Ok(None) => Ok(()),
                    Err(e) => Err(e),
                },
            };
            if let Err(e) = step {
                warn!("[SESSION] Link error: {}", e);
                return LinkEvent::Fault(e.to_string());
            }
        }
    }

    /// Returns the fault to close with once the heartbeat is overdue
    async fn check_heartbeat(&mut self) -> Option<LinkEvent> {
        let silent = self.last_heartbeat.elapsed();
        let limit = self.config.heartbeat_timeout;
        if silent > limit {
            warn!(
                "[SESSION] No heartbeat for {:.1}s, link lost",
                silent.as_secs_f32()
            );
            return Some(LinkEvent::Fault("heartbeat timeout".into()));
        }
        let health = if silent > limit / 2 {
            LinkHealth::Stale
        } else {
            LinkHealth::Ok
        };
        if self.store.set_link_health(health).await {
            debug!("[SESSION] Link health {:?}", health);
        }
        None
    }

    async fn handle_inbound(&mut self, link: &mut C::Link, inbound: Inbound) -> Result<(), LinkError> {
        if is_vehicle_heartbeat(&inbound) && inbound.system_id() == self.target.system {
            self.last_heartbeat = Instant::now();
        }
        let mut ctx = HandlerContext::new(self.target);
        self.dispatcher.dispatch(&inbound, &self.store, &mut ctx).await;

        for action in ctx.into_actions() {
            self.perform(link, action).await?;
        }
        Ok(())
    }

    async fn perform(&mut self, link: &mut C::Link, action: DispatchAction) -> Result<(), LinkError> {
        match action {
            DispatchAction::Notify(event) => self.hub.notify(event),
            DispatchAction::CommandAck { key, label, result } => {
                self.reporter.acknowledge(key, &label, result).await;
            }
            DispatchAction::HomeKnown => {
                let stop = encode::set_message_interval(self.target, message_id::HOME_POSITION, 0.0);
                send_within(link, &stop, self.config.send_timeout).await?;
            }
            DispatchAction::MissionCount { kind, count } => {
                let out = self.mission.on_count(kind, count);
                self.apply_mission(link, out).await?;
            }
            DispatchAction::MissionItem { kind, item } => {
                let out = self.mission.on_item(kind, item);
                self.apply_mission(link, out).await?;
            }
            DispatchAction::MissionAck {
                kind,
                accepted,
                code,
            } => {
                if let Some(kind) = kind.filter(|k| self.mission.is_active_for(*k) && !accepted) {
                    let out = self.mission.on_refused(kind, code);
                    self.apply_mission(link, out).await?;
                } else if self.reporter.tracker().get(CommandKey::MissionClear).await.is_some() {
                    let result = if accepted {
                        AckResult::Accepted
                    } else {
                        AckResult::Denied
                    };
                    self.reporter
                        .acknowledge(CommandKey::MissionClear, "MISSION_CLEAR_ALL", result)
                        .await;
                }
            }
        }
        Ok(())
    }

    async fn send_outbound(&mut self, link: &mut C::Link, frame: OutboundFrame) -> Result<(), LinkError> {
        if frame.generation != self.generation {
            debug!(
                "[SESSION] Dropping frame queued for connection #{}",
                frame.generation
            );
            // Registered after that connection was already torn down
            let orphaned = self.reporter.tracker().orphan(frame.generation).await;
            self.reporter.orphaned(orphaned);
            if let Outbound::Download(kind) = frame.payload {
                self.reporter.lost(kind.request_label());
            }
            return Ok(());
        }
        match frame.payload {
            Outbound::Message(message) => {
                send_within(link, &message, self.config.send_timeout).await
            }
            Outbound::Download(kind) => match self.mission.start(kind, self.target) {
                Ok(out) => self.apply_mission(link, out).await,
                Err(reason) => {
                    self.reporter.rejected(kind.request_label(), &reason);
                    Ok(())
                }
            },
        }
    }

    async fn apply_mission(&mut self, link: &mut C::Link, outputs: Vec<MissionOutput>) -> Result<(), LinkError> {
        for output in outputs {
            match output {
                MissionOutput::Send(message) => {
                    send_within(link, &message, self.config.send_timeout).await?
                }
                MissionOutput::Notify(event) => self.hub.notify(event),
            }
        }
        Ok(())
    }

    /// CLOSING: release the link and everything tied to this connection
    async fn close(&mut self, link: Option<C::Link>, end: LinkEvent) {
        let reason = match &end {
            LinkEvent::Fault(cause) => cause.clone(),
            _ => "stop requested".to_string(),
        };
        let stopped = end == LinkEvent::StopRequested;
        self.transition(end);

        if let Some(mut link) = link {
            if timeout(self.config.open_timeout, link.close()).await.is_err() {
                warn!("[SESSION] Link close timed out, dropping it");
            }
        }

        let health = if stopped {
            LinkHealth::NoLink
        } else {
            LinkHealth::Lost
        };
        let was_connected = self.store.mark_link_down(health).await;

        let orphaned = self.reporter.tracker().orphan(self.generation).await;
        self.reporter.orphaned(orphaned);
        for output in self.mission.abort("Connection lost") {
            if let MissionOutput::Notify(event) = output {
                self.hub.notify(event);
            }
        }

        if was_connected {
            warn!("[SESSION] Link to {} lost: {}", self.address, reason);
            self.hub.notify(ObserverEvent::LinkLost {
                reason,
                address: self.address.clone(),
            });
        }

        if *self.stop_rx.borrow() != StopState::Clear {
            self.transition(LinkEvent::Parked);
        } else {
            self.transition(LinkEvent::Closed);
        }
    }

    /// Apply `event`, then publish the new phase to waiters and observers
    fn transition(&mut self, event: LinkEvent) {
        match self.fsm.process_event(event) {
            TransitionResult::Success { from, to } if from != to => {
                debug!("[SESSION] {} -> {}", from, to);
                self.control.publish_phase(to);
                self.hub.notify(ObserverEvent::ConnectionStatus {
                    state: to,
                    address: self.address.clone(),
                });
            }
            TransitionResult::Success { .. } => {}
            TransitionResult::Invalid { from, event } => {
                warn!("[SESSION] Ignoring {:?} in {}", event, from);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandGateway, CommandTracker, VehicleCommand};
    use crate::link::mock::{heartbeat_message, MockConnector, MockVehicle};
    use crate::session::TargetChange;
    use gcs_shared::{CommandStatus, ServerFrame};
    use mavlink::ardupilotmega::{MavCmd, MavResult, COMMAND_ACK_DATA};

    struct Harness {
        connector: MockConnector,
        control: Arc<SessionControl>,
        store: Arc<TelemetryStore>,
        tracker: Arc<CommandTracker>,
        gateway: CommandGateway,
        outbound: mpsc::Sender<OutboundFrame>,
        hub: ObserverHub,
        task: JoinHandle<()>,
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            heartbeat_timeout: Duration::from_secs(3),
            heartbeat_attempts: 3,
            heartbeat_attempt_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            reconnect_delay: Duration::from_secs(2),
            open_timeout: Duration::from_secs(1),
            ..SessionConfig::default()
        }
    }

    fn start(connector: MockConnector) -> Harness {
        let config = test_config();
        let control = Arc::new(SessionControl::new(
            SessionTarget::tcp("127.0.0.1", 5760),
            config.stop_timeout(),
        ));
        let store = Arc::new(TelemetryStore::new());
        let tracker = Arc::new(CommandTracker::new(30));
        let hub = ObserverHub::default();
        let reporter = Arc::new(CommandReporter::new(tracker.clone(), store.clone(), hub.clone()));
        let (tx, rx) = mpsc::channel(16);
        let gateway = CommandGateway::new(store.clone(), reporter.clone(), tx.clone());

        let supervisor = SessionSupervisor::new(
            connector.clone(),
            control.clone(),
            config,
            store.clone(),
            Dispatcher::new(),
            reporter,
            hub.clone(),
            rx,
        );
        Harness {
            connector,
            control,
            store,
            tracker,
            gateway,
            outbound: tx,
            hub,
            task: supervisor.start(),
        }
    }

    async fn wait_phase(control: &SessionControl, phase: LinkState) {
        let mut rx = control.subscribe_phase();
        timeout(Duration::from_secs(60), rx.wait_for(|p| *p == phase))
            .await
            .expect("phase reached")
            .expect("supervisor alive");
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        sleep(Duration::from_millis(300)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_heartbeat_connects() {
        let connector = MockConnector::new();
        let vehicle = connector.push_link();
        vehicle.heartbeat(false, 4);
        let h = start(connector);
        let mut events = h.hub.subscribe();

        wait_phase(&h.control, LinkState::Streaming).await;
        settle().await;

        let state = h.store.snapshot().await;
        assert!(state.connected);
        assert!(!state.armed);
        assert_eq!(state.mode, "GUIDED");
        assert_eq!(state.target_system, 1);

        let mut heartbeats = 0;
        while let Ok(frame) = events.try_recv() {
            if frame == ServerFrame::Event(ObserverEvent::HeartbeatReceived { system_id: 1 }) {
                heartbeats += 1;
            }
        }
        assert_eq!(heartbeats, 1);

        // Data streams were requested on the fresh link
        assert!(h.connector.sent().iter().any(|m| matches!(
            m,
            MavMessage::COMMAND_LONG(cmd) if cmd.command == MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL
        )));
        h.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_heartbeat_reconnects() {
        let connector = MockConnector::new();
        let _silent = connector.push_link();
        connector.push_refusal();
        let h = start(connector);

        wait_phase(&h.control, LinkState::AwaitingHeartbeat).await;
        wait_phase(&h.control, LinkState::ReconnectWait).await;
        assert!(!h.store.is_connected().await);
        assert_eq!(h.connector.live_links(), 0);

        // The retry is refused
        sleep(Duration::from_millis(2_500)).await;
        assert_eq!(h.connector.opened().len(), 2);
        assert!(!h.store.is_connected().await);
        h.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_timeout_drops_link() {
        let connector = MockConnector::new();
        let vehicle = connector.push_link();
        vehicle.heartbeat(false, 4);
        let h = start(connector);
        let mut events = h.hub.subscribe();

        wait_phase(&h.control, LinkState::Streaming).await;
        wait_phase(&h.control, LinkState::ReconnectWait).await;

        assert!(!h.store.is_connected().await);
        let mut lost = false;
        while let Ok(frame) = events.try_recv() {
            if let ServerFrame::Event(ObserverEvent::LinkLost { reason, .. }) = frame {
                assert_eq!(reason, "heartbeat timeout");
                lost = true;
            }
        }
        assert!(lost);
        drop(vehicle);
        h.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_ack_round_trip() {
        let connector = MockConnector::new();
        let vehicle = connector.push_link();
        vehicle.heartbeat(false, 4);
        let h = start(connector);
        let mut events = h.hub.subscribe();
        wait_phase(&h.control, LinkState::Streaming).await;
        settle().await;

        h.gateway.send_command(VehicleCommand::Arm, None).await.unwrap();
        assert_eq!(h.tracker.len().await, 1);
        settle().await;
        assert!(h.connector.sent().iter().any(|m| matches!(
            m,
            MavMessage::COMMAND_LONG(cmd) if cmd.command == MavCmd::MAV_CMD_COMPONENT_ARM_DISARM
        )));

        vehicle.send(MavMessage::COMMAND_ACK(COMMAND_ACK_DATA {
            command: MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            result: MavResult::MAV_RESULT_ACCEPTED,
            ..Default::default()
        }));
        settle().await;

        assert!(h.tracker.is_empty().await);
        assert!(h.store.snapshot().await.armed);
        let mut accepted = false;
        while let Ok(frame) = events.try_recv() {
            if let ServerFrame::Event(ObserverEvent::CommandResult { command, status, .. }) = frame {
                if command == "ARM" && status == CommandStatus::Accepted {
                    accepted = true;
                }
            }
        }
        assert!(accepted);
        h.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_address_change_mid_stream() {
        let connector = MockConnector::new();
        let first = connector.push_link();
        first.heartbeat(false, 4);
        let second = connector.push_link();
        let h = start(connector);
        wait_phase(&h.control, LinkState::Streaming).await;
        settle().await;

        // Pending command on the old connection gets orphaned
        h.gateway.send_command(VehicleCommand::Land, None).await.unwrap();

        let change = h.control.change_address("tcp:10.0.0.2:5760").await;
        assert_eq!(change, Ok(TargetChange::Switched));
        assert!(!h.store.is_connected().await);
        assert!(h.tracker.is_empty().await);

        second.send_from(1, 1, heartbeat_message(false, 5));
        wait_phase(&h.control, LinkState::Streaming).await;
        settle().await;

        let state = h.store.snapshot().await;
        assert!(state.connected);
        assert_eq!(state.mode, "LOITER");
        assert_eq!(state.link_address.as_deref(), Some("tcp:10.0.0.2:5760"));
        assert_eq!(
            h.connector.opened(),
            vec![
                SessionTarget::tcp("127.0.0.1", 5760),
                SessionTarget::tcp("10.0.0.2", 5760)
            ]
        );
        assert_eq!(h.connector.max_live_links(), 1);
        drop(first);
        h.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_address_twice_is_idempotent() {
        let connector = MockConnector::new();
        let first = connector.push_link();
        first.heartbeat(false, 4);
        let second = connector.push_link();
        second.heartbeat(false, 4);
        let h = start(connector);
        wait_phase(&h.control, LinkState::Streaming).await;

        h.control.change_address("tcp:10.0.0.2:5760").await.unwrap();
        wait_phase(&h.control, LinkState::Streaming).await;
        settle().await;
        let once = h.store.snapshot().await;

        let again = h.control.change_address("tcp:10.0.0.2:5760").await;
        assert_eq!(again, Ok(TargetChange::Unchanged));
        settle().await;

        let twice = h.store.snapshot().await;
        assert_eq!(once.connected, twice.connected);
        assert_eq!(once.link_address, twice.link_address);
        assert_eq!(h.connector.opened().len(), 2);
        h.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_send_drops_link() {
        let connector = MockConnector::new();
        let vehicle = connector.push_link();
        vehicle.heartbeat(false, 4);
        let h = start(connector);
        let mut events = h.hub.subscribe();
        wait_phase(&h.control, LinkState::Streaming).await;
        settle().await;

        // The next GCS heartbeat never leaves the transport
        vehicle.stall_sends();
        wait_phase(&h.control, LinkState::ReconnectWait).await;
        assert!(!h.store.is_connected().await);

        let mut reason = None;
        while let Ok(frame) = events.try_recv() {
            if let ServerFrame::Event(ObserverEvent::LinkLost { reason: r, .. }) = frame {
                reason = Some(r);
            }
        }
        let reason = reason.expect("link_lost reported");
        assert!(reason.starts_with("send not accepted"), "{}", reason);

        // The supervisor is free again, so the address can change
        let change = h.control.change_address("tcp:10.0.0.2:5760").await;
        assert_eq!(change, Ok(TargetChange::Switched));
        h.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_for_closed_connection_reports_lost() {
        let connector = MockConnector::new();
        let vehicle = connector.push_link();
        vehicle.heartbeat(false, 4);
        let h = start(connector);
        let mut events = h.hub.subscribe();
        wait_phase(&h.control, LinkState::Streaming).await;
        settle().await;

        // Registered against connection #0 after it had already closed
        let land = VehicleCommand::Land;
        let key = land.key().unwrap();
        h.tracker.submit(key, land.label(), land.meta(), 0).await;
        h.outbound
            .send(OutboundFrame {
                generation: 0,
                payload: land.encode(TargetIds::new(1, 1)),
            })
            .await
            .unwrap();
        settle().await;

        assert!(h.tracker.is_empty().await);
        assert!(!h.connector.sent().iter().any(|m| matches!(
            m,
            MavMessage::COMMAND_LONG(cmd) if cmd.command == MavCmd::MAV_CMD_NAV_LAND
        )));
        let mut lost = false;
        while let Ok(frame) = events.try_recv() {
            if let ServerFrame::Event(ObserverEvent::CommandResult { command, status, .. }) = frame {
                if command == "LAND" && status == CommandStatus::ConnectionLost {
                    lost = true;
                }
            }
        }
        assert!(lost);
        h.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_supervisor() {
        let connector = MockConnector::new();
        let vehicle: MockVehicle = connector.push_link();
        vehicle.heartbeat(false, 4);
        let h = start(connector);
        wait_phase(&h.control, LinkState::Streaming).await;

        h.control.shutdown();
        timeout(Duration::from_secs(5), h.task)
            .await
            .expect("supervisor exits")
            .unwrap();
        assert_eq!(h.connector.live_links(), 0);
        assert!(!h.store.is_connected().await);
    }
}
