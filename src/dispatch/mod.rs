//! Message Dispatcher
//!
//! Maps inbound MAVLink message kinds to handlers. Each handler mutates the
//! telemetry state under the store lock and reports whether it changed
//! anything; side effects it cannot perform itself (notifying observers,
//! resolving commands, talking back to the vehicle) are queued on the
//! [`HandlerContext`] and carried out by the supervisor afterwards.

pub mod handlers;
pub mod modes;

use std::collections::HashMap;

use gcs_shared::{now_ms, ObserverEvent, TelemetryState, Waypoint};
use mavlink::ardupilotmega::MavMessage;
use tracing::trace;

use crate::command::{AckResult, CommandKey};
use crate::link::{Inbound, MissionKind, TargetIds};
use crate::telemetry::TelemetryStore;

/// Closed set of message kinds the bridge understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Heartbeat,
    GlobalPosition,
    Attitude,
    SysStatus,
    GpsRaw,
    VfrHud,
    HomePosition,
    StatusText,
    CommandAck,
    MissionCurrent,
    MissionCount,
    MissionItem,
    MissionAck,
    /// Anything else; never has a handler
    Other,
}

impl MessageKind {
    pub fn of(message: &MavMessage) -> Self {
        match message {
            MavMessage::HEARTBEAT(_) => MessageKind::Heartbeat,
            MavMessage::GLOBAL_POSITION_INT(_) => MessageKind::GlobalPosition,
            MavMessage::ATTITUDE(_) => MessageKind::Attitude,
            MavMessage::SYS_STATUS(_) => MessageKind::SysStatus,
            MavMessage::GPS_RAW_INT(_) => MessageKind::GpsRaw,
            MavMessage::VFR_HUD(_) => MessageKind::VfrHud,
            MavMessage::HOME_POSITION(_) => MessageKind::HomePosition,
            MavMessage::STATUSTEXT(_) => MessageKind::StatusText,
            MavMessage::COMMAND_ACK(_) => MessageKind::CommandAck,
            MavMessage::MISSION_CURRENT(_) => MessageKind::MissionCurrent,
            MavMessage::MISSION_COUNT(_) => MessageKind::MissionCount,
            MavMessage::MISSION_ITEM_INT(_) => MessageKind::MissionItem,
            MavMessage::MISSION_ACK(_) => MessageKind::MissionAck,
            _ => MessageKind::Other,
        }
    }
}

/// Work a handler asks the supervisor to do once the state lock is released
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchAction {
    Notify(ObserverEvent),
    CommandAck {
        key: CommandKey,
        label: String,
        result: AckResult,
    },
    /// Home position became known for the first time
    HomeKnown,
    MissionCount {
        kind: MissionKind,
        count: u16,
    },
    MissionItem {
        kind: MissionKind,
        item: Waypoint,
    },
    /// MISSION_ACK from the vehicle; `accepted` is MAV_MISSION_ACCEPTED
    MissionAck {
        kind: Option<MissionKind>,
        accepted: bool,
        code: u8,
    },
}

/// Link/session context handed to every handler
#[derive(Debug)]
pub struct HandlerContext {
    pub target: TargetIds,
    pub now_ms: u64,
    actions: Vec<DispatchAction>,
}

impl HandlerContext {
    pub fn new(target: TargetIds) -> Self {
        Self {
            target,
            now_ms: now_ms(),
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, action: DispatchAction) {
        self.actions.push(action);
    }

    pub fn notify(&mut self, event: ObserverEvent) {
        self.actions.push(DispatchAction::Notify(event));
    }

    #[cfg(test)]
    pub fn actions(&self) -> &[DispatchAction] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<DispatchAction> {
        self.actions
    }
}

/// One handler per message kind; must not block
pub trait MessageHandler: Send + Sync {
    fn handle(&self, inbound: &Inbound, state: &mut TelemetryState, ctx: &mut HandlerContext)
        -> bool;
}

/// Registration table of handlers
pub struct Dispatcher {
    handlers: HashMap<MessageKind, Box<dyn MessageHandler>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Dispatcher with every built-in handler registered
    pub fn new() -> Self {
        let mut dispatcher = Self::empty();
        handlers::register_all(&mut dispatcher);
        dispatcher
    }

    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: MessageKind, handler: Box<dyn MessageHandler>) {
        self.handlers.insert(kind, handler);
    }

    #[cfg(test)]
    pub fn handles(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Run the handler for `inbound`; returns whether the state changed.
    /// Messages without a handler, and non-heartbeat messages from systems
    /// other than the target, are ignored.
    pub async fn dispatch(
        &self,
        inbound: &Inbound,
        store: &TelemetryStore,
        ctx: &mut HandlerContext,
    ) -> bool {
        let kind = MessageKind::of(&inbound.message);
        let Some(handler) = self.handlers.get(&kind) else {
            return false;
        };
        if kind != MessageKind::Heartbeat && inbound.system_id() != ctx.target.system {
            trace!(
                "[DISPATCH] Ignoring {:?} from system {}",
                kind,
                inbound.system_id()
            );
            return false;
        }
        store
            .update(|state| handler.handle(inbound, state, ctx))
            .await
    }
}
