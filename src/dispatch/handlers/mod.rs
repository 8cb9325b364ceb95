//! Per-message handlers

mod command_ack;
mod heartbeat;
mod mission;
mod motion;
mod status;

pub use command_ack::CommandAckHandler;
pub use heartbeat::HeartbeatHandler;
pub use mission::{MissionAckHandler, MissionCountHandler, MissionCurrentHandler, MissionItemHandler};
pub use motion::{AttitudeHandler, GlobalPositionHandler, VfrHudHandler};
pub use status::{GpsRawHandler, HomePositionHandler, StatusTextHandler, SysStatusHandler};

use super::{Dispatcher, MessageKind};

pub(super) fn register_all(dispatcher: &mut Dispatcher) {
    dispatcher.register(MessageKind::Heartbeat, Box::new(HeartbeatHandler));
    dispatcher.register(MessageKind::GlobalPosition, Box::new(GlobalPositionHandler));
    dispatcher.register(MessageKind::Attitude, Box::new(AttitudeHandler));
    dispatcher.register(MessageKind::VfrHud, Box::new(VfrHudHandler));
    dispatcher.register(MessageKind::SysStatus, Box::new(SysStatusHandler));
    dispatcher.register(MessageKind::GpsRaw, Box::new(GpsRawHandler));
    dispatcher.register(MessageKind::HomePosition, Box::new(HomePositionHandler));
    dispatcher.register(MessageKind::StatusText, Box::new(StatusTextHandler));
    dispatcher.register(MessageKind::CommandAck, Box::new(CommandAckHandler));
    dispatcher.register(MessageKind::MissionCurrent, Box::new(MissionCurrentHandler));
    dispatcher.register(MessageKind::MissionCount, Box::new(MissionCountHandler));
    dispatcher.register(MessageKind::MissionItem, Box::new(MissionItemHandler));
    dispatcher.register(MessageKind::MissionAck, Box::new(MissionAckHandler));
}
