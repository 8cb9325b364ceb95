//! Outbound MAVLink message builders
//!
//! Everything the bridge sends to the vehicle is assembled here.

use mavlink::ardupilotmega::{
    MavAutopilot, MavCmd, MavFrame, MavMessage, MavMissionResult, MavMissionType, MavModeFlag,
    MavState, MavType, COMMAND_INT_DATA, COMMAND_LONG_DATA, HEARTBEAT_DATA, MISSION_ACK_DATA,
    MISSION_CLEAR_ALL_DATA, MISSION_REQUEST_INT_DATA, MISSION_REQUEST_LIST_DATA,
};

/// MAVLink message ids used in stream configuration
pub mod message_id {
    pub const HEARTBEAT: u32 = 0;
    pub const SYS_STATUS: u32 = 1;
    pub const GPS_RAW_INT: u32 = 24;
    pub const ATTITUDE: u32 = 30;
    pub const GLOBAL_POSITION_INT: u32 = 33;
    pub const MISSION_CURRENT: u32 = 42;
    pub const VFR_HUD: u32 = 74;
    pub const HOME_POSITION: u32 = 242;
}

/// Addressing of the vehicle a message is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetIds {
    pub system: u8,
    pub component: u8,
}

impl TargetIds {
    pub fn new(system: u8, component: u8) -> Self {
        Self { system, component }
    }
}

/// Item list kinds the vehicle can hand out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissionKind {
    Mission,
    Fence,
}

impl MissionKind {
    pub fn to_mav(self) -> MavMissionType {
        match self {
            MissionKind::Mission => MavMissionType::MAV_MISSION_TYPE_MISSION,
            MissionKind::Fence => MavMissionType::MAV_MISSION_TYPE_FENCE,
        }
    }

    pub fn from_mav(mission_type: MavMissionType) -> Option<Self> {
        match mission_type {
            MavMissionType::MAV_MISSION_TYPE_MISSION => Some(MissionKind::Mission),
            MavMissionType::MAV_MISSION_TYPE_FENCE => Some(MissionKind::Fence),
            _ => None,
        }
    }

    /// Observer command that starts a download of this kind
    pub fn request_label(self) -> &'static str {
        match self {
            MissionKind::Mission => "REQUEST_MISSION",
            MissionKind::Fence => "REQUEST_FENCE",
        }
    }
}

/// COMMAND_LONG with all seven parameters
pub fn command_long(target: TargetIds, command: MavCmd, params: [f32; 7]) -> MavMessage {
    MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
        target_system: target.system,
        target_component: target.component,
        command,
        confirmation: 0,
        param1: params[0],
        param2: params[1],
        param3: params[2],
        param4: params[3],
        param5: params[4],
        param6: params[5],
        param7: params[6],
    })
}

/// COMMAND_INT carrying a global position (degrees, metres)
pub fn command_int_global(
    target: TargetIds,
    command: MavCmd,
    params: [f32; 4],
    lat: f64,
    lon: f64,
    alt: f32,
) -> MavMessage {
    MavMessage::COMMAND_INT(COMMAND_INT_DATA {
        target_system: target.system,
        target_component: target.component,
        frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
        command,
        current: 0,
        autocontinue: 0,
        param1: params[0],
        param2: params[1],
        param3: params[2],
        param4: params[3],
        x: (lat * 1e7).round() as i32,
        y: (lon * 1e7).round() as i32,
        z: alt,
        ..Default::default()
    })
}

/// SET_MESSAGE_INTERVAL; a non-positive rate disables the message
pub fn set_message_interval(target: TargetIds, message_id: u32, rate_hz: f32) -> MavMessage {
    let interval_us = if rate_hz > 0.0 {
        (1_000_000.0 / rate_hz).round()
    } else {
        -1.0
    };
    command_long(
        target,
        MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
        [message_id as f32, interval_us, 0.0, 0.0, 0.0, 0.0, 0.0],
    )
}

/// REQUEST_MESSAGE for a one-off copy of `message_id`
pub fn request_message(target: TargetIds, message_id: u32) -> MavMessage {
    command_long(
        target,
        MavCmd::MAV_CMD_REQUEST_MESSAGE,
        [message_id as f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    )
}

/// Data-stream subscription sent when a session starts streaming
pub fn stream_requests(target: TargetIds, rate_hz: f32, home_known: bool) -> Vec<MavMessage> {
    let mut requests = vec![
        set_message_interval(target, message_id::HEARTBEAT, 1.0),
        set_message_interval(target, message_id::SYS_STATUS, 1.0),
        set_message_interval(target, message_id::GPS_RAW_INT, 1.0),
        set_message_interval(target, message_id::GLOBAL_POSITION_INT, rate_hz),
        set_message_interval(target, message_id::ATTITUDE, rate_hz),
        set_message_interval(target, message_id::VFR_HUD, rate_hz),
        set_message_interval(target, message_id::MISSION_CURRENT, 1.0),
    ];
    if !home_known {
        requests.push(set_message_interval(target, message_id::HOME_POSITION, 0.2));
    }
    requests
}

/// Heartbeat identifying the bridge as a ground station
pub fn gcs_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

pub fn mission_request_list(target: TargetIds, kind: MissionKind) -> MavMessage {
    MavMessage::MISSION_REQUEST_LIST(MISSION_REQUEST_LIST_DATA {
        target_system: target.system,
        target_component: target.component,
        mission_type: kind.to_mav(),
        ..Default::default()
    })
}

pub fn mission_request_int(target: TargetIds, kind: MissionKind, seq: u16) -> MavMessage {
    MavMessage::MISSION_REQUEST_INT(MISSION_REQUEST_INT_DATA {
        seq,
        target_system: target.system,
        target_component: target.component,
        mission_type: kind.to_mav(),
        ..Default::default()
    })
}

/// Final MISSION_ACK closing a download
pub fn mission_ack(target: TargetIds, kind: MissionKind) -> MavMessage {
    MavMessage::MISSION_ACK(MISSION_ACK_DATA {
        target_system: target.system,
        target_component: target.component,
        mavtype: MavMissionResult::MAV_MISSION_ACCEPTED,
        mission_type: kind.to_mav(),
        ..Default::default()
    })
}

pub fn mission_clear_all(target: TargetIds) -> MavMessage {
    MavMessage::MISSION_CLEAR_ALL(MISSION_CLEAR_ALL_DATA {
        target_system: target.system,
        target_component: target.component,
        mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
        ..Default::default()
    })
}
