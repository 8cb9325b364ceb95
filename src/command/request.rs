//! Observer command parsing and validation
//!
//! Every request is checked here before anything touches the link; a
//! request that fails validation never produces traffic or a pending entry.

use gcs_shared::CommandRequest;
use mavlink::ardupilotmega::{MavCmd, MavModeFlag};
use serde_json::Value;
use thiserror::Error;

use super::gateway::Outbound;
use super::tracker::{CommandKey, CommandMeta};
use crate::dispatch::modes::ArduPilotMode;
use crate::link::encode::{self, message_id};
use crate::link::{MissionKind, TargetIds};

pub const MAX_TAKEOFF_ALT: f32 = 1000.0;
pub const MIN_GOTO_ALT: f32 = -100.0;
pub const MAX_GOTO_ALT: f32 = 5000.0;

/// DO_REPOSITION flag: switch to guided mode if needed
const REPOSITION_CHANGE_MODE: f32 = 1.0;

/// Synchronous command submission failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Not connected to vehicle")]
    NotConnected,

    #[error("Target system id is 0 (broadcast), refusing to send")]
    BroadcastTarget,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Unknown flight mode: {0}")]
    UnknownMode(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParam { name: &'static str, reason: String },

    #[error("Cannot arm while in RTL mode")]
    ArmInRtl,

    #[error("Command queue full, try again")]
    QueueFull,
}

fn invalid(name: &'static str, reason: impl Into<String>) -> CommandError {
    CommandError::InvalidParam {
        name,
        reason: reason.into(),
    }
}

/// A validated user-level command
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleCommand {
    Arm,
    Disarm,
    Takeoff { altitude: f32 },
    Land,
    ReturnToLaunch,
    SetMode(ArduPilotMode),
    Goto { lat: f64, lon: f64, alt: f32 },
    ClearMission,
    RequestHome,
    Download(MissionKind),
}

impl VehicleCommand {
    /// Parse and validate an observer request
    pub fn parse(request: &CommandRequest) -> Result<Self, CommandError> {
        let kind = request.kind.trim().to_ascii_uppercase();
        let command = match kind.as_str() {
            "ARM" => VehicleCommand::Arm,
            "DISARM" => VehicleCommand::Disarm,
            "TAKEOFF" => {
                let altitude = number(request, &["altitude", "alt"], "altitude")? as f32;
                if !(altitude > 0.0 && altitude <= MAX_TAKEOFF_ALT) {
                    return Err(invalid(
                        "altitude",
                        format!("{} outside (0, {}]", altitude, MAX_TAKEOFF_ALT),
                    ));
                }
                VehicleCommand::Takeoff { altitude }
            }
            "LAND" => VehicleCommand::Land,
            "RETURN_TO_LAUNCH" | "RTL" => VehicleCommand::ReturnToLaunch,
            "SET_MODE" => {
                let name = request
                    .param("mode")
                    .or_else(|| request.param("mode_name"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("mode", "missing"))?;
                let mode = ArduPilotMode::from_name(name)
                    .ok_or_else(|| CommandError::UnknownMode(name.to_string()))?;
                VehicleCommand::SetMode(mode)
            }
            "GOTO" => {
                let lat = number(request, &["lat", "latitude"], "lat")?;
                let lon = number(request, &["lon", "longitude"], "lon")?;
                let alt = number(request, &["alt", "altitude"], "alt")? as f32;
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(invalid("lat", format!("{} outside [-90, 90]", lat)));
                }
                if !(-180.0..=180.0).contains(&lon) {
                    return Err(invalid("lon", format!("{} outside [-180, 180]", lon)));
                }
                if !(MIN_GOTO_ALT..=MAX_GOTO_ALT).contains(&alt) {
                    return Err(invalid(
                        "alt",
                        format!("{} outside [{}, {}]", alt, MIN_GOTO_ALT, MAX_GOTO_ALT),
                    ));
                }
                VehicleCommand::Goto { lat, lon, alt }
            }
            "CLEAR_MISSION" => VehicleCommand::ClearMission,
            "REQUEST_HOME" => VehicleCommand::RequestHome,
            "REQUEST_MISSION" => VehicleCommand::Download(MissionKind::Mission),
            "REQUEST_FENCE" => VehicleCommand::Download(MissionKind::Fence),
            _ => return Err(CommandError::UnknownCommand(request.kind.clone())),
        };
        Ok(command)
    }

    /// Tracker key, or `None` for commands that are never tracked
    pub fn key(&self) -> Option<CommandKey> {
        let cmd = match self {
            VehicleCommand::Arm | VehicleCommand::Disarm => MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            VehicleCommand::Takeoff { .. } => MavCmd::MAV_CMD_NAV_TAKEOFF,
            VehicleCommand::Land => MavCmd::MAV_CMD_NAV_LAND,
            VehicleCommand::ReturnToLaunch => MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH,
            VehicleCommand::SetMode(_) => MavCmd::MAV_CMD_DO_SET_MODE,
            VehicleCommand::Goto { .. } => MavCmd::MAV_CMD_DO_REPOSITION,
            VehicleCommand::ClearMission => return Some(CommandKey::MissionClear),
            VehicleCommand::RequestHome | VehicleCommand::Download(_) => return None,
        };
        Some(CommandKey::of(cmd))
    }

    pub fn label(&self) -> &'static str {
        match self {
            VehicleCommand::Arm => "ARM",
            VehicleCommand::Disarm => "DISARM",
            VehicleCommand::Takeoff { .. } => "TAKEOFF",
            VehicleCommand::Land => "LAND",
            VehicleCommand::ReturnToLaunch => "RETURN_TO_LAUNCH",
            VehicleCommand::SetMode(_) => "SET_MODE",
            VehicleCommand::Goto { .. } => "GOTO",
            VehicleCommand::ClearMission => "CLEAR_MISSION",
            VehicleCommand::RequestHome => "REQUEST_HOME",
            VehicleCommand::Download(kind) => kind.request_label(),
        }
    }

    pub fn meta(&self) -> CommandMeta {
        match self {
            VehicleCommand::Arm => CommandMeta::Arm(true),
            VehicleCommand::Disarm => CommandMeta::Arm(false),
            VehicleCommand::Takeoff { altitude } => CommandMeta::Takeoff {
                altitude: *altitude,
            },
            VehicleCommand::SetMode(mode) => CommandMeta::Mode {
                name: mode.name().to_string(),
                custom_mode: mode.custom_mode(),
            },
            VehicleCommand::Goto { lat, lon, alt } => CommandMeta::Goto {
                lat: *lat,
                lon: *lon,
                alt: *alt,
            },
            _ => CommandMeta::None,
        }
    }

    /// What the supervisor has to put on the link for this command
    pub fn encode(&self, target: TargetIds) -> Outbound {
        let message = match self {
            VehicleCommand::Arm => arm_disarm(target, true),
            VehicleCommand::Disarm => arm_disarm(target, false),
            VehicleCommand::Takeoff { altitude } => encode::command_long(
                target,
                MavCmd::MAV_CMD_NAV_TAKEOFF,
                [0.0, 0.0, 0.0, f32::NAN, 0.0, 0.0, *altitude],
            ),
            VehicleCommand::Land => {
                encode::command_long(target, MavCmd::MAV_CMD_NAV_LAND, [0.0; 7])
            }
            VehicleCommand::ReturnToLaunch => {
                encode::command_long(target, MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH, [0.0; 7])
            }
            VehicleCommand::SetMode(mode) => encode::command_long(
                target,
                MavCmd::MAV_CMD_DO_SET_MODE,
                [
                    MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32,
                    mode.custom_mode() as f32,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                ],
            ),
            VehicleCommand::Goto { lat, lon, alt } => encode::command_int_global(
                target,
                MavCmd::MAV_CMD_DO_REPOSITION,
                [-1.0, REPOSITION_CHANGE_MODE, 0.0, f32::NAN],
                *lat,
                *lon,
                *alt,
            ),
            VehicleCommand::ClearMission => encode::mission_clear_all(target),
            VehicleCommand::RequestHome => {
                encode::request_message(target, message_id::HOME_POSITION)
            }
            VehicleCommand::Download(kind) => return Outbound::Download(*kind),
        };
        Outbound::Message(message)
    }
}

fn arm_disarm(target: TargetIds, arm: bool) -> mavlink::ardupilotmega::MavMessage {
    let param1 = if arm { 1.0 } else { 0.0 };
    encode::command_long(
        target,
        MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
        [param1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    )
}

/// First of `names` present, as a finite number or numeric string
fn number(
    request: &CommandRequest,
    names: &[&str],
    label: &'static str,
) -> Result<f64, CommandError> {
    let value = names
        .iter()
        .find_map(|name| request.param(name))
        .ok_or_else(|| invalid(label, "missing"))?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(label, format!("not a number: {}", value))),
    }
}
