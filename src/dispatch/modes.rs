//! Flight-mode naming
//!
//! Resolution order for heartbeats: the ArduPilot copter table when the
//! autopilot is ArduPilot or the custom-mode flag is set, then a decode of
//! the generic base-mode flags, then `UNKNOWN(n)`.

/// MAV_MODE_FLAG bits
const FLAG_CUSTOM_MODE_ENABLED: u8 = 0x01;
const FLAG_AUTO_ENABLED: u8 = 0x04;
const FLAG_GUIDED_ENABLED: u8 = 0x08;
const FLAG_STABILIZE_ENABLED: u8 = 0x10;
const FLAG_MANUAL_INPUT_ENABLED: u8 = 0x40;

/// MAV_AUTOPILOT_ARDUPILOTMEGA
const AUTOPILOT_ARDUPILOT: u8 = 3;

/// ArduPilot copter flight modes (custom_mode values)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ArduPilotMode {
    Stabilize = 0,
    Acro = 1,
    AltHold = 2,
    Auto = 3,
    Guided = 4,
    Loiter = 5,
    Rtl = 6,
    Circle = 7,
    Land = 9,
    Drift = 11,
    Sport = 13,
    Flip = 14,
    AutoTune = 15,
    PosHold = 16,
    Brake = 17,
    Throw = 18,
    AvoidAdsb = 19,
    GuidedNoGps = 20,
    SmartRtl = 21,
    FlowHold = 22,
    Follow = 23,
    ZigZag = 24,
    SystemId = 25,
    AutoRotate = 26,
    AutoRtl = 27,
}

const ALL_MODES: [ArduPilotMode; 25] = [
    ArduPilotMode::Stabilize,
    ArduPilotMode::Acro,
    ArduPilotMode::AltHold,
    ArduPilotMode::Auto,
    ArduPilotMode::Guided,
    ArduPilotMode::Loiter,
    ArduPilotMode::Rtl,
    ArduPilotMode::Circle,
    ArduPilotMode::Land,
    ArduPilotMode::Drift,
    ArduPilotMode::Sport,
    ArduPilotMode::Flip,
    ArduPilotMode::AutoTune,
    ArduPilotMode::PosHold,
    ArduPilotMode::Brake,
    ArduPilotMode::Throw,
    ArduPilotMode::AvoidAdsb,
    ArduPilotMode::GuidedNoGps,
    ArduPilotMode::SmartRtl,
    ArduPilotMode::FlowHold,
    ArduPilotMode::Follow,
    ArduPilotMode::ZigZag,
    ArduPilotMode::SystemId,
    ArduPilotMode::AutoRotate,
    ArduPilotMode::AutoRtl,
];

impl ArduPilotMode {
    pub fn custom_mode(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            ArduPilotMode::Stabilize => "STABILIZE",
            ArduPilotMode::Acro => "ACRO",
            ArduPilotMode::AltHold => "ALT_HOLD",
            ArduPilotMode::Auto => "AUTO",
            ArduPilotMode::Guided => "GUIDED",
            ArduPilotMode::Loiter => "LOITER",
            ArduPilotMode::Rtl => "RTL",
            ArduPilotMode::Circle => "CIRCLE",
            ArduPilotMode::Land => "LAND",
            ArduPilotMode::Drift => "DRIFT",
            ArduPilotMode::Sport => "SPORT",
            ArduPilotMode::Flip => "FLIP",
            ArduPilotMode::AutoTune => "AUTOTUNE",
            ArduPilotMode::PosHold => "POSHOLD",
            ArduPilotMode::Brake => "BRAKE",
            ArduPilotMode::Throw => "THROW",
            ArduPilotMode::AvoidAdsb => "AVOID_ADSB",
            ArduPilotMode::GuidedNoGps => "GUIDED_NOGPS",
            ArduPilotMode::SmartRtl => "SMART_RTL",
            ArduPilotMode::FlowHold => "FLOWHOLD",
            ArduPilotMode::Follow => "FOLLOW",
            ArduPilotMode::ZigZag => "ZIGZAG",
            ArduPilotMode::SystemId => "SYSTEMID",
            ArduPilotMode::AutoRotate => "AUTOROTATE",
            ArduPilotMode::AutoRtl => "AUTO_RTL",
        }
    }

    pub fn from_custom_mode(custom_mode: u32) -> Option<Self> {
        ALL_MODES.into_iter().find(|m| m.custom_mode() == custom_mode)
    }

    /// Look up a mode by name, case-insensitive; `POS_HOLD` is accepted too
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_uppercase();
        let wanted = if wanted == "POS_HOLD" { "POSHOLD".to_string() } else { wanted };
        ALL_MODES.into_iter().find(|m| m.name() == wanted)
    }
}

/// Mode name from the generic base-mode flags
fn generic_mode(base_mode: u8) -> Option<&'static str> {
    if base_mode & FLAG_AUTO_ENABLED != 0 {
        Some("AUTO")
    } else if base_mode & FLAG_GUIDED_ENABLED != 0 {
        Some("GUIDED")
    } else if base_mode & FLAG_STABILIZE_ENABLED != 0 {
        Some("STABILIZE")
    } else if base_mode & FLAG_MANUAL_INPUT_ENABLED != 0 {
        Some("MANUAL")
    } else {
        None
    }
}

/// Human-readable flight mode of a heartbeat
pub fn resolve_mode(autopilot: u8, base_mode: u8, custom_mode: u32) -> String {
    let firmware_specific =
        autopilot == AUTOPILOT_ARDUPILOT || base_mode & FLAG_CUSTOM_MODE_ENABLED != 0;
    if firmware_specific {
        if let Some(mode) = ArduPilotMode::from_custom_mode(custom_mode) {
            return mode.name().to_string();
        }
    }
    if let Some(name) = generic_mode(base_mode) {
        return name.to_string();
    }
    format!("UNKNOWN({})", custom_mode)
}
