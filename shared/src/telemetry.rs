//! Canonical telemetry record
//!
//! One instance per session. Observers receive full copies of it as
//! snapshots; fields that the vehicle reports as "not available" are `None`
//! rather than zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::Severity;

/// Horizontal dilution reported while the receiver does not know it
pub const HDOP_UNKNOWN: f32 = 99.99;

/// Derived link status shown next to the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkHealth {
    #[default]
    NoLink,
    Connecting,
    Ok,
    /// Heartbeats arriving late (older than half the timeout)
    Stale,
    Lost,
}

/// GPS fix type (MAVLink GPS_FIX_TYPE)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GpsFix {
    #[default]
    NoGps,
    NoFix,
    Fix2d,
    Fix3d,
    Dgps,
    RtkFloat,
    RtkFixed,
    Static,
    Ppp,
}

impl GpsFix {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => GpsFix::NoFix,
            2 => GpsFix::Fix2d,
            3 => GpsFix::Fix3d,
            4 => GpsFix::Dgps,
            5 => GpsFix::RtkFloat,
            6 => GpsFix::RtkFixed,
            7 => GpsFix::Static,
            8 => GpsFix::Ppp,
            _ => GpsFix::NoGps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    /// Altitude above home (m)
    pub alt_rel: f32,
    /// Altitude above mean sea level (m)
    pub alt_msl: f32,
    /// Heading (deg, 0..360)
    pub heading: f32,
}

/// Attitude in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Attitude {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// NED velocity (m/s)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Battery {
    pub voltage: f32,
    pub current: Option<f32>,
    pub remaining: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsStatus {
    pub fix_type: GpsFix,
    pub satellites: Option<u8>,
    pub hdop: f32,
}

impl Default for GpsStatus {
    fn default() -> Self {
        Self {
            fix_type: GpsFix::NoGps,
            satellites: None,
            hdop: HDOP_UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomePosition {
    pub lat: f64,
    pub lon: f64,
    pub alt: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusText {
    pub text: String,
    pub severity: Severity,
    pub timestamp_ms: u64,
}

/// Heartbeat-level view of one system on the link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SystemRecord {
    pub component_id: u8,
    pub autopilot: u8,
    pub vehicle_type: u8,
    pub mode: String,
    pub armed: bool,
    pub system_status: u8,
    pub last_heartbeat_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryState {
    pub connected: bool,
    pub link_address: Option<String>,
    pub link_health: LinkHealth,
    pub armed: bool,
    pub mode: String,
    pub system_status: u8,
    pub position: Position,
    pub attitude: Attitude,
    pub velocity: Velocity,
    pub airspeed: f32,
    pub groundspeed: f32,
    pub battery: Battery,
    pub gps: GpsStatus,
    pub home: Option<HomePosition>,
    pub ekf_status: String,
    pub mission_seq: Option<u16>,
    pub last_status_text: Option<StatusText>,
    pub last_heartbeat_ms: Option<u64>,
    pub target_system: u8,
    pub target_component: u8,
    pub systems: BTreeMap<u8, SystemRecord>,
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self {
            connected: false,
            link_address: None,
            link_health: LinkHealth::NoLink,
            armed: false,
            mode: "UNKNOWN".to_string(),
            system_status: 0,
            position: Position::default(),
            attitude: Attitude::default(),
            velocity: Velocity::default(),
            airspeed: 0.0,
            groundspeed: 0.0,
            battery: Battery::default(),
            gps: GpsStatus::default(),
            home: None,
            ekf_status: "EKF INIT".to_string(),
            mission_seq: None,
            last_status_text: None,
            last_heartbeat_ms: None,
            target_system: 0,
            target_component: 0,
            systems: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unknown() {
        let state = TelemetryState::default();
        assert!(!state.connected);
        assert_eq!(state.mode, "UNKNOWN");
        assert_eq!(state.gps.hdop, HDOP_UNKNOWN);
        assert!(state.home.is_none());
        assert!(state.battery.current.is_none());
        assert!(state.battery.remaining.is_none());
        assert_eq!(state.link_health, LinkHealth::NoLink);
    }

    #[test]
    fn test_gps_fix_codes() {
        assert_eq!(GpsFix::from_code(3), GpsFix::Fix3d);
        assert_eq!(GpsFix::from_code(6), GpsFix::RtkFixed);
        assert_eq!(GpsFix::from_code(200), GpsFix::NoGps);
    }

    #[test]
    fn test_absent_values_serialize_as_null() {
        let json = serde_json::to_value(TelemetryState::default()).unwrap();
        assert!(json["battery"]["current"].is_null());
        assert!(json["home"].is_null());
        assert_eq!(json["link_health"], "NO_LINK");
        assert_eq!(json["gps"]["fix_type"], "NO_GPS");
    }
}
