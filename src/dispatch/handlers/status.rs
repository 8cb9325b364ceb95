//! Battery, EKF, GPS, home position and status text

use gcs_shared::{
    GpsFix, HomePosition, ObserverEvent, Severity, StatusText, TelemetryState, HDOP_UNKNOWN,
};
use mavlink::ardupilotmega::MavMessage;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchAction, HandlerContext, MessageHandler};
use crate::link::Inbound;

// MAV_SYS_STATUS_SENSOR bits
const SENSOR_ANGULAR_RATE_CONTROL: u32 = 0x400;
const SENSOR_ATTITUDE_STABILIZATION: u32 = 0x800;

// ArduPilot packs the EKF_STATUS_FLAGS into the upper half of the health mask
const EKF_ATTITUDE: u32 = 1;
const EKF_VELOCITY_HORIZ: u32 = 2;
const EKF_VELOCITY_VERT: u32 = 4;
const EKF_POS_HORIZ_REL: u32 = 8;
const EKF_POS_HORIZ_ABS: u32 = 16;
const EKF_POS_VERT_ABS: u32 = 32;
const EKF_PRED_POS_HORIZ_REL: u32 = 256;

/// Summarize the estimator from SYS_STATUS sensor health
pub fn ekf_status_report(health: u32) -> &'static str {
    if health & SENSOR_ANGULAR_RATE_CONTROL == 0 {
        return "EKF INIT (Gyro)";
    }
    if health & SENSOR_ATTITUDE_STABILIZATION == 0 {
        return "EKF INIT (Att)";
    }
    let ekf = health >> 16;
    if ekf & EKF_ATTITUDE == 0 {
        return "EKF Bad Att";
    }
    if ekf & EKF_VELOCITY_HORIZ == 0 {
        return "EKF Bad Vel(H)";
    }
    if ekf & EKF_VELOCITY_VERT == 0 {
        return "EKF Bad Vel(V)";
    }
    if ekf & EKF_POS_HORIZ_ABS == 0 && ekf & EKF_POS_HORIZ_REL == 0 {
        return "EKF Bad Pos(H)";
    }
    if ekf & EKF_POS_VERT_ABS == 0 {
        return "EKF Bad Pos(V)";
    }
    if ekf & EKF_PRED_POS_HORIZ_REL == 0 {
        return "EKF Variance (H)";
    }
    "EKF OK"
}

pub struct SysStatusHandler;

impl MessageHandler for SysStatusHandler {
    fn handle(&self, inbound: &Inbound, state: &mut TelemetryState, _ctx: &mut HandlerContext) -> bool {
        let MavMessage::SYS_STATUS(sys) = &inbound.message else {
            return false;
        };
        let before = (state.battery, state.ekf_status.clone());

        if sys.voltage_battery != u16::MAX {
            state.battery.voltage = sys.voltage_battery as f32 / 1000.0;
        }
        state.battery.current = (sys.current_battery >= 0).then(|| sys.current_battery as f32 / 100.0);
        state.battery.remaining = (sys.battery_remaining >= 0).then(|| sys.battery_remaining as u8);

        let report = ekf_status_report(sys.onboard_control_sensors_health.bits());
        if state.ekf_status != report {
            debug!("[DISPATCH] {} -> {}", state.ekf_status, report);
            state.ekf_status = report.to_string();
        }

        before != (state.battery, state.ekf_status.clone())
    }
}

pub struct GpsRawHandler;

impl MessageHandler for GpsRawHandler {
    fn handle(&self, inbound: &Inbound, state: &mut TelemetryState, _ctx: &mut HandlerContext) -> bool {
        let MavMessage::GPS_RAW_INT(gps) = &inbound.message else {
            return false;
        };
        let before = state.gps;

        state.gps.fix_type = GpsFix::from_code(gps.fix_type as u8);
        state.gps.satellites = (gps.satellites_visible != u8::MAX).then_some(gps.satellites_visible);
        state.gps.hdop = if gps.eph == u16::MAX {
            HDOP_UNKNOWN
        } else {
            gps.eph as f32 / 100.0
        };

        before != state.gps
    }
}

/// Records home once; the supervisor then stops the home stream
pub struct HomePositionHandler;

impl MessageHandler for HomePositionHandler {
    fn handle(&self, inbound: &Inbound, state: &mut TelemetryState, ctx: &mut HandlerContext) -> bool {
        let MavMessage::HOME_POSITION(home) = &inbound.message else {
            return false;
        };
        if state.home.is_some() {
            return false;
        }

        let home = HomePosition {
            lat: home.latitude as f64 / 1e7,
            lon: home.longitude as f64 / 1e7,
            alt: home.altitude as f32 / 1000.0,
        };
        info!(
            "[DISPATCH] Home position {:.7}, {:.7} @ {:.1}m",
            home.lat, home.lon, home.alt
        );
        state.home = Some(home);
        ctx.push(DispatchAction::HomeKnown);
        true
    }
}

/// Free text from the vehicle, surfaced to observers as it arrives
pub struct StatusTextHandler;

impl MessageHandler for StatusTextHandler {
    fn handle(&self, inbound: &Inbound, state: &mut TelemetryState, ctx: &mut HandlerContext) -> bool {
        let MavMessage::STATUSTEXT(status) = &inbound.message else {
            return false;
        };
        let text = String::from_utf8_lossy(&status.text)
            .trim_end_matches('\0')
            .trim()
            .to_string();
        if text.is_empty() {
            return false;
        }

        let severity = Severity::from_mav(status.severity as u8);
        match severity {
            Severity::Error => warn!("[DISPATCH] Vehicle: {}", text),
            Severity::Debug => {
                debug!("[DISPATCH] Vehicle: {}", text);
                return false;
            }
            _ => info!("[DISPATCH] Vehicle: {}", text),
        }

        state.last_status_text = Some(StatusText {
            text: text.clone(),
            severity,
            timestamp_ms: ctx.now_ms,
        });
        ctx.notify(ObserverEvent::status_message(text, severity));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handlers::testing::run;
    use mavlink::ardupilotmega::{
        GpsFixType, MavSeverity, MavSysStatusSensor, GPS_RAW_INT_DATA, HOME_POSITION_DATA,
        STATUSTEXT_DATA, SYS_STATUS_DATA,
    };

    const HEALTHY: u32 = SENSOR_ANGULAR_RATE_CONTROL
        | SENSOR_ATTITUDE_STABILIZATION
        | ((EKF_ATTITUDE
            | EKF_VELOCITY_HORIZ
            | EKF_VELOCITY_VERT
            | EKF_POS_HORIZ_ABS
            | EKF_POS_VERT_ABS
            | EKF_PRED_POS_HORIZ_REL)
            << 16);

    fn sys_status(voltage: u16, current: i16, remaining: i8) -> MavMessage {
        MavMessage::SYS_STATUS(SYS_STATUS_DATA {
            onboard_control_sensors_health: MavSysStatusSensor::from_bits_truncate(HEALTHY),
            voltage_battery: voltage,
            current_battery: current,
            battery_remaining: remaining,
            ..Default::default()
        })
    }

    fn status_text(text: &str, severity: MavSeverity) -> MavMessage {
        let mut buf = [0u8; 50];
        buf[..text.len()].copy_from_slice(text.as_bytes());
        MavMessage::STATUSTEXT(STATUSTEXT_DATA {
            severity,
            text: buf,
            ..Default::default()
        })
    }

    #[test]
    fn test_ekf_report_order() {
        assert_eq!(ekf_status_report(0), "EKF INIT (Gyro)");
        assert_eq!(ekf_status_report(SENSOR_ANGULAR_RATE_CONTROL), "EKF INIT (Att)");
        assert_eq!(ekf_status_report(HEALTHY), "EKF OK");
        assert_eq!(
            ekf_status_report(HEALTHY & !(EKF_VELOCITY_VERT << 16)),
            "EKF Bad Vel(V)"
        );
        // Relative horizontal position is enough when absolute is missing
        let relative_only = (HEALTHY & !(EKF_POS_HORIZ_ABS << 16)) | (EKF_POS_HORIZ_REL << 16);
        assert_eq!(ekf_status_report(relative_only), "EKF OK");
        assert_eq!(
            ekf_status_report(HEALTHY & !(EKF_POS_HORIZ_ABS << 16)),
            "EKF Bad Pos(H)"
        );
    }

    #[test]
    fn test_battery_decoding() {
        let mut state = TelemetryState::default();
        let (changed, _) = run(&SysStatusHandler, &mut state, sys_status(12_600, 1_550, 87));

        assert!(changed);
        assert!((state.battery.voltage - 12.6).abs() < 1e-4);
        assert_eq!(state.battery.current, Some(15.5));
        assert_eq!(state.battery.remaining, Some(87));
        assert_eq!(state.ekf_status, "EKF OK");
    }

    #[test]
    fn test_battery_sentinels_are_absent_not_zero() {
        let mut state = TelemetryState::default();
        run(&SysStatusHandler, &mut state, sys_status(12_000, 100, 50));
        run(&SysStatusHandler, &mut state, sys_status(u16::MAX, -1, -1));

        assert!((state.battery.voltage - 12.0).abs() < 1e-4);
        assert_eq!(state.battery.current, None);
        assert_eq!(state.battery.remaining, None);
    }

    #[test]
    fn test_gps_sentinels() {
        let mut state = TelemetryState::default();
        let gps = |satellites_visible: u8, eph: u16| {
            MavMessage::GPS_RAW_INT(GPS_RAW_INT_DATA {
                fix_type: GpsFixType::GPS_FIX_TYPE_3D_FIX,
                satellites_visible,
                eph,
                ..Default::default()
            })
        };

        run(&GpsRawHandler, &mut state, gps(14, 87));
        assert_eq!(state.gps.fix_type, GpsFix::Fix3d);
        assert_eq!(state.gps.satellites, Some(14));
        assert!((state.gps.hdop - 0.87).abs() < 1e-4);

        run(&GpsRawHandler, &mut state, gps(u8::MAX, u16::MAX));
        assert_eq!(state.gps.satellites, None);
        assert_eq!(state.gps.hdop, HDOP_UNKNOWN);
    }

    #[test]
    fn test_home_recorded_once() {
        let mut state = TelemetryState::default();
        let home = |latitude: i32| {
            MavMessage::HOME_POSITION(HOME_POSITION_DATA {
                latitude,
                longitude: 85_455_940,
                altitude: 488_000,
                ..Default::default()
            })
        };

        let (changed, ctx) = run(&HomePositionHandler, &mut state, home(473_977_420));
        assert!(changed);
        assert_eq!(ctx.into_actions(), vec![DispatchAction::HomeKnown]);
        let recorded = state.home.expect("home");
        assert!((recorded.lat - 47.397742).abs() < 1e-9);
        assert!((recorded.alt - 488.0).abs() < 1e-3);

        let (changed, ctx) = run(&HomePositionHandler, &mut state, home(0));
        assert!(!changed);
        assert!(ctx.actions().is_empty());
        assert!((state.home.unwrap().lat - 47.397742).abs() < 1e-9);
    }

    #[test]
    fn test_status_text_notifies_observers() {
        let mut state = TelemetryState::default();
        let (changed, ctx) = run(
            &StatusTextHandler,
            &mut state,
            status_text("PreArm: Need 3D Fix", MavSeverity::MAV_SEVERITY_CRITICAL),
        );

        assert!(changed);
        assert_eq!(
            ctx.into_actions(),
            vec![DispatchAction::Notify(ObserverEvent::status_message(
                "PreArm: Need 3D Fix",
                Severity::Error
            ))]
        );
        assert_eq!(state.last_status_text.unwrap().text, "PreArm: Need 3D Fix");
    }

    #[test]
    fn test_debug_text_is_not_surfaced() {
        let mut state = TelemetryState::default();
        let (changed, ctx) = run(
            &StatusTextHandler,
            &mut state,
            status_text("EKF3 IMU0 tilt", MavSeverity::MAV_SEVERITY_DEBUG),
        );
        assert!(!changed);
        assert!(ctx.actions().is_empty());
        assert!(state.last_status_text.is_none());
    }
}
