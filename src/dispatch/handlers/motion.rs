//! Position, attitude and air data

use gcs_shared::TelemetryState;
use mavlink::ardupilotmega::MavMessage;

use crate::dispatch::{HandlerContext, MessageHandler};
use crate::link::Inbound;

/// GLOBAL_POSITION_INT heading when unknown
const HEADING_UNKNOWN: u16 = u16::MAX;

/// Overwrite `field` unless the vehicle sent NaN/inf
fn set_finite(field: &mut f32, value: f32) {
    if value.is_finite() {
        *field = value;
    }
}

pub struct GlobalPositionHandler;

impl MessageHandler for GlobalPositionHandler {
    fn handle(&self, inbound: &Inbound, state: &mut TelemetryState, _ctx: &mut HandlerContext) -> bool {
        let MavMessage::GLOBAL_POSITION_INT(pos) = &inbound.message else {
            return false;
        };
        let before = (state.position, state.velocity, state.groundspeed);

        state.position.lat = pos.lat as f64 / 1e7;
        state.position.lon = pos.lon as f64 / 1e7;
        state.position.alt_msl = pos.alt as f32 / 1000.0;
        state.position.alt_rel = pos.relative_alt as f32 / 1000.0;
        if pos.hdg != HEADING_UNKNOWN {
            state.position.heading = pos.hdg as f32 / 100.0;
        }

        state.velocity.vx = pos.vx as f32 / 100.0;
        state.velocity.vy = pos.vy as f32 / 100.0;
        state.velocity.vz = pos.vz as f32 / 100.0;
        state.groundspeed = state.velocity.vx.hypot(state.velocity.vy);

        before != (state.position, state.velocity, state.groundspeed)
    }
}

pub struct AttitudeHandler;

impl MessageHandler for AttitudeHandler {
    fn handle(&self, inbound: &Inbound, state: &mut TelemetryState, _ctx: &mut HandlerContext) -> bool {
        let MavMessage::ATTITUDE(att) = &inbound.message else {
            return false;
        };
        let before = state.attitude;

        set_finite(&mut state.attitude.roll, att.roll.to_degrees());
        set_finite(&mut state.attitude.pitch, att.pitch.to_degrees());
        set_finite(&mut state.attitude.yaw, att.yaw.to_degrees());

        before != state.attitude
    }
}

pub struct VfrHudHandler;

impl MessageHandler for VfrHudHandler {
    fn handle(&self, inbound: &Inbound, state: &mut TelemetryState, _ctx: &mut HandlerContext) -> bool {
        let MavMessage::VFR_HUD(hud) = &inbound.message else {
            return false;
        };
        let before = (
            state.airspeed,
            state.groundspeed,
            state.position.alt_msl,
            state.position.heading,
        );

        set_finite(&mut state.airspeed, hud.airspeed);
        set_finite(&mut state.groundspeed, hud.groundspeed);
        set_finite(&mut state.position.alt_msl, hud.alt);
        // Compass heading in whole degrees; anything outside 0..360 is bogus
        if (0..360).contains(&hud.heading) {
            state.position.heading = hud.heading as f32;
        }

        before
            != (
                state.airspeed,
                state.groundspeed,
                state.position.alt_msl,
                state.position.heading,
            )
    }
}
