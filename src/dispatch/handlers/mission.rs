//! Mission progress and the item-download exchange

use gcs_shared::{TelemetryState, Waypoint};
use mavlink::ardupilotmega::{MavMessage, MavMissionResult};
use tracing::debug;

use crate::dispatch::{DispatchAction, HandlerContext, MessageHandler};
use crate::link::{Inbound, MissionKind};

/// Active mission item
pub struct MissionCurrentHandler;

impl MessageHandler for MissionCurrentHandler {
    fn handle(&self, inbound: &Inbound, state: &mut TelemetryState, _ctx: &mut HandlerContext) -> bool {
        let MavMessage::MISSION_CURRENT(current) = &inbound.message else {
            return false;
        };
        if state.mission_seq == Some(current.seq) {
            return false;
        }
        state.mission_seq = Some(current.seq);
        true
    }
}

pub struct MissionCountHandler;

impl MessageHandler for MissionCountHandler {
    fn handle(&self, inbound: &Inbound, _state: &mut TelemetryState, ctx: &mut HandlerContext) -> bool {
        let MavMessage::MISSION_COUNT(count) = &inbound.message else {
            return false;
        };
        match MissionKind::from_mav(count.mission_type) {
            Some(kind) => ctx.push(DispatchAction::MissionCount {
                kind,
                count: count.count,
            }),
            None => debug!("[DISPATCH] MISSION_COUNT for {:?} ignored", count.mission_type),
        }
        false
    }
}

pub struct MissionItemHandler;

impl MessageHandler for MissionItemHandler {
    fn handle(&self, inbound: &Inbound, _state: &mut TelemetryState, ctx: &mut HandlerContext) -> bool {
        let MavMessage::MISSION_ITEM_INT(item) = &inbound.message else {
            return false;
        };
        let Some(kind) = MissionKind::from_mav(item.mission_type) else {
            return false;
        };
        ctx.push(DispatchAction::MissionItem {
            kind,
            item: Waypoint {
                seq: item.seq,
                command: item.command as u32,
                frame: item.frame as u8,
                lat: item.x as f64 / 1e7,
                lon: item.y as f64 / 1e7,
                alt: item.z,
                params: [item.param1, item.param2, item.param3, item.param4],
            },
        });
        false
    }
}

/// MISSION_ACK answers both MISSION_CLEAR_ALL and an aborted download
pub struct MissionAckHandler;

impl MessageHandler for MissionAckHandler {
    fn handle(&self, inbound: &Inbound, _state: &mut TelemetryState, ctx: &mut HandlerContext) -> bool {
        let MavMessage::MISSION_ACK(ack) = &inbound.message else {
            return false;
        };
        ctx.push(DispatchAction::MissionAck {
            kind: MissionKind::from_mav(ack.mission_type),
            accepted: ack.mavtype == MavMissionResult::MAV_MISSION_ACCEPTED,
            code: ack.mavtype as u8,
        });
        false
    }
}
