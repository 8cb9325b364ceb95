use gcs_shared::{ObserverEvent, SystemRecord, TelemetryState};
use mavlink::ardupilotmega::{MavMessage, MavModeFlag, MavType};
use tracing::info;

use crate::dispatch::modes::resolve_mode;
use crate::dispatch::{HandlerContext, MessageHandler};
use crate::link::Inbound;

/// Armed flag, flight mode and liveness of every system on the link.
/// The target system is mirrored into the top-level fields.
pub struct HeartbeatHandler;

impl MessageHandler for HeartbeatHandler {
    fn handle(&self, inbound: &Inbound, state: &mut TelemetryState, ctx: &mut HandlerContext) -> bool {
        let MavMessage::HEARTBEAT(hb) = &inbound.message else {
            return false;
        };
        // Other ground stations share the link; they are not vehicles
        if hb.mavtype == MavType::MAV_TYPE_GCS {
            return false;
        }

        let system_id = inbound.system_id();
        let armed = hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
        let mode = resolve_mode(hb.autopilot as u8, hb.base_mode.bits(), hb.custom_mode);
        let system_status = hb.system_status as u8;

        let mut changed = !state.systems.contains_key(&system_id);
        let record = state.systems.entry(system_id).or_insert_with(SystemRecord::default);
        if record.mode != mode || record.armed != armed || record.system_status != system_status {
            changed = true;
        }
        *record = SystemRecord {
            component_id: inbound.component_id(),
            autopilot: hb.autopilot as u8,
            vehicle_type: hb.mavtype as u8,
            mode: mode.clone(),
            armed,
            system_status,
            last_heartbeat_ms: ctx.now_ms,
        };

        if system_id == ctx.target.system {
            if state.armed != armed {
                info!(
                    "[DISPATCH] Vehicle {}",
                    if armed { "ARMED" } else { "DISARMED" }
                );
                changed = true;
            }
            if state.mode != mode {
                info!("[DISPATCH] Mode {} -> {}", state.mode, mode);
                changed = true;
            }
            if state.system_status != system_status {
                changed = true;
            }
            state.armed = armed;
            state.mode = mode;
            state.system_status = system_status;
            // Timestamp refresh alone does not dirty the state
            state.last_heartbeat_ms = Some(ctx.now_ms);
        }

        ctx.notify(ObserverEvent::HeartbeatReceived { system_id });
        changed
    }
}
