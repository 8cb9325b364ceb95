use gcs_shared::TelemetryState;
use mavlink::ardupilotmega::MavMessage;
use tracing::debug;

use crate::command::{command_name, AckResult, CommandKey};
use crate::dispatch::{DispatchAction, HandlerContext, MessageHandler};
use crate::link::Inbound;

/// Forwards COMMAND_ACK to the lifecycle tracker; never touches telemetry
pub struct CommandAckHandler;

impl MessageHandler for CommandAckHandler {
    fn handle(&self, inbound: &Inbound, _state: &mut TelemetryState, ctx: &mut HandlerContext) -> bool {
        let MavMessage::COMMAND_ACK(ack) = &inbound.message else {
            return false;
        };
        let result = AckResult::from_code(ack.result as u8);
        debug!("[DISPATCH] COMMAND_ACK {:?} -> {:?}", ack.command, result);

        ctx.push(DispatchAction::CommandAck {
            key: CommandKey::of(ack.command),
            label: command_name(ack.command),
            result,
        });
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handlers::testing::run;
    use mavlink::ardupilotmega::{MavCmd, MavResult, COMMAND_ACK_DATA};

    #[test]
    fn test_ack_becomes_action() {
        let mut state = TelemetryState::default();
        let ack = MavMessage::COMMAND_ACK(COMMAND_ACK_DATA {
            command: MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            result: MavResult::MAV_RESULT_DENIED,
            ..Default::default()
        });
        let (changed, ctx) = run(&CommandAckHandler, &mut state, ack);

        assert!(!changed);
        assert_eq!(
            ctx.into_actions(),
            vec![DispatchAction::CommandAck {
                key: CommandKey::of(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM),
                label: "COMPONENT_ARM_DISARM".to_string(),
                result: AckResult::Denied,
            }]
        );
        assert_eq!(state, TelemetryState::default());
    }
}
