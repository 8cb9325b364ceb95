//! Link Session State Machine
//!
//! Defines the lifecycle of one vehicle link session and the valid
//! transitions between its phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of the session supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkState {
    /// Parked; no link open
    Idle,
    /// Opening the vehicle link
    Connecting,
    /// Link open, waiting for the first vehicle heartbeat
    AwaitingHeartbeat,
    /// Receive loop running
    Streaming,
    /// Tearing down the current link
    Closing,
    /// Sleeping before the next connection attempt
    ReconnectWait,
}

impl LinkState {
    /// Phases in which no vehicle link is open
    pub fn is_quiescent(self) -> bool {
        matches!(self, LinkState::Idle | LinkState::ReconnectWait)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Idle => "IDLE",
            LinkState::Connecting => "CONNECTING",
            LinkState::AwaitingHeartbeat => "AWAITING_HEARTBEAT",
            LinkState::Streaming => "STREAMING",
            LinkState::Closing => "CLOSING",
            LinkState::ReconnectWait => "RECONNECT_WAIT",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that drive the session lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Begin a connection attempt to the current target
    Connect,
    /// Link opened successfully
    Opened,
    /// First vehicle heartbeat received
    HeartbeatReceived,
    /// Open refused/timed out, heartbeat never came, I/O fault or heartbeat timeout
    Fault(String),
    /// Stop signal observed
    StopRequested,
    /// Link closed; a reconnect follows
    Closed,
    /// Link closed while a stop is raised; park until it clears
    Parked,
    /// Reconnect delay elapsed
    WaitElapsed,
}

/// Result of a transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and the phase changed (or stayed)
    Success { from: LinkState, to: LinkState },
    /// Transition was invalid from the current phase
    Invalid { from: LinkState, event: LinkEvent },
}

/// Tracks the current phase and the cause of the last teardown
#[derive(Debug)]
pub struct LinkStateMachine {
    current_state: LinkState,
    last_fault: Option<String>,
}

impl Default for LinkStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self {
            current_state: LinkState::Idle,
            last_fault: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.current_state
    }

    /// Cause recorded by the most recent fault
    pub fn last_fault(&self) -> Option<&str> {
        self.last_fault.as_deref()
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LinkEvent) -> TransitionResult {
        let from = self.current_state;
        match next_state(from, &event) {
            Some(to) => {
                match &event {
                    LinkEvent::Fault(cause) => self.last_fault = Some(cause.clone()),
                    LinkEvent::Connect => self.last_fault = None,
                    _ => {}
                }
                self.current_state = to;
                TransitionResult::Success { from, to }
            }
            None => TransitionResult::Invalid { from, event },
        }
    }
}

/// Get the next phase for a given event, if the transition is valid
pub fn next_state(state: LinkState, event: &LinkEvent) -> Option<LinkState> {
    use LinkEvent::*;
    use LinkState::*;

    match (state, event) {
        (Idle, Connect) => Some(Connecting),
        (Idle, StopRequested) => Some(Idle),

        (Connecting, Opened) => Some(AwaitingHeartbeat),
        (AwaitingHeartbeat, HeartbeatReceived) => Some(Streaming),

        // Any active phase tears down on fault or stop
        (Connecting | AwaitingHeartbeat | Streaming, Fault(_) | StopRequested) => Some(Closing),

        (Closing, Closed) => Some(ReconnectWait),
        (Closing, Parked) => Some(Idle),

        (ReconnectWait, WaitElapsed) => Some(Connecting),
        (ReconnectWait, StopRequested) => Some(Idle),

        _ => None,
    }
}

/// Check if moving from one phase to another is generally valid
pub fn is_valid_transition(from: LinkState, to: LinkState) -> bool {
    use LinkState::*;

    match (from, to) {
        (a, b) if a == b => true,

        (Idle, Connecting) => true,
        (Connecting, AwaitingHeartbeat) => true,
        (AwaitingHeartbeat, Streaming) => true,
        (Connecting | AwaitingHeartbeat | Streaming, Closing) => true,
        (Closing, ReconnectWait | Idle) => true,
        (ReconnectWait, Connecting | Idle) => true,

        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let fsm = LinkStateMachine::new();
        assert_eq!(fsm.state(), LinkState::Idle);
        assert!(fsm.last_fault().is_none());
    }

    #[test]
    fn test_normal_session_flow() {
        let mut fsm = LinkStateMachine::new();

        let result = fsm.process_event(LinkEvent::Connect);
        assert!(matches!(result, TransitionResult::Success { to: LinkState::Connecting, .. }));

        fsm.process_event(LinkEvent::Opened);
        assert_eq!(fsm.state(), LinkState::AwaitingHeartbeat);

        fsm.process_event(LinkEvent::HeartbeatReceived);
        assert_eq!(fsm.state(), LinkState::Streaming);

        fsm.process_event(LinkEvent::Fault("heartbeat timeout".into()));
        assert_eq!(fsm.state(), LinkState::Closing);
        assert_eq!(fsm.last_fault(), Some("heartbeat timeout"));

        fsm.process_event(LinkEvent::Closed);
        assert_eq!(fsm.state(), LinkState::ReconnectWait);

        fsm.process_event(LinkEvent::WaitElapsed);
        assert_eq!(fsm.state(), LinkState::Connecting);
        assert_eq!(fsm.last_fault(), Some("heartbeat timeout"));
    }

    #[test]
    fn test_no_heartbeat_goes_to_reconnect_wait() {
        let mut fsm = LinkStateMachine::new();
        fsm.process_event(LinkEvent::Connect);
        fsm.process_event(LinkEvent::Opened);
        fsm.process_event(LinkEvent::Fault("no heartbeat".into()));
        fsm.process_event(LinkEvent::Closed);
        assert_eq!(fsm.state(), LinkState::ReconnectWait);
        assert!(fsm.state().is_quiescent());
    }

    #[test]
    fn test_stop_parks_in_idle() {
        let mut fsm = LinkStateMachine::new();
        fsm.process_event(LinkEvent::Connect);
        fsm.process_event(LinkEvent::Opened);
        fsm.process_event(LinkEvent::HeartbeatReceived);

        fsm.process_event(LinkEvent::StopRequested);
        assert_eq!(fsm.state(), LinkState::Closing);
        fsm.process_event(LinkEvent::Parked);
        assert_eq!(fsm.state(), LinkState::Idle);

        // Raising stop again while parked is harmless
        let result = fsm.process_event(LinkEvent::StopRequested);
        assert!(matches!(result, TransitionResult::Success { to: LinkState::Idle, .. }));
    }

    #[test]
    fn test_invalid_transition() {
        let mut fsm = LinkStateMachine::new();

        // Cannot stream without opening a link first
        let result = fsm.process_event(LinkEvent::HeartbeatReceived);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), LinkState::Idle);
    }

    #[test]
    fn test_is_valid_transition() {
        assert!(is_valid_transition(LinkState::Idle, LinkState::Connecting));
        assert!(is_valid_transition(LinkState::Closing, LinkState::Idle));
        assert!(is_valid_transition(LinkState::ReconnectWait, LinkState::Connecting));
        assert!(!is_valid_transition(LinkState::Idle, LinkState::Streaming));
        assert!(!is_valid_transition(LinkState::ReconnectWait, LinkState::Streaming));
        assert!(!is_valid_transition(LinkState::Streaming, LinkState::Connecting));
    }

    #[test]
    fn test_every_next_state_is_valid() {
        use LinkState::*;
        let states = [Idle, Connecting, AwaitingHeartbeat, Streaming, Closing, ReconnectWait];
        let events = [
            LinkEvent::Connect,
            LinkEvent::Opened,
            LinkEvent::HeartbeatReceived,
            LinkEvent::Fault("x".into()),
            LinkEvent::StopRequested,
            LinkEvent::Closed,
            LinkEvent::Parked,
            LinkEvent::WaitElapsed,
        ];
        for from in states {
            for event in &events {
                if let Some(to) = next_state(from, event) {
                    assert!(is_valid_transition(from, to), "{from} -> {to} via {event:?}");
                }
            }
        }
    }
}
