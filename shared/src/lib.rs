//! gcs-bridge Shared Protocol Types
//!
//! This crate provides the observer-facing protocol types, the frame codec and
//! the link-session state machine shared by the bridge and its clients.

pub mod codec;
pub mod protocol;
pub mod state_machine;
pub mod telemetry;

use std::time::{SystemTime, UNIX_EPOCH};

pub use protocol::{
    ClientFrame, CommandRequest, CommandStatus, FencePoint, ObserverEvent, ObserverRequest,
    ServerFrame, Severity, Waypoint,
};
pub use state_machine::{LinkEvent, LinkState, LinkStateMachine, TransitionResult};
pub use telemetry::{
    Attitude, Battery, GpsFix, GpsStatus, HomePosition, LinkHealth, Position, StatusText,
    SystemRecord, TelemetryState, Velocity, HDOP_UNKNOWN,
};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Default timing parameters for a vehicle link session
pub mod defaults {
    /// Heartbeat timeout - the link is declared lost after this much silence
    pub const HEARTBEAT_TIMEOUT_MS: u64 = 30_000;

    /// Number of receive attempts while waiting for the first heartbeat
    pub const HEARTBEAT_WAIT_ATTEMPTS: u32 = 15;

    /// Duration of each first-heartbeat receive attempt
    pub const HEARTBEAT_WAIT_ATTEMPT_MS: u64 = 1_000;

    /// Bounded receive timeout of the streaming loop
    pub const LINK_POLL_INTERVAL_MS: u64 = 200;

    /// Address changes wait this many poll intervals for the supervisor to stop
    pub const STOP_WAIT_POLLS: u32 = 10;

    /// A send the transport has not taken after this long faults the link
    pub const LINK_SEND_TIMEOUT_MS: u64 = 1_000;

    /// Delay between a closed link and the next connection attempt
    pub const RECONNECT_DELAY_MS: u64 = 5_000;

    /// Link open timeout
    pub const OPEN_TIMEOUT_MS: u64 = 5_000;

    /// Telemetry stream rate requested from the vehicle
    pub const STREAM_RATE_HZ: f32 = 4.0;

    /// Command ACK timeout in milliseconds
    pub const COMMAND_ACK_TIMEOUT_MS: u64 = 10_000;

    /// Period of the pending-command sweep
    pub const ACK_SWEEP_INTERVAL_MS: u64 = 1_000;

    /// Snapshot publish period (10 Hz)
    pub const SNAPSHOT_INTERVAL_MS: u64 = 100;

    /// Period of the heartbeat the bridge sends to the vehicle
    pub const GCS_HEARTBEAT_INTERVAL_MS: u64 = 1_000;

    /// Maximum number of commands awaiting acknowledgment
    pub const MAX_PENDING_COMMANDS: usize = 30;

    /// Timeout of each mission download step
    pub const MISSION_ITEM_TIMEOUT_MS: u64 = 5_000;
}
