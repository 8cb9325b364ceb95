//! Bridge configuration
//!
//! Settings come from the command line or `GCS_*` environment variables and
//! fall back to the values in [`gcs_shared::defaults`].

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use gcs_shared::defaults;

use crate::link::{SessionTarget, TargetError};

/// Timing and identity settings of the session supervisor
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Link is declared lost after this much heartbeat silence
    pub heartbeat_timeout: Duration,
    /// Receive attempts while waiting for the first heartbeat
    pub heartbeat_attempts: u32,
    /// Duration of one first-heartbeat attempt
    pub heartbeat_attempt_timeout: Duration,
    /// Bounded receive timeout of the streaming loop
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub open_timeout: Duration,
    /// Bound on a single outbound send
    pub send_timeout: Duration,
    pub stream_rate_hz: f32,
    pub gcs_heartbeat_interval: Duration,
    pub mission_item_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_millis(defaults::HEARTBEAT_TIMEOUT_MS),
            heartbeat_attempts: defaults::HEARTBEAT_WAIT_ATTEMPTS,
            heartbeat_attempt_timeout: Duration::from_millis(defaults::HEARTBEAT_WAIT_ATTEMPT_MS),
            poll_interval: Duration::from_millis(defaults::LINK_POLL_INTERVAL_MS),
            reconnect_delay: Duration::from_millis(defaults::RECONNECT_DELAY_MS),
            open_timeout: Duration::from_millis(defaults::OPEN_TIMEOUT_MS),
            send_timeout: Duration::from_millis(defaults::LINK_SEND_TIMEOUT_MS),
            stream_rate_hz: defaults::STREAM_RATE_HZ,
            gcs_heartbeat_interval: Duration::from_millis(defaults::GCS_HEARTBEAT_INTERVAL_MS),
            mission_item_timeout: Duration::from_millis(defaults::MISSION_ITEM_TIMEOUT_MS),
        }
    }
}

impl SessionConfig {
    /// How long an address change waits for the supervisor to stop
    pub fn stop_timeout(&self) -> Duration {
        self.poll_interval * defaults::STOP_WAIT_POLLS
    }
}

/// Complete bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub target: SessionTarget,
    pub observer_addr: SocketAddr,
    pub session: SessionConfig,
    /// System ID the bridge uses on the link
    pub gcs_system_id: u8,
    /// Component ID the bridge uses on the link
    pub gcs_component_id: u8,
    pub ack_timeout: Duration,
    pub ack_sweep_interval: Duration,
    pub snapshot_interval: Duration,
    pub max_pending_commands: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            target: SessionTarget::tcp("127.0.0.1", 5678),
            observer_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            session: SessionConfig::default(),
            gcs_system_id: 255,
            gcs_component_id: 190,
            ack_timeout: Duration::from_millis(defaults::COMMAND_ACK_TIMEOUT_MS),
            ack_sweep_interval: Duration::from_millis(defaults::ACK_SWEEP_INTERVAL_MS),
            snapshot_interval: Duration::from_millis(defaults::SNAPSHOT_INTERVAL_MS),
            max_pending_commands: defaults::MAX_PENDING_COMMANDS,
        }
    }
}

/// Command-line interface
#[derive(Debug, Parser)]
#[command(name = "gcs-bridge", version, about = "Ground-control bridge for a MAVLink vehicle")]
pub struct Cli {
    /// Vehicle link address: tcp:HOST:PORT, udp:HOST:PORT, udpin:HOST:PORT or HOST:PORT
    #[arg(long, env = "GCS_LINK", default_value = "tcp:127.0.0.1:5678")]
    pub link: String,

    /// Listen address of the observer server
    #[arg(long, env = "GCS_OBSERVER_ADDR", default_value = "127.0.0.1:5000")]
    pub observer_addr: SocketAddr,

    /// Heartbeat timeout in seconds
    #[arg(long, env = "GCS_HEARTBEAT_TIMEOUT", default_value_t = defaults::HEARTBEAT_TIMEOUT_MS / 1000)]
    pub heartbeat_timeout_secs: u64,

    /// Requested telemetry rate in Hz
    #[arg(long, env = "GCS_STREAM_RATE", default_value_t = defaults::STREAM_RATE_HZ)]
    pub stream_rate_hz: f32,

    /// Command acknowledgment timeout in seconds
    #[arg(long, env = "GCS_ACK_TIMEOUT", default_value_t = defaults::COMMAND_ACK_TIMEOUT_MS / 1000)]
    pub ack_timeout_secs: u64,

    /// Delay before reconnecting, in seconds
    #[arg(long, env = "GCS_RECONNECT_DELAY", default_value_t = defaults::RECONNECT_DELAY_MS / 1000)]
    pub reconnect_delay_secs: u64,

    /// Link poll interval in milliseconds
    #[arg(long, env = "GCS_POLL_INTERVAL_MS", default_value_t = defaults::LINK_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// MAVLink system id of the bridge
    #[arg(long, env = "GCS_SYSTEM_ID", default_value_t = 255)]
    pub system_id: u8,

    /// MAVLink component id of the bridge
    #[arg(long, env = "GCS_COMPONENT_ID", default_value_t = 190)]
    pub component_id: u8,
}

impl Cli {
    pub fn into_config(self) -> Result<BridgeConfig, TargetError> {
        let base = BridgeConfig::default();
        Ok(BridgeConfig {
            target: self.link.parse()?,
            observer_addr: self.observer_addr,
            session: SessionConfig {
                heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs),
                stream_rate_hz: self.stream_rate_hz,
                reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
                poll_interval: Duration::from_millis(self.poll_interval_ms.max(10)),
                ..base.session
            },
            gcs_system_id: self.system_id,
            gcs_component_id: self.component_id,
            ack_timeout: Duration::from_secs(self.ack_timeout_secs),
            ..base
        })
    }
}
