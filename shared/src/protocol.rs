//! Observer protocol
//!
//! JSON documents exchanged between the bridge and observing clients. The
//! bridge pushes [`ServerFrame`]s; clients send [`ClientFrame`]s and get one
//! `reply` per request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state_machine::LinkState;
use crate::telemetry::TelemetryState;

/// Observer-facing classification of a vehicle status text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Debug,
}

impl Severity {
    /// Classify a MAVLink severity level (0 = EMERGENCY .. 7 = DEBUG)
    pub fn from_mav(level: u8) -> Self {
        match level {
            0..=3 => Severity::Error,
            4 => Severity::Warning,
            5 | 6 => Severity::Info,
            _ => Severity::Debug,
        }
    }
}

/// Outcome attached to every `command_result` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Sent,
    Accepted,
    TemporarilyRejected,
    Denied,
    Unsupported,
    Failed,
    InProgress,
    Unknown,
    Timeout,
    ConnectionLost,
    Evicted,
    Rejected,
}

impl CommandStatus {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            CommandStatus::Sent | CommandStatus::Accepted | CommandStatus::InProgress
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Sent => "SENT",
            CommandStatus::Accepted => "ACCEPTED",
            CommandStatus::TemporarilyRejected => "TEMPORARILY_REJECTED",
            CommandStatus::Denied => "DENIED",
            CommandStatus::Unsupported => "UNSUPPORTED",
            CommandStatus::Failed => "FAILED",
            CommandStatus::InProgress => "IN_PROGRESS",
            CommandStatus::Unknown => "UNKNOWN",
            CommandStatus::Timeout => "TIMEOUT",
            CommandStatus::ConnectionLost => "CONNECTION_LOST",
            CommandStatus::Evicted => "EVICTED",
            CommandStatus::Rejected => "REJECTED",
        }
    }
}

/// One downloaded mission item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub seq: u16,
    pub command: u32,
    pub frame: u8,
    pub lat: f64,
    pub lon: f64,
    pub alt: f32,
    pub params: [f32; 4],
}

/// One downloaded fence item (vertex or circle centre)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FencePoint {
    pub seq: u16,
    pub command: u32,
    pub lat: f64,
    pub lon: f64,
    /// Vertex count for polygon items, radius in metres for circles
    pub param1: f32,
}

/// Discrete notifications pushed to every observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ObserverEvent {
    HeartbeatReceived {
        system_id: u8,
    },
    StatusMessage {
        text: String,
        severity: Severity,
    },
    CommandResult {
        command: String,
        success: bool,
        message: String,
        status: CommandStatus,
    },
    ConnectionStatus {
        state: LinkState,
        address: String,
    },
    LinkLost {
        reason: String,
        address: String,
    },
    MissionUpdate {
        waypoints: Vec<Waypoint>,
    },
    GeofenceUpdate {
        points: Vec<FencePoint>,
    },
}

impl ObserverEvent {
    pub fn command_result(
        command: impl Into<String>,
        status: CommandStatus,
        message: impl Into<String>,
    ) -> Self {
        ObserverEvent::CommandResult {
            command: command.into(),
            success: status.is_success(),
            message: message.into(),
            status,
        }
    }

    pub fn status_message(text: impl Into<String>, severity: Severity) -> Self {
        ObserverEvent::StatusMessage {
            text: text.into(),
            severity,
        }
    }
}

/// Frames pushed from the bridge to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    Snapshot(TelemetryState),
    Event(ObserverEvent),
    Reply {
        id: u64,
        success: bool,
        message: String,
    },
}

/// A user-level command as submitted by an observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl CommandRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

/// Requests accepted from observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverRequest {
    Command { command: CommandRequest },
    UpdateTarget { address: String },
}

/// Frame sent by a client; `id` is echoed in the reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub id: u64,
    pub request: ObserverRequest,
}
