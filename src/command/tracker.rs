//! Command Lifecycle Tracker
//!
//! Records commands awaiting acknowledgment. Every entry ends in exactly one
//! of: resolved by an ack, expired by the sweep, orphaned when its
//! connection closes, or evicted when the table is full.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use gcs_shared::CommandStatus;
use mavlink::ardupilotmega::MavCmd;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Identity of an in-flight command; the protocol allows one per key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKey {
    /// COMMAND_LONG / COMMAND_INT, keyed by MAV_CMD id
    Command(u32),
    /// MISSION_CLEAR_ALL, answered by MISSION_ACK
    MissionClear,
}

impl CommandKey {
    pub fn of(command: MavCmd) -> Self {
        CommandKey::Command(command as u32)
    }

    /// Stream-configuration commands the bridge issues on its own
    pub fn is_background(self) -> bool {
        self == CommandKey::of(MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL)
            || self == CommandKey::of(MavCmd::MAV_CMD_REQUEST_MESSAGE)
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKey::Command(id) => write!(f, "MAV_CMD({})", id),
            CommandKey::MissionClear => f.write_str("MISSION_CLEAR_ALL"),
        }
    }
}

/// Human-readable protocol name of a MAV_CMD
pub fn command_name(command: MavCmd) -> String {
    let name = format!("{:?}", command);
    name.trim_start_matches("MAV_CMD_").to_string()
}

/// Classified acknowledgment result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckResult {
    Accepted,
    TemporarilyRejected,
    Denied,
    Unsupported,
    Failed,
    InProgress,
    /// Result code not recognized
    Unknown,
}

impl AckResult {
    /// Classify a MAV_RESULT code
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => AckResult::Accepted,
            1 => AckResult::TemporarilyRejected,
            2 => AckResult::Denied,
            3 => AckResult::Unsupported,
            4 => AckResult::Failed,
            5 => AckResult::InProgress,
            _ => AckResult::Unknown,
        }
    }

    pub fn status(self) -> CommandStatus {
        match self {
            AckResult::Accepted => CommandStatus::Accepted,
            AckResult::TemporarilyRejected => CommandStatus::TemporarilyRejected,
            AckResult::Denied => CommandStatus::Denied,
            AckResult::Unsupported => CommandStatus::Unsupported,
            AckResult::Failed => CommandStatus::Failed,
            AckResult::InProgress => CommandStatus::InProgress,
            AckResult::Unknown => CommandStatus::Unknown,
        }
    }

    pub fn explanation(self) -> &'static str {
        match self {
            AckResult::Accepted => "Command accepted and executed",
            AckResult::TemporarilyRejected => "Command temporarily rejected, try again later",
            AckResult::Denied => "Command denied by the vehicle",
            AckResult::Unsupported => "Command not supported by the vehicle",
            AckResult::Failed => "Command failed to execute",
            AckResult::InProgress => "Command in progress",
            AckResult::Unknown => "Unknown acknowledgment result",
        }
    }
}

/// Disambiguates acknowledgments and carries the effect of an accepted command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandMeta {
    None,
    Arm(bool),
    Mode { name: String, custom_mode: u32 },
    Takeoff { altitude: f32 },
    Goto { lat: f64, lon: f64, alt: f32 },
}

/// A command sent but not yet acknowledged or expired
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub key: CommandKey,
    pub label: String,
    pub meta: CommandMeta,
    pub issued_at: Instant,
    /// Connection generation the command was sent on
    pub generation: u64,
}

impl PendingCommand {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.issued_at)
    }

    /// Check if the acknowledgment is overdue
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        self.age(now) > timeout
    }
}

/// Result of a `submit`
#[derive(Debug, Clone)]
pub struct CommandHandle {
    pub key: CommandKey,
    pub issued_at: Instant,
    /// A pending entry for the same key was overwritten
    pub superseded: bool,
    /// Oldest entry dropped to make room
    pub evicted: Option<PendingCommand>,
}

/// Pending-command table
#[derive(Debug)]
pub struct CommandTracker {
    pending: RwLock<HashMap<CommandKey, PendingCommand>>,
    capacity: usize,
}

impl CommandTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a command. A second submit for the same key before it
    /// resolves replaces the first (last writer wins).
    pub async fn submit(
        &self,
        key: CommandKey,
        label: impl Into<String>,
        meta: CommandMeta,
        generation: u64,
    ) -> CommandHandle {
        let issued_at = Instant::now();
        let mut pending = self.pending.write().await;

        let superseded = pending.contains_key(&key);
        let mut evicted = None;
        if !superseded && pending.len() >= self.capacity {
            let oldest = pending
                .values()
                .min_by_key(|p| p.issued_at)
                .map(|p| p.key);
            if let Some(oldest) = oldest {
                evicted = pending.remove(&oldest);
            }
        }

        pending.insert(
            key,
            PendingCommand {
                key,
                label: label.into(),
                meta,
                issued_at,
                generation,
            },
        );

        CommandHandle {
            key,
            issued_at,
            superseded,
            evicted,
        }
    }

    /// Correlate an acknowledgment. IN_PROGRESS keeps the entry pending with
    /// a fresh timestamp; every other result removes it.
    pub async fn resolve(&self, key: CommandKey, result: AckResult) -> Option<PendingCommand> {
        let mut pending = self.pending.write().await;
        if result == AckResult::InProgress {
            return pending.get_mut(&key).map(|entry| {
                entry.issued_at = Instant::now();
                entry.clone()
            });
        }
        pending.remove(&key)
    }

    /// Remove and return every entry older than `timeout`
    pub async fn sweep(&self, now: Instant, timeout: Duration) -> Vec<PendingCommand> {
        let mut pending = self.pending.write().await;
        let expired_keys: Vec<CommandKey> = pending
            .values()
            .filter(|p| p.is_timed_out(now, timeout))
            .map(|p| p.key)
            .collect();

        let mut expired: Vec<PendingCommand> = expired_keys
            .iter()
            .filter_map(|key| pending.remove(key))
            .collect();
        expired.sort_by_key(|p| p.issued_at);
        expired
    }

    /// Remove and return the entries sent on connection `generation`
    pub async fn orphan(&self, generation: u64) -> Vec<PendingCommand> {
        let mut pending = self.pending.write().await;
        let keys: Vec<CommandKey> = pending
            .values()
            .filter(|p| p.generation == generation)
            .map(|p| p.key)
            .collect();
        keys.iter().filter_map(|key| pending.remove(key)).collect()
    }

    /// Withdraw a submission that never reached the link. Only the exact
    /// instance is removed, not a newer one for the same key.
    pub async fn cancel(&self, handle: &CommandHandle) -> Option<PendingCommand> {
        let mut pending = self.pending.write().await;
        match pending.get(&handle.key) {
            Some(entry) if entry.issued_at == handle.issued_at => pending.remove(&handle.key),
            _ => None,
        }
    }

    pub async fn get(&self, key: CommandKey) -> Option<PendingCommand> {
        self.pending.read().await.get(&key).cloned()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.pending.read().await.is_empty()
    }
}
