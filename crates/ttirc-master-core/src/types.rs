// ABOUTME: Domain types shared by the master, its store, and its workers.
// ABOUTME: Connection specs with the eligibility rule, worker states, and stored codes.

use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;

/// Reserved channel name for connection-level events; doubles as the sender tag.
pub const SYSTEM_CHANNEL: &str = "---";

/// Nickname reported when a connection has no active nick on record.
pub const UNKNOWN_NICK: &str = "?UNKNOWN?";

/// Event text appended to the message log when a session is reaped.
pub const DISCONNECT_EVENT: &str = "DISCONNECT";

/// System table key holding the "master is running" flag.
pub const MASTER_RUNNING_KEY: &str = "MASTER_RUNNING";

/// System table key holding the last master heartbeat timestamp.
pub const MASTER_HEARTBEAT_KEY: &str = "MASTER_HEARTBEAT";

/// Identifier of a stored IRC connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub i64);

impl ConnectionId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ConnectionId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// One desired session as declared in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub id: ConnectionId,
    pub enabled: bool,
    pub visible: bool,
    pub permanent: bool,
    /// The owning user still exists.
    pub owner_valid: bool,
    /// Last time a client showed interest in this connection.
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl ConnectionSpec {
    /// Whether this connection should have a live worker at `now`.
    ///
    /// Permanent connections ignore the heartbeat; everything else needs a
    /// heartbeat strictly newer than `now - freshness_window`.
    pub fn is_eligible(&self, now: DateTime<Utc>, freshness_window: TimeDelta) -> bool {
        if !(self.enabled && self.owner_valid && self.visible) {
            return false;
        }
        if self.permanent {
            return true;
        }
        self.last_heartbeat
            .is_some_and(|beat| beat > now - freshness_window)
    }
}

/// Lifecycle state of a worker as seen from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Starting,
    Running,
    Terminated,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        self == WorkerState::Terminated
    }

    /// Transitions only move forward; `Terminated` is final.
    pub fn can_advance_to(self, next: WorkerState) -> bool {
        matches!(
            (self, next),
            (WorkerState::Starting, WorkerState::Running)
                | (WorkerState::Starting, WorkerState::Terminated)
                | (WorkerState::Running, WorkerState::Terminated)
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Connection status codes stored in `ttirc_connections.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Message type codes stored in `ttirc_messages.message_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Privmsg = 0,
    Command = 1,
    Broadcast = 2,
    Action = 3,
    Topic = 4,
    PrivatePrivmsg = 5,
    Event = 6,
    Notice = 7,
    System = 8,
}

impl MessageType {
    pub fn code(self) -> i32 {
        self as i32
    }
}
