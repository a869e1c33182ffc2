// ABOUTME: Shared types and configuration for the ttirc master.
// ABOUTME: Contains config parsing, connection specs, worker states, and stored constants.

pub mod config;
pub mod types;

pub use config::{Config, WorkerKind};
pub use types::{
    ConnectionId, ConnectionSpec, ConnectionStatus, MessageType, WorkerState,
    DISCONNECT_EVENT, MASTER_HEARTBEAT_KEY, MASTER_RUNNING_KEY, SYSTEM_CHANNEL, UNKNOWN_NICK,
};
