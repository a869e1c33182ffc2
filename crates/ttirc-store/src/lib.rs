// ABOUTME: Store adapter between the ttirc master and the shared database
// ABOUTME: Exposes the ConnectionStore trait and its SQLite-backed implementation

pub mod error;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use ttirc_master_core::{ConnectionId, ConnectionSpec, MessageType};

/// Narrow query/command surface the master needs from persistent storage.
///
/// Rows in the connections table are owned by the web front-end; the master
/// only reads desired state and writes status, liveness and event records.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Connections that should currently have a worker, ordered by id.
    async fn list_eligible_connections(&self) -> Result<Vec<ConnectionSpec>>;

    /// Active nickname of a connection, or [`ttirc_master_core::UNKNOWN_NICK`].
    async fn active_nick(&self, id: ConnectionId) -> Result<String>;

    /// Append a record to the message log.
    ///
    /// The sender is `sender_nick` when non-empty; otherwise the system tag for
    /// the system channel, or the connection's active nick.
    async fn append_message(
        &self,
        id: ConnectionId,
        channel: &str,
        text: &str,
        incoming: bool,
        message_type: MessageType,
        sender_nick: &str,
    ) -> Result<()>;

    async fn mark_disconnected(&self, id: ConnectionId) -> Result<()>;

    async fn clear_channel_member_lists(&self, id: ConnectionId) -> Result<()>;

    async fn set_supervisor_alive(&self, alive: bool) -> Result<()>;

    async fn set_heartbeat_now(&self) -> Result<()>;

    /// Mark every connection disconnected, clear all member lists, and drop the
    /// running flag. Used at startup and by `--cleanup`.
    async fn reset_all(&self) -> Result<()>;
}
