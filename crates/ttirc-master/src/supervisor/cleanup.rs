// ABOUTME: Post-termination bookkeeping for a reaped connection.
// ABOUTME: Marks it disconnected, clears member lists, and logs a DISCONNECT event.

use ttirc_master_core::{ConnectionId, MessageType, DISCONNECT_EVENT, SYSTEM_CHANNEL};
use ttirc_store::{ConnectionStore, Result};

/// Record that the session for `id` is gone.
///
/// Stops at the first failing write; the caller keeps the registry entry and
/// retries on a later tick, so each step is safe to repeat.
pub async fn cleanup_connection(store: &dyn ConnectionStore, id: ConnectionId) -> Result<()> {
    store.mark_disconnected(id).await?;
    store.clear_channel_member_lists(id).await?;
    store
        .append_message(
            id,
            SYSTEM_CHANNEL,
            DISCONNECT_EVENT,
            true,
            MessageType::Event,
            "",
        )
        .await?;
    tracing::debug!(connection_id = %id, "Connection cleaned up");
    Ok(())
}
