// ABOUTME: Supervisor liveness published to the shared store each tick.
// ABOUTME: Front-ends read these keys to tell whether the master is up.

use ttirc_store::{ConnectionStore, Result};

/// Set the running flag and refresh the heartbeat timestamp.
pub async fn publish(store: &dyn ConnectionStore) -> Result<()> {
    store.set_supervisor_alive(true).await?;
    store.set_heartbeat_now().await
}
