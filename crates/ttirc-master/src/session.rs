// ABOUTME: Seam for the IRC session handler run by in-process workers.
// ABOUTME: The handler owns the wire protocol; the master only drives its lifecycle.

use crate::supervisor::worker::StateCell;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use ttirc_master_core::{ConnectionId, WorkerState};
use ttirc_store::ConnectionStore;

/// Runs one IRC connection inside the master process.
///
/// `run` should call [`SessionContext::mark_running`] once the session is
/// established and return after [`SessionContext::stopped`] resolves. Returning
/// early (connection refused, server closed the link) is fine: the worker is
/// reaped and respawned on a later tick if the connection is still wanted.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    async fn run(&self, session: SessionContext) -> Result<()>;
}

/// What a session handler gets to work with.
pub struct SessionContext {
    connection_id: ConnectionId,
    store: Arc<dyn ConnectionStore>,
    state: StateCell,
    stop: CancellationToken,
}

impl SessionContext {
    pub(crate) fn new(
        connection_id: ConnectionId,
        store: Arc<dyn ConnectionStore>,
        state: StateCell,
        stop: CancellationToken,
    ) -> Self {
        Self {
            connection_id,
            store,
            state,
            stop,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Store handle for message appends and nick lookups.
    pub fn store(&self) -> &Arc<dyn ConnectionStore> {
        &self.store
    }

    /// Report that the session is established.
    pub fn mark_running(&self) {
        if self.state.advance(WorkerState::Running) {
            tracing::debug!(connection_id = %self.connection_id, "Session established");
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Resolves once the supervisor asks this session to end.
    pub async fn stopped(&self) {
        self.stop.cancelled().await;
    }
}
