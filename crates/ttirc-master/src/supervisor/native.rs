// ABOUTME: In-process worker running a session handler on its own tokio task.
// ABOUTME: Graceful stop via the session's stop token, forced stop drops the session future.

use super::worker::{StateCell, Worker, WorkerFactory};
use crate::session::{SessionContext, SessionHandler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use ttirc_master_core::{ConnectionId, WorkerKind, WorkerState};
use ttirc_store::ConnectionStore;

pub struct NativeWorker {
    id: ConnectionId,
    handler: Arc<dyn SessionHandler>,
    store: Arc<dyn ConnectionStore>,
    state: StateCell,
    stop: CancellationToken,
    kill: CancellationToken,
    started: AtomicBool,
}

impl NativeWorker {
    pub fn new(
        id: ConnectionId,
        handler: Arc<dyn SessionHandler>,
        store: Arc<dyn ConnectionStore>,
    ) -> Self {
        Self {
            id,
            handler,
            store,
            state: StateCell::new(),
            stop: CancellationToken::new(),
            kill: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }
}

impl Worker for NativeWorker {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn kind(&self) -> WorkerKind {
        WorkerKind::Native
    }

    fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let id = self.id;
        let handler = Arc::clone(&self.handler);
        let state = self.state.clone();
        let kill = self.kill.clone();
        let session = SessionContext::new(
            id,
            Arc::clone(&self.store),
            self.state.clone(),
            self.stop.clone(),
        );

        tokio::spawn(async move {
            // Own task so a panicking handler still ends in Terminated.
            let mut session_task = tokio::spawn(async move { handler.run(session).await });

            let joined = tokio::select! {
                joined = &mut session_task => Some(joined),
                _ = kill.cancelled() => None,
            };

            match joined {
                Some(Ok(Ok(()))) => info!(connection_id = %id, "Session ended"),
                Some(Ok(Err(e))) => warn!(connection_id = %id, error = %e, "Session failed"),
                Some(Err(e)) => warn!(connection_id = %id, error = %e, "Session task aborted"),
                None => {
                    // The session future must be dropped before Terminated is published.
                    session_task.abort();
                    let _ = session_task.await;
                    warn!(connection_id = %id, "Session killed");
                }
            }
            state.advance(WorkerState::Terminated);
        });
    }

    fn request_stop(&self) {
        self.stop.cancel();
    }

    fn force_kill(&self) {
        self.stop.cancel();
        self.kill.cancel();
    }

    fn state(&self) -> WorkerState {
        self.state.get()
    }
}

/// Builds [`NativeWorker`]s that share one session handler.
pub struct NativeWorkerFactory {
    handler: Arc<dyn SessionHandler>,
    store: Arc<dyn ConnectionStore>,
}

impl NativeWorkerFactory {
    pub fn new(handler: Arc<dyn SessionHandler>, store: Arc<dyn ConnectionStore>) -> Self {
        Self { handler, store }
    }
}

impl WorkerFactory for NativeWorkerFactory {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Native
    }

    fn create(&self, id: ConnectionId) -> Box<dyn Worker> {
        Box::new(NativeWorker::new(
            id,
            Arc::clone(&self.handler),
            Arc::clone(&self.store),
        ))
    }
}
