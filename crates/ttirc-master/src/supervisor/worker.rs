// ABOUTME: Worker abstraction shared by the in-process and external-process variants.
// ABOUTME: Lifecycle control trait, factory trait, and a monotonic state cell.

use std::sync::Arc;
use tokio::sync::watch;
use ttirc_master_core::{ConnectionId, WorkerKind, WorkerState};

/// One connection session's lifecycle, as the supervisor sees it.
///
/// Every method is non-blocking. Once [`Worker::state`] returns
/// [`WorkerState::Terminated`] it keeps doing so, and the session's sockets,
/// tasks and child processes have already been released.
pub trait Worker: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn kind(&self) -> WorkerKind;

    /// Begin establishing the session in the background. Calling it again is a no-op.
    fn start(&self);

    /// Ask the session to end gracefully. Idempotent; termination is observed
    /// later through [`Worker::state`].
    fn request_stop(&self);

    /// Tear the session down without waiting for it to cooperate. Only used
    /// once the shutdown deadline has passed.
    fn force_kill(&self);

    /// Most recently observed lifecycle state.
    fn state(&self) -> WorkerState;
}

/// Creates workers of one configured variant.
pub trait WorkerFactory: Send + Sync {
    fn kind(&self) -> WorkerKind;

    fn create(&self, id: ConnectionId) -> Box<dyn Worker>;
}

/// Shared lifecycle state that only ever moves forward.
///
/// The worker's own task publishes transitions; the supervisor reads them.
#[derive(Clone)]
pub struct StateCell {
    tx: Arc<watch::Sender<WorkerState>>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(WorkerState::Starting);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> WorkerState {
        *self.tx.borrow()
    }

    /// Move to `next` if that is a forward transition. Returns whether the state changed.
    pub fn advance(&self, next: WorkerState) -> bool {
        self.tx.send_if_modified(|current| {
            if current.can_advance_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.tx.subscribe()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
