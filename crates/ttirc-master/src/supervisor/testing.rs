// ABOUTME: Test doubles for supervisor tests: an in-memory store and scripted workers.
// ABOUTME: Lets tests drive worker lifecycles and inspect every store call.

use super::worker::{StateCell, Worker, WorkerFactory};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ttirc_master_core::{ConnectionId, ConnectionSpec, MessageType, WorkerKind, WorkerState};
use ttirc_store::{ConnectionStore, Result, StoreError};

/// Poll `worker` until it reports `target`, giving up after five seconds.
pub async fn wait_for_state(worker: &dyn Worker, target: WorkerState) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if worker.state() == target {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    worker.state() == target
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    ListEligible,
    MarkDisconnected(ConnectionId),
    ClearMemberLists(ConnectionId),
    AppendMessage {
        id: ConnectionId,
        channel: String,
        text: String,
        incoming: bool,
        message_type: MessageType,
        sender_nick: String,
    },
    SupervisorAlive(bool),
    Heartbeat,
    ResetAll,
}

#[derive(Default)]
struct StoreInner {
    eligible: Vec<ConnectionSpec>,
    offline: bool,
    fail_cleanup: bool,
    events: Vec<StoreEvent>,
}

/// In-memory [`ConnectionStore`] that records every call.
///
/// `list_eligible_connections` returns exactly what [`RecordingStore::set_eligible`]
/// was given; eligibility filtering is the SQLite store's job.
#[derive(Default)]
pub struct RecordingStore {
    inner: Mutex<StoreInner>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_eligible(&self, ids: &[i64]) {
        let mut specs: Vec<ConnectionSpec> = ids
            .iter()
            .map(|&id| ConnectionSpec {
                id: ConnectionId(id),
                enabled: true,
                visible: true,
                permanent: true,
                owner_valid: true,
                last_heartbeat: None,
            })
            .collect();
        specs.sort_by_key(|spec| spec.id);
        self.inner.lock().unwrap().eligible = specs;
    }

    /// Every call fails as if the database were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }

    /// Only `mark_disconnected` fails.
    pub fn set_fail_cleanup(&self, fail: bool) {
        self.inner.lock().unwrap().fail_cleanup = fail;
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn clear_events(&self) {
        self.inner.lock().unwrap().events.clear();
    }

    /// Number of DISCONNECT records appended for `id`.
    pub fn disconnects(&self, id: ConnectionId) -> usize {
        self.events()
            .iter()
            .filter(|event| {
                matches!(event, StoreEvent::AppendMessage { id: got, text, .. }
                    if *got == id && text == ttirc_master_core::DISCONNECT_EVENT)
            })
            .count()
    }

    fn record(&self, operation: &'static str, event: StoreEvent) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let failing = inner.offline
            || (inner.fail_cleanup && matches!(event, StoreEvent::MarkDisconnected(_)));
        if failing {
            return Err(StoreError::Unavailable {
                operation,
                source: sqlx::Error::PoolClosed,
            });
        }
        inner.events.push(event);
        Ok(())
    }
}

#[async_trait]
impl ConnectionStore for RecordingStore {
    async fn list_eligible_connections(&self) -> Result<Vec<ConnectionSpec>> {
        self.record("list_eligible_connections", StoreEvent::ListEligible)?;
        Ok(self.inner.lock().unwrap().eligible.clone())
    }

    async fn active_nick(&self, _id: ConnectionId) -> Result<String> {
        Ok(ttirc_master_core::UNKNOWN_NICK.to_string())
    }

    async fn append_message(
        &self,
        id: ConnectionId,
        channel: &str,
        text: &str,
        incoming: bool,
        message_type: MessageType,
        sender_nick: &str,
    ) -> Result<()> {
        self.record(
            "append_message",
            StoreEvent::AppendMessage {
                id,
                channel: channel.to_string(),
                text: text.to_string(),
                incoming,
                message_type,
                sender_nick: sender_nick.to_string(),
            },
        )
    }

    async fn mark_disconnected(&self, id: ConnectionId) -> Result<()> {
        self.record("mark_disconnected", StoreEvent::MarkDisconnected(id))
    }

    async fn clear_channel_member_lists(&self, id: ConnectionId) -> Result<()> {
        self.record("clear_channel_member_lists", StoreEvent::ClearMemberLists(id))
    }

    async fn set_supervisor_alive(&self, alive: bool) -> Result<()> {
        self.record("set_supervisor_alive", StoreEvent::SupervisorAlive(alive))
    }

    async fn set_heartbeat_now(&self) -> Result<()> {
        self.record("set_heartbeat_now", StoreEvent::Heartbeat)
    }

    async fn reset_all(&self) -> Result<()> {
        self.record("reset_all", StoreEvent::ResetAll)
    }
}

/// How a scripted worker reacts to lifecycle calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBehavior {
    /// Stays where the test puts it; only `force_kill` terminates it.
    Manual,
    /// Runs on start and terminates as soon as it is asked to stop.
    Graceful,
    /// Runs on start and ignores stop requests; only `force_kill` terminates it.
    Stubborn,
}

struct HandleInner {
    state: StateCell,
    behavior: StopBehavior,
    starts: AtomicUsize,
    stops: AtomicUsize,
    kills: AtomicUsize,
}

/// Test-side view of a scripted worker.
#[derive(Clone)]
pub struct ScriptedHandle {
    inner: Arc<HandleInner>,
}

impl ScriptedHandle {
    pub fn state(&self) -> WorkerState {
        self.inner.state.get()
    }

    pub fn set_running(&self) {
        self.inner.state.advance(WorkerState::Running);
    }

    /// Simulate the session ending on its own.
    pub fn terminate(&self) {
        self.inner.state.advance(WorkerState::Terminated);
    }

    pub fn start_calls(&self) -> usize {
        self.inner.starts.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.inner.stops.load(Ordering::SeqCst)
    }

    pub fn kill_calls(&self) -> usize {
        self.inner.kills.load(Ordering::SeqCst)
    }
}

struct ScriptedWorker {
    id: ConnectionId,
    handle: ScriptedHandle,
}

impl Worker for ScriptedWorker {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn kind(&self) -> WorkerKind {
        WorkerKind::Native
    }

    fn start(&self) {
        let inner = &self.handle.inner;
        inner.starts.fetch_add(1, Ordering::SeqCst);
        if inner.behavior != StopBehavior::Manual {
            inner.state.advance(WorkerState::Running);
        }
    }

    fn request_stop(&self) {
        let inner = &self.handle.inner;
        inner.stops.fetch_add(1, Ordering::SeqCst);
        if inner.behavior == StopBehavior::Graceful {
            inner.state.advance(WorkerState::Terminated);
        }
    }

    fn force_kill(&self) {
        let inner = &self.handle.inner;
        inner.kills.fetch_add(1, Ordering::SeqCst);
        inner.state.advance(WorkerState::Terminated);
    }

    fn state(&self) -> WorkerState {
        self.handle.state()
    }
}

#[derive(Default)]
struct FactoryInner {
    latest: HashMap<ConnectionId, ScriptedHandle>,
    created: Vec<ConnectionId>,
}

/// Factory producing [`ScriptedWorker`]s; clones share their bookkeeping.
#[derive(Clone)]
pub struct ScriptedFactory {
    behavior: StopBehavior,
    inner: Arc<Mutex<FactoryInner>>,
}

impl ScriptedFactory {
    pub fn new(behavior: StopBehavior) -> Self {
        Self {
            behavior,
            inner: Arc::new(Mutex::new(FactoryInner::default())),
        }
    }

    /// Handle of the most recently created worker for `id`.
    pub fn handle(&self, id: ConnectionId) -> Option<ScriptedHandle> {
        self.inner.lock().unwrap().latest.get(&id).cloned()
    }

    /// How many workers were ever created for `id`.
    pub fn created(&self, id: ConnectionId) -> usize {
        self.inner
            .lock()
            .unwrap()
            .created
            .iter()
            .filter(|created| **created == id)
            .count()
    }

    pub fn created_total(&self) -> usize {
        self.inner.lock().unwrap().created.len()
    }
}

impl WorkerFactory for ScriptedFactory {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Native
    }

    fn create(&self, id: ConnectionId) -> Box<dyn Worker> {
        let handle = ScriptedHandle {
            inner: Arc::new(HandleInner {
                state: StateCell::new(),
                behavior: self.behavior,
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                kills: AtomicUsize::new(0),
            }),
        };
        let mut inner = self.inner.lock().unwrap();
        inner.latest.insert(id, handle.clone());
        inner.created.push(id);
        Box::new(ScriptedWorker { id, handle })
    }
}
