// ABOUTME: Registry of running workers keyed by connection id.
// ABOUTME: The single synchronized owner of the id -> worker mapping.

use super::error::RegistryError;
use super::worker::Worker;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use ttirc_master_core::{ConnectionId, WorkerKind, WorkerState};

struct Entry {
    worker: Box<dyn Worker>,
    stop_requested: bool,
    spawned_at: DateTime<Utc>,
}

/// Point-in-time view of one registered worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    pub id: ConnectionId,
    pub kind: WorkerKind,
    pub state: WorkerState,
    pub stop_requested: bool,
    pub spawned_at: DateTime<Utc>,
}

/// Running workers by connection id.
///
/// Mutations take the write lock, so readers always see a consistent map.
/// Nothing here touches the network or disk.
#[derive(Default)]
pub struct WorkerRegistry {
    entries: RwLock<HashMap<ConnectionId, Entry>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids currently tracked
    pub async fn list(&self) -> BTreeSet<ConnectionId> {
        self.entries.read().await.keys().copied().collect()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.entries.read().await.contains_key(&id)
    }

    /// Observed state of the worker for `id`, if one is registered
    pub async fn state(&self, id: ConnectionId) -> Option<WorkerState> {
        self.entries
            .read()
            .await
            .get(&id)
            .map(|entry| entry.worker.state())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Register a worker. Never replaces an existing one.
    pub async fn insert(
        &self,
        id: ConnectionId,
        worker: Box<dyn Worker>,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&id) {
            return Err(RegistryError::DuplicateKey(id));
        }
        entries.insert(
            id,
            Entry {
                worker,
                stop_requested: false,
                spawned_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub async fn start(&self, id: ConnectionId) -> Result<(), RegistryError> {
        let entries = self.entries.read().await;
        let entry = entries.get(&id).ok_or(RegistryError::NotFound(id))?;
        entry.worker.start();
        Ok(())
    }

    /// Ask the worker for `id` to stop.
    ///
    /// Returns `true` on the first request for this registration and `false`
    /// afterwards; the worker is only signalled once.
    pub async fn request_stop(&self, id: ConnectionId) -> Result<bool, RegistryError> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        if entry.stop_requested {
            return Ok(false);
        }
        entry.stop_requested = true;
        entry.worker.request_stop();
        Ok(true)
    }

    pub async fn force_kill(&self, id: ConnectionId) -> Result<(), RegistryError> {
        let entries = self.entries.read().await;
        let entry = entries.get(&id).ok_or(RegistryError::NotFound(id))?;
        entry.worker.force_kill();
        Ok(())
    }

    /// Ids whose workers are observed terminated, in id order
    pub async fn terminated(&self) -> Vec<ConnectionId> {
        let entries = self.entries.read().await;
        let mut ids: Vec<ConnectionId> = entries
            .iter()
            .filter(|(_, entry)| entry.worker.state().is_terminal())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn remove(&self, id: ConnectionId) -> Result<Box<dyn Worker>, RegistryError> {
        self.entries
            .write()
            .await
            .remove(&id)
            .map(|entry| entry.worker)
            .ok_or(RegistryError::NotFound(id))
    }

    /// Consistent status of every registered worker, in id order
    pub async fn snapshot(&self) -> Vec<WorkerStatus> {
        let entries = self.entries.read().await;
        let mut statuses: Vec<WorkerStatus> = entries
            .iter()
            .map(|(id, entry)| WorkerStatus {
                id: *id,
                kind: entry.worker.kind(),
                state: entry.worker.state(),
                stop_requested: entry.stop_requested,
                spawned_at: entry.spawned_at,
            })
            .collect();
        statuses.sort_by_key(|status| status.id);
        statuses
    }
}
