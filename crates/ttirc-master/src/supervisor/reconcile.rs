// ABOUTME: One reconciliation pass: diff the eligible set against the registry.
// ABOUTME: Spawns missing workers, asks unwanted ones to stop, reaps terminated ones.

use super::cleanup::cleanup_connection;
use super::error::MasterError;
use super::registry::WorkerRegistry;
use super::worker::WorkerFactory;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use ttirc_master_core::{ConnectionId, ConnectionSpec};
use ttirc_store::ConnectionStore;

/// What one pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub spawned: Vec<ConnectionId>,
    pub stop_requested: Vec<ConnectionId>,
    pub reaped: Vec<ConnectionId>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.spawned.is_empty() && self.stop_requested.is_empty() && self.reaped.is_empty()
    }
}

pub struct Reconciler {
    store: Arc<dyn ConnectionStore>,
    registry: Arc<WorkerRegistry>,
    factory: Arc<dyn WorkerFactory>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        registry: Arc<WorkerRegistry>,
        factory: Arc<dyn WorkerFactory>,
    ) -> Self {
        Self {
            store,
            registry,
            factory,
        }
    }

    /// Fetch the eligible set and apply it.
    ///
    /// A store failure while fetching leaves the registry untouched.
    pub async fn reconcile(&self) -> Result<TickReport, MasterError> {
        let specs = self.store.list_eligible_connections().await?;
        self.apply(&specs).await
    }

    /// Bring the registry in line with `eligible`: spawn, then stop, then reap.
    pub async fn apply(&self, eligible: &[ConnectionSpec]) -> Result<TickReport, MasterError> {
        let desired: BTreeSet<ConnectionId> = eligible.iter().map(|spec| spec.id).collect();
        let current = self.registry.list().await;
        let mut report = TickReport::default();

        for &id in desired.difference(&current) {
            let worker = self.factory.create(id);
            self.registry.insert(id, worker).await?;
            self.registry.start(id).await?;
            info!(connection_id = %id, kind = %self.factory.kind(), "Spawned worker");
            report.spawned.push(id);
        }

        for &id in current.difference(&desired) {
            if self.registry.request_stop(id).await? {
                info!(connection_id = %id, "Connection no longer eligible, stopping worker");
                report.stop_requested.push(id);
            }
        }

        for id in self.registry.terminated().await {
            if let Err(e) = cleanup_connection(self.store.as_ref(), id).await {
                warn!(connection_id = %id, error = %e, "Cleanup failed, will retry next tick");
                continue;
            }
            self.registry.remove(id).await?;
            info!(connection_id = %id, "Reaped worker");
            report.reaped.push(id);
        }

        Ok(report)
    }
}
