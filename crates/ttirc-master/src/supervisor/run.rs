// ABOUTME: Supervisor loop: heartbeat and reconcile on a fixed interval until cancelled.
// ABOUTME: On shutdown it drains every worker, force-killing stragglers at the deadline.

use super::cleanup::cleanup_connection;
use super::error::MasterError;
use super::heartbeat;
use super::reconcile::{Reconciler, TickReport};
use super::registry::WorkerRegistry;
use super::worker::WorkerFactory;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ttirc_master_core::Config;
use ttirc_store::ConnectionStore;

/// Timing knobs for the loop and the shutdown drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Pause between ticks
    pub idle_interval: Duration,
    /// How long shutdown waits for graceful termination
    pub shutdown_timeout: Duration,
    /// How often shutdown re-checks worker states
    pub drain_poll_interval: Duration,
    /// How long force-killed workers get to report termination
    pub kill_grace: Duration,
}

impl SupervisorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_interval: config.idle_interval(),
            shutdown_timeout: config.shutdown_timeout(),
            ..Self::default()
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
            drain_poll_interval: Duration::from_millis(100),
            kill_grace: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    ShuttingDown,
    Stopped,
}

/// Outcome of draining the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that terminated before the deadline
    pub drained: usize,
    /// Workers that had to be force-killed
    pub forced: usize,
    /// Workers whose store cleanup failed (still removed)
    pub cleanup_failures: usize,
}

pub struct Supervisor {
    store: Arc<dyn ConnectionStore>,
    registry: Arc<WorkerRegistry>,
    reconciler: Reconciler,
    settings: SupervisorSettings,
    state: watch::Sender<SupervisorState>,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        factory: Arc<dyn WorkerFactory>,
        settings: SupervisorSettings,
    ) -> Self {
        let registry = Arc::new(WorkerRegistry::new());
        let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&registry), factory);
        let (state, _rx) = watch::channel(SupervisorState::Running);
        Self {
            store,
            registry,
            reconciler,
            settings,
            state,
        }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Publish liveness, then reconcile. A failed heartbeat does not skip reconciliation.
    pub async fn tick(&self) -> Result<TickReport, MasterError> {
        if let Err(e) = heartbeat::publish(self.store.as_ref()).await {
            warn!(error = %e, "Failed to publish heartbeat");
        }
        self.reconciler.reconcile().await
    }

    /// Tick until `shutdown` is cancelled, then drain.
    ///
    /// Store outages are logged and retried on the next tick. A registry
    /// invariant violation drains the workers and is returned as the error.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<ShutdownReport, MasterError> {
        info!(
            idle_interval_ms = self.settings.idle_interval.as_millis() as u64,
            "Supervisor started"
        );

        while !shutdown.is_cancelled() {
            match self.tick().await {
                Ok(report) if !report.is_idle() => debug!(
                    spawned = report.spawned.len(),
                    stop_requested = report.stop_requested.len(),
                    reaped = report.reaped.len(),
                    "Tick complete"
                ),
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Supervisor stopping after fatal error");
                    self.shutdown().await;
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "Reconciliation skipped"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.idle_interval) => {}
            }
        }

        Ok(self.shutdown().await)
    }

    /// Stop every worker, wait up to the shutdown timeout, kill the rest,
    /// and clean up all of them. Leaves the registry empty.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.state.send_replace(SupervisorState::ShuttingDown);
        let workers = self.registry.len().await;
        info!(workers, "Shutting down");

        for id in self.registry.list().await {
            if let Err(e) = self.registry.request_stop(id).await {
                warn!(connection_id = %id, error = %e, "Failed to request stop");
            }
        }

        let deadline = Instant::now() + self.settings.shutdown_timeout;
        self.wait_for_termination(deadline).await;

        let mut report = ShutdownReport::default();
        for status in self.registry.snapshot().await {
            if status.state.is_terminal() {
                continue;
            }
            warn!(
                connection_id = %status.id,
                state = %status.state,
                abnormal = true,
                "Worker missed shutdown deadline, killing"
            );
            if let Err(e) = self.registry.force_kill(status.id).await {
                warn!(connection_id = %status.id, error = %e, "Failed to kill worker");
            }
            report.forced += 1;
        }
        if report.forced > 0 {
            self.wait_for_termination(Instant::now() + self.settings.kill_grace)
                .await;
        }

        for id in self.registry.list().await {
            if let Some(state) = self.registry.state(id).await {
                if !state.is_terminal() {
                    warn!(connection_id = %id, %state, "Removing worker that never reported termination");
                }
            }
            if let Err(e) = cleanup_connection(self.store.as_ref(), id).await {
                warn!(connection_id = %id, error = %e, "Cleanup failed during shutdown");
                report.cleanup_failures += 1;
            }
            match self.registry.remove(id).await {
                Ok(_) => report.drained += 1,
                Err(e) => warn!(connection_id = %id, error = %e, "Failed to remove worker"),
            }
        }
        report.drained = report.drained.saturating_sub(report.forced);

        if let Err(e) = self.store.set_supervisor_alive(false).await {
            warn!(error = %e, "Failed to clear running flag");
        }

        self.state.send_replace(SupervisorState::Stopped);
        info!(
            drained = report.drained,
            forced = report.forced,
            cleanup_failures = report.cleanup_failures,
            "Supervisor stopped"
        );
        report
    }

    async fn wait_for_termination(&self, deadline: Instant) {
        loop {
            let pending = self
                .registry
                .snapshot()
                .await
                .iter()
                .filter(|status| !status.state.is_terminal())
                .count();
            let now = Instant::now();
            if pending == 0 || now >= deadline {
                return;
            }
            let pause = self.settings.drain_poll_interval.min(deadline - now);
            tokio::time::sleep(pause).await;
        }
    }
}
