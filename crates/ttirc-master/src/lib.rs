// ABOUTME: ttirc master library: supervisor, worker variants, session seam, and wizard.
// ABOUTME: run_master wires config, store, and supervisor together for the binary.

pub mod configure;
pub mod session;
pub mod supervisor;

pub use configure::run_configure;
pub use session::{SessionContext, SessionHandler};
pub use supervisor::{
    MasterError, NativeWorkerFactory, ProcessWorkerFactory, SessionCommand, ShutdownReport,
    Supervisor, SupervisorSettings, SupervisorState, Worker, WorkerFactory, WorkerRegistry,
};
pub use ttirc_master_core::Config;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use ttirc_master_core::{WorkerKind, MASTER_RUNNING_KEY};
use ttirc_store::{ConnectionStore, SqliteStore};

/// Options for running the master
#[derive(Debug, Default)]
pub struct MasterOptions {
    /// Explicit config file; overrides `node`
    pub config_path: Option<PathBuf>,
    /// Settings namespace under the config directory
    pub node: Option<String>,
    /// Run the wizard even if a config file exists
    pub configure: bool,
    /// Reset stored connection state and exit
    pub cleanup_only: bool,
    /// Override the configured worker variant
    pub native: Option<bool>,
}

/// Run the master with the external worker, or the native one if configured.
///
/// The binary embeds no IRC session handler, so selecting the native worker
/// here is an error; embedders call [`run_master_with`] instead.
pub async fn run_master(options: MasterOptions) -> Result<()> {
    run_master_with(options, None).await
}

/// Run the master, using `handler` for in-process sessions.
pub async fn run_master_with(
    options: MasterOptions,
    handler: Option<Arc<dyn SessionHandler>>,
) -> Result<()> {
    let config_path = match options.config_path {
        Some(path) => path,
        None => Config::default_path(options.node.as_deref())?,
    };

    let mut config = if options.configure || !config_path.exists() {
        let existing = if config_path.exists() {
            Config::load(&config_path).ok()
        } else {
            None
        };
        run_configure(&config_path, existing)?
    } else {
        Config::load(&config_path)?
    };

    if let Some(native) = options.native {
        config.worker = if native {
            WorkerKind::Native
        } else {
            WorkerKind::External
        };
    }

    let database = config.database_path();
    let store = Arc::new(
        SqliteStore::open(&database)
            .await
            .with_context(|| format!("Failed to open database {}", database.display()))?
            .with_freshness_window(config.freshness_window()),
    );

    // Worker selection is settled before any stored state changes.
    let factory = if options.cleanup_only {
        None
    } else {
        match build_factory(&config, handler, store.clone()) {
            Ok(factory) => Some(factory),
            Err(e) => {
                store.close().await;
                return Err(e);
            }
        }
    };

    if store.system_value(MASTER_RUNNING_KEY).await?.as_deref() == Some("true") {
        warn!("Previous master did not shut down cleanly (or is still running)");
    }

    store
        .reset_all()
        .await
        .context("Failed to reset connection state")?;
    info!(database = %database.display(), "Connection state reset");

    let Some(factory) = factory else {
        store.close().await;
        return Ok(());
    };

    info!(
        config = %config_path.display(),
        worker = %config.worker,
        "Starting ttirc master"
    );

    let supervisor = Supervisor::new(
        store.clone(),
        factory,
        SupervisorSettings::from_config(&config),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let result = supervisor.run(shutdown).await;
    store.close().await;

    let report = result.context("Supervisor failed")?;
    if report.forced > 0 {
        warn!(forced = report.forced, "Some workers had to be killed");
    }
    Ok(())
}

fn build_factory(
    config: &Config,
    handler: Option<Arc<dyn SessionHandler>>,
    store: Arc<dyn ConnectionStore>,
) -> Result<Arc<dyn WorkerFactory>> {
    match config.worker {
        WorkerKind::External => Ok(Arc::new(ProcessWorkerFactory::new(SessionCommand::new(
            config.session_command.clone(),
            config.session_args.clone(),
        )))),
        WorkerKind::Native => {
            let handler = handler.context(
                "native worker selected but no session handler is built in; \
                 use the external worker (--native false)",
            )?;
            Ok(Arc::new(NativeWorkerFactory::new(handler, store)))
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::testing::RecordingStore;
    use async_trait::async_trait;
    use ttirc_master_core::ConnectionId;

    struct Idle;

    #[async_trait]
    impl SessionHandler for Idle {
        async fn run(&self, session: SessionContext) -> Result<()> {
            session.stopped().await;
            Ok(())
        }
    }

    fn write_config(dir: &tempfile::TempDir, worker: WorkerKind) -> PathBuf {
        let path = dir.path().join("master.toml");
        let config = Config {
            database: dir.path().join("ttirc.db").display().to_string(),
            worker,
            ..Config::default()
        };
        config.save(&path).unwrap();
        path
    }

    #[test]
    fn test_factory_follows_configured_worker() {
        let store: Arc<dyn ConnectionStore> = Arc::new(RecordingStore::new());
        let external = Config::default();
        let factory = build_factory(&external, None, store.clone()).unwrap();
        assert_eq!(factory.kind(), WorkerKind::External);

        let native = Config {
            worker: WorkerKind::Native,
            ..Config::default()
        };
        let factory = build_factory(&native, Some(Arc::new(Idle)), store.clone()).unwrap();
        assert_eq!(factory.kind(), WorkerKind::Native);
        assert_eq!(factory.create(ConnectionId(1)).kind(), WorkerKind::Native);
    }

    #[test]
    fn test_native_without_handler_is_rejected() {
        let store: Arc<dyn ConnectionStore> = Arc::new(RecordingStore::new());
        let native = Config {
            worker: WorkerKind::Native,
            ..Config::default()
        };
        let err = build_factory(&native, None, store).err().unwrap();
        assert!(err.to_string().contains("no session handler"));
    }

    #[tokio::test]
    async fn test_cleanup_only_resets_and_exits() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(&dir, WorkerKind::External);

        run_master(MasterOptions {
            config_path: Some(config_path),
            cleanup_only: true,
            ..MasterOptions::default()
        })
        .await
        .unwrap();

        let store = SqliteStore::open(&dir.path().join("ttirc.db")).await.unwrap();
        assert_eq!(
            store.system_value(MASTER_RUNNING_KEY).await.unwrap().as_deref(),
            Some("false")
        );
    }

    #[tokio::test]
    async fn test_cleanup_only_needs_no_session_handler() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(&dir, WorkerKind::Native);

        run_master(MasterOptions {
            config_path: Some(config_path),
            cleanup_only: true,
            ..MasterOptions::default()
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_native_without_handler_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(&dir, WorkerKind::External);
        let database = dir.path().join("ttirc.db");

        // A master that is still running elsewhere owns this flag.
        let store = SqliteStore::open(&database).await.unwrap();
        store.set_supervisor_alive(true).await.unwrap();
        store.close().await;

        let err = run_master(MasterOptions {
            config_path: Some(config_path),
            native: Some(true),
            ..MasterOptions::default()
        })
        .await
        .unwrap_err();

        assert!(format!("{:#}", err).contains("no session handler"));
        let store = SqliteStore::open(&database).await.unwrap();
        assert_eq!(
            store.system_value(MASTER_RUNNING_KEY).await.unwrap().as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_invalid_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("master.toml");
        std::fs::write(&config_path, "database = \"\"\n").unwrap();

        let err = run_master(MasterOptions {
            config_path: Some(config_path),
            ..MasterOptions::default()
        })
        .await
        .unwrap_err();

        assert!(format!("{:#}", err).contains("database must not be empty"));
    }
}
