// ABOUTME: Worker supervision: registry, worker variants, reconciliation, and the loop.
// ABOUTME: Keeps one live session per eligible connection and reaps the rest.

pub mod cleanup;
pub mod error;
pub mod heartbeat;
pub mod native;
pub mod process;
pub mod reconcile;
pub mod registry;
pub mod run;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cleanup::cleanup_connection;
pub use error::{MasterError, RegistryError};
pub use native::{NativeWorker, NativeWorkerFactory};
pub use process::{ProcessWorker, ProcessWorkerFactory, SessionCommand};
pub use reconcile::{Reconciler, TickReport};
pub use registry::{WorkerRegistry, WorkerStatus};
pub use run::{ShutdownReport, Supervisor, SupervisorSettings, SupervisorState};
pub use worker::{StateCell, Worker, WorkerFactory};
