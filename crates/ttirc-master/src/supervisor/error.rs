// ABOUTME: Error types for the supervisor using thiserror.
// ABOUTME: Registry invariant violations versus transient store failures.

use thiserror::Error;
use ttirc_master_core::ConnectionId;
use ttirc_store::StoreError;

/// Registry bookkeeping errors. These indicate a reconciliation logic bug,
/// never an environmental fault.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A worker is already registered for this connection.
    #[error("worker already registered for connection {0}")]
    DuplicateKey(ConnectionId),

    /// No worker is registered for this connection.
    #[error("no worker registered for connection {0}")]
    NotFound(ConnectionId),
}

/// Why a supervisor tick could not complete.
#[derive(Error, Debug)]
pub enum MasterError {
    /// The store could not be reached; the tick is retried next cycle.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Registry invariant violated; fatal.
    #[error("registry invariant violated: {0}")]
    Registry(#[from] RegistryError),
}

impl MasterError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, MasterError::Registry(_))
    }
}
