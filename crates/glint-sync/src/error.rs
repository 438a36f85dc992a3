//! Replication error types.

use glint_store::StoreError;
use thiserror::Error;

/// Replication error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A frame arriving over the wire could not be decoded or applied in
    /// the current state. Fatal to the replication session, not the process.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Applying an incoming snapshot or diff was refused by the store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The peer's channel endpoint is gone.
    #[error("transport closed")]
    TransportClosed,
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;
