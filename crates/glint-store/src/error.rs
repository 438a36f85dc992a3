//! Store error types.

use glint_records::{RecordId, SchemaViolation};
use thiserror::Error;

/// Store error type.
#[derive(Clone, Debug, Error)]
pub enum StoreError {
    /// A record failed its schema check. Never retried.
    #[error(transparent)]
    Schema(#[from] SchemaViolation),

    /// `update` was called for an ID that is not in the store. Callers that
    /// mean "insert or replace" should use `put` instead.
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// A snapshot was produced by a process running a different schema.
    #[error("snapshot schema mismatch: this process runs version {ours}, snapshot has version {theirs}")]
    SchemaMismatch { ours: u32, theirs: u32 },
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
