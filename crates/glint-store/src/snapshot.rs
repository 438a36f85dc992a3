//! Full-store snapshots.
//!
//! A snapshot carries the entire ID → record mapping plus the schema header
//! of the process that produced it. It exists for one purpose: handing a
//! newly-subscribed display process its initial state. Incremental updates
//! always travel as diffs.

use std::collections::BTreeMap;

use glint_records::{Record, RecordId, SchemaInfo};
use serde::{Deserialize, Serialize};

/// The full store state at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Header of the schema that produced this snapshot.
    pub schema: SchemaInfo,
    /// Every record in the store, keyed by ID.
    pub records: BTreeMap<RecordId, Record>,
}

impl StoreSnapshot {
    /// Number of records in the snapshot.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
