//! # Glint queries
//!
//! Derived, auto-updating views over a [`Store`]. The store itself only
//! knows about records and diffs; this crate layers per-type indexes on top
//! of it using `futures-signals` cells, and builds the lookups the UI
//! actually renders from: "all records of this type", "the window owning
//! this child window", "is a capture in flight".
//!
//! Recomputation is push-driven: a store diff refreshes only the index cells
//! of the types it touches, once per diff, and `set_neq` keeps watchers
//! quiet when a refresh produces an identical value. Reading any view always
//! reflects the latest committed store state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures_signals::map_ref;
use futures_signals::signal::{Mutable, Signal, SignalExt};
use glint_records::{
    ChildWindowId, DisplayId, DisplayRecord, Record, RecordId, RecordType, WindowRecord,
};
use glint_store::{ListenerId, RecordsDiff, Store};
use tracing::debug;

/// Reactive per-type indexes and the lookups derived from them.
pub struct StoreQueries {
    store: Arc<Store>,
    indexes: BTreeMap<RecordType, Mutable<Vec<Record>>>,
    listener: ListenerId,
}

impl StoreQueries {
    /// Builds the query layer over a store.
    ///
    /// Seeds one index cell per record type from the current contents, then
    /// keeps the cells fresh from the store's change feed.
    pub fn new(store: Arc<Store>) -> Self {
        let mut indexes = BTreeMap::new();
        for record_type in RecordType::ALL {
            indexes.insert(record_type, Mutable::new(Vec::new()));
        }
        for record in store.all_records() {
            if let Some(cell) = indexes.get(&record.record_type()) {
                cell.lock_mut().push(record);
            }
        }

        // The listener owns only clones of the cells, never the store, so a
        // dropped StoreQueries leaves no reference cycle behind.
        let cells = indexes.clone();
        let listener = store.listen(move |diff, _source| {
            refresh_indexes(&cells, diff);
        });
        debug!("store queries attached");

        Self {
            store,
            indexes,
            listener,
        }
    }

    fn index(&self, record_type: RecordType) -> &Mutable<Vec<Record>> {
        // Populated for every type tag in new().
        self.indexes
            .get(&record_type)
            .expect("index exists for every record type")
    }

    /// Current records of a type, in ID order.
    pub fn records(&self, record_type: RecordType) -> Vec<Record> {
        self.index(record_type).get_cloned()
    }

    /// Live list of records of a type.
    pub fn records_signal(&self, record_type: RecordType) -> impl Signal<Item = Vec<Record>> {
        self.index(record_type).signal_cloned()
    }

    /// Current IDs of a type, in ID order.
    pub fn ids(&self, record_type: RecordType) -> Vec<RecordId> {
        self.records(record_type)
            .iter()
            .map(|record| record.id().clone())
            .collect()
    }

    /// The first record of a type matching a predicate.
    ///
    /// Linear in the type index, which holds tens of records at most.
    pub fn record_where(
        &self,
        record_type: RecordType,
        predicate: impl Fn(&Record) -> bool,
    ) -> Option<Record> {
        self.records(record_type).into_iter().find(|r| predicate(r))
    }

    /// Live single-record lookup by predicate.
    pub fn record_signal(
        &self,
        record_type: RecordType,
        predicate: impl Fn(&Record) -> bool + 'static,
    ) -> impl Signal<Item = Option<Record>> {
        self.index(record_type)
            .signal_cloned()
            .map(move |records| records.into_iter().find(|r| predicate(r)))
    }

    /// The window record owned by the given child window, if any.
    pub fn window_for_child(&self, child_window_id: &ChildWindowId) -> Option<WindowRecord> {
        self.record_where(RecordType::Window, |record| {
            record
                .as_window()
                .is_some_and(|w| w.child_window_id.as_ref() == Some(child_window_id))
        })
        .and_then(|record| record.as_window().cloned())
    }

    /// Live version of [`StoreQueries::window_for_child`].
    pub fn window_for_child_signal(
        &self,
        child_window_id: ChildWindowId,
    ) -> impl Signal<Item = Option<WindowRecord>> {
        self.record_signal(RecordType::Window, move |record| {
            record
                .as_window()
                .is_some_and(|w| w.child_window_id.as_ref() == Some(&child_window_id))
        })
        .map(|record| record.and_then(|r| r.as_window().cloned()))
    }

    /// The display record for a platform display ID, if any.
    pub fn display_by_id(&self, display_id: DisplayId) -> Option<DisplayRecord> {
        self.store
            .get(&DisplayRecord::id_for(display_id))
            .and_then(|record| record.as_display().cloned())
    }

    /// Everything the user currently has in flight: captures and editors.
    pub fn activities(&self) -> Vec<Record> {
        let mut activities = self.records(RecordType::Capture);
        activities.extend(self.records(RecordType::Editor));
        activities
    }

    /// Whether any capture or editor activity exists.
    pub fn has_activities(&self) -> bool {
        !self.activities().is_empty()
    }

    /// Live version of [`StoreQueries::has_activities`].
    pub fn has_activities_signal(&self) -> impl Signal<Item = bool> {
        map_ref! {
            let captures = self.index(RecordType::Capture).signal_cloned(),
            let editors = self.index(RecordType::Editor).signal_cloned() =>
            !captures.is_empty() || !editors.is_empty()
        }
        .dedupe()
    }
}

impl Drop for StoreQueries {
    fn drop(&mut self) {
        self.store.unlisten(self.listener);
    }
}

/// Applies a store diff to the index cells of the types it touches.
fn refresh_indexes(cells: &BTreeMap<RecordType, Mutable<Vec<Record>>>, diff: &RecordsDiff) {
    let mut touched = BTreeSet::new();
    for record in diff.added.values() {
        touched.insert(record.record_type());
    }
    for (_, new) in diff.updated.values() {
        touched.insert(new.record_type());
    }
    for record in diff.removed.values() {
        touched.insert(record.record_type());
    }

    for record_type in touched {
        let Some(cell) = cells.get(&record_type) else {
            continue;
        };
        let mut records = cell.get_cloned();

        records.retain(|record| {
            !diff.removed.contains_key(record.id()) && !diff.updated.contains_key(record.id())
        });
        for record in diff.added.values().chain(diff.updated.values().map(|(_, new)| new)) {
            if record.record_type() == record_type {
                records.push(record.clone());
            }
        }
        records.sort_by(|a, b| a.id().cmp(b.id()));

        cell.set_neq(records);
    }
}
