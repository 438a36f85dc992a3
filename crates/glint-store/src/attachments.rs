//! Attachments for non-serializable values.
//!
//! Live platform handles (native window objects, video streams) can't live
//! inside records, which are plain data. An attachment map keeps such values
//! next to their records and drops each one the moment its record is removed
//! from the store, so handles never outlive the state they belong to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use glint_records::RecordId;

use crate::store::{ListenerId, Store};

/// In-memory values keyed by record ID, pruned on record removal.
pub struct RecordAttachmentMap<V> {
    map: Arc<Mutex<HashMap<RecordId, V>>>,
    store: Arc<Store>,
    listener: ListenerId,
}

impl<V: Send + 'static> RecordAttachmentMap<V> {
    /// Creates an attachment map bound to the given store.
    pub fn new(store: Arc<Store>) -> Self {
        let map: Arc<Mutex<HashMap<RecordId, V>>> = Arc::new(Mutex::new(HashMap::new()));
        let pruned = map.clone();
        let listener = store.listen(move |diff, _source| {
            if diff.removed.is_empty() {
                return;
            }
            let mut map = pruned.lock().expect("lock poisoned");
            for id in diff.removed.keys() {
                map.remove(id);
            }
        });

        Self {
            map,
            store,
            listener,
        }
    }

    /// Attaches a value to a record ID, replacing any previous one.
    pub fn insert(&self, id: RecordId, value: V) -> Option<V> {
        self.map.lock().expect("lock poisoned").insert(id, value)
    }

    /// Detaches and returns the value for a record ID.
    pub fn remove(&self, id: &RecordId) -> Option<V> {
        self.map.lock().expect("lock poisoned").remove(id)
    }

    /// Whether a value is attached to this record ID.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.map.lock().expect("lock poisoned").contains_key(id)
    }

    /// Runs a closure over the attached value, if any.
    pub fn with<R>(&self, id: &RecordId, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.map.lock().expect("lock poisoned").get(id).map(f)
    }

    /// Number of attached values.
    pub fn len(&self) -> usize {
        self.map.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().expect("lock poisoned").is_empty()
    }
}

impl<V> Drop for RecordAttachmentMap<V> {
    fn drop(&mut self) {
        self.store.unlisten(self.listener);
    }
}
