//! The record store.
//!
//! One store per process, constructed at startup and passed by reference to
//! whatever needs it. All mutation goes through the batch entry points here;
//! each successful call commits atomically and delivers exactly one diff to
//! every listener, tagged with the source of the change.
//!
//! The replication layer never uses an ambient "remote" scope: every applying
//! entry point takes an explicit [`ChangeSource`], and the plain
//! `put`/`remove`/`update` methods default it to `Local`.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use glint_records::{Record, RecordId, Schema, SchemaViolation};
use tracing::{error, trace};

use crate::diff::RecordsDiff;
use crate::error::{StoreError, StoreResult};
use crate::snapshot::StoreSnapshot;

/// Who caused a change.
///
/// `Local` mutations originate in this process and are the only ones the
/// replication layer forwards; everything applied on behalf of another
/// process is `Remote`, which is what stops a replicated change from being
/// broadcast straight back to its origin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeSource {
    Local,
    Remote,
}

/// Handle for removing a registered listener.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&RecordsDiff, ChangeSource) + Send + Sync>;

/// The in-memory keyed collection of all records in one process.
pub struct Store {
    schema: Schema,
    records: RwLock<BTreeMap<RecordId, Record>>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("schema", &self.schema)
            .field("records", &self.len())
            .finish()
    }
}

impl Store {
    /// Creates an empty store over the given schema.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            records: RwLock::new(BTreeMap::new()),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    /// The schema this store validates against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Looks up a record by ID.
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.records.read().expect("lock poisoned").get(id).cloned()
    }

    /// Whether a record with this ID exists.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.read().expect("lock poisoned").contains_key(id)
    }

    /// Number of records across all types.
    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().expect("lock poisoned").is_empty()
    }

    /// All records, in ID order.
    pub fn all_records(&self) -> Vec<Record> {
        self.records
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Upserts a batch of locally-originated records.
    pub fn put(&self, records: Vec<Record>) -> StoreResult<()> {
        self.put_with_source(records, ChangeSource::Local)
    }

    /// Upserts a batch of records with an explicit change source.
    ///
    /// All-or-nothing: if any record fails validation the store is untouched
    /// and no diff is emitted. Replacing a record with an identical value is
    /// dropped from the diff; a batch of only such writes emits nothing.
    pub fn put_with_source(&self, records: Vec<Record>, source: ChangeSource) -> StoreResult<()> {
        for record in &records {
            self.schema.validate(record)?;
        }

        let mut diff = RecordsDiff::new();
        {
            let mut map = self.records.write().expect("lock poisoned");
            for record in records {
                upsert(&mut map, &mut diff, record);
            }
        }

        self.commit(diff, source);
        Ok(())
    }

    /// Removes a batch of locally-originated records by ID.
    pub fn remove(&self, ids: &[RecordId]) {
        self.remove_with_source(ids, ChangeSource::Local)
    }

    /// Removes records by ID with an explicit change source.
    ///
    /// Absent IDs are skipped: two racing "close this window" signals must
    /// both succeed, so removal is idempotent and infallible.
    pub fn remove_with_source(&self, ids: &[RecordId], source: ChangeSource) {
        let mut diff = RecordsDiff::new();
        {
            let mut map = self.records.write().expect("lock poisoned");
            for id in ids {
                if let Some(old) = map.remove(id) {
                    diff.removed.insert(id.clone(), old);
                }
            }
        }

        self.commit(diff, source);
    }

    /// Loads a record, transforms it, and puts the result back.
    ///
    /// Fails with [`StoreError::NotFound`] if the ID is absent; callers that
    /// mean "insert or replace" must use [`Store::put`]. The transform must
    /// keep the record's ID.
    pub fn update(&self, id: &RecordId, f: impl FnOnce(Record) -> Record) -> StoreResult<()> {
        let current = self
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let next = f(current);
        if next.id() != id {
            return Err(SchemaViolation::new(
                next.record_type(),
                "id",
                format!("update must keep the record ID (was {id}, got {})", next.id()),
            )
            .into());
        }
        self.put_with_source(vec![next], ChangeSource::Local)
    }

    /// Applies a whole diff transactionally.
    ///
    /// Added and updated records are upserted, removed records removed.
    /// Every incoming record is validated before any write, so a malformed
    /// diff leaves the store untouched. The emitted diff describes what
    /// actually changed here, not what the incoming diff claimed.
    pub fn apply_diff(&self, diff: &RecordsDiff, source: ChangeSource) -> StoreResult<()> {
        for record in diff.added.values() {
            self.schema.validate(record)?;
        }
        for (_, new) in diff.updated.values() {
            self.schema.validate(new)?;
        }

        let mut applied = RecordsDiff::new();
        {
            let mut map = self.records.write().expect("lock poisoned");
            for record in diff.added.values() {
                upsert(&mut map, &mut applied, record.clone());
            }
            for (_, new) in diff.updated.values() {
                upsert(&mut map, &mut applied, new.clone());
            }
            for id in diff.removed.keys() {
                if let Some(old) = map.remove(id) {
                    applied.removed.insert(id.clone(), old);
                }
            }
        }

        self.commit(applied, source);
        Ok(())
    }

    /// Serializes the full store for initial sync.
    pub fn serialize(&self) -> StoreSnapshot {
        StoreSnapshot {
            schema: self.schema.info(),
            records: self.records.read().expect("lock poisoned").clone(),
        }
    }

    /// Replaces the entire store contents from a locally-produced snapshot.
    pub fn deserialize(&self, snapshot: StoreSnapshot) -> StoreResult<()> {
        self.deserialize_with_source(snapshot, ChangeSource::Local)
    }

    /// Replaces the entire store contents with an explicit change source.
    ///
    /// Rejects snapshots from a foreign schema and validates every incoming
    /// record before touching anything. Listeners receive one synthetic diff
    /// describing the whole replacement, never per-record events.
    pub fn deserialize_with_source(
        &self,
        snapshot: StoreSnapshot,
        source: ChangeSource,
    ) -> StoreResult<()> {
        if !self.schema.accepts(&snapshot.schema) {
            return Err(StoreError::SchemaMismatch {
                ours: self.schema.version(),
                theirs: snapshot.schema.version,
            });
        }
        for record in snapshot.records.values() {
            self.schema.validate(record)?;
        }

        let mut diff = RecordsDiff::new();
        {
            let mut map = self.records.write().expect("lock poisoned");
            for (id, new_record) in &snapshot.records {
                match map.get(id) {
                    Some(old_record) if old_record == new_record => {}
                    Some(old_record) => {
                        diff.updated
                            .insert(id.clone(), (old_record.clone(), new_record.clone()));
                    }
                    None => {
                        diff.added.insert(id.clone(), new_record.clone());
                    }
                }
            }
            for (id, old_record) in map.iter() {
                if !snapshot.records.contains_key(id) {
                    diff.removed.insert(id.clone(), old_record.clone());
                }
            }
            *map = snapshot.records;
        }

        self.commit(diff, source);
        Ok(())
    }

    /// Registers a change listener.
    ///
    /// Every successful mutating call delivers exactly one `(diff, source)`
    /// pair to every listener. A panicking listener is caught and logged so
    /// it cannot starve the others.
    pub fn listen(&self, callback: impl Fn(&RecordsDiff, ChangeSource) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .expect("lock poisoned")
            .push((id, Arc::new(callback)));
        id
    }

    /// Removes a listener. Returns true if it was registered.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().expect("lock poisoned");
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().expect("lock poisoned").len()
    }

    fn commit(&self, diff: RecordsDiff, source: ChangeSource) {
        if diff.is_empty() {
            return;
        }
        trace!(
            added = diff.added.len(),
            updated = diff.updated.len(),
            removed = diff.removed.len(),
            ?source,
            "store commit"
        );

        // Release the listener lock before dispatch so listeners may
        // re-enter the store.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&diff, source))).is_err() {
                error!("store listener panicked; continuing with remaining listeners");
            }
        }
    }
}

/// Writes one record into the map, folding the effect into `diff`.
///
/// Handles batches that touch the same ID twice: the diff keeps the value
/// from before the batch as the old value and the last write as the new one.
fn upsert(map: &mut BTreeMap<RecordId, Record>, diff: &mut RecordsDiff, record: Record) {
    let id = record.id().clone();
    let prev = map.insert(id.clone(), record.clone());

    if let Some(new_added) = diff.added.get_mut(&id) {
        *new_added = record;
        return;
    }
    if let Some((_, newest)) = diff.updated.get_mut(&id) {
        *newest = record;
        return;
    }
    match prev {
        Some(old) if old == record => {}
        Some(old) => {
            diff.updated.insert(id, (old, record));
        }
        None => {
            diff.added.insert(id, record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_records::{
        Bounds, CaptureActivityRecord, CaptureMode, DisplayId, DisplayRecord, EditorRecord,
        RecordType, Schema, SchemaInfo,
    };
    use std::sync::Mutex;

    fn make_store() -> Store {
        Store::new(Schema::capture_tool())
    }

    fn make_display(display_id: i64) -> Record {
        let bounds = Bounds::new(0, 0, 1920, 1080);
        DisplayRecord::new(DisplayId(display_id), bounds, bounds, 1.0).into()
    }

    fn make_editor() -> Record {
        EditorRecord::new().into()
    }

    /// Collects every (diff, source) pair a store delivers.
    fn record_diffs(store: &Store) -> Arc<Mutex<Vec<(RecordsDiff, ChangeSource)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.listen(move |diff, source| {
            sink.lock().unwrap().push((diff.clone(), source));
        });
        seen
    }

    #[test]
    fn put_then_get() {
        let store = make_store();
        let record = make_display(1);

        store.put(vec![record.clone()]).unwrap();

        assert_eq!(store.get(record.id()), Some(record));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn put_existing_id_is_an_update() {
        let store = make_store();
        let seen = record_diffs(&store);
        let v1 = make_editor();
        let mut v2 = v1.as_editor().cloned().unwrap();
        v2.hidden = true;
        let v2: Record = v2.into();

        store.put(vec![v1.clone()]).unwrap();
        store.put(vec![v2.clone()]).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0.added.get(v1.id()), Some(&v1));
        assert_eq!(seen[1].0.updated.get(v1.id()), Some(&(v1, v2)));
    }

    #[test]
    fn identical_put_emits_nothing() {
        let store = make_store();
        let record = make_display(1);
        store.put(vec![record.clone()]).unwrap();

        let seen = record_diffs(&store);
        store.put(vec![record]).unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = make_store();
        let good = make_display(1);
        let bounds = Bounds::new(0, 0, 10, 10);
        let bad: Record = DisplayRecord::new(DisplayId(2), bounds, bounds, -1.0).into();

        let seen = record_diffs(&store);
        let result = store.put(vec![good.clone(), bad]);

        assert!(matches!(result, Err(StoreError::Schema(_))));
        assert!(store.is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn batch_emits_one_diff() {
        let store = make_store();
        let seen = record_diffs(&store);

        store
            .put(vec![make_display(1), make_display(2), make_editor()])
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.added.len(), 3);
    }

    #[test]
    fn removal_is_idempotent() {
        let store = make_store();
        let record = make_display(1);
        store.put(vec![record.clone()]).unwrap();

        let seen = record_diffs(&store);
        store.remove(&[record.id().clone()]);
        store.remove(&[record.id().clone()]);
        store.remove(&[RecordId::custom(RecordType::Editor, "never-existed")]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1, "only the first removal changes anything");
        assert!(store.is_empty());
    }

    #[test]
    fn update_transforms_in_place() {
        let store = make_store();
        let record = make_editor();
        store.put(vec![record.clone()]).unwrap();

        store
            .update(record.id(), |current| {
                let mut editor = current.as_editor().cloned().unwrap();
                editor.hidden = true;
                editor.into()
            })
            .unwrap();

        let after = store.get(record.id()).unwrap();
        assert!(after.as_editor().unwrap().hidden);
    }

    #[test]
    fn update_missing_record_is_not_found() {
        let store = make_store();
        let id = RecordId::custom(RecordType::Editor, "missing");

        let result = store.update(&id, |record| record);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn update_must_keep_the_id() {
        let store = make_store();
        let record = make_editor();
        store.put(vec![record.clone()]).unwrap();

        let result = store.update(record.id(), |_| make_editor());
        assert!(matches!(result, Err(StoreError::Schema(_))));
    }

    #[test]
    fn singleton_upsert_collides_by_id() {
        let store = make_store();
        store
            .put(vec![CaptureActivityRecord::singleton(CaptureMode::Area).into()])
            .unwrap();
        store
            .put(vec![CaptureActivityRecord::singleton(CaptureMode::Window).into()])
            .unwrap();

        assert_eq!(store.len(), 1);
        let record = store.get(&CaptureActivityRecord::singleton_id()).unwrap();
        assert_eq!(record.as_capture().unwrap().mode, CaptureMode::Window);
    }

    #[test]
    fn diff_applies_to_a_fresh_copy() {
        // Diff correctness: replaying captured diffs onto a fresh store
        // reproduces the mutated store exactly.
        let store = make_store();
        let seen = record_diffs(&store);

        let a = make_display(1);
        let b = make_editor();
        store.put(vec![a.clone(), b.clone()]).unwrap();
        store
            .update(b.id(), |current| {
                let mut editor = current.as_editor().cloned().unwrap();
                editor.file_path = Some("/tmp/shot.png".to_string());
                editor.into()
            })
            .unwrap();
        store.remove(&[a.id().clone()]);

        let replay = make_store();
        for (diff, _) in seen.lock().unwrap().iter() {
            replay.apply_diff(diff, ChangeSource::Local).unwrap();
        }

        assert_eq!(replay.serialize().records, store.serialize().records);
    }

    #[test]
    fn squashed_diffs_apply_like_the_sequence() {
        // Diff composability: apply(A) then apply(B) == apply(A.squash(B)).
        let store = make_store();
        let seen = record_diffs(&store);

        let a = make_editor();
        store.put(vec![a.clone()]).unwrap();
        store
            .update(a.id(), |current| {
                let mut editor = current.as_editor().cloned().unwrap();
                editor.hidden = true;
                editor.into()
            })
            .unwrap();
        store.put(vec![make_display(7)]).unwrap();
        store.remove(&[a.id().clone()]);

        let diffs: Vec<RecordsDiff> =
            seen.lock().unwrap().iter().map(|(d, _)| d.clone()).collect();
        let squashed = diffs
            .into_iter()
            .reduce(|acc, next| acc.squash(next))
            .unwrap();

        let replay = make_store();
        replay.apply_diff(&squashed, ChangeSource::Local).unwrap();

        assert_eq!(replay.serialize().records, store.serialize().records);
    }

    #[test]
    fn snapshot_round_trip() {
        let store = make_store();
        store
            .put(vec![make_display(1), make_display(2), make_editor()])
            .unwrap();

        let restored = make_store();
        restored.deserialize(store.serialize()).unwrap();

        assert_eq!(restored.serialize().records, store.serialize().records);
    }

    #[test]
    fn deserialize_emits_one_replacement_diff() {
        let store = make_store();
        let stale = make_display(1);
        let kept = make_editor();
        store.put(vec![stale.clone(), kept.clone()]).unwrap();

        let incoming = make_store();
        incoming.put(vec![kept.clone(), make_display(2)]).unwrap();

        let seen = record_diffs(&store);
        store
            .deserialize_with_source(incoming.serialize(), ChangeSource::Remote)
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (diff, source) = &seen[0];
        assert_eq!(*source, ChangeSource::Remote);
        assert!(diff.removed.contains_key(stale.id()));
        assert_eq!(diff.added.len(), 1);
        assert!(!diff.updated.contains_key(kept.id()), "unchanged records are silent");
    }

    #[test]
    fn deserialize_rejects_foreign_schema() {
        let store = make_store();
        let mut snapshot = store.serialize();
        snapshot.schema = SchemaInfo {
            version: 99,
            record_types: snapshot.schema.record_types.clone(),
        };

        let result = store.deserialize(snapshot);
        assert!(matches!(result, Err(StoreError::SchemaMismatch { theirs: 99, .. })));
    }

    #[test]
    fn listener_panic_does_not_starve_others() {
        let store = make_store();
        store.listen(|_, _| panic!("bad listener"));
        let seen = record_diffs(&store);

        store.put(vec![make_editor()]).unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn unlisten_stops_delivery() {
        let store = make_store();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        let id = store.listen(move |_, _| *sink.lock().unwrap() += 1);

        store.put(vec![make_editor()]).unwrap();
        assert!(store.unlisten(id));
        assert!(!store.unlisten(id));
        store.put(vec![make_editor()]).unwrap();

        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn sources_are_reported_to_listeners() {
        let store = make_store();
        let seen = record_diffs(&store);

        store.put(vec![make_editor()]).unwrap();
        store
            .put_with_source(vec![make_editor()], ChangeSource::Remote)
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1, ChangeSource::Local);
        assert_eq!(seen[1].1, ChangeSource::Remote);
    }

    #[test]
    fn apply_diff_validates_before_writing() {
        let store = make_store();
        let bounds = Bounds::new(0, 0, 10, 10);
        let good = make_display(1);
        let bad: Record = DisplayRecord::new(DisplayId(2), bounds, bounds, f64::NAN).into();

        let mut diff = RecordsDiff::new();
        diff.added.insert(good.id().clone(), good);
        diff.added.insert(bad.id().clone(), bad);

        assert!(store.apply_diff(&diff, ChangeSource::Remote).is_err());
        assert!(store.is_empty(), "malformed diffs apply nothing");
    }
}
