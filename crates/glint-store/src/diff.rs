//! Structured record diffs.
//!
//! A diff is the unit of change: every listener notification and every
//! replicated `Changes` frame carries one. Diffs must compose: a follower
//! batches pending diffs by squashing, so `apply(A); apply(B)` and
//! `apply(A.squash(B))` have to be indistinguishable to every observer.

use std::collections::BTreeMap;

use glint_records::{Record, RecordId};
use serde::{Deserialize, Serialize};

/// An added/updated/removed delta between two store states.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordsDiff {
    /// Records that did not exist before.
    pub added: BTreeMap<RecordId, Record>,
    /// `(old, new)` pairs for records replaced under the same ID.
    pub updated: BTreeMap<RecordId, (Record, Record)>,
    /// Last-known values of records that were deleted.
    pub removed: BTreeMap<RecordId, Record>,
}

impl RecordsDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Total number of entries across all three buckets.
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    /// Iterates every change in the diff, added then updated then removed.
    pub fn iter(&self) -> impl Iterator<Item = RecordChange<'_>> {
        self.added
            .values()
            .map(RecordChange::Added)
            .chain(
                self.updated
                    .values()
                    .map(|(old, new)| RecordChange::Updated { old, new }),
            )
            .chain(self.removed.values().map(RecordChange::Removed))
    }

    /// Merges a later diff into this one.
    ///
    /// Collapse rules:
    /// - added then updated stays added (with the newer value)
    /// - added then removed cancels out
    /// - updated then updated keeps the earliest old value
    /// - updated then removed becomes removed (with the earliest old value)
    /// - removed then added becomes updated
    pub fn squash(mut self, later: RecordsDiff) -> RecordsDiff {
        for (id, record) in later.added {
            match self.removed.remove(&id) {
                Some(old) => {
                    self.updated.insert(id, (old, record));
                }
                None => {
                    self.added.insert(id, record);
                }
            }
        }

        for (id, (old, new)) in later.updated {
            if self.added.contains_key(&id) {
                self.added.insert(id, new);
            } else if let Some((first_old, _)) = self.updated.remove(&id) {
                self.updated.insert(id, (first_old, new));
            } else {
                self.updated.insert(id, (old, new));
            }
        }

        for (id, old) in later.removed {
            if self.added.remove(&id).is_some() {
                // Created and destroyed within the squashed span: invisible.
            } else if let Some((first_old, _)) = self.updated.remove(&id) {
                self.removed.insert(id, first_old);
            } else {
                self.removed.insert(id, old);
            }
        }

        self
    }
}

/// One entry of a [`RecordsDiff`].
#[derive(Clone, Copy, Debug)]
pub enum RecordChange<'a> {
    Added(&'a Record),
    Updated { old: &'a Record, new: &'a Record },
    Removed(&'a Record),
}

impl<'a> RecordChange<'a> {
    /// The ID of the affected record.
    pub fn id(&self) -> &'a RecordId {
        match self {
            RecordChange::Added(record) => record.id(),
            RecordChange::Updated { new, .. } => new.id(),
            RecordChange::Removed(record) => record.id(),
        }
    }
}
