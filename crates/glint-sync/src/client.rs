//! Follower-side replication endpoint.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use glint_ipc::{Event, Method, Request};
use glint_store::{ChangeSource, ListenerId, RecordsDiff, Store};
use tracing::{debug, error, warn};

use crate::error::{SyncError, SyncResult};
use crate::event::StoreEvent;

/// Lifecycle of one replication session.
enum SyncState {
    /// Waiting for the `Init` snapshot. `Changes` frames that race ahead of
    /// it are buffered and replayed in order once the snapshot lands.
    Subscribing { buffered: Vec<RecordsDiff> },
    /// Snapshot applied, incremental diffs flowing.
    Synced,
    /// A protocol error ended this session. A fresh client (and a fresh
    /// subscription) is the only way back.
    Failed,
}

/// Keeps a replica store convergent with the host's authoritative copy.
///
/// Incoming frames are applied as `Remote`; the replica's own `Local` diffs
/// are forwarded upstream as `store.update` requests. The host applies those
/// and fans them out to all other followers, so this client never receives
/// its own changes back.
pub struct StoreClient {
    store: Arc<Store>,
    state: Mutex<SyncState>,
    listener: ListenerId,
}

impl StoreClient {
    /// Wires a replica store to the host via `upstream`.
    pub fn new(store: Arc<Store>, upstream: Sender<Request>) -> Self {
        let listener = store.listen(move |diff, source| {
            if source != ChangeSource::Local {
                return;
            }
            let params = match serde_json::to_value(diff) {
                Ok(params) => params,
                Err(e) => {
                    warn!("failed to encode local diff for upstream: {e}");
                    return;
                }
            };
            if upstream
                .send(Request::with_params(Method::StoreUpdate, params))
                .is_err()
            {
                // Host gone: the follower process is shutting down anyway.
                warn!("upstream channel closed, local change not forwarded");
            }
        });

        Self {
            store,
            state: Mutex::new(SyncState::Subscribing {
                buffered: Vec::new(),
            }),
            listener,
        }
    }

    /// The replica store this client keeps in sync.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Applies one frame pushed by the host.
    ///
    /// Any failure marks the session [`Failed`](SyncState::Failed) and every
    /// later frame is rejected: once a frame is dropped the replica can no
    /// longer be trusted to converge.
    pub fn handle_event(&self, frame: &Event) -> SyncResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        match self.apply_frame(&mut state, frame) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("replication session failed: {e}");
                *state = SyncState::Failed;
                Err(e)
            }
        }
    }

    fn apply_frame(&self, state: &mut SyncState, frame: &Event) -> SyncResult<()> {
        let event = StoreEvent::from_frame(frame)?;
        match (&mut *state, event) {
            (SyncState::Subscribing { buffered }, StoreEvent::Changes(diff)) => {
                buffered.push(diff);
                Ok(())
            }
            (SyncState::Subscribing { buffered }, StoreEvent::Init(snapshot)) => {
                let buffered = std::mem::take(buffered);
                self.store
                    .deserialize_with_source(snapshot, ChangeSource::Remote)?;
                for diff in &buffered {
                    self.store.apply_diff(diff, ChangeSource::Remote)?;
                }
                debug!(records = self.store.len(), "replica synced");
                *state = SyncState::Synced;
                Ok(())
            }
            (SyncState::Synced, StoreEvent::Changes(diff)) => {
                self.store.apply_diff(&diff, ChangeSource::Remote)?;
                Ok(())
            }
            (SyncState::Synced, StoreEvent::Init(_)) => Err(SyncError::Protocol(
                "unexpected second init frame".to_string(),
            )),
            (SyncState::Failed, _) => Err(SyncError::Protocol(
                "session already failed".to_string(),
            )),
        }
    }

    /// Whether the initial snapshot has been applied.
    pub fn is_synced(&self) -> bool {
        matches!(*self.state.lock().expect("lock poisoned"), SyncState::Synced)
    }

    /// Whether a protocol error has ended this session.
    pub fn has_failed(&self) -> bool {
        matches!(*self.state.lock().expect("lock poisoned"), SyncState::Failed)
    }
}

impl Drop for StoreClient {
    fn drop(&mut self) {
        self.store.unlisten(self.listener);
    }
}
