//! Typed store events and their wire frames.

use glint_ipc::{Event, EventKind};
use glint_store::{RecordsDiff, StoreSnapshot};

use crate::error::{SyncError, SyncResult};

/// An event on the store channel.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    /// Full snapshot for a newly-subscribed follower.
    Init(StoreSnapshot),
    /// Incremental diff for a synced follower.
    Changes(RecordsDiff),
}

impl StoreEvent {
    /// Encodes this event as a wire frame.
    pub fn to_frame(&self) -> Result<Event, serde_json::Error> {
        match self {
            StoreEvent::Init(snapshot) => {
                Ok(Event::new(EventKind::Init, serde_json::to_value(snapshot)?))
            }
            StoreEvent::Changes(diff) => {
                Ok(Event::new(EventKind::Changes, serde_json::to_value(diff)?))
            }
        }
    }

    /// Decodes a wire frame into a typed event.
    ///
    /// A payload that does not match the frame kind is a protocol error:
    /// the sender runs a different schema or the channel corrupted the frame.
    pub fn from_frame(frame: &Event) -> SyncResult<Self> {
        match frame.kind {
            EventKind::Init => serde_json::from_value(frame.data.clone())
                .map(StoreEvent::Init)
                .map_err(|e| SyncError::Protocol(format!("malformed init payload: {e}"))),
            EventKind::Changes => serde_json::from_value(frame.data.clone())
                .map(StoreEvent::Changes)
                .map_err(|e| SyncError::Protocol(format!("malformed changes payload: {e}"))),
        }
    }
}
