//! Host-side replication endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use glint_ipc::{error_codes, Event, Method, Request, Response};
use glint_records::{CaptureActivityRecord, CaptureMode};
use glint_store::{ChangeSource, ListenerId, RecordsDiff, Store, StoreError};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::event::StoreEvent;

/// Identifies one subscribed follower.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: SubscriberId,
    sender: Sender<Event>,
}

/// Fans the authoritative store out to follower processes.
///
/// Subscribing delivers one `Init` snapshot up front. After that every
/// locally-originated diff on the host store is broadcast as a `Changes`
/// frame. Diffs received from a follower are applied as `Remote` and
/// rebroadcast to every other follower, so all replicas converge without
/// the originator ever hearing its own change back.
pub struct StorePublisher {
    store: Arc<Store>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    listener: ListenerId,
    next_subscriber: AtomicU64,
}

impl StorePublisher {
    pub fn new(store: Arc<Store>) -> Self {
        let subscribers: Arc<Mutex<Vec<Subscriber>>> = Arc::new(Mutex::new(Vec::new()));

        let sinks = subscribers.clone();
        let listener = store.listen(move |diff, source| {
            // Remote diffs were already rebroadcast by handle_update with
            // the originator excluded; forwarding them here would echo.
            if source != ChangeSource::Local {
                return;
            }
            match StoreEvent::Changes(diff.clone()).to_frame() {
                Ok(frame) => broadcast(&sinks, &frame, None),
                Err(e) => warn!("failed to encode changes frame: {e}"),
            }
        });

        Self {
            store,
            subscribers,
            listener,
            next_subscriber: AtomicU64::new(0),
        }
    }

    /// The store this publisher fans out.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Registers a follower's event channel.
    ///
    /// The `Init` snapshot is sent before the subscriber is registered, so
    /// no `Changes` frame can precede it on the channel.
    pub fn subscribe(&self, sender: Sender<Event>) -> SyncResult<SubscriberId> {
        let snapshot = self.store.serialize();
        let frame = StoreEvent::Init(snapshot)
            .to_frame()
            .map_err(|e| SyncError::Protocol(format!("failed to encode init frame: {e}")))?;
        sender.send(frame).map_err(|_| SyncError::TransportClosed)?;

        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .expect("lock poisoned")
            .push(Subscriber { id, sender });
        debug!(subscriber = id.0, "follower subscribed");
        Ok(id)
    }

    /// Drops a follower. Returns true if it was subscribed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock().expect("lock poisoned");
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("lock poisoned").len()
    }

    /// Applies a diff pushed up by a follower and rebroadcasts it.
    ///
    /// The diff lands in the host store as `Remote` and is then forwarded to
    /// every subscriber except `from`, the follower it came from.
    pub fn handle_update(&self, diff: &RecordsDiff, from: Option<SubscriberId>) -> SyncResult<()> {
        self.store.apply_diff(diff, ChangeSource::Remote)?;

        let frame = StoreEvent::Changes(diff.clone())
            .to_frame()
            .map_err(|e| SyncError::Protocol(format!("failed to encode changes frame: {e}")))?;
        broadcast(&self.subscribers, &frame, from);
        Ok(())
    }

    /// Dispatches one follower request and produces its response.
    pub fn handle_request(&self, request: &Request, from: Option<SubscriberId>) -> Response {
        match request.method {
            Method::StoreUpdate => {
                let diff: RecordsDiff = match &request.params {
                    Some(params) => match serde_json::from_value(params.clone()) {
                        Ok(diff) => diff,
                        Err(e) => {
                            return Response::error(
                                &request.id,
                                error_codes::INVALID_PARAMS,
                                &format!("malformed diff: {e}"),
                            )
                        }
                    },
                    None => {
                        return Response::error(
                            &request.id,
                            error_codes::INVALID_PARAMS,
                            "store.update requires a diff",
                        )
                    }
                };
                match self.handle_update(&diff, from) {
                    Ok(()) => Response::success(&request.id, serde_json::json!({ "applied": true })),
                    Err(e) => error_response(&request.id, e),
                }
            }

            Method::CaptureArea => self.begin_capture(&request.id, CaptureMode::Area),
            Method::CaptureWindow => self.begin_capture(&request.id, CaptureMode::Window),
            Method::CaptureFullScreen => self.begin_capture(&request.id, CaptureMode::FullScreen),

            Method::CaptureCancel => {
                self.store.remove(&[CaptureActivityRecord::singleton_id()]);
                Response::success(&request.id, serde_json::json!({ "cancelled": true }))
            }

            Method::StoreSubscribe => Response::error(
                &request.id,
                error_codes::INVALID_REQUEST,
                "subscriptions require a push channel; use StorePublisher::subscribe",
            ),
        }
    }

    fn begin_capture(&self, request_id: &str, mode: CaptureMode) -> Response {
        match self
            .store
            .put(vec![CaptureActivityRecord::singleton(mode).into()])
        {
            Ok(()) => Response::success(request_id, serde_json::json!({ "started": true })),
            Err(e) => error_response(request_id, e.into()),
        }
    }
}

impl Drop for StorePublisher {
    fn drop(&mut self) {
        self.store.unlisten(self.listener);
    }
}

/// Sends a frame to every subscriber except `exclude`, pruning dead channels.
fn broadcast(subscribers: &Mutex<Vec<Subscriber>>, frame: &Event, exclude: Option<SubscriberId>) {
    subscribers.lock().expect("lock poisoned").retain(|s| {
        if exclude == Some(s.id) {
            return true;
        }
        if s.sender.send(frame.clone()).is_err() {
            warn!(subscriber = s.id.0, "follower channel closed, dropping subscriber");
            return false;
        }
        true
    });
}

fn error_response(request_id: &str, error: SyncError) -> Response {
    let (code, message) = match &error {
        SyncError::Store(StoreError::Schema(violation)) => {
            (error_codes::SCHEMA_VIOLATION, violation.to_string())
        }
        SyncError::Store(StoreError::NotFound(id)) => {
            (error_codes::NOT_FOUND, format!("no record {id}"))
        }
        other => (error_codes::INTERNAL_ERROR, other.to_string()),
    };
    Response::error(request_id, code, &message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_ipc::EventKind;
    use glint_records::{Bounds, DisplayId, DisplayRecord, Record, Schema};
    use std::sync::mpsc;

    fn make_publisher() -> StorePublisher {
        StorePublisher::new(Arc::new(Store::new(Schema::capture_tool())))
    }

    fn make_display(display_id: i64) -> Record {
        let bounds = Bounds::new(0, 0, 2560, 1440);
        DisplayRecord::new(DisplayId(display_id), bounds, bounds, 2.0).into()
    }

    #[test]
    fn subscribe_sends_init_first() {
        let publisher = make_publisher();
        publisher.store().put(vec![make_display(1)]).unwrap();

        let (tx, rx) = mpsc::channel();
        publisher.subscribe(tx).unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.kind, EventKind::Init);
        match StoreEvent::from_frame(&frame).unwrap() {
            StoreEvent::Init(snapshot) => assert_eq!(snapshot.records.len(), 1),
            other => panic!("expected init, got {other:?}"),
        }
    }

    #[test]
    fn local_changes_are_broadcast() {
        let publisher = make_publisher();
        let (tx, rx) = mpsc::channel();
        publisher.subscribe(tx).unwrap();
        rx.try_recv().unwrap(); // init

        publisher.store().put(vec![make_display(1)]).unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.kind, EventKind::Changes);
    }

    #[test]
    fn follower_update_skips_the_originator() {
        let publisher = make_publisher();
        let (tx1, rx1) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();
        let f1 = publisher.subscribe(tx1).unwrap();
        publisher.subscribe(tx2).unwrap();
        rx1.try_recv().unwrap();
        rx2.try_recv().unwrap();

        let record = make_display(5);
        let mut diff = RecordsDiff::new();
        diff.added.insert(record.id().clone(), record.clone());
        publisher.handle_update(&diff, Some(f1)).unwrap();

        assert_eq!(publisher.store().get(record.id()), Some(record));
        assert!(rx1.try_recv().is_err(), "originator must not hear its own change");
        assert_eq!(rx2.try_recv().unwrap().kind, EventKind::Changes);
    }

    #[test]
    fn dead_subscriber_is_pruned_on_broadcast() {
        let publisher = make_publisher();
        let (tx, rx) = mpsc::channel();
        publisher.subscribe(tx).unwrap();
        drop(rx);

        publisher.store().put(vec![make_display(1)]).unwrap();

        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let publisher = make_publisher();
        let (tx, rx) = mpsc::channel();
        let id = publisher.subscribe(tx).unwrap();
        rx.try_recv().unwrap();

        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        publisher.store().put(vec![make_display(1)]).unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn capture_requests_drive_the_singleton() {
        let publisher = make_publisher();

        let response =
            publisher.handle_request(&Request::new(Method::CaptureArea), None);
        assert!(response.is_success());
        let record = publisher
            .store()
            .get(&CaptureActivityRecord::singleton_id())
            .unwrap();
        assert_eq!(record.as_capture().unwrap().mode, CaptureMode::Area);

        let response =
            publisher.handle_request(&Request::new(Method::CaptureCancel), None);
        assert!(response.is_success());
        assert!(!publisher
            .store()
            .contains(&CaptureActivityRecord::singleton_id()));
    }

    #[test]
    fn malformed_update_params_are_rejected() {
        let publisher = make_publisher();

        let request = Request::with_params(Method::StoreUpdate, serde_json::json!("garbage"));
        let response = publisher.handle_request(&request, None);
        assert_eq!(
            response.error.unwrap().code,
            error_codes::INVALID_PARAMS
        );

        let response = publisher.handle_request(&Request::new(Method::StoreUpdate), None);
        assert_eq!(
            response.error.unwrap().code,
            error_codes::INVALID_PARAMS
        );
    }

    #[test]
    fn invalid_update_reports_schema_violation() {
        let publisher = make_publisher();
        let bounds = Bounds::new(0, 0, 10, 10);
        let bad: Record = DisplayRecord::new(DisplayId(1), bounds, bounds, -1.0).into();
        let mut diff = RecordsDiff::new();
        diff.added.insert(bad.id().clone(), bad);

        let request = Request::with_params(
            Method::StoreUpdate,
            serde_json::to_value(&diff).unwrap(),
        );
        let response = publisher.handle_request(&request, None);
        assert_eq!(
            response.error.unwrap().code,
            error_codes::SCHEMA_VIOLATION
        );
        assert!(publisher.store().is_empty());
    }
}
