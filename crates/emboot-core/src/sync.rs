//! Persistent storage sync bridge
//!
//! The guest asks for a flush between its live filesystem view and the
//! durable store with `request_sync(direction, handle)`. The call returns
//! immediately; the host runs the flush (`FS.syncfs`) asynchronously and the
//! platform layer pushes the outcome back with [`SyncBridge::complete`].
//!
//! # Correlation
//!
//! Every accepted request gets a bridge-assigned [`SyncRequestId`]. The
//! pending map is keyed by that id and remembers the guest's opaque
//! [`CorrelationHandle`], so a completion is matched to its request by id and
//! never by arrival order. Each entry also carries a one-shot channel whose
//! receiving end is the [`SyncTicket`] returned to the caller.
//!
//! # Safety Invariants
//!
//! ## Success Criteria
//! - Exactly one guest callback per accepted request, carrying the request's
//!   own direction and handle
//! - Error text from the host forwarded verbatim (no retry, no interpretation)
//! - No outcome delivered before the mount's initial load has completed
//!
//! ## Acceptable Partial Failures
//! - Unknown request id: logged, dropped (orphaned completion)
//! - Ticket dropped by the caller: guest callback still fires
//!
//! ## Forbidden States
//! - Two in-flight requests sharing a correlation handle (second is rejected)
//! - A completion delivered with another request's handle

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use emboot_hal::{BootHal, CorrelationHandle, SyncDirection, SyncRequestId};
use futures_channel::oneshot;
use thiserror::Error;

use crate::mount::MountDescriptor;

/// Sync bridge errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    /// A request with this handle has not completed yet
    #[error("sync request with handle {0} is already in flight")]
    HandleInFlight(CorrelationHandle),
    /// Sync requested before the durable store was mounted
    #[error("durable storage is not mounted")]
    NotMounted,
    /// The bridge went away before the request completed
    #[error("sync request abandoned before completion")]
    Abandoned,
}

/// Receives sync completions inside the guest.
///
/// Invoked exactly once per accepted request with `(is_load, error, handle)`;
/// `error` is `None` on success.
pub trait GuestSyncCallback {
    fn sync_complete(&self, is_load: bool, error: Option<&str>, handle: CorrelationHandle);
}

/// Outcome of one flush
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOutcome {
    pub direction: SyncDirection,
    /// Error text reported by the host, `None` on success
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Resolves once the matching request has completed
#[derive(Debug)]
pub struct SyncTicket {
    request_id: SyncRequestId,
    handle: CorrelationHandle,
    receiver: oneshot::Receiver<SyncOutcome>,
}

impl SyncTicket {
    pub fn request_id(&self) -> SyncRequestId {
        self.request_id
    }

    pub fn handle(&self) -> CorrelationHandle {
        self.handle
    }
}

impl Future for SyncTicket {
    type Output = Result<SyncOutcome, SyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| SyncError::Abandoned))
    }
}

/// What a call to [`SyncBridge::complete`] resolved
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The mount's initial load finished; queued requests have been started
    InitialLoad(SyncOutcome),
    /// A guest request finished and its callback fired
    Request {
        handle: CorrelationHandle,
        outcome: SyncOutcome,
    },
    /// No pending request had this id
    Orphan,
}

struct PendingSync {
    direction: SyncDirection,
    /// `None` for the mount's own initial load
    handle: Option<CorrelationHandle>,
    responder: Option<oneshot::Sender<SyncOutcome>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InitialLoad {
    InFlight(SyncRequestId),
    Done,
}

/// Request/response map between guest sync requests and host flushes
pub struct SyncBridge {
    mount: MountDescriptor,
    /// Next request ID (monotonically increasing)
    next_request_id: SyncRequestId,
    initial_load: InitialLoad,
    /// Pending requests: request_id -> request
    pending: HashMap<SyncRequestId, PendingSync>,
    /// Handles of accepted requests that have not completed
    in_flight_handles: HashSet<CorrelationHandle>,
    /// Accepted during the initial load, started once it completes
    queued: VecDeque<(SyncRequestId, SyncDirection)>,
}

impl SyncBridge {
    /// Create the bridge for a freshly mounted store and start its initial load.
    ///
    /// Only a [`MountDescriptor`] produced by a successful mount can build a
    /// bridge, so no request can reach the host before the mount exists.
    pub fn begin<H: BootHal>(hal: &H, mount: MountDescriptor) -> Self {
        let initial_id = 1;
        let mut pending = HashMap::new();
        pending.insert(
            initial_id,
            PendingSync {
                direction: SyncDirection::Load,
                handle: None,
                responder: None,
            },
        );

        log::info!(
            "[sync] Initial load of {} started: request_id={}",
            mount.path(),
            initial_id
        );
        hal.fs_sync_start(initial_id, SyncDirection::Load);

        Self {
            mount,
            next_request_id: initial_id + 1,
            initial_load: InitialLoad::InFlight(initial_id),
            pending,
            in_flight_handles: HashSet::new(),
            queued: VecDeque::new(),
        }
    }

    pub fn mount(&self) -> &MountDescriptor {
        &self.mount
    }

    pub fn initial_load_done(&self) -> bool {
        self.initial_load == InitialLoad::Done
    }

    /// Number of accepted requests without an outcome yet (initial load included)
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_in_flight(&self, handle: CorrelationHandle) -> bool {
        self.in_flight_handles.contains(&handle)
    }

    fn next_request_id(&mut self) -> SyncRequestId {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        id
    }

    /// Accept a guest sync request (returns immediately).
    ///
    /// While the initial load is still running the request is queued and
    /// started afterwards, in issue order.
    pub fn request_sync<H: BootHal>(
        &mut self,
        hal: &H,
        direction: SyncDirection,
        handle: CorrelationHandle,
    ) -> Result<SyncTicket, SyncError> {
        if !self.in_flight_handles.insert(handle) {
            log::error!(
                "[sync] Rejected {:?} request: handle {} is already in flight",
                direction,
                handle
            );
            return Err(SyncError::HandleInFlight(handle));
        }

        let request_id = self.next_request_id();
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(
            request_id,
            PendingSync {
                direction,
                handle: Some(handle),
                responder: Some(sender),
            },
        );

        if self.initial_load_done() {
            log::debug!(
                "[sync] {:?} started: request_id={}, handle={}",
                direction,
                request_id,
                handle
            );
            hal.fs_sync_start(request_id, direction);
        } else {
            log::debug!(
                "[sync] {:?} queued behind initial load: request_id={}, handle={}",
                direction,
                request_id,
                handle
            );
            self.queued.push_back((request_id, direction));
        }

        Ok(SyncTicket {
            request_id,
            handle,
            receiver,
        })
    }

    /// Deliver the host's outcome for `request_id`.
    ///
    /// An empty error string counts as success. For guest requests the guest
    /// callback fires before the ticket resolves.
    pub fn complete<H: BootHal>(
        &mut self,
        hal: &H,
        guest: &dyn GuestSyncCallback,
        request_id: SyncRequestId,
        error: Option<String>,
    ) -> Completion {
        let Some(request) = self.pending.remove(&request_id) else {
            log::error!(
                "[sync] Unknown request_id {} in completion (orphaned response)",
                request_id
            );
            return Completion::Orphan;
        };

        let outcome = SyncOutcome {
            direction: request.direction,
            error: error.filter(|e| !e.is_empty()),
        };

        let Some(handle) = request.handle else {
            self.finish_initial_load(hal, &outcome);
            return Completion::InitialLoad(outcome);
        };

        self.in_flight_handles.remove(&handle);

        match &outcome.error {
            None => log::debug!("[sync] {:?} complete: handle={}", outcome.direction, handle),
            Some(e) => log::warn!("[sync] {:?} failed: handle={}: {}", outcome.direction, handle, e),
        }

        guest.sync_complete(outcome.direction.is_load(), outcome.error.as_deref(), handle);

        if let Some(responder) = request.responder {
            // The caller may have dropped its ticket; the guest callback above
            // is the primary channel.
            let _ = responder.send(outcome.clone());
        }

        Completion::Request { handle, outcome }
    }

    fn finish_initial_load<H: BootHal>(&mut self, hal: &H, outcome: &SyncOutcome) {
        match &outcome.error {
            None => log::info!("[sync] Initial load of {} complete", self.mount.path()),
            Some(e) => log::error!(
                "[sync] Initial load of {} failed, continuing with an empty store: {}",
                self.mount.path(),
                e
            ),
        }
        self.initial_load = InitialLoad::Done;

        for (request_id, direction) in self.queued.drain(..) {
            log::debug!("[sync] Starting queued {:?}: request_id={}", direction, request_id);
            hal.fs_sync_start(request_id, direction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MOUNT_PATH;
    use crate::mount::StorageMount;
    use crate::testing::{MockHal, RecordingGuest};
    use futures_util::FutureExt;

    fn descriptor(hal: &MockHal) -> MountDescriptor {
        StorageMount::new().ensure_mounted(hal, MOUNT_PATH).unwrap()
    }

    fn loaded_bridge(hal: &MockHal, guest: &RecordingGuest) -> SyncBridge {
        let mut bridge = SyncBridge::begin(hal, descriptor(hal));
        let (initial_id, _) = hal.sync_starts()[0];
        bridge.complete(hal, guest, initial_id, None);
        bridge
    }

    #[test]
    fn test_bridge_only_from_attached_mount() {
        let hal = MockHal::new();
        let mount = descriptor(&hal);
        assert_eq!(hal.mount_calls(), 1);
        assert!(hal.has_dir(mount.path()));

        let bridge = SyncBridge::begin(&hal, mount);
        assert_eq!(bridge.mount().path(), MOUNT_PATH);
        assert_eq!(hal.sync_starts(), vec![(1, SyncDirection::Load)]);
    }

    #[test]
    fn test_begin_starts_initial_load() {
        let hal = MockHal::new();
        let bridge = SyncBridge::begin(&hal, descriptor(&hal));
        assert_eq!(hal.sync_starts(), vec![(1, SyncDirection::Load)]);
        assert!(!bridge.initial_load_done());
        assert_eq!(bridge.pending_count(), 1);
    }

    #[test]
    fn test_initial_load_does_not_reach_guest() {
        let hal = MockHal::new();
        let guest = RecordingGuest::new();
        let mut bridge = SyncBridge::begin(&hal, descriptor(&hal));

        let completion = bridge.complete(&hal, &guest, 1, None);
        assert!(matches!(completion, Completion::InitialLoad(ref o) if o.success()));
        assert!(guest.calls().is_empty());
        assert!(bridge.initial_load_done());
    }

    #[test]
    fn test_requests_queue_behind_initial_load() {
        let hal = MockHal::new();
        let guest = RecordingGuest::new();
        let mut bridge = SyncBridge::begin(&hal, descriptor(&hal));

        bridge
            .request_sync(&hal, SyncDirection::Save, CorrelationHandle(10))
            .unwrap();
        bridge
            .request_sync(&hal, SyncDirection::Load, CorrelationHandle(11))
            .unwrap();
        // Only the initial load reached the host so far
        assert_eq!(hal.sync_starts().len(), 1);

        bridge.complete(&hal, &guest, 1, None);
        assert_eq!(
            hal.sync_starts(),
            vec![
                (1, SyncDirection::Load),
                (2, SyncDirection::Save),
                (3, SyncDirection::Load)
            ]
        );
        assert!(guest.calls().is_empty());
    }

    #[test]
    fn test_completion_matches_by_id_not_order() {
        let hal = MockHal::new();
        let guest = RecordingGuest::new();
        let mut bridge = loaded_bridge(&hal, &guest);

        let a = bridge
            .request_sync(&hal, SyncDirection::Save, CorrelationHandle(0xa))
            .unwrap();
        let b = bridge
            .request_sync(&hal, SyncDirection::Load, CorrelationHandle(0xb))
            .unwrap();

        // Host finishes b first
        bridge.complete(&hal, &guest, b.request_id(), None);
        bridge.complete(&hal, &guest, a.request_id(), Some("QuotaExceededError".into()));

        assert_eq!(
            guest.calls(),
            vec![
                (true, None, CorrelationHandle(0xb)),
                (false, Some("QuotaExceededError".to_string()), CorrelationHandle(0xa)),
            ]
        );

        let a = a.now_or_never().unwrap().unwrap();
        assert_eq!(a.error.as_deref(), Some("QuotaExceededError"));
        assert_eq!(a.direction, SyncDirection::Save);
        assert!(b.now_or_never().unwrap().unwrap().success());
    }

    #[test]
    fn test_duplicate_in_flight_handle_rejected() {
        let hal = MockHal::new();
        let guest = RecordingGuest::new();
        let mut bridge = loaded_bridge(&hal, &guest);

        let first = bridge
            .request_sync(&hal, SyncDirection::Save, CorrelationHandle(7))
            .unwrap();
        let second = bridge.request_sync(&hal, SyncDirection::Save, CorrelationHandle(7));
        assert_eq!(second.err(), Some(SyncError::HandleInFlight(CorrelationHandle(7))));

        bridge.complete(&hal, &guest, first.request_id(), None);
        assert_eq!(guest.calls().len(), 1);

        // Reusable once the first completed
        assert!(bridge
            .request_sync(&hal, SyncDirection::Load, CorrelationHandle(7))
            .is_ok());
    }

    #[test]
    fn test_orphan_and_repeated_completion_dropped() {
        let hal = MockHal::new();
        let guest = RecordingGuest::new();
        let mut bridge = loaded_bridge(&hal, &guest);

        assert_eq!(bridge.complete(&hal, &guest, 99, None), Completion::Orphan);

        let ticket = bridge
            .request_sync(&hal, SyncDirection::Save, CorrelationHandle(1))
            .unwrap();
        bridge.complete(&hal, &guest, ticket.request_id(), None);
        assert_eq!(
            bridge.complete(&hal, &guest, ticket.request_id(), None),
            Completion::Orphan
        );
        assert_eq!(guest.calls().len(), 1);
    }

    #[test]
    fn test_empty_error_is_success() {
        let hal = MockHal::new();
        let guest = RecordingGuest::new();
        let mut bridge = loaded_bridge(&hal, &guest);

        let ticket = bridge
            .request_sync(&hal, SyncDirection::Save, CorrelationHandle(3))
            .unwrap();
        bridge.complete(&hal, &guest, ticket.request_id(), Some(String::new()));
        assert_eq!(guest.calls(), vec![(false, None, CorrelationHandle(3))]);
    }

    #[test]
    fn test_dropped_ticket_still_calls_guest() {
        let hal = MockHal::new();
        let guest = RecordingGuest::new();
        let mut bridge = loaded_bridge(&hal, &guest);

        let id = bridge
            .request_sync(&hal, SyncDirection::Save, CorrelationHandle(5))
            .unwrap()
            .request_id();
        bridge.complete(&hal, &guest, id, None);
        assert_eq!(guest.calls(), vec![(false, None, CorrelationHandle(5))]);
    }
}
