//! Single-flight session refresh coordination
//!
//! When a session credential expires, every in-flight request against that
//! backend starts failing with 401 at once. The coordinator guarantees:
//!
//! - at most one refresh call is in flight per backend at any instant;
//! - requests arriving (or observing their own 401) while a refresh is in
//!   flight are parked in a FIFO queue instead of being sent;
//! - when the refresh settles, every parked caller is resumed exactly once -
//!   replayed in arrival order on success, failed with the refresh outcome
//!   on failure;
//! - the refresh call itself is never intercepted (no recursion).
//!
//! The state flag and the wait queue live behind a single mutex so the
//! "is a refresh in flight? if not, become the refresher" check is one
//! critical section. Critical sections are short and the lock is never held
//! across an await, so a plain `std::sync::Mutex` suffices. Parked callers
//! suspend on a oneshot channel; nothing polls.
//!
//! The caller that wins the critical section receives a [`RefresherGuard`];
//! settling the cycle consumes the guard, and dropping it unsettled (the
//! refreshing task was cancelled) cascades a failure to every parked caller
//! so nobody waits on a refresh that will never finish.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info};

use crate::client::ApiResponse;
use crate::error::{Error, Result};
use crate::request::RequestDescriptor;

/// Coordinator mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No refresh in flight; requests flow through normally
    Idle,
    /// A refresh call is in flight; arriving requests are parked
    Refreshing,
}

/// Notification that the session cannot be restored.
///
/// Emitted when the refresh endpoint itself rejects the credential; the
/// hosting application should force re-authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Expired,
}

/// A parked request waiting for the in-flight refresh to settle
pub(crate) struct PendingReplay {
    pub descriptor: RequestDescriptor,
    pub reply: oneshot::Sender<Result<ApiResponse>>,
}

/// What the coordinator decided for a request that wants to proceed
pub(crate) enum Admission {
    /// No refresh in flight; send the request
    Proceed,
    /// A refresh is in flight; await the delivered outcome
    Parked(oneshot::Receiver<Result<ApiResponse>>),
}

/// Role assigned to a caller that observed an expired-credential response
pub(crate) enum UnauthorizedRole<'a> {
    /// This caller won the critical section; it must perform the refresh
    /// and settle the cycle through the guard
    Refresher(RefresherGuard<'a>),
    /// Another caller is already refreshing; await the delivered outcome
    Parked(oneshot::Receiver<Result<ApiResponse>>),
}

struct CoordinatorInner {
    state: RefreshState,
    queue: VecDeque<PendingReplay>,
}

/// Per-backend refresh coordinator
///
/// One instance per [`ClientConfig`](crate::ClientConfig); refresh state is
/// never shared across backends.
pub struct RefreshCoordinator {
    inner: Mutex<CoordinatorInner>,
    events: broadcast::Sender<SessionEvent>,
}

impl RefreshCoordinator {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            inner: Mutex::new(CoordinatorInner {
                state: RefreshState::Idle,
                queue: VecDeque::new(),
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorInner> {
        // A poisoned lock means a panic mid-critical-section; the state is
        // still coherent (transitions are single assignments), so recover.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current coordinator mode
    pub fn state(&self) -> RefreshState {
        self.lock().state
    }

    /// Gate a request that is about to be sent.
    ///
    /// While a refresh is in flight the descriptor is cloned onto the queue
    /// and the caller receives a channel to await instead of sending.
    pub(crate) fn admit(&self, descriptor: &RequestDescriptor) -> Admission {
        let mut inner = self.lock();
        match inner.state {
            RefreshState::Idle => Admission::Proceed,
            RefreshState::Refreshing => {
                debug!(path = %descriptor.path, "refresh in flight, parking request");
                Admission::Parked(park(&mut inner, descriptor))
            }
        }
    }

    /// Resolve what a caller holding a fresh 401 should do.
    ///
    /// The check and the transition to `Refreshing` happen under one lock
    /// acquisition, so exactly one caller becomes the refresher no matter
    /// how many observe the expired credential simultaneously.
    pub(crate) fn on_unauthorized(&self, descriptor: &RequestDescriptor) -> UnauthorizedRole<'_> {
        let mut inner = self.lock();
        match inner.state {
            RefreshState::Idle => {
                info!(path = %descriptor.path, "session expired, starting refresh");
                inner.state = RefreshState::Refreshing;
                UnauthorizedRole::Refresher(RefresherGuard { coordinator: self, armed: true })
            }
            RefreshState::Refreshing => {
                debug!(path = %descriptor.path, "session expired, refresh already in flight");
                UnauthorizedRole::Parked(park(&mut inner, descriptor))
            }
        }
    }

    fn settle_success(&self) -> VecDeque<PendingReplay> {
        let mut inner = self.lock();
        inner.state = RefreshState::Idle;
        let queue = std::mem::take(&mut inner.queue);
        info!(waiters = queue.len(), "refresh succeeded, replaying parked requests");
        queue
    }

    fn settle_failure(&self, status: Option<u16>, message: &str, credential_rejected: bool) {
        let queue = {
            let mut inner = self.lock();
            inner.state = RefreshState::Idle;
            std::mem::take(&mut inner.queue)
        };

        error!(waiters = queue.len(), ?status, "refresh failed, cascading to parked requests");

        for pending in queue {
            let outcome = Err(Error::RefreshFailed { status, message: message.to_string() });
            // A dropped receiver means the caller gave up; nothing to deliver.
            let _ = pending.reply.send(outcome);
        }

        if credential_rejected {
            // No subscribers is fine; the event is advisory.
            let _ = self.events.send(SessionEvent::Expired);
        }
    }
}

/// Exclusive right (and obligation) to settle the in-flight refresh.
///
/// Settling consumes the guard. If the refresher's task is dropped before
/// settling, the guard's `Drop` fails every parked caller and returns the
/// coordinator to idle - no caller is left permanently unresolved.
pub(crate) struct RefresherGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl RefresherGuard<'_> {
    /// The refresh call succeeded: return to idle and hand the parked
    /// requests back to the refresher for FIFO replay.
    pub(crate) fn settle_success(mut self) -> VecDeque<PendingReplay> {
        self.armed = false;
        self.coordinator.settle_success()
    }

    /// The refresh call failed: return to idle and deliver the same failure
    /// to every parked caller. When the refresh endpoint rejected the
    /// credential outright, a [`SessionEvent::Expired`] is broadcast so the
    /// hosting application can force re-authentication.
    pub(crate) fn settle_failure(
        mut self,
        status: Option<u16>,
        message: &str,
        credential_rejected: bool,
    ) {
        self.armed = false;
        self.coordinator.settle_failure(status, message, credential_rejected);
    }
}

impl Drop for RefresherGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.coordinator.settle_failure(None, "refresh abandoned before completion", false);
        }
    }
}

fn park(
    inner: &mut CoordinatorInner,
    descriptor: &RequestDescriptor,
) -> oneshot::Receiver<Result<ApiResponse>> {
    let (reply, receiver) = oneshot::channel();
    inner.queue.push_back(PendingReplay { descriptor: descriptor.clone(), reply });
    receiver
}
