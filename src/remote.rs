//! Correlation of responses to requests sent over a multiplexed connection.
//!
//! Each request sent to a remote hub carries a connection-scoped `req_id`.
//! The pending request is registered in a [`RemoteRequestMap`] and removed
//! again when the response with the same id arrives, or canceled when the
//! connection goes away.

use crate::error::{HubError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// A request waiting for its response.
#[derive(Debug)]
pub struct RemoteRequest<T> {
    req_id: i32,
    completion: Sender<Result<T>>,
}

impl<T> RemoteRequest<T> {
    /// Create a pending request and the receiver its outcome arrives on.
    pub fn new(req_id: i32) -> (Self, ResponseReceiver<T>) {
        let (completion, receiver) = bounded(1);
        (
            Self { req_id, completion },
            ResponseReceiver { req_id, receiver },
        )
    }

    pub fn req_id(&self) -> i32 {
        self.req_id
    }

    /// Deliver the response. Dropped silently if nobody waits any more.
    pub fn complete(self, response: T) {
        let _ = self.completion.try_send(Ok(response));
    }

    pub fn cancel(self) {
        let _ = self.completion.try_send(Err(HubError::Canceled));
    }
}

/// Receiving half of a [`RemoteRequest`].
#[derive(Debug)]
pub struct ResponseReceiver<T> {
    req_id: i32,
    receiver: Receiver<Result<T>>,
}

impl<T> ResponseReceiver<T> {
    pub fn req_id(&self) -> i32 {
        self.req_id
    }

    /// Wait for the response (blocking).
    pub fn recv(&self) -> Result<T> {
        self.receiver.recv().unwrap_or(Err(HubError::Canceled))
    }

    /// Returns `None` while the response is still pending.
    pub fn try_recv(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(HubError::Canceled)),
        }
    }

    /// Wait with timeout. Returns `None` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(HubError::Canceled)),
        }
    }
}

/// Pending requests of one connection, keyed by request id.
#[derive(Debug)]
pub struct RemoteRequestMap<T> {
    requests: Mutex<HashMap<i32, RemoteRequest<T>>>,
}

impl<T> RemoteRequestMap<T> {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Register a pending request. `req_id` must be unique among the
    /// outstanding requests; a duplicate replaces and cancels the older one.
    pub fn add(&self, request: RemoteRequest<T>) {
        let req_id = request.req_id;
        let previous = self.requests.lock().insert(req_id, request);
        if let Some(previous) = previous {
            warn!(req_id, "duplicate request id, previous request canceled");
            previous.cancel();
        }
    }

    /// Detach the pending request, typically when its response arrived.
    /// `None` if it was already completed or canceled.
    pub fn remove(&self, req_id: i32) -> Option<RemoteRequest<T>> {
        self.requests.lock().remove(&req_id)
    }

    /// Complete the request `req_id` with `response`. A response for an
    /// unknown id is dropped and `false` returned.
    pub fn complete(&self, req_id: i32, response: T) -> bool {
        match self.remove(req_id) {
            Some(request) => {
                request.complete(response);
                true
            }
            None => {
                debug!(req_id, "response for unknown request dropped");
                false
            }
        }
    }

    /// Cancel every pending request, e.g. when the connection is lost.
    /// Returns the number of canceled requests.
    pub fn cancel_requests(&self) -> usize {
        let pending: Vec<RemoteRequest<T>> = {
            let mut requests = self.requests.lock();
            requests.drain().map(|(_, request)| request).collect()
        };
        // canceled outside the lock
        let count = pending.len();
        for request in pending {
            request.cancel();
        }
        if count > 0 {
            debug!(count, "pending requests canceled");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }
}

impl<T> Default for RemoteRequestMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
