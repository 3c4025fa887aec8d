//! Bookkeeping for in-flight requests.
//!
//! The registry maps request id → [`PendingRequest`]. Removing an entry is the
//! only way to obtain its responder, so a request can be settled at most once
//! no matter which path (response, deadline, send failure, close) gets there
//! first.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::RequestError;
use crate::protocol::{Frame, Subtype};

/// Outcome delivered to the caller of a correlated request.
pub type RequestResult = Result<Frame, RequestError>;

/// Sending half handed to the correlator.
pub type Responder = oneshot::Sender<RequestResult>;

/// Receiving half the caller awaits.
pub type ResponseReceiver = oneshot::Receiver<RequestResult>;

/// One request awaiting its response.
#[derive(Debug)]
pub struct PendingRequest {
    subtype: Subtype,
    deadline: Instant,
    responder: Responder,
}

impl PendingRequest {
    /// Create a pending request that expires at `deadline`.
    #[must_use]
    pub fn new(subtype: Subtype, deadline: Instant, responder: Responder) -> Self {
        Self {
            subtype,
            deadline,
            responder,
        }
    }

    /// Subtype the request was sent with.
    #[must_use]
    pub fn subtype(&self) -> Subtype {
        self.subtype
    }

    /// Instant after which the request times out.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Deliver the outcome to the caller.
    ///
    /// Rejections are logged; a caller that stopped waiting is not an error.
    pub fn settle(self, id: &str, result: RequestResult) {
        if let Err(e) = &result {
            log::debug!(
                "[Correlator] Rejecting {} request {}: {} ({})",
                self.subtype,
                id,
                e,
                e.kind()
            );
        }
        if self.responder.send(result).is_err() {
            log::trace!("[Correlator] Caller for request {} no longer waiting", id);
        }
    }
}

/// Map of request id → pending request.
#[derive(Debug, Default)]
pub struct PendingRequestRegistry {
    pending: HashMap<String, PendingRequest>,
}

impl PendingRequestRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether `id` is pending.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Store a pending request under `id`.
    ///
    /// # Errors
    ///
    /// Hands the request back untouched if `id` is already pending; the
    /// existing entry is left as it was.
    pub fn insert(&mut self, id: String, request: PendingRequest) -> Result<(), PendingRequest> {
        if self.pending.contains_key(&id) {
            return Err(request);
        }
        self.pending.insert(id, request);
        Ok(())
    }

    /// Remove and return the request pending under `id`.
    pub fn remove(&mut self, id: &str) -> Option<PendingRequest> {
        self.pending.remove(id)
    }

    /// Earliest deadline among pending requests.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(PendingRequest::deadline).min()
    }

    /// Remove every request whose deadline is at or before `now`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<(String, PendingRequest)> {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, request)| request.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.pending.remove(&id).map(|request| (id, request)))
            .collect()
    }

    /// Remove every pending request.
    pub fn drain(&mut self) -> Vec<(String, PendingRequest)> {
        self.pending.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pending(deadline: Instant) -> (PendingRequest, ResponseReceiver) {
        let (tx, rx) = oneshot::channel();
        (PendingRequest::new(Subtype::Graph, deadline, tx), rx)
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id_and_keeps_original() {
        let mut registry = PendingRequestRegistry::new();
        let now = Instant::now();
        let (first, _rx1) = pending(now + Duration::from_secs(5));
        let (second, _rx2) = pending(now + Duration::from_secs(1));

        assert!(registry.insert("a".into(), first).is_ok());
        let rejected = registry.insert("a".into(), second).unwrap_err();

        assert_eq!(rejected.deadline(), now + Duration::from_secs(1));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.next_deadline(), Some(now + Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_next_deadline_is_minimum() {
        let mut registry = PendingRequestRegistry::new();
        assert!(registry.next_deadline().is_none());

        let now = Instant::now();
        let (late, _rx1) = pending(now + Duration::from_secs(9));
        let (early, _rx2) = pending(now + Duration::from_secs(3));
        registry.insert("late".into(), late).unwrap();
        registry.insert("early".into(), early).unwrap();

        assert_eq!(registry.next_deadline(), Some(now + Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_take_expired_only_removes_due_entries() {
        let mut registry = PendingRequestRegistry::new();
        let now = Instant::now();
        let (due, _rx1) = pending(now);
        let (later, _rx2) = pending(now + Duration::from_secs(1));
        registry.insert("due".into(), due).unwrap();
        registry.insert("later".into(), later).unwrap();

        let expired = registry.take_expired(now);

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, "due");
        assert!(registry.contains("later"));
        assert!(!registry.contains("due"));
    }

    #[tokio::test]
    async fn test_settle_delivers_exactly_once() {
        let (request, mut rx) = pending(Instant::now());
        request.settle("x", Err(RequestError::Timeout));

        assert_eq!(rx.try_recv().unwrap(), Err(RequestError::Timeout));
    }

    #[tokio::test]
    async fn test_settle_with_dropped_receiver_does_not_panic() {
        let (request, rx) = pending(Instant::now());
        drop(rx);
        request.settle("x", Err(RequestError::ConnectionClosed));
    }
}
