//! Request/response correlation.
//!
//! The [`Correlator`] turns "send this payload as subtype X" into a
//! [`Frame`] with a fresh id, remembers the caller's responder in the
//! [`PendingRequestRegistry`] together with a deadline, and later settles it
//! from whichever comes first:
//!
//! - a response frame carrying the same id ([`Correlator::resolve`]),
//! - the deadline passing ([`Correlator::expire`]),
//! - a send failure ([`Correlator::fail`]),
//! - the connection going away ([`Correlator::fail_all`]).
//!
//! The correlator does no I/O and never blocks; the connection event loop
//! owns it exclusively, so no locking is involved.

pub mod registry;

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::error::RequestError;
use crate::protocol::{Frame, Subtype};

pub use registry::{
    PendingRequest, PendingRequestRegistry, RequestResult, Responder, ResponseReceiver,
};

/// Source of request ids.
pub trait IdGenerator: Send + std::fmt::Debug {
    /// Produce the next id. Uniqueness is checked by the correlator.
    fn next_id(&mut self) -> String;
}

/// Random UUID v4 ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Matches outgoing requests with their responses.
#[derive(Debug)]
pub struct Correlator {
    registry: PendingRequestRegistry,
    ids: Box<dyn IdGenerator>,
    request_timeout: Duration,
}

impl Correlator {
    /// Correlator with UUID ids and the given per-request timeout.
    #[must_use]
    pub fn new(request_timeout: Duration) -> Self {
        Self::with_id_generator(request_timeout, Box::new(UuidGenerator))
    }

    /// Correlator with a custom id source.
    #[must_use]
    pub fn with_id_generator(request_timeout: Duration, ids: Box<dyn IdGenerator>) -> Self {
        Self {
            registry: PendingRequestRegistry::new(),
            ids,
            request_timeout,
        }
    }

    /// Register a new request and build the frame to send.
    ///
    /// Returns `None` when the generated id is already pending; in that case
    /// `responder` has been rejected with [`RequestError::Collision`] and
    /// nothing must be sent.
    pub fn register(
        &mut self,
        subtype: Subtype,
        payload: Value,
        responder: Responder,
    ) -> Option<Frame> {
        let id = self.ids.next_id();
        let deadline = Instant::now() + self.request_timeout;
        let request = PendingRequest::new(subtype, deadline, responder);

        match self.registry.insert(id.clone(), request) {
            Ok(()) => {
                log::trace!("[Correlator] Registered {} request {}", subtype, id);
                Some(Frame::request(id, subtype, payload))
            }
            Err(request) => {
                log::warn!("[Correlator] Generated id {} is already pending", id);
                request.settle(&id, Err(RequestError::Collision(id.clone())));
                None
            }
        }
    }

    /// Settle the request a response frame belongs to.
    ///
    /// Returns `false` (after logging a warning) when the frame has no id or
    /// its id matches no pending request; nothing else is touched then.
    pub fn resolve(&mut self, frame: Frame) -> bool {
        let Some(id) = frame.id.clone() else {
            log::warn!("[Correlator] Response without id ignored");
            return false;
        };

        match self.registry.remove(&id) {
            Some(request) => {
                log::trace!("[Correlator] Resolved {} request {}", request.subtype(), id);
                request.settle(&id, Ok(frame));
                true
            }
            None => {
                log::warn!("[Correlator] Response for unknown request {}", id);
                false
            }
        }
    }

    /// Reject one pending request, e.g. because writing it failed.
    pub fn fail(&mut self, id: &str, error: RequestError) -> bool {
        match self.registry.remove(id) {
            Some(request) => {
                request.settle(id, Err(error));
                true
            }
            None => false,
        }
    }

    /// Time out every request whose deadline is at or before `now`.
    ///
    /// Returns how many requests expired.
    pub fn expire(&mut self, now: Instant) -> usize {
        let expired = self.registry.take_expired(now);
        let count = expired.len();
        for (id, request) in expired {
            log::warn!("[Correlator] {} request {} timed out", request.subtype(), id);
            request.settle(&id, Err(RequestError::Timeout));
        }
        count
    }

    /// Reject every pending request with `error`.
    pub fn fail_all(&mut self, error: &RequestError) -> usize {
        let drained = self.registry.drain();
        let count = drained.len();
        for (id, request) in drained {
            request.settle(&id, Err(error.clone()));
        }
        count
    }

    /// Earliest pending deadline, if anything is pending.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.registry.next_deadline()
    }

    /// Number of pending requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether `id` is pending.
    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.registry.contains(id)
    }
}
