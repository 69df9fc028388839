//! Per-session tracking of in-flight context requests.
//!
//! A dashboard session issues a new context request whenever the user edits
//! the query, the filters, or the pinned set. Only the latest one matters:
//! [`InFlightRequests::begin`] cancels the previous request for the same
//! session and hands back a guard whose ticket goes stale as soon as a newer
//! request starts. Requests without a session id are never tracked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use hitherto_core::generation::{RequestGenerations, RequestTicket};

struct SessionSlot {
    generations: Arc<RequestGenerations>,
    cancel: CancellationToken,
}

#[derive(Default)]
pub struct InFlightRequests {
    sessions: Mutex<HashMap<String, SessionSlot>>,
}

impl InFlightRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionSlot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new request for `session`, cancelling its predecessor.
    pub fn begin(&self, session: &str) -> InFlight<'_> {
        let cancel = CancellationToken::new();
        let mut sessions = self.lock();
        let slot = sessions
            .entry(session.to_string())
            .or_insert_with(|| SessionSlot {
                generations: Arc::new(RequestGenerations::new()),
                cancel: CancellationToken::new(),
            });
        slot.cancel.cancel();
        slot.cancel = cancel.clone();
        let ticket = slot.generations.begin();
        tracing::debug!(
            session,
            generation = ticket.generation(),
            "context request started"
        );

        InFlight {
            owner: self,
            session: session.to_string(),
            generations: Arc::clone(&slot.generations),
            ticket,
            cancel,
        }
    }

    /// Number of sessions with a request still running.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A tracked request. Dropping it clears the session entry if no newer
/// request has replaced it.
pub struct InFlight<'a> {
    owner: &'a InFlightRequests,
    session: String,
    generations: Arc<RequestGenerations>,
    ticket: RequestTicket,
    cancel: CancellationToken,
}

impl InFlight<'_> {
    /// Fires when a newer request for the same session starts.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Keep `value` only if this is still the session's latest request.
    pub fn settle<T>(&self, value: T) -> Option<T> {
        self.generations.settle(self.ticket, value)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut sessions = self.owner.lock();
        if self.generations.is_current(&self.ticket) {
            sessions.remove(&self.session);
        }
    }
}
