//! Request generations for discarding superseded responses.
//!
//! Each new request takes a [`RequestTicket`] from [`RequestGenerations`].
//! Starting a newer request makes every older ticket stale, and a stale
//! ticket's late response is dropped by [`RequestGenerations::settle`]
//! instead of overwriting newer state.
//!
//! ```rust
//! use hitherto_core::generation::RequestGenerations;
//!
//! let generations = RequestGenerations::new();
//! let first = generations.begin();
//! let second = generations.begin();
//! assert_eq!(generations.settle(first, "old"), None);
//! assert_eq!(generations.settle(second, "new"), Some("new"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Proof that a request was started at a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

/// Monotonic generation counter shared by one stream of requests.
#[derive(Debug, Default)]
pub struct RequestGenerations {
    current: AtomicU64,
}

impl RequestGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, superseding all earlier tickets.
    pub fn begin(&self) -> RequestTicket {
        RequestTicket(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.current.load(Ordering::Acquire) == ticket.0
    }

    /// Keep `value` only if `ticket` is still the latest request.
    pub fn settle<T>(&self, ticket: RequestTicket, value: T) -> Option<T> {
        if self.is_current(&ticket) {
            Some(value)
        } else {
            tracing::debug!(
                generation = ticket.0,
                "discarding response from superseded request"
            );
            None
        }
    }
}
