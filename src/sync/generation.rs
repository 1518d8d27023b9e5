//! Generation counters for check-then-apply staleness detection.
//!
//! A fetch captures a [`Ticket`] when it is issued. Anything that makes the
//! pending result irrelevant advances the generation; on completion the
//! result is applied only if its ticket is still current.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a [`Generation`] at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Monotonic counter; see the module docs.
#[derive(Debug, Default)]
pub struct Generation {
    current: AtomicU64,
}

impl Generation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current generation.
    pub fn ticket(&self) -> Ticket {
        Ticket(self.current.load(Ordering::Acquire))
    }

    /// Invalidate every outstanding ticket and return the new one.
    pub fn advance(&self) -> Ticket {
        Ticket(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.ticket() == ticket
    }
}
