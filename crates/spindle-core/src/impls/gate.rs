//! Close gate shared by the lock-free queues.
//!
//! Producers announce themselves before checking `closed` and pushing. The
//! consumer only trusts "closed and empty" once no producer is mid-push, so an
//! item is either rejected or observed by the consumer, never stranded.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub(crate) struct CloseGate {
    closed: AtomicBool,
    in_flight: AtomicUsize,
}

/// Held by a producer between the closed check and the push.
pub(crate) struct Admission<'a> {
    gate: &'a CloseGate,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CloseGate {
    /// `None` when closed.
    pub(crate) fn admit(&self) -> Option<Admission<'_>> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let admission = Admission { gate: self };
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        Some(admission)
    }

    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closed, and every admitted producer has finished pushing.
    pub(crate) fn is_sealed(&self) -> bool {
        self.is_closed() && self.in_flight.load(Ordering::SeqCst) == 0
    }
}
