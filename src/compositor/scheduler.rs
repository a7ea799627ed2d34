//! Composite scheduling
//!
//! Two request paths feed one composite pass: the throttled path coalesces
//! bursts of damage into one pass per interval, the immediate path cancels
//! whatever is pending and lets the caller composite synchronously.
//! Nothing here owns a timer; the host event loop sleeps until
//! [`CompositeScheduler::deadline`] and then calls [`CompositeScheduler::take_due`].

use std::time::{Duration, Instant};

use tracing::trace;

#[derive(Debug)]
pub struct CompositeScheduler {
    interval: Duration,
    pending: Option<Instant>,
    coalesced: u64,
}

impl CompositeScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: None,
            coalesced: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Request a throttled composite. Returns true if this call armed a new
    /// deadline, false if it collapsed into the pending one.
    pub fn request(&mut self, now: Instant) -> bool {
        if self.pending.is_some() {
            self.coalesced += 1;
            return false;
        }
        let deadline = now + self.interval;
        trace!("Composite scheduled in {:?}", self.interval);
        self.pending = Some(deadline);
        true
    }

    /// Drop any pending request. Idempotent.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending
    }

    /// Consume the pending request if its deadline has passed
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(deadline) if now >= deadline => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Requests that were folded into an already pending composite
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_within_interval_coalesce() {
        let mut scheduler = CompositeScheduler::new(Duration::from_millis(16));
        let now = Instant::now();

        assert!(scheduler.request(now));
        for i in 1..10 {
            assert!(!scheduler.request(now + Duration::from_millis(i)));
        }
        assert_eq!(scheduler.coalesced(), 9);
        assert_eq!(scheduler.deadline(), Some(now + Duration::from_millis(16)));

        assert!(!scheduler.take_due(now + Duration::from_millis(15)));
        assert!(scheduler.take_due(now + Duration::from_millis(16)));
        assert!(!scheduler.take_due(now + Duration::from_millis(40)));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut scheduler = CompositeScheduler::new(Duration::from_millis(16));
        let now = Instant::now();
        scheduler.request(now);
        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());
        assert!(!scheduler.take_due(now + Duration::from_secs(1)));
    }
}
