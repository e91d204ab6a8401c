use std::sync::atomic::{AtomicU64, Ordering};

/// A region's virtual clock in milliseconds.
///
/// Any thread may read it; only the owning region advances it, and it never
/// goes backwards.
#[derive(Debug, Default)]
pub struct RegionClock {
    now: AtomicU64,
}

impl RegionClock {
    /// A clock starting at `start` milliseconds.
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }

    /// Advance by `delta` milliseconds. Returns the new time.
    pub(crate) fn advance(&self, delta: u64) -> u64 {
        let prev = self.now.load(Ordering::Relaxed);
        let next = prev.saturating_add(delta);
        self.now.store(next, Ordering::Release);
        next
    }
}
