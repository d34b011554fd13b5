use std::time::{Duration, Instant};

/// Token-style batch governor applied only to backlog flushing; fresh
/// publishes always bypass it.
pub struct Throttle {
    batch_size: u32,
    batch_delay: Duration,
    batch_count: u32,
    last_batch_time: Instant,
}

impl Throttle {
    pub fn new(batch_size: u32, batch_delay: Duration) -> Self {
        Self {
            batch_size,
            batch_delay,
            batch_count: 0,
            last_batch_time: Instant::now(),
        }
    }

    /// Whether a backlog submission may proceed right now. Resets and grants
    /// the moment a full batch's delay has elapsed, so the denial window is
    /// observable to a caller polling `check` between submissions (e.g. to
    /// interleave a heartbeat during the pause).
    pub fn check(&mut self, now: Instant) -> bool {
        if self.batch_count < self.batch_size {
            return true;
        }
        if now.duration_since(self.last_batch_time) >= self.batch_delay {
            self.reset_batch(now);
            true
        } else {
            false
        }
    }

    /// Record a successful backlog submission. Once this fills the batch,
    /// `last_batch_time` marks the start of the pause that `check` enforces
    /// until `batch_delay` elapses.
    pub fn record_submission(&mut self, now: Instant) {
        self.batch_count += 1;
        if self.batch_count == self.batch_size {
            self.last_batch_time = now;
        }
    }

    /// Time the current batch pause began, i.e. when the batch last filled
    /// (or was explicitly reset). Used to interleave a heartbeat at the
    /// pause's midpoint.
    pub fn pause_started_at(&self) -> Instant {
        self.last_batch_time
    }

    pub fn is_paused(&self) -> bool {
        self.batch_count >= self.batch_size
    }

    /// Explicitly reset the batch window, e.g. on broker reconnect.
    pub fn reset_batch(&mut self, now: Instant) {
        self.batch_count = 0;
        self.last_batch_time = now;
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn batch_delay(&self) -> Duration {
        self.batch_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_batch_size_permits_then_denies_then_grants_after_delay() {
        let mut t = Throttle::new(3, Duration::from_millis(50));
        let t0 = Instant::now();

        assert!(t.check(t0));
        t.record_submission(t0);
        assert!(t.check(t0));
        t.record_submission(t0);
        assert!(t.check(t0));
        t.record_submission(t0); // fills the batch, starts the pause

        assert!(t.is_paused());
        assert!(!t.check(t0));
        assert!(t.is_paused());

        let later = t0 + Duration::from_millis(60);
        assert!(t.check(later)); // delay elapsed: grants and resets
        assert!(!t.is_paused());
    }

    #[test]
    fn batch_count_zero_always_permits() {
        let mut t = Throttle::new(3, Duration::from_millis(100));
        assert!(t.check(Instant::now()));
    }
}
