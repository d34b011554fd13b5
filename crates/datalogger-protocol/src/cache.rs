/// Persisted cache entry shapes, kept free of any particular storage backend
/// so their TTL/acceptance logic (§8 invariants 5 and 12) can be unit tested
/// without touching disk.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverCacheEntry {
    pub ip: String,
    pub saved_at_epoch: u32,
}

impl ResolverCacheEntry {
    /// Whether this entry is still usable. An entry saved while time was
    /// unsynced (`saved_at_epoch == 0`) is accepted unconditionally.
    pub fn is_fresh(&self, now_epoch: u32, ttl_secs: u32) -> bool {
        if self.saved_at_epoch == 0 {
            return true;
        }
        now_epoch.saturating_sub(self.saved_at_epoch) < ttl_secs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeCacheEntry {
    pub cached_epoch: u32,
}

/// 2024-01-01T00:00:00Z — a cached value older than this is treated as never
/// having been cached, mirroring the original firmware's boot-time guard.
pub const TIME_CACHE_DISCARD_BEFORE: u32 = 1_704_067_200;

impl TimeCacheEntry {
    /// Whether the cached value is plausible enough to persist across a
    /// restart and to be trusted as real wall-clock by itself. A value
    /// predating this cutoff is kept only long enough to serve as a boot
    /// estimate (see `estimate`) and is discarded rather than re-persisted.
    pub fn is_usable(&self) -> bool {
        self.cached_epoch >= TIME_CACHE_DISCARD_BEFORE
    }

    /// Best-effort wall-clock estimate applied at boot, valid only while the
    /// device has been up for less than `max_age_secs`. Applied unconditionally
    /// on age alone — even a pre-2024 cached value is still a better timestamp
    /// hint than raw uptime — `is_usable` governs persistence, not this hint.
    pub fn estimate(&self, uptime_secs: u32, max_age_secs: u32) -> Option<u32> {
        if uptime_secs >= max_age_secs {
            return None;
        }
        Some(self.cached_epoch + uptime_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_within_ttl() {
        let e = ResolverCacheEntry {
            ip: "203.0.113.10".into(),
            saved_at_epoch: 1_700_000_000,
        };
        assert!(e.is_fresh(1_700_000_000 + 100, 86_400));
    }

    #[test]
    fn expired_entry_past_ttl() {
        let e = ResolverCacheEntry {
            ip: "203.0.113.10".into(),
            saved_at_epoch: 1_700_000_000,
        };
        assert!(!e.is_fresh(1_700_000_000 + 90_000, 86_400));
    }

    #[test]
    fn zero_saved_at_always_fresh() {
        let e = ResolverCacheEntry {
            ip: "203.0.113.10".into(),
            saved_at_epoch: 0,
        };
        assert!(e.is_fresh(u32::MAX, 1));
    }

    #[test]
    fn stale_time_cache_before_2024_still_yields_a_boot_estimate() {
        let e = TimeCacheEntry { cached_epoch: 1_640_000_000 };
        assert!(!e.is_usable());
        assert_eq!(e.estimate(5, 7_200), Some(1_640_000_005));
        assert_eq!(e.estimate(7_200, 7_200), None);
    }

    #[test]
    fn time_cache_estimate_within_max_age() {
        let e = TimeCacheEntry { cached_epoch: 1_700_000_000 };
        assert_eq!(e.estimate(5, 7_200), Some(1_700_000_005));
        assert_eq!(e.estimate(7_200, 7_200), None);
    }
}
