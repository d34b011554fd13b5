/// Typed replacement for the original firmware's FreeRTOS event-group bits.
///
/// Each flag is an independently-owned `AtomicBool`, set/cleared by exactly
/// one component and polled by others, mirroring the set/clear/test semantics
/// of `xEventGroupSetBits`/`ClearBits`/`GetBits` without a shared bitmask.
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct EventFlags {
    pub link_connected: AtomicBool,
    pub link_failed: AtomicBool,
    pub time_synced: AtomicBool,
    pub broker_connected: AtomicBool,
    /// Lockless summary bit for the HTTP collaborator: true only once link,
    /// time and broker are all up. Kept in sync by `refresh_system_ready`,
    /// called from every site that flips one of those three flags.
    pub system_ready: AtomicBool,
    pub process_backlog: AtomicBool,
}

impl EventFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute `system_ready` from `link_connected`/`time_synced`/
    /// `broker_connected`. Call after changing any of the three.
    pub fn refresh_system_ready(&self) {
        let ready = self.link_connected.is_set() && self.time_synced.is_set() && self.broker_connected.is_set();
        self.system_ready.store(ready, Ordering::Relaxed);
    }

    /// Derive the coarse lifecycle state from the underlying flags. A pure
    /// read-side projection so it can't drift out of sync with what it
    /// summarizes; fed to `/status` and the periodic status dump.
    pub fn system_state(&self) -> SystemState {
        if self.link_failed.is_set() {
            SystemState::Error
        } else if !self.link_connected.is_set() {
            SystemState::LinkConnecting
        } else if !self.time_synced.is_set() {
            SystemState::TimeSyncing
        } else if !self.broker_connected.is_set() {
            SystemState::BrokerConnecting
        } else {
            SystemState::Ready
        }
    }
}

/// Convenience extension trait so call sites read as `flags.link_connected.is_set()`
/// rather than repeating `Ordering::Relaxed` everywhere.
pub trait FlagExt {
    fn is_set(&self) -> bool;
    fn set(&self);
    fn clear(&self);
}

impl FlagExt for AtomicBool {
    fn is_set(&self) -> bool {
        self.load(Ordering::Relaxed)
    }

    fn set(&self) {
        self.store(true, Ordering::Relaxed)
    }

    fn clear(&self) {
        self.store(false, Ordering::Relaxed)
    }
}

/// Coarse system lifecycle state, advisory only — nothing blocks on it except
/// the status surfaces (`/status`, the periodic status dump).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    Init,
    LinkConnecting,
    LinkConnected,
    TimeSyncing,
    TimeSynced,
    BrokerConnecting,
    BrokerConnected,
    Ready,
    Error,
}

impl SystemState {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemState::Init => "init",
            SystemState::LinkConnecting => "link_connecting",
            SystemState::LinkConnected => "link_connected",
            SystemState::TimeSyncing => "time_syncing",
            SystemState::TimeSynced => "time_synced",
            SystemState::BrokerConnecting => "broker_connecting",
            SystemState::BrokerConnected => "broker_connected",
            SystemState::Ready => "ready",
            SystemState::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_set_clear_roundtrip() {
        let flags = EventFlags::new();
        assert!(!flags.time_synced.is_set());
        flags.time_synced.set();
        assert!(flags.time_synced.is_set());
        flags.time_synced.clear();
        assert!(!flags.time_synced.is_set());
    }
}
