/// Shared engine state: the single `Arc<Engine>` passed to every spawned
/// task, analogous to the host daemon's client/session state struct.
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex as AsyncMutex, RwLock};

use datalogger_protocol::flags::EventFlags;
use datalogger_protocol::measurement::Measurement;
use datalogger_protocol::pending::PendingTable;
use datalogger_protocol::ring::RingBuffer;
use datalogger_protocol::throttle::Throttle;

use crate::config::EngineConfig;
use crate::health::HealthCollector;
use crate::kv_store::KvStore;

/// Monotonic counters surfaced on `/status` and the periodic status dump.
#[derive(Default)]
pub struct Counters {
    pub messages_sent: AtomicU64,
    pub publish_attempts: AtomicU64,
    pub consecutive_failures: AtomicU32,
}

impl Counters {
    pub fn record_ack(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_attempt(&self) {
        self.publish_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reset_failures(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }
}

pub struct Engine {
    pub config: EngineConfig,
    pub client_id: String,
    pub mac_address: [u8; 6],
    pub flags: EventFlags,
    pub ring: RingBuffer,
    pub pending: AsyncMutex<PendingTable>,
    pub throttle: AsyncMutex<Throttle>,
    pub kv: KvStore,
    pub counters: Counters,
    pub last_measurement: RwLock<Option<Measurement>>,
    pub health: Arc<HealthCollector>,
    pub start_time: Instant,
}

impl Engine {
    pub fn backlog_count(&self) -> u32 {
        self.ring.count()
    }
}
