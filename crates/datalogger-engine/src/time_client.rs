/// NTP time client.
///
/// Polls a fixed list of regional servers, keeps a durable time cache so a
/// restart can offer a best-effort estimate before the first live sync lands,
/// and watches for drift once synced — matching `ntp_sync_task`'s
/// stop/fast-resync/restore cycle.
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rsntp::AsyncSntpClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use datalogger_protocol::cache::TimeCacheEntry;
use datalogger_protocol::flags::FlagExt;

use crate::engine::Engine;
use crate::health::TaskPulse;

const TIME_CACHE_KEY: &str = "time_cache";
const PRE_SYNC_FAST_POLL: Duration = Duration::from_secs(10);
const PRE_SYNC_FAST_POLL_WINDOW: Duration = Duration::from_secs(60);
const PRE_SYNC_SLOW_POLL: Duration = Duration::from_secs(60);
const DRIFT_RESYNC_POLL: Duration = Duration::from_secs(30);

fn now_unix() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

async fn sync_once(servers: &[String]) -> anyhow::Result<u32> {
    let client = AsyncSntpClient::new();
    let mut last_err = None;
    for server in servers {
        match client.synchronize(server.as_str()).await {
            Ok(result) => {
                let offset = result.clock_offset().as_secs_f64();
                let epoch = (now_unix().as_secs_f64() + offset) as u32;
                return Ok(epoch);
            }
            Err(e) => {
                warn!(server, error = %e, "ntp server unreachable");
                last_err = Some(e);
            }
        }
    }
    anyhow::bail!("all ntp servers unreachable: {:?}", last_err)
}

fn apply_boot_estimate(engine: &Engine) {
    let Some(cached) = engine.kv.get::<TimeCacheEntry>(TIME_CACHE_KEY) else {
        return;
    };
    if !cached.is_usable() {
        debug!(cached_epoch = cached.cached_epoch, "discarding stale persisted time cache");
        if let Err(e) = engine.kv.remove(TIME_CACHE_KEY) {
            warn!(error = %e, "failed to discard stale time cache entry");
        }
    }
    let uptime_secs = engine.start_time.elapsed().as_secs() as u32;
    if let Some(estimate) = cached.estimate(uptime_secs, engine.config.ntp.cache_max_age_secs) {
        info!(estimate, "applying cached time estimate at boot");
        engine.flags.time_synced.set();
        engine.flags.refresh_system_ready();
    }
}

pub async fn run(engine: Arc<Engine>, pulse: TaskPulse, cancel: CancellationToken) {
    while !engine.flags.link_connected.is_set() {
        if cancel.is_cancelled() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    apply_boot_estimate(&engine);

    let cfg = engine.config.ntp.servers.clone();
    let sync_interval = Duration::from_secs(engine.config.ntp.sync_interval_secs);
    let resync_threshold = Duration::from_secs(engine.config.ntp.resync_threshold_secs);

    let mut first_sync = true;
    let wait_deadline = Instant::now() + PRE_SYNC_FAST_POLL_WINDOW;
    let mut last_sync_ack = Instant::now();

    loop {
        pulse.tick();
        if cancel.is_cancelled() {
            return;
        }

        match sync_once(&cfg).await {
            Ok(epoch) => {
                engine.flags.time_synced.set();
                engine.flags.refresh_system_ready();
                last_sync_ack = Instant::now();
                info!(epoch, "ntp sync acknowledged");

                if let Err(e) = engine.kv.set(TIME_CACHE_KEY, &TimeCacheEntry { cached_epoch: epoch }) {
                    warn!(error = %e, "failed to persist time cache");
                }

                if first_sync {
                    engine.flags.process_backlog.set();
                    first_sync = false;
                }

                tokio::time::sleep(sync_interval).await;

                if last_sync_ack.elapsed() > resync_threshold {
                    warn!("ntp drift threshold exceeded, forcing resync");
                    engine.flags.time_synced.clear();
                    engine.flags.refresh_system_ready();
                    tokio::time::sleep(DRIFT_RESYNC_POLL).await;
                }
            }
            Err(e) => {
                debug!(error = %e, "ntp sync attempt failed");
                if Instant::now() < wait_deadline {
                    tokio::time::sleep(PRE_SYNC_FAST_POLL).await;
                } else {
                    tokio::time::sleep(PRE_SYNC_SLOW_POLL).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_entry_estimate_matches_boot_estimate_inputs() {
        let entry = TimeCacheEntry { cached_epoch: 1_700_000_000 };
        assert_eq!(entry.estimate(30, 7_200), Some(1_700_000_030));
    }
}
