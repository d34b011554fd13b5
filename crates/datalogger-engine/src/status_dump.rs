/// Periodic structured status dump, carried forward from the original
/// firmware's config-gated `system_status.c` task: a single `info!` line
/// summarizing the same fields `/status` serves, at a configured interval.
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use datalogger_protocol::flags::FlagExt;

use crate::engine::Engine;

pub async fn run(engine: Arc<Engine>) {
    if !engine.config.http.status_dump_enabled {
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_millis(
        engine.config.http.status_dump_interval_ms,
    ));

    loop {
        interval.tick().await;
        info!(
            link_connected = engine.flags.link_connected.is_set(),
            broker_connected = engine.flags.broker_connected.is_set(),
            system_state = engine.flags.system_state().as_str(),
            system_ready = engine.flags.system_ready.is_set(),
            messages_sent = engine.counters.messages_sent.load(Ordering::Relaxed),
            publish_attempts = engine.counters.publish_attempts.load(Ordering::Relaxed),
            backlog_count = engine.backlog_count(),
            consecutive_failures = engine.counters.consecutive_failures.load(Ordering::Relaxed),
            uptime_secs = engine.start_time.elapsed().as_secs(),
            "status"
        );
    }
}
