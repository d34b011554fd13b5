/// Link supervisor.
///
/// On the original hardware this task owned the WiFi station: connect,
/// monitor, reconnect with exponential backoff, and reboot after enough
/// consecutive failures. A hosted process has no station to bring up, so
/// "link up" here means a configured probe host answers a TCP connect within
/// the timeout; the backoff/reboot state machine around that probe is kept
/// verbatim (see DESIGN.md for the substitution rationale).
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use datalogger_protocol::flags::FlagExt;

use crate::engine::Engine;
use crate::health::TaskPulse;
use crate::resolver;

/// How long a reachable link is considered stable before the next probe,
/// mirroring the original `wifi_monitor_task`'s 30s poll once connected.
const STABLE_POLL: Duration = Duration::from_secs(30);

pub async fn run(engine: Arc<Engine>, pulse: TaskPulse, cancel: CancellationToken) {
    let cfg = &engine.config.link;
    let timeout = Duration::from_millis(engine.config.dns.reachability_timeout_ms);
    let mut interval_ms = cfg.reconnect_initial_ms;
    let mut failed_attempts: u32 = 0;

    loop {
        pulse.tick();
        if cancel.is_cancelled() {
            return;
        }

        if resolver::probe_reachable(&cfg.probe_target, timeout).await {
            if !engine.flags.link_connected.is_set() {
                info!(target = %cfg.probe_target, "link reachable");
            }
            engine.flags.link_connected.set();
            engine.flags.link_failed.clear();
            engine.flags.refresh_system_ready();
            failed_attempts = 0;
            interval_ms = cfg.reconnect_initial_ms;
            tokio::time::sleep(STABLE_POLL).await;
        } else {
            engine.flags.link_connected.clear();
            engine.flags.link_failed.set();
            engine.flags.refresh_system_ready();
            failed_attempts += 1;
            warn!(attempt = failed_attempts, target = %cfg.probe_target, "link probe failed");

            if failed_attempts % 3 == 0 {
                interval_ms = (interval_ms * 2).min(cfg.reconnect_max_ms);
            }

            if failed_attempts >= cfg.max_failed_attempts {
                error!(
                    failed_attempts,
                    "link unreachable after max attempts, exiting for supervisor restart"
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
                std::process::exit(1);
            }

            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }
}
