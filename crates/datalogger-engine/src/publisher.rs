/// Publisher: single cooperative loop with strict priority — fresh
/// measurements first, then backlog drain under the throttle, then a
/// heartbeat while otherwise idle but connected.
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use datalogger_protocol::flags::FlagExt;
use datalogger_protocol::measurement::Measurement;

use crate::broker::{BrokerMessage, PublishRequest};
use crate::engine::Engine;
use crate::health::TaskPulse;

const FRESH_POLL_TIMEOUT: Duration = Duration::from_millis(10);

fn store_to_ring(engine: &Engine, measurement: Measurement) {
    let now_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32;
    let uptime = engine.start_time.elapsed().as_secs() as u32;
    if let Err(e) = engine.ring.store(&measurement, now_epoch, uptime) {
        warn!(error = %e, "failed to persist measurement to backlog");
    }
}

pub async fn run(
    engine: Arc<Engine>,
    mut measurement_rx: Receiver<Measurement>,
    broker_tx: Sender<BrokerMessage>,
    pulse: TaskPulse,
    cancel: CancellationToken,
) {
    let heartbeat_interval = Duration::from_secs(engine.config.broker.heartbeat_interval_secs);
    let mut last_activity = Instant::now();
    // Tracks the pause we've already sent a mid-pause heartbeat for, keyed by
    // its start time, so each batch pause gets at most one split heartbeat.
    let mut split_heartbeat_sent_for: Option<Instant> = None;

    loop {
        pulse.tick();
        if cancel.is_cancelled() {
            return;
        }

        let mut handled_fresh = false;

        if let Ok(Some(measurement)) =
            tokio::time::timeout(FRESH_POLL_TIMEOUT, measurement_rx.recv()).await
        {
            handled_fresh = true;
            last_activity = Instant::now();
            if engine.flags.broker_connected.is_set() {
                if broker_tx
                    .send(BrokerMessage::Publish(PublishRequest {
                        measurement,
                        from_backlog: false,
                    }))
                    .await
                    .is_err()
                {
                    store_to_ring(&engine, measurement);
                }
            } else {
                store_to_ring(&engine, measurement);
            }
        }

        if !handled_fresh && engine.flags.broker_connected.is_set() && !engine.ring.is_empty() {
            let now = Instant::now();
            let mut throttle = engine.throttle.lock().await;
            if throttle.check(now) {
                if let Ok(Some(measurement)) = engine.ring.get_and_remove() {
                    throttle.record_submission(now);
                    drop(throttle);
                    last_activity = Instant::now();
                    split_heartbeat_sent_for = None;
                    if broker_tx
                        .send(BrokerMessage::Publish(PublishRequest {
                            measurement,
                            from_backlog: true,
                        }))
                        .await
                        .is_err()
                    {
                        if let Err(e) = engine.ring.rollback(&measurement) {
                            warn!(error = %e, "failed to roll back unsendable backlog record");
                        }
                    }
                }
            } else {
                // Mid-batch-pause: split the pause in half with an interleaved
                // heartbeat, distinct from the generic idle heartbeat below,
                // so a receiver doesn't mistake a full-batch pause for a stall.
                let pause_start = throttle.pause_started_at();
                let pause_len = throttle.batch_delay();
                drop(throttle);
                if split_heartbeat_sent_for != Some(pause_start)
                    && now.duration_since(pause_start) >= pause_len / 2
                {
                    if broker_tx.send(BrokerMessage::Heartbeat).await.is_ok() {
                        last_activity = Instant::now();
                    }
                    split_heartbeat_sent_for = Some(pause_start);
                }
            }
        }

        if engine.flags.broker_connected.is_set() && last_activity.elapsed() >= heartbeat_interval {
            let _ = broker_tx.send(BrokerMessage::Heartbeat).await;
            last_activity = Instant::now();
        }
    }
}
