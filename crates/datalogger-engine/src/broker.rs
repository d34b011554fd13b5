/// Broker supervisor.
///
/// The original firmware split this into a session task (`mqtt_manager`,
/// which owns the client handle and scans the pending table on publish
/// acknowledgement) and a monitor task (`mqtt_monitor_task`, a 10s poll loop
/// deciding whether to reconnect or recreate). `tokio::select!` lets one task
/// multiplex the periodic poll, inbound publish requests, and event-loop
/// polling, so this port merges both into a single supervisor loop — see
/// DESIGN.md.
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use datalogger_protocol::flags::FlagExt;
use datalogger_protocol::measurement::Measurement;

use crate::engine::Engine;
use crate::health::TaskPulse;
use crate::resolver;

const MONITOR_POLL: Duration = Duration::from_secs(10);
const LINK_STABILIZATION_WAIT: Duration = Duration::from_secs(10);
const STALL_CHECK_INTERVAL: Duration = Duration::from_secs(120);
const RECREATE_SETTLE_DELAY: Duration = Duration::from_secs(1);

pub struct PublishRequest {
    pub measurement: Measurement,
    pub from_backlog: bool,
}

/// Messages the publisher sends to the broker supervisor over its channel.
pub enum BrokerMessage {
    Publish(PublishRequest),
    /// Keep-alive status ping, QoS 0, never tracked in the pending table.
    Heartbeat,
}

/// One slot in the `Outgoing::Publish` correlation FIFO. rumqttc emits an
/// outgoing-publish event for every `client.publish()` call regardless of
/// QoS, including the post-ConnAck "Online" status publish and heartbeats —
/// both of which skip the pending table. Every submission, tracked or not,
/// must push exactly one slot so the FIFO stays aligned with pkid events.
enum AwaitingAck {
    Tracked(Measurement, bool),
    Untracked,
}

fn parse_broker_uri(uri: &str) -> anyhow::Result<(String, u16)> {
    let rest = uri
        .strip_prefix("mqtt://")
        .or_else(|| uri.strip_prefix("mqtts://"))
        .unwrap_or(uri);
    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("broker uri missing port: {uri}"))?;
    Ok((host.to_string(), port.parse()?))
}

async fn create_session(engine: &Engine) -> anyhow::Result<(AsyncClient, EventLoop)> {
    let cfg = &engine.config.broker;
    let (host, port) = parse_broker_uri(&cfg.uri)?;

    let now_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32;

    let connect_host = match resolver::resolve(engine, &host, now_epoch).await {
        Ok(ip) => {
            let probe_timeout = Duration::from_millis(engine.config.dns.reachability_timeout_ms);
            if resolver::probe_reachable(&format!("{ip}:{port}"), probe_timeout).await {
                ip.to_string()
            } else {
                warn!(%ip, host, "resolved address unreachable, discarding cache entry and falling back to hostname");
                resolver::clear_cache(engine, &host);
                host.clone()
            }
        }
        Err(e) => {
            warn!(error = %e, host, "falling back to hostname, resolution failed");
            host
        }
    };

    let mut mqttoptions = MqttOptions::new(engine.client_id.clone(), connect_host, port);
    mqttoptions.set_keep_alive(Duration::from_secs(cfg.keepalive_secs));
    mqttoptions.set_last_will(LastWill::new(
        &cfg.status_topic,
        b"Offline".to_vec(),
        QoS::AtLeastOnce,
        true,
    ));

    let (client, eventloop) = AsyncClient::new(mqttoptions, cfg.max_pending);
    Ok((client, eventloop))
}

/// Returns whether the publish submission succeeded, so the caller can keep
/// the `awaiting_pkid` FIFO aligned with the `Outgoing::Publish` event it
/// will still generate.
async fn publish_online(client: &AsyncClient, topic: &str) -> bool {
    match client
        .publish(topic, QoS::AtLeastOnce, true, b"Online".to_vec())
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "failed to publish online status");
            false
        }
    }
}

/// Undo a failed submission: restore it to the backlog so it is retried
/// later, rather than lost.
async fn requeue_failed(engine: &Engine, measurement: Measurement) {
    if let Err(e) = engine.ring.rollback(&measurement) {
        warn!(error = %e, "failed to requeue measurement after publish failure");
    }
}

pub async fn run(
    engine: Arc<Engine>,
    mut rx: Receiver<BrokerMessage>,
    pulse: TaskPulse,
    cancel: CancellationToken,
) {
    let mut consecutive_failures: u32 = 0;
    let mut force_recreate = false;
    let mut was_link_connected = false;
    let mut link_up_at: Option<Instant> = None;
    let mut last_attempt = Instant::now() - Duration::from_millis(engine.config.broker.reconnect_delay_ms);
    let mut last_publish_count: u64 = 0;
    let mut next_stall_check = Instant::now() + STALL_CHECK_INTERVAL;

    let mut session: Option<(AsyncClient, EventLoop)> = None;
    let mut awaiting_pkid: VecDeque<AwaitingAck> = VecDeque::new();

    let mut monitor_tick = tokio::time::interval(MONITOR_POLL);

    loop {
        pulse.tick();
        if cancel.is_cancelled() {
            return;
        }

        let link_connected = engine.flags.link_connected.is_set();
        if link_connected && !was_link_connected {
            force_recreate = true;
            link_up_at = Some(Instant::now());
            info!("link reconnect edge detected, arming broker recreate");
        }
        if !link_connected {
            if session.is_some() {
                session = None;
                awaiting_pkid.clear();
                engine.flags.broker_connected.clear();
                engine.flags.refresh_system_ready();
                consecutive_failures = 0;
                force_recreate = true;
            }
        }
        was_link_connected = link_connected;

        if session.is_none() && link_connected {
            let stabilized = link_up_at
                .map(|t| t.elapsed() >= LINK_STABILIZATION_WAIT)
                .unwrap_or(true);
            let delay_elapsed =
                last_attempt.elapsed() >= Duration::from_millis(engine.config.broker.reconnect_delay_ms);

            if stabilized && delay_elapsed {
                last_attempt = Instant::now();
                if force_recreate {
                    tokio::time::sleep(RECREATE_SETTLE_DELAY).await;
                }
                match create_session(&engine).await {
                    Ok((client, eventloop)) => {
                        info!("broker session (re)created");
                        session = Some((client, eventloop));
                        force_recreate = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "broker session creation failed");
                    }
                }
            }
        }

        let Some((client, eventloop)) = session.as_mut() else {
            tokio::time::sleep(Duration::from_millis(250)).await;
            continue;
        };

        tokio::select! {
            biased;

            maybe_req = rx.recv() => {
                match maybe_req {
                    Some(BrokerMessage::Publish(req)) => {
                        engine.counters.record_attempt();
                        let payload = req.measurement.to_publish_json(&engine.client_id);
                        match client
                            .publish(&engine.config.broker.data_topic, QoS::AtLeastOnce, false, payload)
                            .await
                        {
                            Ok(()) => awaiting_pkid.push_back(AwaitingAck::Tracked(req.measurement, req.from_backlog)),
                            Err(e) => {
                                warn!(error = %e, "publish submission failed");
                                requeue_failed(&engine, req.measurement).await;
                            }
                        }
                    }
                    Some(BrokerMessage::Heartbeat) => {
                        match client
                            .publish(&engine.config.broker.status_topic, QoS::AtMostOnce, false, b"heartbeat".to_vec())
                            .await
                        {
                            Ok(()) => awaiting_pkid.push_back(AwaitingAck::Untracked),
                            Err(e) => warn!(error = %e, "heartbeat publish failed"),
                        }
                    }
                    None => return,
                }
            }

            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        engine.flags.broker_connected.set();
                        engine.flags.process_backlog.set();
                        engine.flags.refresh_system_ready();
                        consecutive_failures = 0;
                        engine.counters.reset_failures();
                        engine.throttle.lock().await.reset_batch(Instant::now());
                        info!("broker connected");
                        if publish_online(client, &engine.config.broker.status_topic).await {
                            awaiting_pkid.push_back(AwaitingAck::Untracked);
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                        match awaiting_pkid.pop_front() {
                            Some(AwaitingAck::Tracked(measurement, from_backlog)) => {
                                let mut pending = engine.pending.lock().await;
                                if pending.insert(pkid as i32, measurement, from_backlog).is_err() {
                                    warn!("pending-publish table full, dropping publish tracking");
                                }
                            }
                            Some(AwaitingAck::Untracked) | None => {}
                        }
                    }
                    Ok(Event::Incoming(Packet::PubAck(ack))) => {
                        let mut pending = engine.pending.lock().await;
                        if pending.remove(ack.pkid as i32).is_some() {
                            engine.counters.record_ack();
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "broker event loop error");
                        engine.flags.broker_connected.clear();
                        engine.flags.refresh_system_ready();
                        let failures = engine.counters.record_failure();
                        if failures >= 3 {
                            resolver::clear_cache(&engine, &broker_host(&engine.config.broker.uri));
                            engine.counters.reset_failures();
                        }
                        if consecutive_failures >= 2 {
                            force_recreate = true;
                            session = None;
                            awaiting_pkid.clear();
                        } else {
                            // Lightweight reconnect: keep polling the same handle and
                            // let rumqttc renegotiate the session against the stored
                            // MqttOptions, rather than tearing down and re-resolving.
                            tokio::time::sleep(Duration::from_millis(engine.config.broker.reconnect_delay_ms)).await;
                        }
                        consecutive_failures += 1;
                    }
                }
            }

            _ = monitor_tick.tick() => {
                if engine.flags.broker_connected.is_set() && Instant::now() >= next_stall_check {
                    let sent = engine.counters.messages_sent.load(Ordering::Relaxed);
                    if sent == last_publish_count && engine.backlog_count() > 0 {
                        warn!("broker stall detected: no acknowledgements with a non-empty backlog");
                        force_recreate = true;
                        engine.flags.broker_connected.clear();
                        engine.flags.refresh_system_ready();
                        engine.counters.reset_failures();
                        session = None;
                        awaiting_pkid.clear();
                    }
                    last_publish_count = sent;
                    next_stall_check = Instant::now() + STALL_CHECK_INTERVAL;
                }
            }
        }
    }
}

fn broker_host(uri: &str) -> String {
    parse_broker_uri(uri).map(|(h, _)| h).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port_from_uri() {
        let (host, port) = parse_broker_uri("mqtt://broker.example.com:1883").unwrap();
        assert_eq!(host, "broker.example.com");
        assert_eq!(port, 1883);
    }

    #[test]
    fn rejects_uri_without_port() {
        assert!(parse_broker_uri("mqtt://broker.example.com").is_err());
    }
}
