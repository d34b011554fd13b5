#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

mod broker;
mod client_id;
mod config;
mod engine;
mod health;
mod http_server;
mod kv_store;
mod link;
mod publisher;
mod resolver;
mod sampler;
mod status_dump;
mod time_client;
mod watchdog;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use datalogger_protocol::flags::EventFlags;
use datalogger_protocol::pending::PendingTable;
use datalogger_protocol::ring::RingBuffer;
use datalogger_protocol::throttle::Throttle;

use crate::broker::BrokerMessage;
use crate::config::EngineConfig;
use crate::engine::{Counters, Engine};
use crate::health::{task_pulse, HealthCollector};
use crate::sampler::SyntheticSensor;

#[derive(Parser, Debug)]
#[command(name = "datalogger-engine", about = "Environmental datalogger delivery engine")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/datalogger.toml")]
    config: PathBuf,
}

/// Derive a stable pseudo hardware address for this process. There is no
/// network interface to read a real MAC from on a hosted target, so the
/// low 6 bytes of a persisted random seed stand in for it (see DESIGN.md).
fn derive_mac_address(kv: &kv_store::KvStore) -> [u8; 6] {
    const KEY: &str = "mac_address";
    if let Some(existing) = kv.get::<[u8; 6]>(KEY) {
        return existing;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let pid = std::process::id();
    let mut mac = [0u8; 6];
    mac[0] = 0x02; // locally administered, unicast
    mac[1] = (pid >> 8) as u8;
    mac[2] = pid as u8;
    mac[3] = (nanos >> 16) as u8;
    mac[4] = (nanos >> 8) as u8;
    mac[5] = nanos as u8;
    if let Err(e) = kv.set(KEY, &mac) {
        warn!(error = %e, "failed to persist generated mac address");
    }
    mac
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config: EngineConfig = if args.config.exists() {
        let config_str = tokio::fs::read_to_string(&args.config).await?;
        toml::from_str(&config_str)?
    } else {
        info!(path = %args.config.display(), "no config file found, using defaults");
        EngineConfig::default()
    };

    let kv = kv_store::KvStore::open(&config.backlog.data_dir)?;
    let mac_address = derive_mac_address(&kv);
    let client_id = client_id::generate(&config.broker.client_id_prefix, &mac_address);

    let ring = RingBuffer::open(&config.backlog.data_dir, config.backlog.ring_capacity)?;
    let pending = AsyncMutex::new(PendingTable::new(config.broker.max_pending));
    let throttle = AsyncMutex::new(Throttle::new(
        config.broker.batch_size,
        Duration::from_millis(config.broker.batch_delay_ms),
    ));

    let health = Arc::new(HealthCollector::new());

    let (link_pulse, link_monitor) = task_pulse("link");
    let (time_pulse, time_monitor) = task_pulse("time_client");
    let (sampler_pulse, sampler_monitor) = task_pulse("sampler");
    let (publisher_pulse, publisher_monitor) = task_pulse("publisher");
    let (broker_pulse, broker_monitor) = task_pulse("broker");

    health.register_monitor(link_monitor);
    health.register_monitor(time_monitor);
    health.register_monitor(sampler_monitor);
    health.register_monitor(publisher_monitor);
    health.register_monitor(broker_monitor);

    let sampler_queue_capacity = config.sampler.queue_capacity;
    let broker_channel_capacity = config.broker.max_pending.max(1) * 2;

    let engine = Arc::new(Engine {
        config,
        client_id,
        mac_address,
        flags: EventFlags::new(),
        ring,
        pending,
        throttle,
        kv,
        counters: Counters::default(),
        last_measurement: RwLock::new(None),
        health: Arc::clone(&health),
        start_time: std::time::Instant::now(),
    });

    info!(client_id = %engine.client_id, "datalogger engine starting");

    let cancel = CancellationToken::new();

    let (measurement_tx, measurement_rx) = mpsc::channel(sampler_queue_capacity);
    let (broker_tx, broker_rx) = mpsc::channel::<BrokerMessage>(broker_channel_capacity);

    let link_handle = {
        let engine = Arc::clone(&engine);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = link::run(engine, link_pulse, cancel.clone()) => {}
                _ = cancel.cancelled() => {}
            }
        })
    };

    let time_handle = {
        let engine = Arc::clone(&engine);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = time_client::run(engine, time_pulse, cancel.clone()) => {}
                _ = cancel.cancelled() => {}
            }
        })
    };

    let sampler_handle = {
        let engine = Arc::clone(&engine);
        let cancel = cancel.clone();
        let sensor = Arc::new(SyntheticSensor);
        tokio::spawn(async move {
            tokio::select! {
                _ = sampler::run(engine, sensor, measurement_tx, sampler_pulse, cancel.clone()) => {}
                _ = cancel.cancelled() => {}
            }
        })
    };

    let publisher_handle = {
        let engine = Arc::clone(&engine);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = publisher::run(engine, measurement_rx, broker_tx, publisher_pulse, cancel.clone()) => {}
                _ = cancel.cancelled() => {}
            }
        })
    };

    let broker_handle = {
        let engine = Arc::clone(&engine);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = broker::run(engine, broker_rx, broker_pulse, cancel.clone()) => {}
                _ = cancel.cancelled() => {}
            }
        })
    };

    let http_handle = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            http_server::run(engine).await;
        })
    };

    let status_dump_handle = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            status_dump::run(engine).await;
        })
    };

    let watchdog_handle = {
        let health = Arc::clone(&health);
        tokio::spawn(async move {
            watchdog::run(health).await;
        })
    };

    info!("delivery engine running");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    cancel.cancel();

    link_handle.abort();
    time_handle.abort();
    sampler_handle.abort();
    publisher_handle.abort();
    broker_handle.abort();
    http_handle.abort();
    status_dump_handle.abort();
    watchdog_handle.abort();

    Ok(())
}
