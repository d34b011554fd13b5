/// Sampler: produces one measurement per `measurement_interval_ms` tick and
/// enqueues it for the publisher.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use datalogger_protocol::flags::FlagExt;
use datalogger_protocol::measurement::{Measurement, SensorId};

use crate::engine::Engine;
use crate::health::TaskPulse;

const NTP_WAIT_TIMEOUT: Duration = Duration::from_secs(15);
const ENQUEUE_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Collaborator boundary for the physical sensor. The production driver is
/// out of scope for this engine; `SyntheticSensor` always misses so the
/// pseudo-random fallback path below runs deterministically.
pub trait SensorSource: Send + Sync {
    fn read(&self) -> Result<(f32, f32), ()>;
}

pub struct SyntheticSensor;

impl SensorSource for SyntheticSensor {
    fn read(&self) -> Result<(f32, f32), ()> {
        Err(())
    }
}

fn fallback_reading() -> (f32, f32) {
    let mut rng = rand::thread_rng();
    let temperature = 20.0 + rng.gen_range(0..100) as f32 / 10.0;
    let humidity = 40.0 + rng.gen_range(0..400) as f32 / 10.0;
    (temperature, humidity)
}

fn current_timestamp(engine: &Engine) -> u32 {
    let wall_clock = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32;
    let candidate = Measurement {
        measurement_id: 0,
        timestamp: wall_clock,
        sensor_id: SensorId::new(""),
        mac_address: [0; 6],
        temperature: 0.0,
        humidity: 0.0,
        retry_count: 0,
    };
    if engine.flags.time_synced.is_set() && candidate.timestamp_is_sane() {
        if engine.config.sampler.use_local_timestamp {
            wall_clock.wrapping_add_signed(engine.config.sampler.local_timezone_offset_secs)
        } else {
            wall_clock
        }
    } else {
        engine.start_time.elapsed().as_secs() as u32
    }
}

pub async fn run(
    engine: Arc<Engine>,
    sensor: Arc<dyn SensorSource>,
    tx: Sender<Measurement>,
    pulse: TaskPulse,
    cancel: CancellationToken,
) {
    let deadline = tokio::time::Instant::now() + NTP_WAIT_TIMEOUT;
    loop {
        if engine.flags.time_synced.is_set() {
            info!("sampler starting with synchronized time");
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("sampler starting without synchronized time, using uptime timestamps");
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let sensor_id = SensorId::new(&engine.config.sampler.sensor_id);
    let interval = Duration::from_millis(engine.config.sampler.measurement_interval_ms);
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        pulse.tick();
        if cancel.is_cancelled() {
            return;
        }

        let (temperature, humidity) = match sensor.read() {
            Ok(reading) => reading,
            Err(()) => fallback_reading(),
        };

        let measurement_id = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        let measurement = Measurement {
            measurement_id,
            timestamp: current_timestamp(&engine),
            sensor_id,
            mac_address: engine.mac_address,
            temperature,
            humidity,
            retry_count: 0,
        };

        match tokio::time::timeout(ENQUEUE_TIMEOUT, tx.send(measurement)).await {
            Ok(Ok(())) => {
                debug!(measurement_id, "measurement enqueued");
                *engine.last_measurement.write().await = Some(measurement);
            }
            Ok(Err(_)) => warn!("measurement queue closed, dropping reading"),
            Err(_) => warn!(measurement_id, "measurement queue full, dropping reading"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_sensor_always_misses() {
        assert!(SyntheticSensor.read().is_err());
    }

    #[test]
    fn fallback_reading_stays_within_plausible_bounds() {
        for _ in 0..50 {
            let (t, h) = fallback_reading();
            assert!((20.0..30.0).contains(&t));
            assert!((40.0..80.0).contains(&h));
        }
    }
}
