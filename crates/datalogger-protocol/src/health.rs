/// Status types served by `GET /status` and logged by the periodic status
/// dump. Structurally modeled on the teacher daemon's health snapshot: one
/// flat, fully-owned struct built fresh on each request rather than cached.
use serde::{Deserialize, Serialize};

use crate::measurement::Measurement;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub firmware_version: String,
    pub sensor_id: String,
    pub mac: String,
    pub link_connected: bool,
    pub broker_connected: bool,
    pub system_state: String,
    pub system_ready: bool,
    pub messages_sent: u64,
    pub publish_attempts: u64,
    pub backlog_count: u32,
    pub consecutive_failures: u32,
    pub uptime_secs: u64,
    pub last_measurement: Option<LastMeasurementBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMeasurementBlock {
    pub timestamp: u32,
    pub temperature: f32,
    pub humidity: f32,
}

impl From<Measurement> for LastMeasurementBlock {
    fn from(m: Measurement) -> Self {
        Self {
            timestamp: m.timestamp,
            temperature: m.temperature,
            humidity: m.humidity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse {
    pub sensor_id: String,
    pub timestamp: u32,
    pub temperature: f32,
    pub humidity: f32,
}

impl From<Measurement> for DataResponse {
    fn from(m: Measurement) -> Self {
        Self {
            sensor_id: m.sensor_id.as_str().to_string(),
            timestamp: m.timestamp,
            temperature: m.temperature,
            humidity: m.humidity,
        }
    }
}
