/// Engine configuration, loaded from a TOML file named by `--config`
/// (default `config/datalogger.toml`). Every field carries a default
/// matching the original firmware's `config.h` constants; a missing config
/// file is not fatal, mirroring the teacher daemon's "fall back to defaults"
/// startup behavior.
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub link: LinkSection,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub sampler: SamplerSection,
    #[serde(default)]
    pub backlog: BacklogSection,
    #[serde(default)]
    pub dns: DnsSection,
    #[serde(default)]
    pub ntp: NtpSection,
    #[serde(default)]
    pub http: HttpSection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            link: LinkSection::default(),
            broker: BrokerSection::default(),
            sampler: SamplerSection::default(),
            backlog: BacklogSection::default(),
            dns: DnsSection::default(),
            ntp: NtpSection::default(),
            http: HttpSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkSection {
    /// Host:port probed to determine link reachability (the hosted analog
    /// of "WiFi connected" — see DESIGN.md for the substitution rationale).
    #[serde(default = "default_probe_target")]
    pub probe_target: String,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            probe_target: default_probe_target(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            max_failed_attempts: default_max_failed_attempts(),
        }
    }
}

fn default_probe_target() -> String {
    "8.8.8.8:53".to_string()
}
fn default_reconnect_initial_ms() -> u64 {
    5_000
}
fn default_reconnect_max_ms() -> u64 {
    300_000
}
fn default_max_failed_attempts() -> u32 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSection {
    #[serde(default = "default_broker_uri")]
    pub uri: String,
    #[serde(default = "default_data_topic")]
    pub data_topic: String,
    #[serde(default = "default_status_topic")]
    pub status_topic: String,
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_message_delay_ms")]
    pub message_delay_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            uri: default_broker_uri(),
            data_topic: default_data_topic(),
            status_topic: default_status_topic(),
            client_id_prefix: default_client_id_prefix(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            message_delay_ms: default_message_delay_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            keepalive_secs: default_keepalive_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            max_pending: default_max_pending(),
        }
    }
}

fn default_broker_uri() -> String {
    "mqtt://broker.example.com:1883".to_string()
}
fn default_data_topic() -> String {
    "sensors/datalogger/data".to_string()
}
fn default_status_topic() -> String {
    "sensors/datalogger/status".to_string()
}
fn default_client_id_prefix() -> String {
    "datalogger".to_string()
}
fn default_batch_size() -> u32 {
    3
}
fn default_batch_delay_ms() -> u64 {
    2_000
}
fn default_message_delay_ms() -> u64 {
    500
}
fn default_reconnect_delay_ms() -> u64 {
    10_000
}
fn default_keepalive_secs() -> u64 {
    20
}
fn default_heartbeat_interval_secs() -> u64 {
    10
}
fn default_max_pending() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerSection {
    #[serde(default = "default_sensor_id")]
    pub sensor_id: String,
    #[serde(default = "default_measurement_interval_ms")]
    pub measurement_interval_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Store timestamps in local time instead of UTC. The original firmware
    /// hardcoded this at compile time (`USE_LOCAL_TIMESTAMP` in `config.h`);
    /// here it is a runtime switch, off by default (recommended).
    #[serde(default = "default_use_local_timestamp")]
    pub use_local_timestamp: bool,
    /// Fixed UTC offset applied when `use_local_timestamp` is set. Default
    /// matches the original's GMT-3 deployment.
    #[serde(default = "default_local_timezone_offset_secs")]
    pub local_timezone_offset_secs: i32,
}

impl Default for SamplerSection {
    fn default() -> Self {
        Self {
            sensor_id: default_sensor_id(),
            measurement_interval_ms: default_measurement_interval_ms(),
            queue_capacity: default_queue_capacity(),
            use_local_timestamp: default_use_local_timestamp(),
            local_timezone_offset_secs: default_local_timezone_offset_secs(),
        }
    }
}

fn default_sensor_id() -> String {
    "dht22-01".to_string()
}
fn default_measurement_interval_ms() -> u64 {
    30_000
}
fn default_queue_capacity() -> usize {
    20
}
fn default_use_local_timestamp() -> bool {
    false
}
fn default_local_timezone_offset_secs() -> i32 {
    -10_800
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacklogSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: u32,
}

impl Default for BacklogSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ring_capacity: default_ring_capacity(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_ring_capacity() -> u32 {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsSection {
    #[serde(default = "default_fallback_servers")]
    pub fallback_servers: Vec<String>,
    #[serde(default = "default_dns_cache_ttl_secs")]
    pub cache_ttl_secs: u32,
    #[serde(default = "default_reachability_timeout_ms")]
    pub reachability_timeout_ms: u64,
}

impl Default for DnsSection {
    fn default() -> Self {
        Self {
            fallback_servers: default_fallback_servers(),
            cache_ttl_secs: default_dns_cache_ttl_secs(),
            reachability_timeout_ms: default_reachability_timeout_ms(),
        }
    }
}

fn default_fallback_servers() -> Vec<String> {
    vec![
        "8.8.8.8".to_string(),
        "8.8.4.4".to_string(),
        "1.1.1.1".to_string(),
        "208.67.222.222".to_string(),
    ]
}
fn default_dns_cache_ttl_secs() -> u32 {
    86_400
}
fn default_reachability_timeout_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct NtpSection {
    #[serde(default = "default_ntp_servers")]
    pub servers: Vec<String>,
    #[serde(default = "default_ntp_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_ntp_fast_sync_interval_secs")]
    pub fast_sync_interval_secs: u64,
    #[serde(default = "default_ntp_resync_threshold_secs")]
    pub resync_threshold_secs: u64,
    #[serde(default = "default_ntp_cache_max_age_secs")]
    pub cache_max_age_secs: u32,
}

impl Default for NtpSection {
    fn default() -> Self {
        Self {
            servers: default_ntp_servers(),
            sync_interval_secs: default_ntp_sync_interval_secs(),
            fast_sync_interval_secs: default_ntp_fast_sync_interval_secs(),
            resync_threshold_secs: default_ntp_resync_threshold_secs(),
            cache_max_age_secs: default_ntp_cache_max_age_secs(),
        }
    }
}

fn default_ntp_servers() -> Vec<String> {
    vec![
        "a.st1.ntp.br".to_string(),
        "b.st1.ntp.br".to_string(),
        "c.st1.ntp.br".to_string(),
    ]
}
fn default_ntp_sync_interval_secs() -> u64 {
    3_600
}
fn default_ntp_fast_sync_interval_secs() -> u64 {
    300
}
fn default_ntp_resync_threshold_secs() -> u64 {
    86_400
}
fn default_ntp_cache_max_age_secs() -> u32 {
    7_200
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_http_bind")]
    pub bind: String,
    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,
    #[serde(default = "default_status_dump_enabled")]
    pub status_dump_enabled: bool,
    #[serde(default = "default_status_dump_interval_ms")]
    pub status_dump_interval_ms: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            bind: default_http_bind(),
            firmware_version: default_firmware_version(),
            status_dump_enabled: default_status_dump_enabled(),
            status_dump_interval_ms: default_status_dump_interval_ms(),
        }
    }
}

fn default_http_bind() -> String {
    format!("0.0.0.0:{}", datalogger_protocol::DEFAULT_HTTP_PORT)
}
fn default_firmware_version() -> String {
    format!("datalogger-1.0.0+{}", datalogger_protocol::GIT_HASH)
}
fn default_status_dump_enabled() -> bool {
    false
}
fn default_status_dump_interval_ms() -> u64 {
    180_000
}
