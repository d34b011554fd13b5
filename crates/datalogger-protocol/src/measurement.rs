use serde::{Deserialize, Serialize};

/// Lower sanity bound for wall-clock timestamps: 2024-01-01T00:00:00Z.
pub const SANITY_EPOCH_MIN: u32 = 1_704_067_200;
/// Upper sanity bound for wall-clock timestamps: 2030-01-01T00:00:00Z.
pub const SANITY_EPOCH_MAX: u32 = 1_893_456_000;

/// A single temperature/humidity reading, stamped with an ID and a timestamp.
///
/// Immutable once produced. `timestamp` is epoch seconds when the sampler had
/// synced wall-clock time at the moment of capture, otherwise seconds-since-boot;
/// see [`crate::ring::normalize_timestamp`] for the post-hoc correction applied
/// when a boot-relative reading is later flushed from the backlog.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub measurement_id: u32,
    pub timestamp: u32,
    pub sensor_id: SensorId,
    pub mac_address: [u8; 6],
    pub temperature: f32,
    pub humidity: f32,
    /// Reserved; unused by the delivery engine.
    pub retry_count: u8,
}

/// Fixed-capacity sensor identifier, mirroring the original firmware's
/// `char sensor_id[16]` field. Longer identifiers are truncated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorId([u8; 16]);

impl SensorId {
    pub const CAPACITY: usize = 16;

    pub fn new(s: &str) -> Self {
        let mut buf = [0u8; Self::CAPACITY];
        let bytes = s.as_bytes();
        let n = bytes.len().min(Self::CAPACITY);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(Self::CAPACITY);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }

    pub fn raw(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn from_raw(raw: [u8; 16]) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Measurement {
    /// Whether `timestamp` falls within the sampler's wall-clock sanity window.
    pub fn timestamp_is_sane(&self) -> bool {
        self.timestamp > SANITY_EPOCH_MIN && self.timestamp < SANITY_EPOCH_MAX
    }

    /// Render the MAC address as `aa:bb:cc:dd:ee:ff`.
    pub fn mac_string(&self) -> String {
        let m = self.mac_address;
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }

    /// Build the fixed-key-order, two-decimal-float JSON payload sent on the
    /// data topic. Hand-built rather than via `serde_json::to_string` so the
    /// key order and float formatting exactly match the wire contract.
    pub fn to_publish_json(&self, client_id: &str) -> String {
        format!(
            "{{\"client_id\":\"{}\",\"sensor_id\":\"{}\",\"mac\":\"{}\",\"timestamp\":{},\"temperature\":{:.2},\"humidity\":{:.2},\"measurement_id\":{}}}",
            client_id,
            self.sensor_id.as_str(),
            self.mac_string(),
            self.timestamp,
            self.temperature,
            self.humidity,
            self.measurement_id,
        )
    }

    /// Build the smaller status block returned by `GET /data` and embedded in
    /// `GET /status`.
    pub fn to_status_json(&self) -> String {
        format!(
            "{{\"sensor_id\":\"{}\",\"timestamp\":{},\"temperature\":{:.1},\"humidity\":{:.1}}}",
            self.sensor_id.as_str(),
            self.timestamp,
            self.temperature,
            self.humidity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Measurement {
        Measurement {
            measurement_id: 42,
            timestamp: 1_700_000_000,
            sensor_id: SensorId::new("dht22-01"),
            mac_address: [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
            temperature: 23.449,
            humidity: 55.1,
            retry_count: 0,
        }
    }

    #[test]
    fn publish_json_matches_fixed_key_order_and_precision() {
        let m = sample();
        let json = m.to_publish_json("dl_abc123_5f50e3c0_1a2b");
        assert_eq!(
            json,
            "{\"client_id\":\"dl_abc123_5f50e3c0_1a2b\",\"sensor_id\":\"dht22-01\",\"mac\":\"aa:bb:cc:dd:ee:ff\",\"timestamp\":1700000000,\"temperature\":23.45,\"humidity\":55.10,\"measurement_id\":42}"
        );
    }

    #[test]
    fn sensor_id_truncates_to_capacity() {
        let long = "a".repeat(40);
        let id = SensorId::new(&long);
        assert_eq!(id.as_str().len(), SensorId::CAPACITY);
    }

    #[test]
    fn timestamp_sanity_window() {
        let mut m = sample();
        m.timestamp = SANITY_EPOCH_MIN - 1;
        assert!(!m.timestamp_is_sane());
        m.timestamp = SANITY_EPOCH_MIN + 1;
        assert!(m.timestamp_is_sane());
        m.timestamp = SANITY_EPOCH_MAX;
        assert!(!m.timestamp_is_sane());
    }
}
