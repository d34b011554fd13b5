/// Durable on-disk ring buffer backlog.
///
/// Two flat files back the backlog: a record file of `N` fixed-size slots and
/// an index file holding `{head, tail, count, total_written}`. All operations
/// are serialized through a single `std::sync::Mutex` — the critical sections
/// are plain synchronous file I/O with no `.await` inside them, so a blocking
/// mutex is the right tool rather than an async one.
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{DataloggerError, Result};
use crate::measurement::{Measurement, SensorId};

/// On-disk record schema version. Bumping this is the forward-compatibility
/// seam the original raw-struct format lacked (see DESIGN.md open question b).
const RECORD_SCHEMA_VERSION: u8 = 1;

/// `version(1) + ts(4) + sensor_id(16) + mac(6) + temp(4) + hum(4) + retry(1) + id(4)`
const RECORD_SIZE: usize = 1 + 4 + 16 + 6 + 4 + 4 + 1 + 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingIndex {
    pub head: u32,
    pub tail: u32,
    pub count: u32,
    pub total_written: u32,
}

impl RingIndex {
    fn is_valid(&self, capacity: u32) -> bool {
        self.count <= capacity && self.head < capacity && self.tail < capacity
    }

    fn to_bytes(self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[0..4].copy_from_slice(&self.head.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.tail.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.count.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.total_written.to_ne_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; 16]) -> Self {
        Self {
            head: u32::from_ne_bytes(buf[0..4].try_into().unwrap()),
            tail: u32::from_ne_bytes(buf[4..8].try_into().unwrap()),
            count: u32::from_ne_bytes(buf[8..12].try_into().unwrap()),
            total_written: u32::from_ne_bytes(buf[12..16].try_into().unwrap()),
        }
    }
}

fn encode_record(m: &Measurement) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];
    let mut off = 0;
    buf[off] = RECORD_SCHEMA_VERSION;
    off += 1;
    buf[off..off + 4].copy_from_slice(&m.timestamp.to_ne_bytes());
    off += 4;
    buf[off..off + 16].copy_from_slice(m.sensor_id.raw());
    off += 16;
    buf[off..off + 6].copy_from_slice(&m.mac_address);
    off += 6;
    buf[off..off + 4].copy_from_slice(&m.temperature.to_ne_bytes());
    off += 4;
    buf[off..off + 4].copy_from_slice(&m.humidity.to_ne_bytes());
    off += 4;
    buf[off] = m.retry_count;
    off += 1;
    buf[off..off + 4].copy_from_slice(&m.measurement_id.to_ne_bytes());
    buf
}

fn decode_record(buf: &[u8; RECORD_SIZE]) -> Result<Measurement> {
    let mut off = 0;
    let version = buf[off];
    off += 1;
    if version != RECORD_SCHEMA_VERSION {
        return Err(DataloggerError::RingCorrupt(format!(
            "unknown record schema version {version}"
        )));
    }
    let timestamp = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
    off += 4;
    let mut sensor_raw = [0u8; 16];
    sensor_raw.copy_from_slice(&buf[off..off + 16]);
    off += 16;
    let mut mac_address = [0u8; 6];
    mac_address.copy_from_slice(&buf[off..off + 6]);
    off += 6;
    let temperature = f32::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
    off += 4;
    let humidity = f32::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
    off += 4;
    let retry_count = buf[off];
    off += 1;
    let measurement_id = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap());

    Ok(Measurement {
        measurement_id,
        timestamp,
        sensor_id: SensorId::from_raw(sensor_raw),
        mac_address,
        temperature,
        humidity,
        retry_count,
    })
}

/// Replace a boot-relative timestamp with an epoch timestamp, now that
/// wall-clock time is known. `now_epoch` and `current_uptime_secs` are sampled
/// together by the caller at the moment of normalization.
///
/// Mirrors the original firmware's two-branch heuristic: a stored timestamp is
/// treated as "looked like uptime" only if it is still within 60s of what the
/// current uptime would have been when it was stored. Applying the rule twice
/// is a no-op because the second pass sees an epoch-range timestamp, which
/// fails the uptime-likeness check.
///
/// The original also handles a millisecond-uptime variant, for a second
/// uptime clock source at finer resolution. `Measurement::timestamp` here is
/// `u32` seconds everywhere it is produced (`sampler.rs::current_timestamp`)
/// and everywhere it is stored (this module's on-disk record), with no
/// millisecond-resolution counterpart anywhere in the struct or wire format,
/// so there is no value this function could ever see that would need the
/// ms-uptime branch — it would be unreachable dead code in this engine.
pub fn normalize_timestamp(stored_ts: u32, now_epoch: u32, current_uptime_secs: u32) -> u32 {
    let looks_like_uptime_seconds = stored_ts <= current_uptime_secs.saturating_add(60);
    if looks_like_uptime_seconds {
        now_epoch.saturating_sub(current_uptime_secs.saturating_sub(stored_ts))
    } else {
        stored_ts
    }
}

pub struct RingBuffer {
    capacity: u32,
    record_path: PathBuf,
    index_path: PathBuf,
    inner: Mutex<RingState>,
}

struct RingState {
    record_file: File,
    index_file: File,
    index: RingIndex,
}

impl RingBuffer {
    /// Open (or create) the backlog under `dir`, recovering the index per
    /// §4.5's boot-recovery rule: a missing or out-of-range index resets to
    /// zero rather than failing.
    pub fn open(dir: &Path, capacity: u32) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let record_path = dir.join("backlog.records");
        let index_path = dir.join("backlog.index");

        let record_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&record_path)?;
        let needed = capacity as u64 * RECORD_SIZE as u64;
        record_file.set_len(record_file.metadata()?.len().max(needed))?;

        let mut index_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&index_path)?;

        let index = load_or_reset_index(&mut index_file, capacity)?;

        Ok(Self {
            capacity,
            record_path,
            index_path,
            inner: Mutex::new(RingState {
                record_file,
                index_file,
                index,
            }),
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn count(&self) -> u32 {
        self.inner.lock().unwrap().index.count
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn index_snapshot(&self) -> RingIndex {
        self.inner.lock().unwrap().index
    }

    /// Store a measurement, normalizing its timestamp first. Overwrites the
    /// oldest record (FIFO eviction) when the ring is full.
    pub fn store(&self, measurement: &Measurement, now_epoch: u32, uptime_secs: u32) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        let mut normalized = *measurement;
        normalized.timestamp = normalize_timestamp(measurement.timestamp, now_epoch, uptime_secs);

        let head = state.index.head;
        write_record_at(&mut state.record_file, head, &normalized)?;

        state.index.head = (head + 1) % self.capacity;
        state.index.total_written = state.index.total_written.wrapping_add(1);
        if state.index.count < self.capacity {
            state.index.count += 1;
        } else {
            state.index.tail = (state.index.tail + 1) % self.capacity;
        }
        debug_assert!(state.index.head == (state.index.tail + state.index.count) % self.capacity);
        persist_index(&mut state.index_file, state.index)?;
        Ok(())
    }

    /// Remove and return the oldest record, or `None` if the ring is empty.
    /// A failure to persist the updated index is logged by the caller but
    /// does not undo the removal — the caller already has the record.
    pub fn get_and_remove(&self) -> Result<Option<Measurement>> {
        let mut state = self.inner.lock().unwrap();
        if state.index.count == 0 {
            return Ok(None);
        }
        let tail = state.index.tail;
        let raw = read_record_at(&mut state.record_file, tail)?;
        let measurement = decode_record(&raw)?;

        state.index.tail = (tail + 1) % self.capacity;
        state.index.count -= 1;
        if let Err(e) = persist_index(&mut state.index_file, state.index) {
            tracing::warn!(error = %e, "failed to persist ring index after get-and-remove");
        }
        Ok(Some(measurement))
    }

    /// Re-insert a measurement at the tail after a failed publish attempt.
    /// Refuses when the ring is already full.
    pub fn rollback(&self, measurement: &Measurement) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        if state.index.count == self.capacity {
            return Err(DataloggerError::RingFull);
        }
        let new_tail = (state.index.tail + self.capacity - 1) % self.capacity;
        write_record_at(&mut state.record_file, new_tail, measurement)?;
        state.index.tail = new_tail;
        state.index.count += 1;
        persist_index(&mut state.index_file, state.index)?;
        Ok(())
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }
}

fn load_or_reset_index(index_file: &mut File, capacity: u32) -> Result<RingIndex> {
    let mut buf = [0u8; 16];
    index_file.seek(SeekFrom::Start(0))?;
    let read = index_file.read(&mut buf).unwrap_or(0);
    let index = if read == 16 {
        RingIndex::from_bytes(&buf)
    } else {
        RingIndex::default()
    };

    if read == 16 && index.is_valid(capacity) {
        Ok(index)
    } else {
        let reset = RingIndex::default();
        persist_index(index_file, reset)?;
        Ok(reset)
    }
}

fn persist_index(index_file: &mut File, index: RingIndex) -> Result<()> {
    index_file.seek(SeekFrom::Start(0))?;
    index_file.write_all(&index.to_bytes())?;
    index_file.set_len(16)?;
    index_file.flush()?;
    Ok(())
}

fn write_record_at(record_file: &mut File, slot: u32, measurement: &Measurement) -> Result<()> {
    let bytes = encode_record(measurement);
    record_file.seek(SeekFrom::Start(slot as u64 * RECORD_SIZE as u64))?;
    record_file.write_all(&bytes)?;
    Ok(())
}

fn read_record_at(record_file: &mut File, slot: u32) -> Result<[u8; RECORD_SIZE]> {
    let mut buf = [0u8; RECORD_SIZE];
    record_file.seek(SeekFrom::Start(slot as u64 * RECORD_SIZE as u64))?;
    record_file.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(id: u32) -> Measurement {
        Measurement {
            measurement_id: id,
            timestamp: 1_700_000_000 + id,
            sensor_id: SensorId::new("dht22-01"),
            mac_address: [1, 2, 3, 4, 5, 6],
            temperature: 22.3,
            humidity: 55.0,
            retry_count: 0,
        }
    }

    #[test]
    fn invariant_head_tail_count_after_store() {
        let dir = tempdir().unwrap();
        let ring = RingBuffer::open(dir.path(), 4).unwrap();
        for i in 0..3 {
            ring.store(&sample(i), 1_700_000_000, 10).unwrap();
        }
        let idx = ring.index_snapshot();
        assert_eq!(idx.count, 3);
        assert_eq!(idx.head, (idx.tail + idx.count) % ring.capacity());
    }

    #[test]
    fn store_then_get_and_remove_round_trips() {
        let dir = tempdir().unwrap();
        let ring = RingBuffer::open(dir.path(), 4).unwrap();
        let m = sample(7);
        ring.store(&m, 0, 0).unwrap();
        let got = ring.get_and_remove().unwrap().unwrap();
        assert_eq!(got.measurement_id, m.measurement_id);
        assert_eq!(got.temperature, m.temperature);
        assert!(ring.is_empty());
    }

    #[test]
    fn get_and_remove_then_rollback_restores_state() {
        let dir = tempdir().unwrap();
        let ring = RingBuffer::open(dir.path(), 4).unwrap();
        ring.store(&sample(1), 0, 0).unwrap();
        let before = ring.index_snapshot();
        let got = ring.get_and_remove().unwrap().unwrap();
        ring.rollback(&got).unwrap();
        let after = ring.index_snapshot();
        assert_eq!(before, after);
    }

    #[test]
    fn full_ring_overwrites_oldest() {
        let dir = tempdir().unwrap();
        let ring = RingBuffer::open(dir.path(), 2).unwrap();
        ring.store(&sample(1), 0, 0).unwrap();
        ring.store(&sample(2), 0, 0).unwrap();
        ring.store(&sample(3), 0, 0).unwrap();
        let idx = ring.index_snapshot();
        assert_eq!(idx.count, 2);
        let first_out = ring.get_and_remove().unwrap().unwrap();
        assert_eq!(first_out.measurement_id, 2);
    }

    #[test]
    fn rollback_refuses_when_full() {
        let dir = tempdir().unwrap();
        let ring = RingBuffer::open(dir.path(), 1).unwrap();
        ring.store(&sample(1), 0, 0).unwrap();
        let err = ring.rollback(&sample(2));
        assert!(matches!(err, Err(DataloggerError::RingFull)));
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_timestamp(5, 1_700_000_000, 10);
        let twice = normalize_timestamp(once, 1_700_000_000, 10);
        assert_eq!(once, twice);
    }

    #[test]
    fn boot_recovery_resets_invalid_index() {
        let dir = tempdir().unwrap();
        {
            let ring = RingBuffer::open(dir.path(), 4).unwrap();
            ring.store(&sample(1), 0, 0).unwrap();
        }
        // Corrupt the index file with an out-of-range count.
        std::fs::write(dir.path().join("backlog.index"), [0u8, 0, 0, 0, 0, 0, 0, 0, 99, 0, 0, 0, 0, 0, 0, 0])
            .unwrap();
        let ring = RingBuffer::open(dir.path(), 4).unwrap();
        assert_eq!(ring.count(), 0);
    }
}
