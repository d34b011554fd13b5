/// Tiny persisted key-value store backing the `dns_cache` and `time_cache`
/// namespaces. A single JSON file under the backlog data directory, rewritten
/// wholesale on every `set` — the entry count is a handful of scalars, so a
/// full embedded database (sled, rusqlite) would be disproportionate; see
/// DESIGN.md for the rejected alternatives.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub struct KvStore {
    path: PathBuf,
    inner: Mutex<HashMap<String, Value>>,
}

impl KvStore {
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("state.json");
        let inner = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let map = self.inner.lock().unwrap();
        map.get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> std::io::Result<()> {
        let mut map = self.inner.lock().unwrap();
        map.insert(key.to_string(), serde_json::to_value(value).unwrap());
        self.persist(&map)
    }

    pub fn remove(&self, key: &str) -> std::io::Result<()> {
        let mut map = self.inner.lock().unwrap();
        map.remove(key);
        self.persist(&map)
    }

    fn persist(&self, map: &HashMap<String, Value>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(map).unwrap();
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalogger_protocol::cache::{ResolverCacheEntry, TimeCacheEntry};
    use tempfile::tempdir;

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let kv = KvStore::open(dir.path()).unwrap();
        let entry = ResolverCacheEntry {
            ip: "203.0.113.5".to_string(),
            saved_at_epoch: 1_700_000_000,
        };
        kv.set("dns_cache.broker.example.com", &entry).unwrap();
        let back: ResolverCacheEntry = kv.get("dns_cache.broker.example.com").unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn reopen_preserves_entries_across_instances() {
        let dir = tempdir().unwrap();
        {
            let kv = KvStore::open(dir.path()).unwrap();
            kv.set("time_cache", &TimeCacheEntry { cached_epoch: 1_700_000_500 })
                .unwrap();
        }
        let kv = KvStore::open(dir.path()).unwrap();
        let back: TimeCacheEntry = kv.get("time_cache").unwrap();
        assert_eq!(back.cached_epoch, 1_700_000_500);
    }

    #[test]
    fn missing_key_returns_none() {
        let dir = tempdir().unwrap();
        let kv = KvStore::open(dir.path()).unwrap();
        assert!(kv.get::<TimeCacheEntry>("time_cache").is_none());
    }
}
