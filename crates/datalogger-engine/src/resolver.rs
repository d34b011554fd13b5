/// Broker hostname resolution: cache-first, system-resolver-second,
/// fixed fallback-server list third.
///
/// Mirrors `test_dns_resolution()`: one attempt against the system resolver,
/// then each fallback server in the configured fixed order, each given a
/// short window before moving to the next, restoring nothing afterward since
/// a fresh resolver instance is built per attempt rather than a shared one
/// mutated in place.
use std::net::IpAddr;
use std::time::Duration;

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use datalogger_protocol::cache::ResolverCacheEntry;

use crate::engine::Engine;

const FALLBACK_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(1_500);

fn cache_key(host: &str) -> String {
    format!("dns_cache.{host}")
}

/// Resolve `host`, consulting and updating the durable cache.
pub async fn resolve(engine: &Engine, host: &str, now_epoch: u32) -> anyhow::Result<IpAddr> {
    let key = cache_key(host);

    if let Some(entry) = engine.kv.get::<ResolverCacheEntry>(&key) {
        if entry.is_fresh(now_epoch, engine.config.dns.cache_ttl_secs) {
            if let Ok(ip) = entry.ip.parse::<IpAddr>() {
                debug!(host, ip = %ip, "resolved from durable cache");
                return Ok(ip);
            }
        }
    }

    let ip = resolve_live(host, &engine.config.dns.fallback_servers).await?;

    let entry = ResolverCacheEntry {
        ip: ip.to_string(),
        saved_at_epoch: now_epoch,
    };
    if let Err(e) = engine.kv.set(&key, &entry) {
        warn!(error = %e, "failed to persist resolved address");
    }
    Ok(ip)
}

/// Drop the cached address for `host`, forcing re-resolution on next use.
/// Called by the broker supervisor's escalating-recovery ladder.
pub fn clear_cache(engine: &Engine, host: &str) {
    if let Err(e) = engine.kv.remove(&cache_key(host)) {
        warn!(error = %e, "failed to clear dns cache entry");
    }
}

async fn resolve_live(host: &str, fallback_servers: &[String]) -> anyhow::Result<IpAddr> {
    if let Ok(resolver) = TokioAsyncResolver::tokio_from_system_conf() {
        if let Ok(response) = resolver.lookup_ip(host).await {
            if let Some(ip) = response.iter().next() {
                debug!(host, ip = %ip, "resolved via system resolver");
                return Ok(ip);
            }
        }
    }
    warn!(host, "system resolver failed, trying fallback servers");

    for server in fallback_servers {
        let Ok(addr) = server.parse::<IpAddr>() else {
            continue;
        };
        let config = ResolverConfig::from_parts(
            None,
            vec![],
            NameServerConfigGroup::from_ips_clear(&[addr], 53, true),
        );
        let resolver = TokioAsyncResolver::tokio(config, ResolverOpts::default());
        match tokio::time::timeout(FALLBACK_ATTEMPT_TIMEOUT, resolver.lookup_ip(host)).await {
            Ok(Ok(response)) => {
                if let Some(ip) = response.iter().next() {
                    debug!(host, server, ip = %ip, "resolved via fallback server");
                    return Ok(ip);
                }
            }
            Ok(Err(e)) => warn!(server, error = %e, "fallback server lookup failed"),
            Err(_) => warn!(server, "fallback server lookup timed out"),
        }
    }

    anyhow::bail!("name resolution failed for {host} against all fallback servers")
}

/// Generic TCP-connect reachability probe, used both before trusting a
/// cached resolved address for a reconnect attempt and by the link
/// supervisor's own connectivity check.
pub async fn probe_reachable(target: &str, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, TcpStream::connect(target))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_namespaced_per_host() {
        assert_eq!(cache_key("broker.example.com"), "dns_cache.broker.example.com");
    }
}
