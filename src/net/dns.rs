//! Host name resolution with a process-wide cache.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

/// Resolves host names to addresses, in connection-attempt order.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the system lookup, caching every successful answer.
///
/// Lookups run outside any lock; the insert is checked again under the map
/// entry so concurrent misses agree on a single answer.
#[derive(Debug, Default)]
pub struct CachingResolver {
    cache: DashMap<String, Arc<[IpAddr]>>,
}

impl CachingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_hosts(&self) -> usize {
        self.cache.len()
    }

    async fn lookup(host: &str) -> io::Result<Vec<IpAddr>> {
        let mut addresses: Vec<IpAddr> = Vec::new();
        for addr in tokio::net::lookup_host((host, 0)).await? {
            if !addresses.contains(&addr.ip()) {
                addresses.push(addr.ip());
            }
        }
        if addresses.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {host}"),
            ));
        }
        Ok(addresses)
    }
}

#[async_trait]
impl Resolve for CachingResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let key = host.to_ascii_lowercase();
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.to_vec());
        }

        let resolved: Arc<[IpAddr]> = Self::lookup(host).await?.into();
        let entry = self.cache.entry(key).or_insert(resolved);
        tracing::debug!(host, addresses = entry.len(), "Resolved host");
        Ok(entry.to_vec())
    }
}
