use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{Resolver, TokioResolver};
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Timeout for the system resolver
const PRIMARY_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for the public fallback resolver
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(3);

/// Name resolution used by a session
pub trait Resolve: Send + Sync + 'static {
    /// Forward lookup of the session target
    fn lookup_host(&self, host: &str) -> impl Future<Output = Option<IpAddr>> + Send;

    /// Reverse lookup of a hop address
    fn reverse_lookup(&self, ip: IpAddr) -> impl Future<Output = Option<String>> + Send;
}

/// DNS cache entry
struct CacheEntry {
    hostname: Option<String>,
    cached_at: Instant,
}

/// DNS lookups through the system resolver, falling back to Google public DNS
pub struct DnsLookup {
    primary: TokioResolver,
    fallback: TokioResolver,
    cache: RwLock<HashMap<IpAddr, CacheEntry>>,
    cache_ttl: Duration,
}

impl DnsLookup {
    pub fn new() -> Self {
        let fallback = Resolver::builder_with_config(
            ResolverConfig::google(),
            TokioConnectionProvider::default(),
        )
        .build();

        // Without a usable system config both paths go to the public resolver
        let primary = match Resolver::builder_tokio() {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!("System DNS config unavailable ({}), using Google DNS", e);
                fallback.clone()
            }
        };

        Self {
            primary,
            fallback,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(3600), // 1 hour
        }
    }

    async fn query_ptr(resolver: &TokioResolver, ip: IpAddr, timeout: Duration) -> Option<String> {
        match tokio::time::timeout(timeout, resolver.reverse_lookup(ip)).await {
            Ok(Ok(lookup)) => lookup
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string()),
            Ok(Err(e)) => {
                debug!("reverse lookup for {} failed: {}", ip, e);
                None
            }
            Err(_) => {
                debug!("reverse lookup for {} timed out", ip);
                None
            }
        }
    }

    /// Primary lookup, then the fallback when the primary fails or only
    /// echoes the address back
    async fn resolve_uncached(&self, ip: IpAddr) -> Option<String> {
        let ip_text = ip.to_string();
        if let Some(name) = Self::query_ptr(&self.primary, ip, PRIMARY_TIMEOUT).await
            && name != ip_text
        {
            return Some(name);
        }

        let name = Self::query_ptr(&self.fallback, ip, FALLBACK_TIMEOUT).await?;
        if name == ip_text {
            None
        } else {
            debug!("fallback DNS resolved {} to {}", ip, name);
            Some(name)
        }
    }
}

impl Default for DnsLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolve for DnsLookup {
    fn lookup_host(&self, host: &str) -> impl Future<Output = Option<IpAddr>> + Send {
        let host = host.to_string();
        async move {
            let lookup = tokio::time::timeout(PRIMARY_TIMEOUT, self.primary.lookup_ip(host.as_str()))
                .await
                .ok()?
                .ok()?;
            let addrs: Vec<IpAddr> = lookup.iter().collect();
            // Prefer IPv4 when both families are available
            addrs
                .iter()
                .find(|ip| ip.is_ipv4())
                .or_else(|| addrs.first())
                .copied()
        }
    }

    fn reverse_lookup(&self, ip: IpAddr) -> impl Future<Output = Option<String>> + Send {
        async move {
            // Check cache first
            {
                let cache = self.cache.read();
                if let Some(entry) = cache.get(&ip)
                    && entry.cached_at.elapsed() < self.cache_ttl
                {
                    return entry.hostname.clone();
                }
            }

            let hostname = self.resolve_uncached(ip).await;

            // Cache result
            {
                let mut cache = self.cache.write();
                cache.insert(
                    ip,
                    CacheEntry {
                        hostname: hostname.clone(),
                        cached_at: Instant::now(),
                    },
                );
            }

            hostname
        }
    }
}
