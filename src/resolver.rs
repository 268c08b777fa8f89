//! DNS lookups of the managed hostname.

use crate::config::ResolverSettings;
use crate::error::{DdnsError, Result};
use crate::metrics::{MetricsSink, Op, OpTimer};
use async_trait::async_trait;
use hickory_resolver::{
    config::{NameServerConfig, ResolverConfig},
    name_server::TokioConnectionProvider,
    proto::xfer::Protocol,
    system_conf, TokioResolver,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Resolves a hostname to the address currently published for it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// The first address published for `hostname`.
    async fn resolve(&self, hostname: &str) -> Result<IpAddr>;
}

/// Resolver backed by hickory, configured like the host's stub resolver.
pub struct DnsResolver {
    resolver: TokioResolver,
    metrics: Arc<dyn MetricsSink>,
}

impl DnsResolver {
    /// Build a resolver from the `[resolver]` settings. Without an explicit
    /// nameserver the system configuration (`/etc/resolv.conf`) is used.
    pub fn from_settings(settings: &ResolverSettings, metrics: Arc<dyn MetricsSink>) -> Result<Self> {
        let (config, mut opts) = match &settings.nameserver {
            Some(addr) => {
                let socket_addr: SocketAddr = addr
                    .parse()
                    .map_err(|_| DdnsError::Config(format!("invalid nameserver address: {}", addr)))?;
                let mut config = ResolverConfig::new();
                config.add_name_server(NameServerConfig::new(socket_addr, Protocol::Udp));
                config.add_name_server(NameServerConfig::new(socket_addr, Protocol::Tcp));
                (config, Default::default())
            }
            None => {
                let (config, opts) = system_conf::read_system_conf().map_err(|e| {
                    DdnsError::Config(format!("failed to read system DNS configuration: {}", e))
                })?;
                if config.name_servers().is_empty() {
                    tracing::warn!("No system DNS servers found, falling back to Cloudflare DNS.");
                    (ResolverConfig::cloudflare(), opts)
                } else {
                    (config, opts)
                }
            }
        };

        opts.timeout = Duration::from_millis(settings.timeout_ms);

        let resolver =
            hickory_resolver::Resolver::builder_with_config(config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        Ok(Self { resolver, metrics })
    }

    async fn lookup(&self, hostname: &str) -> Result<Vec<IpAddr>> {
        let lookup = self
            .resolver
            .lookup_ip(hostname)
            .await
            .map_err(|e| DdnsError::Resolve(e.to_string()))?;

        Ok(lookup.iter().collect())
    }
}

#[async_trait]
impl NameResolver for DnsResolver {
    async fn resolve(&self, hostname: &str) -> Result<IpAddr> {
        let timer = OpTimer::start(self.metrics.as_ref(), Op::Resolve, hostname);
        let result = self.lookup(hostname).await.and_then(|ips| first_address(hostname, &ips));
        timer.finish(&result);

        match &result {
            Ok(ip) => {
                self.metrics.op_succeeded(Op::Resolve, hostname, None);
                tracing::debug!("Resolved {} to {}", hostname, ip);
            }
            Err(e) => tracing::error!("Failed to look up {}: {}", hostname, e),
        }

        result
    }
}

/// Pick the address to compare against. Dynamic hosts should publish
/// exactly one; extra answers are tolerated with a warning.
pub fn first_address(hostname: &str, ips: &[IpAddr]) -> Result<IpAddr> {
    match ips {
        [] => Err(DdnsError::Resolve(format!("no addresses found for {}", hostname))),
        [ip] => Ok(*ip),
        [ip, ..] => {
            tracing::warn!(
                ips_found = ips.len(),
                "Too many IPs found for {}, only one expected! Picking {}",
                hostname,
                ip
            );
            Ok(*ip)
        }
    }
}
