// Per-interface DNS resolution.
//
// Queries only the name servers learned on one port and binds the query
// socket to that port's address, so an answer can never arrive through a
// different network.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use hickory_resolver::TokioResolver;
use hickory_resolver::config::{LookupIpStrategy, NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use tracing::trace;

use crate::error::Error;

const DNS_PORT: u16 = 53;

pub trait HostResolver: Send + Sync {
    /// Resolve `host` from `source` using only `servers`.
    fn lookup(
        &self,
        host: &str,
        source: IpAddr,
        servers: &[IpAddr],
    ) -> impl Future<Output = Result<Vec<IpAddr>, Error>> + Send;
}

/// hickory-backed [`HostResolver`]; builds a throwaway resolver per lookup.
#[derive(Debug, Clone)]
pub struct InterfaceResolver {
    timeout: Duration,
}

impl InterfaceResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for InterfaceResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl HostResolver for InterfaceResolver {
    async fn lookup(
        &self,
        host: &str,
        source: IpAddr,
        servers: &[IpAddr],
    ) -> Result<Vec<IpAddr>, Error> {
        let mut config = ResolverConfig::new();
        let mut added = 0usize;
        for server in servers.iter().filter(|s| s.is_ipv4() == source.is_ipv4()) {
            let mut ns = NameServerConfig::new(SocketAddr::new(*server, DNS_PORT), Protocol::Udp);
            ns.bind_addr = Some(SocketAddr::new(source, 0));
            config.add_name_server(ns);
            added += 1;
        }
        if added == 0 {
            return Err(Error::Resolve {
                host: host.to_owned(),
                message: format!("no DNS server usable from source {source}"),
            });
        }

        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = 2;
        opts.cache_size = 0;
        opts.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;

        let mut builder =
            TokioResolver::builder_with_config(config, TokioConnectionProvider::default());
        *builder.options_mut() = opts;
        let resolver = builder.build();

        trace!(host, %source, servers = added, "resolving");
        let lookup = resolver.lookup_ip(host).await.map_err(|e| Error::Resolve {
            host: host.to_owned(),
            message: e.to_string(),
        })?;
        Ok(lookup.iter().collect())
    }
}
