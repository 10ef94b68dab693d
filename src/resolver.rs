//! Secure Resolver

use std::net::{IpAddr, SocketAddr};

use hickory_resolver::{
    config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts},
    error::ResolveError,
    lookup_ip::LookupIp,
    AsyncResolver,
};

use crate::{
    bootstrap::{parse_host_port, BootstrapAddrs},
    cache::TtlCache,
    dial::Dialer,
    provider::SecureConnectionProvider,
    transport::{HttpsTransport, TlsTransport, Transport, UriTemplate},
    ResolverError, SecureResolveOption, ServerIdentity,
};

pub const DOT_PORT: u16 = 853;

/// Hickory resolver whose every query travels over DoH or DoT.
///
/// Cheap to clone, all clones share the transport, connection pool and cache.
#[derive(Debug, Clone)]
pub struct SecureResolver {
    resolver: AsyncResolver<SecureConnectionProvider>,
    provider: SecureConnectionProvider,
    bootstrap: BootstrapAddrs,
    identity: ServerIdentity,
}

impl SecureResolver {
    /// Builds the resolver, resolving the server's own addresses first.
    ///
    /// Any configuration problem fails here, a returned resolver is usable.
    pub async fn new(
        identity: ServerIdentity,
        option: SecureResolveOption,
    ) -> Result<Self, ResolverError> {
        let dialer = Dialer::new(option.dial.clone());

        let (transport, host, port): (Transport, String, u16) = match identity {
            ServerIdentity::Https { ref uri } => {
                let template = UriTemplate::parse(uri)?;
                let host = template.host().to_owned();
                let port = template.port();
                let transport = HttpsTransport::init(
                    template,
                    option.method,
                    &option.tls,
                    dialer,
                    option.timeout,
                )?;
                (transport.into(), host, port)
            }
            ServerIdentity::Tls { ref server } => {
                let (host, port) = parse_host_port(server, DOT_PORT)?;
                let transport = TlsTransport::init(host, &option.tls, dialer, option.timeout)?;
                (transport.into(), host.to_owned(), port)
            }
        };

        let bootstrap =
            BootstrapAddrs::resolve(&host, port, &option.addresses, option.timeout).await?;

        let cache = option.cache.then(|| TtlCache::new(option.negative_ttl));
        let provider = SecureConnectionProvider::new(transport, cache);

        let (cfg, opt) = resolver_config(&bootstrap, &option);
        let resolver = AsyncResolver::new(cfg, opt, provider.clone());

        log::debug!(
            "secure resolver {:?} via {} using {:?}",
            identity,
            provider.transport().name(),
            bootstrap
        );

        Ok(Self {
            resolver,
            provider,
            bootstrap,
            identity,
        })
    }

    /// DNS over HTTPS against a uri template such as
    /// `https://dns.google/dns-query{?dns}`.
    pub async fn doh<S: Into<String>>(
        uri: S,
        option: SecureResolveOption,
    ) -> Result<Self, ResolverError> {
        Self::new(ServerIdentity::Https { uri: uri.into() }, option).await
    }

    /// DNS over TLS against `host`, `host:port` or an ip literal.
    pub async fn dot<S: Into<String>>(
        server: S,
        option: SecureResolveOption,
    ) -> Result<Self, ResolverError> {
        Self::new(
            ServerIdentity::Tls {
                server: server.into(),
            },
            option,
        )
        .await
    }

    pub async fn lookup_ip(&self, host: &str) -> Result<LookupIp, ResolveError> {
        self.resolver.lookup_ip(host).await
    }

    /// Socket addresses of `host`, ip literals skip the lookup.
    pub async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, ResolveError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }

        let result = self.lookup_ip(host).await?;
        Ok(result.iter().map(|ip| SocketAddr::new(ip, port)).collect())
    }

    /// Full hickory lookup api, routed through the secure transport.
    pub fn resolver(&self) -> &AsyncResolver<SecureConnectionProvider> {
        &self.resolver
    }

    pub fn bootstrap(&self) -> &BootstrapAddrs {
        &self.bootstrap
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn cache(&self) -> Option<&TtlCache> {
        self.provider.cache()
    }
}

/// One name server per bootstrap address. Caching is left to [`TtlCache`].
fn resolver_config(
    bootstrap: &BootstrapAddrs,
    option: &SecureResolveOption,
) -> (ResolverConfig, ResolverOpts) {
    let mut cfg = ResolverConfig::new();
    for addr in bootstrap.iter() {
        cfg.add_name_server(NameServerConfig {
            socket_addr: *addr,
            protocol: Protocol::Tcp,
            tls_dns_name: None,
            trust_negative_responses: true,
            bind_addr: None,
        });
    }

    let mut opt = ResolverOpts::default();
    opt.ip_strategy = option.strategy.into();
    opt.timeout = option.timeout;
    opt.attempts = option.attempts;
    opt.cache_size = 0;
    opt.num_concurrent_reqs = 1;
    opt.use_hosts_file = false;
    opt.preserve_intermediates = true;

    (cfg, opt)
}
