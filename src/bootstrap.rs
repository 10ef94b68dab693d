//! Bootstrap addresses of the secure dns server

use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use tokio::net::lookup_host;

use crate::{BootstrapError, ResolverError};

/// Ordered, non-empty set of addresses the secure server is reached at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAddrs {
    addrs: Vec<SocketAddr>,
}

impl BootstrapAddrs {
    /// Explicit addresses win, then ip literals, then a one-shot lookup with
    /// the platform resolver.
    pub async fn resolve(
        host: &str,
        port: u16,
        explicit: &[IpAddr],
        timeout: Duration,
    ) -> Result<Self, BootstrapError> {
        if !explicit.is_empty() {
            return Ok(Self {
                addrs: explicit.iter().map(|ip| SocketAddr::new(*ip, port)).collect(),
            });
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Self {
                addrs: vec![SocketAddr::new(ip, port)],
            });
        }

        let result = tokio::time::timeout(timeout, lookup_host((host, port))).await??;
        let mut addrs: Vec<SocketAddr> = Vec::new();
        for addr in result {
            if !addrs.contains(&addr) {
                addrs.push(addr);
            }
        }

        if addrs.is_empty() {
            return Err(BootstrapError::Empty(host.to_owned()));
        }

        log::debug!("bootstrap {} resolved to {:?}", host, addrs);
        Ok(Self { addrs })
    }

    pub fn as_slice(&self) -> &[SocketAddr] {
        &self.addrs
    }

    pub fn iter(&self) -> impl Iterator<Item = &SocketAddr> {
        self.addrs.iter()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

/// Parse "host:port", "[ipv6]:port", "ipv6", "host" or "[ipv6]" with a default port.
pub fn parse_host_port(s: &str, default_port: u16) -> Result<(&str, u16), ResolverError> {
    if s.parse::<IpAddr>().is_ok() {
        return Ok((s, default_port));
    }

    if let Some(rest) = s.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ResolverError::Option(format!("invalid ipv6 host in: {s}")))?;
        if host.is_empty() {
            return Err(ResolverError::Option(format!("empty host in: {s}")));
        }
        if tail.is_empty() {
            return Ok((host, default_port));
        }
        let port = tail
            .strip_prefix(':')
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(|| ResolverError::Option(format!("invalid port in: {s}")))?;
        return Ok((host, port));
    }

    if let Some((host, port_str)) = s.rsplit_once(':') {
        if host.is_empty() {
            return Err(ResolverError::Option(format!("empty host in: {s}")));
        }
        let port = port_str
            .parse::<u16>()
            .map_err(|_| ResolverError::Option(format!("invalid port in: {s}")))?;
        return Ok((host, port));
    }

    if s.is_empty() {
        return Err(ResolverError::Option("empty host".to_owned()));
    }

    Ok((s, default_port))
}
