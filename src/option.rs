//! Secure Resolve Option

use std::{net::IpAddr, time::Duration};

use hickory_resolver::config::LookupIpStrategy;
use serde::{Deserialize, Serialize};

use crate::{dial::DialFn, TlsClientOption};

/// Where the secure dns server lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerIdentity {
    /// DoH uri template, e.g. `https://dns.google/dns-query{?dns}`.
    Https { uri: String },
    /// DoT server, `host`, `host:port` or an ip literal. Port defaults to 853.
    Tls { server: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SecureResolveOption {
    /// Literal addresses of the server, skipping bootstrap resolution.
    pub addresses: Vec<IpAddr>,
    /// Wrap exchanges in the ttl cache.
    pub cache: bool,
    /// Lifetime of cached negative answers that carry no SOA record.
    pub negative_ttl: Duration,
    pub strategy: Strategy,
    /// Bound of a single exchange and of the bootstrap lookup.
    pub timeout: Duration,
    pub attempts: usize,
    /// Forces the DoH request method. By default the uri template decides.
    pub method: Option<DohMethod>,
    pub tls: TlsClientOption,
    #[serde(skip)]
    pub dial: Option<DialFn>,
}

impl Default for SecureResolveOption {
    fn default() -> Self {
        Self {
            addresses: vec![],
            cache: false,
            negative_ttl: Duration::from_secs(30),
            strategy: Strategy::default(),
            timeout: Duration::from_secs(5),
            attempts: 2,
            method: None,
            tls: TlsClientOption::default(),
            dial: None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DohMethod {
    Get,
    Post,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Ipv4Only,
    Ipv6Only,
    Ipv4AndIpv6,
    Ipv6ThenIpv4,
    Ipv4ThenIpv6,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Ipv4AndIpv6
    }
}

impl From<Strategy> for LookupIpStrategy {
    fn from(value: Strategy) -> Self {
        match value {
            Strategy::Ipv4Only => Self::Ipv4Only,
            Strategy::Ipv6Only => Self::Ipv6Only,
            Strategy::Ipv4AndIpv6 => Self::Ipv4AndIpv6,
            Strategy::Ipv4ThenIpv6 => Self::Ipv4thenIpv6,
            Strategy::Ipv6ThenIpv4 => Self::Ipv6thenIpv4,
        }
    }
}
