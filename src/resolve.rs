//! Name resolution used by resolver workers.
//!
//! The pipeline only needs `resolve(name) -> address | failure`; how the
//! lookup happens is up to the [`Resolve`] implementation. Lookups are plain
//! blocking calls without a timeout, so a hung resolver blocks its worker.

use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs};

use crate::errors::ResolveError;

pub trait Resolve: Send + Sync {
    /// Resolve `host` to the textual form of one address.
    fn resolve(&self, host: &str) -> Result<String, ResolveError>;
}

/// Resolver backed by the operating system (`getaddrinfo`).
#[derive(Debug, Clone)]
pub struct SystemResolver {
    prefer_ipv4: bool,
}

impl SystemResolver {
    pub fn new(prefer_ipv4: bool) -> Self {
        Self { prefer_ipv4 }
    }

    fn pick(&self, addrs: impl Iterator<Item = IpAddr>) -> Option<IpAddr> {
        let mut first = None;
        for addr in addrs {
            if !self.prefer_ipv4 || addr.is_ipv4() {
                return Some(addr);
            }
            first.get_or_insert(addr);
        }
        first
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Resolve for SystemResolver {
    fn resolve(&self, host: &str) -> Result<String, ResolveError> {
        let addrs = (host, 0)
            .to_socket_addrs()
            .map_err(|source| ResolveError::Lookup {
                host: host.to_string(),
                source,
            })?;

        self.pick(addrs.map(|a| a.ip()))
            .map(|ip| ip.to_string())
            .ok_or_else(|| ResolveError::NoAddress(host.to_string()))
    }
}

/// Fixed host table, useful for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    table: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: impl Into<String>, addr: impl Into<String>) -> Self {
        self.table.insert(host.into(), addr.into());
        self
    }
}

impl Resolve for StaticResolver {
    fn resolve(&self, host: &str) -> Result<String, ResolveError> {
        self.table
            .get(host)
            .cloned()
            .ok_or_else(|| ResolveError::NoAddress(host.to_string()))
    }
}
