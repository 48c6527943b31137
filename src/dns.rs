//! DNS lookups for crawler identity verification.
//!
//! The verifier needs exactly two primitives: reverse-resolve an address to a
//! hostname, and forward-resolve a hostname back to an address. Both are
//! blocking calls with the platform resolver defaults; a hanging resolver
//! stalls the pipeline, which is accepted for batch operation.

use std::net::IpAddr;
use tracing::debug;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::Resolver;

/// Reverse and forward DNS resolution.
///
/// Lookup failures are reported as `None`; the caller decides what a failed
/// lookup means (for crawler claims it is treated as evidence of spoofing).
pub trait Dns: Send + Sync {
    /// Resolve an address to its hostname (first PTR record, trailing dot
    /// stripped).
    fn reverse(&self, ip: IpAddr) -> Option<String>;

    /// Resolve a hostname to its address (first A/AAAA record).
    fn forward(&self, hostname: &str) -> Option<IpAddr>;
}

/// System resolver backed by `trust-dns`.
pub struct SystemDns {
    resolver: Resolver,
}

impl SystemDns {
    /// Create a resolver from the system configuration (`/etc/resolv.conf`),
    /// falling back to the library defaults when that is unavailable.
    pub fn new() -> anyhow::Result<Self> {
        let resolver = match Resolver::from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                debug!(error = %e, "system resolver config unavailable, using defaults");
                Resolver::new(ResolverConfig::default(), ResolverOpts::default())?
            }
        };
        Ok(Self { resolver })
    }
}

impl Dns for SystemDns {
    fn reverse(&self, ip: IpAddr) -> Option<String> {
        let lookup = self.resolver.reverse_lookup(ip).ok()?;
        let name = lookup.iter().next()?;
        Some(name.to_string().trim_end_matches('.').to_string())
    }

    fn forward(&self, hostname: &str) -> Option<IpAddr> {
        let lookup = self.resolver.lookup_ip(hostname).ok()?;
        lookup.iter().next()
    }
}
